//! Event bus: in-process pub/sub keyed by dot-separated topic,
//! with `*`/`**` wildcard subscriptions. Delivery is best-effort and
//! asynchronous; a slow subscriber's bounded queue drops its oldest event
//! on overflow rather than blocking the publisher.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

struct Subscriber {
    pattern: Vec<PatternSegment>,
    queue: Arc<Mutex<VecDeque<Event>>>,
    notify: Arc<Notify>,
    capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Single,
    /// `**`; must be the final segment.
    Trailing,
}

fn compile_pattern(pattern: &str) -> Vec<PatternSegment> {
    pattern
        .split('.')
        .map(|segment| match segment {
            "*" => PatternSegment::Single,
            "**" => PatternSegment::Trailing,
            literal => PatternSegment::Literal(literal.to_string()),
        })
        .collect()
}

fn topic_matches(pattern: &[PatternSegment], topic_segments: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic_segments.is_empty(),
        Some((PatternSegment::Trailing, _)) => true,
        Some((head, rest)) => match topic_segments.split_first() {
            None => false,
            Some((topic_head, topic_rest)) => {
                let head_matches = match head {
                    PatternSegment::Literal(expected) => expected == topic_head,
                    PatternSegment::Single => true,
                    PatternSegment::Trailing => unreachable!("handled above"),
                };
                head_matches && topic_matches(rest, topic_rest)
            }
        },
    }
}

/// A live subscription. Drop it to unsubscribe (the bus prunes dead
/// subscriptions lazily on next publish).
pub struct Subscription {
    queue: Arc<Mutex<VecDeque<Event>>>,
    notify: Arc<Notify>,
}

impl Subscription {
    /// Waits for and returns the next event matching this subscription's
    /// pattern, or `None` if the bus has been dropped.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            if let Some(event) = self.queue.lock().pop_front() {
                return Some(event);
            }
            self.notify.notified().await;
        }
    }

    #[must_use]
    pub fn try_recv(&self) -> Option<Event> {
        self.queue.lock().pop_front()
    }
}

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to `pattern` (e.g. `task.*.completed`, `routine.**`) with
    /// the default bounded queue capacity.
    #[must_use]
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.subscribe_with_capacity(pattern, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    #[must_use]
    pub fn subscribe_with_capacity(&self, pattern: &str, capacity: usize) -> Subscription {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());
        self.subscribers.lock().push(Subscriber {
            pattern: compile_pattern(pattern),
            queue: queue.clone(),
            notify: notify.clone(),
            capacity,
        });
        Subscription { queue, notify }
    }

    /// Publishes `payload` under `topic` to every subscriber whose pattern
    /// matches. `routine.*` topics must never be published from within
    /// handling of another `routine.*` event — that invariant is the
    /// routine scheduler's responsibility, not enforced here, since the bus
    /// has no notion of call-stack provenance.
    pub fn publish(&self, topic: &str, payload: Value) {
        let segments: Vec<&str> = topic.split('.').collect();
        let event = Event {
            topic: topic.to_string(),
            payload,
        };

        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.iter() {
            if !topic_matches(&subscriber.pattern, &segments) {
                continue;
            }
            let mut queue = subscriber.queue.lock();
            if queue.len() >= subscriber.capacity {
                queue.pop_front();
            }
            queue.push_back(event.clone());
            drop(queue);
            subscriber.notify.notify_one();
        }
    }
}

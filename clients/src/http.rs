//! Shared `reqwest::Client` construction: connect timeout bounded,
//! redirects disabled (neither the planner nor the worker endpoint should
//! ever redirect), HTTPS only for the planner. The worker runs on a local
//! network and is typically plain HTTP, so it gets its own unrestricted
//! client.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Client for the remote, HTTPS-only planner API.
#[must_use]
pub fn shared_http_client() -> Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT
        .get_or_init(|| {
            Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .redirect(reqwest::redirect::Policy::none())
                .https_only(true)
                .build()
                .expect("build shared HTTP client")
        })
        .clone()
}

/// Client for the local worker API, which may run over plain HTTP.
#[must_use]
pub fn worker_http_client() -> Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT
        .get_or_init(|| {
            Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("build shared worker HTTP client")
        })
        .clone()
}

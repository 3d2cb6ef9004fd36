//! Provenance records.

use serde::{Deserialize, Serialize};

use crate::ids::DataId;
use crate::scan::ScanResult;
use crate::trust::{DataSource, TrustLevel};

/// A stored, immutable record of one piece of data crossing a trust
/// boundary, or produced by a step.
///
/// `content_digest` is a digest (e.g. SHA-256 hex), not necessarily the
/// content itself, so the store does not need to retain potentially
/// sensitive payloads to answer provenance questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedData {
    pub id: DataId,
    pub content_digest: String,
    pub source: DataSource,
    pub trust: TrustLevel,
    /// Summary of the most relevant scan result for this item, if any was
    /// run. The full finding list lives in a separate scan-log structure;
    /// see `ScanResult` and the store's scan log.
    pub scan_summary: Option<ScanResult>,
    /// Ordered set of ids this item was derived from. Empty for data
    /// entering fresh from outside the system.
    pub derived_from: Vec<DataId>,
}

impl TaggedData {
    #[must_use]
    pub fn new(
        id: DataId,
        content_digest: impl Into<String>,
        source: DataSource,
        trust: TrustLevel,
        derived_from: Vec<DataId>,
    ) -> Self {
        Self {
            id,
            content_digest: content_digest.into(),
            source,
            trust,
            scan_summary: None,
            derived_from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_with_no_parents_keeps_declared_trust() {
        let item = TaggedData::new(
            DataId::generate(),
            "digest",
            DataSource::User,
            TrustLevel::Trusted,
            vec![],
        );
        assert!(item.trust.is_trusted());
        assert!(item.derived_from.is_empty());
    }
}

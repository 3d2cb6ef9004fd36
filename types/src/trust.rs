//! Trust levels and data sources.

use serde::{Deserialize, Serialize};

/// Trust level of a piece of data. Union rule: any derivation with an
/// `Untrusted` parent is `Untrusted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustLevel {
    Trusted,
    Untrusted,
}

impl TrustLevel {
    #[must_use]
    pub const fn is_trusted(self) -> bool {
        matches!(self, Self::Trusted)
    }

    /// Combine a parent trust level into an accumulator, following the union
    /// rule: once `Untrusted`, stays `Untrusted`.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::Trusted, Self::Trusted) => Self::Trusted,
            _ => Self::Untrusted,
        }
    }
}

/// Where a [`crate::TaggedData`] item originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    User,
    Planner,
    Worker,
    File,
    Tool,
    Web,
}

impl DataSource {
    /// Default trust level for data entering the system fresh from this
    /// source, before any derivation chain is considered.
    ///
    /// `File` defaults to `Untrusted` here; callers that know the writer is
    /// trusted should look it up via `FileProvenance` instead of relying on
    /// this default.
    #[must_use]
    pub const fn default_trust(self) -> TrustLevel {
        match self {
            Self::User | Self::Planner | Self::Tool => TrustLevel::Trusted,
            Self::Worker | Self::Web | Self::File => TrustLevel::Untrusted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_untrusted_if_any_parent_untrusted() {
        assert_eq!(TrustLevel::Trusted.union(TrustLevel::Trusted), TrustLevel::Trusted);
        assert_eq!(TrustLevel::Trusted.union(TrustLevel::Untrusted), TrustLevel::Untrusted);
        assert_eq!(TrustLevel::Untrusted.union(TrustLevel::Trusted), TrustLevel::Untrusted);
    }

    #[test]
    fn default_trust_matches_spec_table() {
        assert!(DataSource::User.default_trust().is_trusted());
        assert!(DataSource::Planner.default_trust().is_trusted());
        assert!(DataSource::Tool.default_trust().is_trusted());
        assert!(!DataSource::Worker.default_trust().is_trusted());
        assert!(!DataSource::Web.default_trust().is_trusted());
        assert!(!DataSource::File.default_trust().is_trusted());
    }
}

//! Policy-file and environment-variable configuration loading.

pub mod policy;
pub mod settings;

pub use policy::{AllowedCommand, CredentialPattern, PolicyFile, PolicyFileError};
pub use settings::{
    ApprovalMode, ConversationThresholds, RequiredScanners, SentinelSettings, default_config_dir,
};

//! berth-config — configuration for the berth control plane.
//!
//! Loads the service configuration (TOML) plus the three secret files it
//! points at: the envelope crypto material, the shared-host master password
//! vault, and the operator token used to authorize hard deletion.

pub mod config;
pub mod error;
pub mod secrets;

pub use config::{
    BerthConfig, CloneConfig, DefaultHost, HostTemplate, InstanceClass, QueueConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use secrets::{CryptoMaterial, MasterCredentials, OperatorToken, PasswordVault};

//! Secret-file loading and password generation.
//!
//! Three secret inputs are read once at startup: the envelope crypto
//! material (passphrase + salt), the master-password vault for shared
//! hosts, and the operator token that authorizes hard deletion. None of
//! these values are ever logged.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use serde::Deserialize;
use tracing::error;

use crate::error::{ConfigError, ConfigResult};

/// Passwords are 26 characters of lowercase base-36, a hair over 130 bits
/// of entropy.
const PASSWORD_LEN: usize = 26;
const PASSWORD_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Passphrase and salt feeding the envelope key derivation.
#[derive(Debug, Clone, Deserialize)]
pub struct CryptoMaterial {
    pub passphrase: String,
    pub salt: String,
}

impl CryptoMaterial {
    /// Load crypto material from a TOML file. Returns `None` when the file
    /// is unreadable or malformed; the envelope then rejects every
    /// operation rather than the process failing to start.
    pub fn load(path: &Path) -> Option<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                error!(path = %path.display(), error = %e, "error reading crypto file");
                return None;
            }
        };
        match toml::from_str(&text) {
            Ok(material) => Some(material),
            Err(e) => {
                error!(path = %path.display(), error = %e, "error parsing crypto file");
                None
            }
        }
    }
}

/// Master credentials for one shared host.
#[derive(Debug, Clone, Deserialize)]
pub struct MasterCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct VaultFile {
    #[serde(default)]
    hosts: HashMap<String, MasterCredentials>,
}

/// Master credentials for the shared fleet, keyed by unprefixed host id.
#[derive(Debug, Clone, Default)]
pub struct PasswordVault {
    hosts: HashMap<String, MasterCredentials>,
}

impl PasswordVault {
    /// Load the vault from a TOML file. An unreadable or malformed file
    /// yields an empty vault; shared operations then fail per-host with
    /// a missing-credentials error instead of taking the process down.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                error!(path = %path.display(), error = %e, "error reading password vault");
                return Self::default();
            }
        };
        match toml::from_str::<VaultFile>(&text) {
            Ok(file) => Self { hosts: file.hosts },
            Err(e) => {
                error!(path = %path.display(), error = %e, "error parsing password vault");
                Self::default()
            }
        }
    }

    /// Build a vault from an in-memory map (tests, dev mode).
    pub fn from_entries(entries: impl IntoIterator<Item = (String, MasterCredentials)>) -> Self {
        Self {
            hosts: entries.into_iter().collect(),
        }
    }

    /// Credentials for the given unprefixed host id.
    pub fn credentials(&self, host_id: &str) -> Option<&MasterCredentials> {
        self.hosts.get(host_id)
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// The static operator token authorizing hard deletion.
#[derive(Debug, Clone)]
pub struct OperatorToken(String);

impl OperatorToken {
    /// Load the token from the first line of a plain-text file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match text.lines().next() {
            Some(line) if !line.is_empty() => Ok(Self(line.to_string())),
            _ => {
                error!(path = %path.display(), "empty token file");
                Err(ConfigError::EmptyToken(path.display().to_string()))
            }
        }
    }

    /// Build a token from a literal value (tests, dev mode).
    pub fn from_value(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Whether the presented token matches the operator token.
    pub fn allows(&self, presented: &str) -> bool {
        self.0 == presented
    }
}

/// Generate a fresh tenant password.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_CHARSET.len());
            PASSWORD_CHARSET[idx] as char
        })
        .collect()
}

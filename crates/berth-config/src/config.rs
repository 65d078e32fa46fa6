//! Service configuration for the berth control plane.
//!
//! Loaded once at startup from a TOML file. Everything the orchestrator
//! needs to know that is not a secret lives here: naming, fleet tags,
//! queue cadence, the host template, and the instance-class catalog.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Polling configuration for one work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name (also used as the in-memory queue identifier).
    pub name: String,
    /// Tick period of the poller, in seconds.
    pub tick_secs: u64,
}

/// Template applied when creating a new host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostTemplate {
    /// Database engine, e.g. "postgres".
    pub engine: String,
    pub engine_version: String,
    /// Default compute class for new hosts, e.g. "m4.large".
    pub instance_class: String,
    /// Default allocated storage in gigabytes.
    pub storage_gb: u32,
    /// Master role name on shared hosts.
    pub master_user: String,
    /// Initial database name on a fresh host.
    pub db_name: String,
    pub port: u16,
    pub multi_az: bool,
    pub publicly_accessible: bool,
    /// Network placement; empty strings mean "provider default".
    #[serde(default)]
    pub subnet_group: String,
    #[serde(default)]
    pub security_group: String,
}

/// One entry in the instance-class catalog exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceClass {
    /// Class name without the provider prefix, e.g. "m4.large".
    pub class: String,
    pub total_ram_gb: u32,
    pub total_cores: u32,
}

/// A shared host the daemon guarantees exists at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultHost {
    /// Identifier before color and environment prefixing.
    pub identifier: String,
    pub db_name: String,
    pub instance_class: String,
    pub storage_gb: u32,
}

/// External clone utility configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Command template; `${source_host}`-style placeholders are substituted
    /// with connection parameters before execution.
    pub command: String,
    /// Hard wall-clock limit for a clone run, in seconds.
    pub timeout_secs: u64,
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BerthConfig {
    /// Environment prefix applied to every host name.
    pub identifier_prefix: String,
    /// Active deployment color; shared placement only considers hosts whose
    /// id contains this marker.
    pub deploy_color: String,
    /// Service identity tags applied to hosts this deploy creates.
    pub service_tag: String,
    pub service_component_tag: String,
    /// Value of the fleet-default tag that marks a host as ours.
    pub managed_service_tag: String,
    /// Environment tag key value (e.g. "staging", "prod").
    pub environment_tag: String,

    pub creation_queue: QueueConfig,
    pub deletion_queue: QueueConfig,

    /// Seconds a DELETED record must age before the reaper destroys it.
    pub reap_retention_secs: u64,
    /// Tick period of the reaper sweep, in seconds.
    pub reap_tick_secs: u64,

    pub host_template: HostTemplate,
    #[serde(default)]
    pub instance_classes: Vec<InstanceClass>,
    #[serde(default)]
    pub default_shared_hosts: Vec<DefaultHost>,

    #[serde(rename = "clone")]
    pub clone_config: CloneConfig,

    /// Path to the envelope crypto material (TOML: passphrase + salt).
    /// Absent means encryption is unavailable and every envelope operation
    /// fails with a key-material error.
    pub crypto_file: Option<PathBuf>,
    /// Path to the shared-host master password vault (TOML).
    pub password_file: PathBuf,
    /// Path to the operator token file (first line is the token).
    pub token_file: PathBuf,
}

impl BerthConfig {
    /// Load the configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Look up an instance class in the catalog by its unprefixed name.
    pub fn instance_class(&self, class: &str) -> Option<&InstanceClass> {
        self.instance_classes.iter().find(|c| c.class == class)
    }

    /// A self-contained configuration for dev mode and tests: staging
    /// naming, one default shared host, fast ticks, no crypto file.
    pub fn sample() -> Self {
        Self {
            identifier_prefix: "berth-stage".to_string(),
            deploy_color: "blue".to_string(),
            service_tag: "berth".to_string(),
            service_component_tag: "berth-data".to_string(),
            managed_service_tag: "berth-managed".to_string(),
            environment_tag: "staging".to_string(),
            creation_queue: QueueConfig {
                name: "berth-create".to_string(),
                tick_secs: 5,
            },
            deletion_queue: QueueConfig {
                name: "berth-delete".to_string(),
                tick_secs: 5,
            },
            reap_retention_secs: 900,
            reap_tick_secs: 300,
            host_template: HostTemplate {
                engine: "postgres".to_string(),
                engine_version: "15.4".to_string(),
                instance_class: "m4.large".to_string(),
                storage_gb: 100,
                master_user: "postgres".to_string(),
                db_name: "postgres".to_string(),
                port: 5432,
                multi_az: false,
                publicly_accessible: false,
                subnet_group: String::new(),
                security_group: String::new(),
            },
            instance_classes: vec![
                InstanceClass {
                    class: "m4.large".to_string(),
                    total_ram_gb: 8,
                    total_cores: 2,
                },
                InstanceClass {
                    class: "r4.xlarge".to_string(),
                    total_ram_gb: 30,
                    total_cores: 4,
                },
            ],
            default_shared_hosts: vec![DefaultHost {
                identifier: "pool_1".to_string(),
                db_name: "postgres".to_string(),
                instance_class: "m4.large".to_string(),
                storage_gb: 100,
            }],
            clone_config: CloneConfig {
                command: "berth-clone --source-host ${source_host} --source-port ${source_port} \
                          --source-user ${source_user} --source-password ${source_password} \
                          --source-schema ${source_schema} --target-host ${target_host} \
                          --target-port ${target_port} --target-user ${target_user} \
                          --target-password ${target_password} --target-schema ${target_schema}"
                    .to_string(),
                timeout_secs: 600,
            },
            crypto_file: None,
            password_file: PathBuf::from("/etc/berth/passwords.toml"),
            token_file: PathBuf::from("/etc/berth/operator.token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
identifier_prefix = "berth-stage"
deploy_color = "blue"
service_tag = "berth"
service_component_tag = "berth-data"
managed_service_tag = "berth-managed"
environment_tag = "staging"
reap_retention_secs = 900
reap_tick_secs = 300
password_file = "/etc/berth/passwords.toml"
token_file = "/etc/berth/operator.token"

[creation_queue]
name = "berth-create"
tick_secs = 5

[deletion_queue]
name = "berth-delete"
tick_secs = 5

[host_template]
engine = "postgres"
engine_version = "15.4"
instance_class = "m4.large"
storage_gb = 100
master_user = "postgres"
db_name = "postgres"
port = 5432
multi_az = false
publicly_accessible = false

[clone]
command = "berth-clone --from ${source_host} --to ${target_host}"
timeout_secs = 600

[[instance_classes]]
class = "m4.large"
total_ram_gb = 8
total_cores = 2
"#;

    #[test]
    fn parses_sample_config() {
        let cfg: BerthConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.deploy_color, "blue");
        assert_eq!(cfg.creation_queue.tick_secs, 5);
        assert_eq!(cfg.host_template.port, 5432);
        assert!(cfg.crypto_file.is_none());
        assert!(cfg.instance_class("m4.large").is_some());
        assert!(cfg.instance_class("m4.10xlarge").is_none());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = BerthConfig::load(Path::new("/nonexistent/berth.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

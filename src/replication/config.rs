//! Replication Configuration
//!
//! - Replicable id, the routing key for frames and initial loads
//! - Role: master (default) or replica
//! - Replica identity (UUID, auto-generated when absent)
//! - Retry cadence and bounded bookkeeping sizes
//!
//! Loaded from a JSON file, immutable after startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::descriptor::MasterDescriptor;
use super::errors::{ReplicationError, ReplicationResult};

/// Configured role of a replicable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationRole {
    #[default]
    Master,
    Replica,
}

/// Replication configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Id the replicable is discovered by
    pub replicable_id: String,

    pub role: ReplicationRole,

    /// Identity used when submitting to the master.
    ///
    /// Required for replicas (auto-generated if None), forbidden for masters.
    pub replica_id: Option<Uuid>,

    /// Required for replicas, forbidden for masters
    pub master_address: Option<String>,

    /// Interval between retries of operations the master did not accept
    pub retry_interval_ms: u64,

    /// How many echoed operation ids are remembered to suppress nested echoes
    pub echo_retention: usize,

    /// How many fanned-out operations are kept for transforming submissions
    pub history_capacity: usize,
}

/// Default retry interval
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

/// Default number of remembered echo ids
pub const DEFAULT_ECHO_RETENTION: usize = 1024;

/// Default server history size
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

impl ReplicationConfig {
    /// Create a master configuration.
    pub fn master(replicable_id: impl Into<String>) -> Self {
        Self {
            replicable_id: replicable_id.into(),
            role: ReplicationRole::Master,
            replica_id: None,
            master_address: None,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            echo_retention: DEFAULT_ECHO_RETENTION,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    /// Create a replica configuration.
    ///
    /// Generates a new UUID if replica_id is None.
    pub fn replica(
        replicable_id: impl Into<String>,
        master_address: impl Into<String>,
        replica_id: Option<Uuid>,
    ) -> Self {
        Self {
            role: ReplicationRole::Replica,
            replica_id: Some(replica_id.unwrap_or_else(Uuid::new_v4)),
            master_address: Some(master_address.into()),
            ..Self::master(replicable_id)
        }
    }

    /// Load and validate a JSON configuration file.
    ///
    /// A replica without `replica_id` gets a generated one.
    pub fn load(path: &Path) -> ReplicationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::configuration_error(format!(
                "cannot read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config: ReplicationConfig = serde_json::from_str(&content).map_err(|e| {
            ReplicationError::configuration_error(format!("invalid config JSON: {}", e))
        })?;
        if config.role == ReplicationRole::Replica && config.replica_id.is_none() {
            config.replica_id = Some(Uuid::new_v4());
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// - Replica requires master_address and replica_id
    /// - Master forbids both
    /// - Bookkeeping sizes and retry interval must be positive
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.replicable_id.trim().is_empty() {
            return Err(ReplicationError::configuration_error(
                "replicable_id must not be empty",
            ));
        }

        match self.role {
            ReplicationRole::Master => {
                if self.master_address.is_some() {
                    return Err(ReplicationError::configuration_error(
                        "Master must not have master_address configured",
                    ));
                }
                if self.replica_id.is_some() {
                    return Err(ReplicationError::configuration_error(
                        "Master must not have replica_id configured",
                    ));
                }
            }
            ReplicationRole::Replica => {
                if self.master_address.is_none() {
                    return Err(ReplicationError::configuration_error(
                        "Replica requires master_address to be configured",
                    ));
                }
                if self.replica_id.is_none() {
                    return Err(ReplicationError::configuration_error(
                        "Replica requires replica_id (should be auto-generated)",
                    ));
                }
            }
        }

        if self.retry_interval_ms == 0 {
            return Err(ReplicationError::configuration_error(
                "retry_interval_ms must be positive",
            ));
        }
        if self.echo_retention == 0 {
            return Err(ReplicationError::configuration_error(
                "echo_retention must be positive",
            ));
        }
        if self.history_capacity == 0 {
            return Err(ReplicationError::configuration_error(
                "history_capacity must be positive",
            ));
        }

        Ok(())
    }

    pub fn is_replica(&self) -> bool {
        self.role == ReplicationRole::Replica
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Master descriptor a replica configuration starts following.
    pub fn master_descriptor(&self) -> Option<MasterDescriptor> {
        match (self.role, &self.master_address, self.replica_id) {
            (ReplicationRole::Replica, Some(address), Some(replica_id)) => {
                Some(MasterDescriptor::new(address.clone(), replica_id))
            }
            _ => None,
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::master("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_master() {
        let config = ReplicationConfig::default();
        assert_eq!(config.role, ReplicationRole::Master);
        assert_eq!(config.retry_interval_ms, 1000);
        assert_eq!(config.echo_retention, 1024);
        assert_eq!(config.history_capacity, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_replica_config_valid() {
        let config = ReplicationConfig::replica("racing", "master:8888", None);
        assert!(config.validate().is_ok());
        assert!(config.is_replica());
        assert!(config.replica_id.is_some());
        let descriptor = config.master_descriptor().unwrap();
        assert_eq!(descriptor.address, "master:8888");
    }

    #[test]
    fn test_replica_requires_master_address() {
        let config = ReplicationConfig {
            master_address: None,
            ..ReplicationConfig::replica("racing", "master:8888", None)
        };
        let err = config.validate().unwrap_err();
        assert!(err.message.contains("master_address"));
    }

    #[test]
    fn test_master_forbids_master_address() {
        let config = ReplicationConfig {
            master_address: Some("other:8888".to_string()),
            ..ReplicationConfig::master("racing")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_master_forbids_replica_id() {
        let config = ReplicationConfig {
            replica_id: Some(Uuid::new_v4()),
            ..ReplicationConfig::master("racing")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut config = ReplicationConfig::master("racing");
        config.echo_retention = 0;
        assert!(config.validate().is_err());

        let mut config = ReplicationConfig::master("racing");
        config.history_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ReplicationConfig::master("racing");
        config.retry_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_replicable_id_rejected() {
        assert!(ReplicationConfig::master("  ").validate().is_err());
    }

    #[test]
    fn test_load_generates_replica_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"replicable_id":"racing","role":"replica","master_address":"m:8888"}}"#
        )
        .unwrap();

        let config = ReplicationConfig::load(file.path()).unwrap();
        assert!(config.is_replica());
        assert!(config.replica_id.is_some());
        assert_eq!(config.retry_interval_ms, DEFAULT_RETRY_INTERVAL_MS);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = ReplicationConfig::load(file.path()).unwrap_err();
        assert!(err.message.contains("invalid config JSON"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplicationConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.message.contains("cannot read config file"));
    }
}

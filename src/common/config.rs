//! Configuration for minibank components

use crate::common::{AccountId, Balance, NodeId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix (`MINIBANK__CLUSTER__ELECTION_TIMEOUT_MS=...`)
pub const ENV_PREFIX: &str = "MINIBANK";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub api: ApiConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A statically known cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub id: NodeId,
    pub address: String,
}

impl MemberConfig {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            address: format!("node-{}", id),
        }
    }
}

/// Cluster membership and protocol timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Fixed membership; nodes only move between alive and dead
    #[serde(default = "default_members")]
    pub members: Vec<MemberConfig>,

    /// Period of leader heartbeats and of the follower liveness check
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Silence after which a follower gives up on its leader
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_ms: u64,

    /// Max wait for an ElectionAck from a higher node
    #[serde(default = "default_election_timeout")]
    pub election_timeout_ms: u64,

    /// Max wait for a CoordinatorAnnouncement after being acked
    #[serde(default)]
    pub announcement_timeout_ms: Option<u64>,

    /// Cap for the election retry backoff
    #[serde(default)]
    pub max_election_backoff_ms: Option<u64>,

    /// Opening balances applied to every node
    #[serde(default)]
    pub seed: BTreeMap<AccountId, Balance>,
}

fn default_members() -> Vec<MemberConfig> {
    (1..=3).map(MemberConfig::new).collect()
}
fn default_heartbeat_interval() -> u64 {
    100
}
fn default_heartbeat_timeout() -> u64 {
    300
}
fn default_election_timeout() -> u64 {
    150
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            members: default_members(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
            election_timeout_ms: default_election_timeout(),
            announcement_timeout_ms: None,
            max_election_backoff_ms: None,
            seed: BTreeMap::new(),
        }
    }
}

impl ClusterConfig {
    /// Config with the given member ids and default timings
    pub fn with_members(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            members: ids.into_iter().map(MemberConfig::new).collect(),
            ..Default::default()
        }
    }

    /// Scale all timings to a base heartbeat interval (handy for tests)
    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self.heartbeat_timeout_ms = interval_ms * 3;
        self.election_timeout_ms = interval_ms * 3 / 2;
        self
    }

    pub fn member_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.members.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    pub fn announcement_timeout(&self) -> Duration {
        Duration::from_millis(
            self.announcement_timeout_ms
                .unwrap_or(self.election_timeout_ms * 2),
        )
    }

    pub fn max_election_backoff(&self) -> Duration {
        Duration::from_millis(
            self.max_election_backoff_ms
                .unwrap_or(self.election_timeout_ms * 8),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(Error::InvalidConfig("cluster.members cannot be empty".into()));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if member.id == 0 {
                return Err(Error::InvalidConfig("member ids must be > 0".into()));
            }
            if !seen.insert(member.id) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate member id {}",
                    member.id
                )));
            }
        }

        if self.heartbeat_interval_ms == 0 || self.election_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "heartbeat_interval_ms and election_timeout_ms must be > 0".into(),
            ));
        }

        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(Error::InvalidConfig(format!(
                "heartbeat_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.heartbeat_timeout_ms, self.heartbeat_interval_ms
            )));
        }

        if self.heartbeat_timeout_ms < self.heartbeat_interval_ms * 3 {
            tracing::warn!(
                "heartbeat_timeout_ms ({}) is below 3x heartbeat_interval_ms ({}); expect spurious elections",
                self.heartbeat_timeout_ms,
                self.heartbeat_interval_ms
            );
        }

        Ok(())
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7000))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then `MINIBANK__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.cluster.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.member_ids(), vec![1, 2, 3]);
        assert_eq!(config.heartbeat_timeout(), Duration::from_millis(300));
        assert_eq!(config.announcement_timeout(), Duration::from_millis(300));
        assert_eq!(config.max_election_backoff(), Duration::from_millis(1200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_membership() {
        assert!(ClusterConfig::with_members(Vec::new()).validate().is_err());
        assert!(ClusterConfig::with_members([0, 1]).validate().is_err());
        assert!(ClusterConfig::with_members([1, 2, 2]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_timeout() {
        let mut config = ClusterConfig::default();
        config.heartbeat_timeout_ms = config.heartbeat_interval_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scaled_timings() {
        let config = ClusterConfig::with_members([1, 2]).with_heartbeat_interval_ms(20);
        assert_eq!(config.heartbeat_timeout_ms, 60);
        assert_eq!(config.election_timeout_ms, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[api]
bind_addr = "127.0.0.1:7100"

[cluster]
heartbeat_interval_ms = 50
heartbeat_timeout_ms = 200
members = [{{ id = 1, address = "a" }}, {{ id = 5, address = "b" }}]

[cluster.seed]
alice = 1000
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api.bind_addr.port(), 7100);
        assert_eq!(config.cluster.member_ids(), vec![1, 5]);
        assert_eq!(config.cluster.heartbeat_interval_ms, 50);
        assert_eq!(config.cluster.election_timeout_ms, 150);
        assert_eq!(config.cluster.seed.get("alice"), Some(&1000));
    }
}

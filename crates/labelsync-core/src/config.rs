//! Sync engine configuration
//!
//! `SyncConfig` deserializes from the `[sync]` table of the application
//! configuration (camelCase keys). Unknown strategy or policy names are
//! rejected at deserialization; combinations that cannot run are rejected by
//! [`SyncConfig::validate`] when the orchestrator is built.

use crate::error::{Error, Result};
use crate::utils::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which adapters a save or load uses, and in what order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStrategy {
    /// Write on-device first, push to remotes in the background
    #[default]
    LocalFirst,
    /// Write to remotes first, fall back to the device
    RemoteFirst,
    /// Write to every adapter concurrently
    Hybrid,
    /// Device only
    LocalOnly,
    /// Remotes only
    RemoteOnly,
}

impl SyncStrategy {
    /// All strategies, for help output
    pub const ALL: [SyncStrategy; 5] = [
        Self::LocalFirst,
        Self::RemoteFirst,
        Self::Hybrid,
        Self::LocalOnly,
        Self::RemoteOnly,
    ];

    /// Config name of the strategy
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalFirst => "local-first",
            Self::RemoteFirst => "remote-first",
            Self::Hybrid => "hybrid",
            Self::LocalOnly => "local-only",
            Self::RemoteOnly => "remote-only",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| Error::Configuration(format!("unknown sync strategy: {}", s)))
    }
}

/// How diverging copies of a session are reconciled on load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Newest `updatedAt` wins, adapter priority breaks ties
    #[default]
    LatestWins,
    /// The remote copy wins
    RemoteWins,
    /// The on-device copy wins
    LocalWins,
    /// Field-level merge (not implemented; rejected at construction)
    Merge,
}

impl ConflictResolution {
    /// All policies, for help output
    pub const ALL: [ConflictResolution; 4] = [
        Self::LatestWins,
        Self::RemoteWins,
        Self::LocalWins,
        Self::Merge,
    ];

    /// Config name of the policy
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LatestWins => "latest-wins",
            Self::RemoteWins => "remote-wins",
            Self::LocalWins => "local-wins",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == s)
            .ok_or_else(|| Error::Configuration(format!("unknown conflict resolution: {}", s)))
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Adapter selection strategy
    pub strategy: SyncStrategy,
    /// Conflict resolution policy
    pub conflict_resolution: ConflictResolution,
    /// Run the background reconciliation worker
    pub auto_sync: bool,
    /// Seconds between reconciliation ticks
    pub sync_interval_secs: u64,
    /// Attempts per adapter write, including the first
    pub retry_attempts: u32,
    /// Fixed delay between attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Base URL of the remote session service
    pub remote_url: String,
    /// Per-request timeout for the remote adapter, in seconds
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::LocalFirst,
            conflict_resolution: ConflictResolution::LatestWins,
            auto_sync: true,
            sync_interval_secs: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            remote_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl SyncConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the conflict policy
    #[must_use]
    pub fn with_conflict_resolution(mut self, policy: ConflictResolution) -> Self {
        self.conflict_resolution = policy;
        self
    }

    /// Enable or disable the background worker
    #[must_use]
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Set the reconciliation interval
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_secs = interval.as_secs();
        self
    }

    /// Set attempts and delay for adapter writes
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the remote base URL
    #[must_use]
    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = url.into();
        self
    }

    /// Reconciliation interval
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Remote request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry policy for adapter writes
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    /// Reject settings the orchestrator cannot run with
    ///
    /// # Errors
    ///
    /// `Unimplemented` for the merge policy, `Configuration` for a zero
    /// attempt count, a zero interval with auto-sync on, or a zero timeout
    pub fn validate(&self) -> Result<()> {
        if self.conflict_resolution == ConflictResolution::Merge {
            return Err(Error::Unimplemented("merge conflict resolution"));
        }
        if self.retry_attempts == 0 {
            return Err(Error::Configuration(
                "retryAttempts must be at least 1".to_string(),
            ));
        }
        if self.auto_sync && self.sync_interval_secs == 0 {
            return Err(Error::Configuration(
                "syncIntervalSecs must be positive when autoSync is enabled".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "requestTimeoutSecs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.strategy, SyncStrategy::LocalFirst);
        assert_eq!(config.conflict_resolution, ConflictResolution::LatestWins);
        assert!(config.auto_sync);
        assert_eq!(config.sync_interval(), Duration::from_secs(30));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_policy().delay, Duration::from_millis(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SyncConfig = serde_json::from_value(json!({
            "strategy": "remote-first",
            "conflictResolution": "local-wins",
            "retryAttempts": 5
        }))
        .unwrap();

        assert_eq!(config.strategy, SyncStrategy::RemoteFirst);
        assert_eq!(config.conflict_resolution, ConflictResolution::LocalWins);
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result: std::result::Result<SyncConfig, _> =
            serde_json::from_value(json!({"strategy": "cloud-first"}));
        assert!(result.is_err());
        assert!("cloud-first".parse::<SyncStrategy>().is_err());
    }

    #[test]
    fn test_names_round_trip() {
        for strategy in SyncStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<SyncStrategy>().unwrap(), strategy);
        }
        for policy in ConflictResolution::ALL {
            assert_eq!(
                policy.to_string().parse::<ConflictResolution>().unwrap(),
                policy
            );
        }
    }

    #[test]
    fn test_validate() {
        let merge = SyncConfig::new().with_conflict_resolution(ConflictResolution::Merge);
        assert!(matches!(merge.validate(), Err(Error::Unimplemented(_))));

        let no_attempts = SyncConfig::new().with_retry(0, Duration::from_millis(10));
        assert!(matches!(no_attempts.validate(), Err(Error::Configuration(_))));

        let no_interval = SyncConfig::new().with_sync_interval(Duration::ZERO);
        assert!(matches!(no_interval.validate(), Err(Error::Configuration(_))));

        let manual = SyncConfig::new()
            .with_sync_interval(Duration::ZERO)
            .with_auto_sync(false);
        assert!(manual.validate().is_ok());
    }
}

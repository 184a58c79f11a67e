//! Migration configuration (Functional Core - pure data).

use std::time::Duration;

use crate::error::{MigrateError, Result};

/// Connection settings for one side of the migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsTarget {
    /// Static credentials. `None` falls back to the default credential chain.
    pub credentials: Option<StaticCredentials>,
    /// AWS region.
    pub region: String,
    /// Custom endpoint URL (for local DynamoDB).
    pub endpoint_url: Option<String>,
}

/// An access key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

impl AwsTarget {
    /// Builds a target, requiring the access key and secret to be given together.
    pub fn new(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        region: impl Into<String>,
        endpoint_url: Option<String>,
    ) -> Result<Self> {
        let region = region.into();
        if region.trim().is_empty() {
            return Err(MigrateError::InvalidConfig("region must not be empty".to_string()));
        }

        let credentials = match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(MigrateError::InvalidConfig(
                    "access key id given without a secret access key".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(MigrateError::InvalidConfig(
                    "secret access key given without an access key id".to_string(),
                ))
            }
        };

        Ok(Self {
            credentials,
            region,
            endpoint_url,
        })
    }

    /// Returns a display string for the target environment.
    pub fn target_display(&self) -> String {
        match &self.endpoint_url {
            Some(url) => format!("Local DynamoDB ({})", url),
            None => format!("AWS DynamoDB (region: {})", self.region),
        }
    }
}

/// How long to wait for a freshly created table to become active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

/// Retry policy for items a batch write reports as unprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further attempt.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Everything the orchestrator needs to know about a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Source table names, migrated in this order.
    pub tables: Vec<String>,
    pub source_prefix: String,
    pub destination_prefix: String,
    pub wait: WaitConfig,
    pub retry: RetryConfig,
    /// Stop after the first table that fails.
    pub fail_fast: bool,
}

impl MigrationConfig {
    pub fn new(
        tables: Vec<String>,
        source_prefix: impl Into<String>,
        destination_prefix: impl Into<String>,
    ) -> Self {
        Self {
            tables,
            source_prefix: source_prefix.into(),
            destination_prefix: destination_prefix.into(),
            wait: WaitConfig::default(),
            retry: RetryConfig::default(),
            fail_fast: false,
        }
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Destination name for a source table under this configuration.
    pub fn destination_name(&self, source_table: &str) -> String {
        destination_name(source_table, &self.source_prefix, &self.destination_prefix)
    }
}

/// Replaces the first occurrence of `source_prefix` in `table_name`.
///
/// Names without the prefix, and an empty prefix, leave the name unchanged.
pub fn destination_name(table_name: &str, source_prefix: &str, destination_prefix: &str) -> String {
    if source_prefix.is_empty() {
        return table_name.to_string();
    }
    table_name.replacen(source_prefix, destination_prefix, 1)
}

//! Configuration types for slack-export-enrich
//!
//! Each component takes its own configuration value at construction time;
//! nothing reads ambient state.

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Name of the user directory entry inside a Slack export
pub const USERS_ENTRY: &str = "users.json";

/// Smallest page size accepted by `users.list`
pub const MIN_PAGE_SIZE: u32 = 1;

/// Largest page size accepted by `users.list`
pub const MAX_PAGE_SIZE: u32 = 999;

/// Page size Slack recommends; larger values are allowed but logged
pub const RECOMMENDED_PAGE_SIZE: u32 = 200;

/// Input/output archive locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Export archive to read
    pub input: PathBuf,

    /// Archive to write
    pub output: PathBuf,

    /// Entry rewritten by the pipeline (default: "users.json")
    #[serde(default = "default_target_entry")]
    pub target_entry: String,
}

impl ArchiveConfig {
    /// Archive config for the standard user directory entry
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            target_entry: default_target_entry(),
        }
    }
}

/// Slack `users.list` client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsersApiConfig {
    /// Listing endpoint (default: "https://slack.com/api/users.list")
    #[serde(default = "default_users_endpoint")]
    pub endpoint: String,

    /// Bearer token
    pub token: String,

    /// Requested page size; clamped before use (default: 999)
    #[serde(default = "default_page_size")]
    pub page_size: i64,

    /// Sleep one second between pages (default: true)
    #[serde(default = "default_true")]
    pub pace_requests: bool,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Backoff policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl UsersApiConfig {
    /// Config with defaults for everything but the token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            endpoint: default_users_endpoint(),
            token: token.into(),
            page_size: default_page_size(),
            pace_requests: true,
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Profile picture download configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfilePictureConfig {
    /// URLs must start with this prefix (default: "https://avatars.slack-edge.com/")
    #[serde(default = "default_allowed_prefix")]
    pub allowed_prefix: String,

    /// URLs must end with one of these, case-sensitive (default: ".jpg", ".png")
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Directory inside the archive that pictures are written to (default: "profile_pictures")
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ProfilePictureConfig {
    fn default() -> Self {
        Self {
            allowed_prefix: default_allowed_prefix(),
            allowed_extensions: default_allowed_extensions(),
            storage_dir: default_storage_dir(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry behavior for `users.list` requests
///
/// Network failures and 5xx responses wait `backoff_base * 2^min(attempt, max_backoff_exponent)`.
/// 429 responses wait for the server's `Retry-After`, or `default_retry_after`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base delay for exponential backoff (default: 1 second)
    #[serde(default = "default_backoff_base", with = "duration_serde")]
    pub backoff_base: Duration,

    /// Exponent cap, so the longest backoff is `base * 2^cap` (default: 3)
    #[serde(default = "default_max_backoff_exponent")]
    pub max_backoff_exponent: u32,

    /// Wait used for 429 responses without a usable `Retry-After` (default: 1 second)
    #[serde(default = "default_retry_after", with = "duration_serde")]
    pub default_retry_after: Duration,

    /// Retries allowed per request; `None` retries forever (default: None)
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_base: default_backoff_base(),
            max_backoff_exponent: default_max_backoff_exponent(),
            default_retry_after: default_retry_after(),
            max_retries: None,
        }
    }
}

fn default_target_entry() -> String {
    USERS_ENTRY.to_string()
}

fn default_users_endpoint() -> String {
    "https://slack.com/api/users.list".to_string()
}

fn default_page_size() -> i64 {
    MAX_PAGE_SIZE as i64
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_allowed_prefix() -> String {
    "https://avatars.slack-edge.com/".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".jpg".to_string(), ".png".to_string()]
}

fn default_storage_dir() -> String {
    "profile_pictures".to_string()
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff_exponent() -> u32 {
    3
}

fn default_retry_after() -> Duration {
    Duration::from_secs(1)
}

// Durations are whole seconds in serialized config
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

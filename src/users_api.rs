//! Slack `users.list` client
//!
//! Walks every page of the listing and builds an [`EmailDirectory`] mapping user
//! ids to email addresses. Pages are requested one at a time; transient failures
//! are retried through [`crate::retry`], and successive pages can be paced to
//! stay under Slack's ~1 request/second guidance.

use crate::config::{MAX_PAGE_SIZE, MIN_PAGE_SIZE, RECOMMENDED_PAGE_SIZE, UsersApiConfig};
use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper, with_retry};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Wait between successive pages when pacing is enabled
const PACING_DELAY: Duration = Duration::from_secs(1);

/// `error` values in an `ok: false` body that mean the token itself is bad
const AUTH_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
];

/// User id to email address, built from every `users.list` page
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmailDirectory {
    emails: HashMap<String, String>,
}

impl EmailDirectory {
    /// Email for `user_id`, if Slack returned one
    pub fn get(&self, user_id: &str) -> Option<&str> {
        self.emails.get(user_id).map(String::as_str)
    }

    /// Record an email; entries with an empty id or email are ignored and later
    /// inserts for the same id replace earlier ones
    pub fn insert(&mut self, user_id: impl Into<String>, email: impl Into<String>) {
        let (user_id, email) = (user_id.into(), email.into());
        if user_id.is_empty() || email.is_empty() {
            return;
        }
        self.emails.insert(user_id, email);
    }

    /// Number of users with an email
    pub fn len(&self) -> usize {
        self.emails.len()
    }

    /// True when no emails were collected
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EmailDirectory {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut directory = Self::default();
        for (id, email) in iter {
            directory.insert(id, email);
        }
        directory
    }
}

/// Clamp a requested page size into the range `users.list` accepts
///
/// Zero or negative requests fall back to the recommended size.
pub fn clamp_page_size(requested: i64) -> u32 {
    let size = if requested <= 0 {
        RECOMMENDED_PAGE_SIZE
    } else {
        u32::try_from(requested)
            .unwrap_or(MAX_PAGE_SIZE)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    };

    if size > RECOMMENDED_PAGE_SIZE {
        debug!(
            limit = size,
            "users.list limit above {}; Slack recommends {}, max allowed is under 1000",
            RECOMMENDED_PAGE_SIZE,
            RECOMMENDED_PAGE_SIZE
        );
    } else {
        debug!(limit = size, "users.list limit set");
    }
    size
}

/// `Retry-After` in whole seconds, if present and parseable
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// Only the fields we need; everything else in the response is ignored.
#[derive(Debug, Default, Deserialize)]
struct UsersPage {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    members: Option<Vec<Member>>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Member {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    profile: Option<MemberProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct MemberProfile {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

impl UsersPage {
    fn next_cursor(&self) -> &str {
        self.response_metadata
            .as_ref()
            .and_then(|m| m.next_cursor.as_deref())
            .unwrap_or_default()
    }

    /// Turn an `ok: false` body into the matching error
    fn check_ok(&self) -> Result<()> {
        if self.ok {
            return Ok(());
        }
        match self.error.as_deref() {
            Some(code) if AUTH_ERRORS.contains(&code) => Err(Error::Authentication(format!(
                "Slack rejected the API token ({}). Is the access token correct?",
                code
            ))),
            Some(code) => Err(Error::ApiProtocol(format!(
                "Slack API response has ok=false: {}",
                code
            ))),
            None => Err(Error::ApiProtocol(
                "unexpected lack of ok=true in Slack API response. Is the access token correct?"
                    .to_string(),
            )),
        }
    }
}

/// Paginated `users.list` client
pub struct UsersClient {
    http: reqwest::Client,
    config: UsersApiConfig,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl UsersClient {
    /// Create a client that sleeps on the tokio clock
    ///
    /// # Errors
    /// Returns a configuration error if the token is empty or the endpoint is
    /// not a valid URL, or a network error if the HTTP client cannot be built.
    pub fn new(config: UsersApiConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(Error::Config {
                message: "Slack API token is required".to_string(),
                key: Some("api_token".to_string()),
            });
        }
        Url::parse(&config.endpoint).map_err(|e| Error::Config {
            message: format!("invalid users.list endpoint '{}': {}", config.endpoint, e),
            key: Some("endpoint".to_string()),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("slack-export-enrich/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            policy: RetryPolicy::new(config.retry.clone()),
            config,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the clock used for backoff and pacing
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Fetch every page and collect user emails
    ///
    /// # Errors
    /// - [`Error::Authentication`] when Slack rejects the token
    /// - [`Error::ApiProtocol`] for unexpected statuses or bodies without `ok: true`
    /// - the last retryable error if a configured retry cap is exhausted
    pub async fn fetch_all(&self) -> Result<EmailDirectory> {
        debug!("fetching emails from Slack API");

        let page_size = clamp_page_size(self.config.page_size);
        let mut directory = EmailDirectory::default();
        let mut cursor = String::new();
        let mut page = 1usize;
        let mut total = 0usize;

        loop {
            debug!(page, cursor_present = !cursor.is_empty(), "requesting users.list page");

            let cursor_ref = cursor.as_str();
            let body = with_retry(&self.policy, self.sleeper.as_ref(), move |attempt| {
                debug!(page, attempt = attempt + 1, "users.list request");
                self.fetch_page(page_size, cursor_ref)
            })
            .await?;

            body.check_ok()?;

            let members = body.members.as_deref().unwrap_or_default();
            for member in members {
                let id = member.id.as_deref().unwrap_or_default();
                let email = member
                    .profile
                    .as_ref()
                    .and_then(|p| p.email.as_deref())
                    .unwrap_or_default();
                directory.insert(id, email);
            }

            total += members.len();
            debug!(
                page,
                fetched = members.len(),
                total,
                "users.list page fetched"
            );

            let next = body.next_cursor();
            if next.is_empty() {
                break;
            }
            cursor = next.to_string();
            page += 1;

            if self.config.pace_requests {
                debug!("pacing: sleeping between page requests to respect ~1 rps guidance");
                self.sleeper.sleep(PACING_DELAY).await;
            }
        }

        info!(
            pages = page,
            users = total,
            emails = directory.len(),
            "fetched emails from Slack API"
        );
        Ok(directory)
    }

    fn page_url(&self, page_size: u32, cursor: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoint).map_err(|e| Error::Config {
            message: format!("invalid users.list endpoint: {}", e),
            key: Some("endpoint".to_string()),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &page_size.to_string());
            if !cursor.is_empty() {
                query.append_pair("cursor", cursor);
            }
        }
        Ok(url)
    }

    /// One request attempt, classified for the retry loop
    async fn fetch_page(&self, page_size: u32, cursor: &str) -> Result<UsersPage> {
        let url = self.page_url(page_size, cursor)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            });
        }
        if status.is_server_error() {
            return Err(Error::ServerError {
                status: status.as_u16(),
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Authentication(format!(
                "Slack API returned HTTP {}",
                status.as_u16()
            )));
        }
        if status != StatusCode::OK {
            return Err(Error::ApiProtocol(format!(
                "Slack API returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::ApiProtocol(format!("invalid users.list response: {}", e)))
    }
}

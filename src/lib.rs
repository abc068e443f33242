//! # slack-export-enrich
//!
//! Enriches a Slack workspace export archive in one pass.
//!
//! - **fetch-emails** walks the paginated `users.list` API and writes each
//!   user's email into `users.json`.
//! - **fetch-profile-pictures** downloads every user's avatar into
//!   `profile_pictures/` inside the archive and links it from `users.json`.
//!
//! Every other entry of the export is copied to the output archive untouched.
//!
//! ## Quick Start
//!
//! ```no_run
//! use slack_export_enrich::config::{ArchiveConfig, UsersApiConfig};
//! use slack_export_enrich::{UsersClient, fetch_emails};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = UsersClient::new(UsersApiConfig::with_token("xoxp-..."))?;
//!     let summary = fetch_emails(ArchiveConfig::new("export.zip", "enriched.zip"), &client).await?;
//!     println!("copied {} entries", summary.copied);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive rewrite pipeline
pub mod archive;
/// Subcommand runs
pub mod commands;
/// Configuration types
pub mod config;
/// Zip container writer that preserves entry headers
pub mod container;
/// Per-record enrichment
pub mod enrich;
/// Error types
pub mod error;
/// Profile picture downloads
pub mod pictures;
/// User directory codec
pub mod records;
/// Retry logic with backoff
pub mod retry;
/// Slack users.list client
pub mod users_api;

// Re-export commonly used types
pub use archive::{ArchiveRewriter, RewriteSummary};
pub use commands::{fetch_emails, fetch_profile_pictures};
pub use config::{ArchiveConfig, ProfilePictureConfig, RetryConfig, UsersApiConfig};
pub use enrich::{EmailEnricher, Enricher, EntrySink, PictureEnricher};
pub use error::{Error, Result};
pub use pictures::{PictureAsset, PictureFetcher};
pub use records::{Record, RecordExt};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use users_api::{EmailDirectory, UsersClient};

//! The two enrichment runs
//!
//! Each run owns the full sequence for one subcommand: prepare the enricher,
//! then hand the archive to [`ArchiveRewriter`]. Errors are returned to the
//! caller; nothing here exits the process.

use crate::archive::{ArchiveRewriter, RewriteSummary};
use crate::config::ArchiveConfig;
use crate::enrich::{EmailEnricher, PictureEnricher};
use crate::error::Result;
use crate::pictures::PictureFetcher;
use crate::users_api::{EmailDirectory, UsersClient};
use tracing::info;

/// Add `profile.email` to every user in the export
///
/// The whole `users.list` listing is fetched before the archive is rewritten.
/// Exports without a user directory are copied through without calling the API.
pub async fn fetch_emails(archive: ArchiveConfig, client: &UsersClient) -> Result<RewriteSummary> {
    let rewriter = ArchiveRewriter::new(archive);

    let directory = if rewriter.input_has_target()? {
        client.fetch_all().await?
    } else {
        info!(
            entry = rewriter.target_entry(),
            "no user directory in input archive, skipping Slack API"
        );
        EmailDirectory::default()
    };

    rewriter.rewrite(&EmailEnricher::new(directory)).await
}

/// Download profile pictures into the export and link them from each profile
pub async fn fetch_profile_pictures(
    archive: ArchiveConfig,
    fetcher: PictureFetcher,
) -> Result<RewriteSummary> {
    let rewriter = ArchiveRewriter::new(archive);
    rewriter.rewrite(&PictureEnricher::new(fetcher)).await
}

//! Per-record enrichment of the user directory
//!
//! An [`Enricher`] receives the decoded records of `users.json` and mutates them
//! in place. Problems with a single record (no `id`, no `profile`, no usable
//! picture) are logged and the record is left exactly as it was.

use crate::error::{Error, Result};
use crate::pictures::PictureFetcher;
use crate::records::{PROFILE_FIELD, Record, RecordExt};
use crate::users_api::EmailDirectory;
use async_trait::async_trait;
use tracing::{info, warn};

/// Profile field written by [`EmailEnricher`]
pub const EMAIL_FIELD: &str = "email";
/// Profile field read by [`PictureEnricher`]
pub const IMAGE_ORIGINAL_FIELD: &str = "image_original";
/// Profile field written by [`PictureEnricher`]
pub const IMAGE_PATH_FIELD: &str = "image_path";

/// Destination for entries created while enriching (downloaded pictures)
pub trait EntrySink: Send {
    /// Write a new archive entry
    ///
    /// Returns `Ok(false)` without writing if an entry with that name already
    /// exists in the input or was added earlier.
    fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<bool>;
}

/// Rewrites the records of the user directory entry
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Mutate `records` decoded from `entry`, adding new archive entries through `sink`
    async fn enrich(
        &self,
        entry: &str,
        records: &mut [Record],
        sink: &mut dyn EntrySink,
    ) -> Result<()>;
}

/// Sets `profile.email` from a prefetched [`EmailDirectory`]
pub struct EmailEnricher {
    directory: EmailDirectory,
}

impl EmailEnricher {
    /// Enricher backed by a complete directory
    pub fn new(directory: EmailDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Enricher for EmailEnricher {
    async fn enrich(
        &self,
        entry: &str,
        records: &mut [Record],
        _sink: &mut dyn EntrySink,
    ) -> Result<()> {
        if records.is_empty() {
            return Err(Error::MalformedInput {
                entry: entry.to_string(),
                reason: "failed to find any users; looks like something went wrong".to_string(),
            });
        }

        tracing::debug!(entry, "updating user directory with fetched emails");

        for record in records.iter_mut() {
            let name = record.name().to_string();
            let Some(user_id) = record.id().map(str::to_owned) else {
                info!("user entry without an id, skipping");
                continue;
            };
            let Some(profile) = record.record_field_mut(PROFILE_FIELD) else {
                warn!(user_id = %user_id, "user has no profile in {}", entry);
                continue;
            };

            // Users missing from the directory still get the field, left empty
            let email = self.directory.get(&user_id).unwrap_or_default();
            profile.set_str(EMAIL_FIELD, email);
            info!("{:?} ({:?}) -> {:?}", name, user_id, email);
        }

        Ok(())
    }
}

/// Downloads `profile.image_original` into the archive and sets `profile.image_path`
pub struct PictureEnricher {
    fetcher: PictureFetcher,
}

impl PictureEnricher {
    /// Enricher downloading through `fetcher`
    pub fn new(fetcher: PictureFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Enricher for PictureEnricher {
    async fn enrich(
        &self,
        entry: &str,
        records: &mut [Record],
        sink: &mut dyn EntrySink,
    ) -> Result<()> {
        tracing::debug!(entry, "updating user directory with fetched pictures");

        for record in records.iter_mut() {
            let name = record.name().to_string();
            let Some(user_id) = record.id().map(str::to_owned) else {
                info!("user entry without an id, skipping");
                continue;
            };
            let Some(profile) = record.record_field_mut(PROFILE_FIELD) else {
                warn!(user_id = %user_id, "user has no profile in {}", entry);
                continue;
            };

            let url = profile
                .str_field(IMAGE_ORIGINAL_FIELD)
                .filter(|url| self.fetcher.storage_name(&user_id, url).is_some())
                .map(str::to_owned);
            let Some(url) = url else {
                info!(user_id = %user_id, "skipping, no suitable profile picture found");
                continue;
            };

            info!("downloading profile picture for {:?}", name);
            let Some(asset) = self.fetcher.fetch(&user_id, &url).await else {
                continue;
            };

            if sink.add_entry(&asset.storage_name, &asset.bytes)? {
                profile.set_str(IMAGE_PATH_FIELD, asset.storage_name);
            } else {
                warn!(
                    user_id = %user_id,
                    entry = %asset.storage_name,
                    "archive already has an entry with this name, picture not linked"
                );
            }
        }

        Ok(())
    }
}

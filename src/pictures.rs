//! Profile picture downloads
//!
//! Only URLs on the configured avatar host with an allowed image extension are
//! fetched. A failed download is never fatal: the caller simply leaves the
//! user's profile untouched.

use crate::config::ProfilePictureConfig;
use crate::error::Result;
use tracing::{debug, info, warn};

/// A downloaded picture and the archive entry it belongs in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PictureAsset {
    /// Entry name inside the output archive, e.g. `profile_pictures/U123.jpg`
    pub storage_name: String,
    /// Image bytes as served
    pub bytes: Vec<u8>,
}

/// Downloads profile pictures referenced by `profile.image_original`
pub struct PictureFetcher {
    http: reqwest::Client,
    config: ProfilePictureConfig,
}

impl PictureFetcher {
    /// Create a fetcher with its own HTTP client
    pub fn new(config: ProfilePictureConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("slack-export-enrich/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// Archive entry name for `url`, or `None` if the URL is not an allowed picture
    ///
    /// The extension match is an exact, case-sensitive suffix match. User ids
    /// that are empty or could leave the storage directory (`/`, `\`, `..`)
    /// get no entry.
    pub fn storage_name(&self, user_id: &str, url: &str) -> Option<String> {
        if !is_plain_entry_component(user_id) {
            debug!(user_id, "user id is not usable as an archive entry name");
            return None;
        }
        if !url.starts_with(&self.config.allowed_prefix) {
            return None;
        }
        let extension = self
            .config
            .allowed_extensions
            .iter()
            .find(|ext| url.ends_with(ext.as_str()))?;
        Some(format!("{}/{}{}", self.config.storage_dir, user_id, extension))
    }

    /// Download the picture for `user_id`
    ///
    /// Returns `None` when the URL is not allowed or the download fails; the
    /// reason is logged. There is no retry.
    pub async fn fetch(&self, user_id: &str, url: &str) -> Option<PictureAsset> {
        let storage_name = self.storage_name(user_id, url)?;

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id, url, error = %e, "failed to download profile picture");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(
                user_id,
                url,
                status = status.as_u16(),
                "profile picture request returned an error status"
            );
            return None;
        }

        match response.bytes().await {
            Ok(bytes) => {
                info!(user_id, bytes = bytes.len(), entry = %storage_name, "downloaded profile picture");
                Some(PictureAsset {
                    storage_name,
                    bytes: bytes.to_vec(),
                })
            }
            Err(e) => {
                warn!(user_id, url, error = %e, "failed to read profile picture body");
                None
            }
        }
    }
}

fn is_plain_entry_component(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..")
}

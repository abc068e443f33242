//! Archive rewrite pipeline
//!
//! Copies a Slack export zip entry by entry. Every entry except the user
//! directory is copied as raw records, keeping its headers, extra fields,
//! comment and compressed bytes. The user directory is decoded, handed to an
//! [`Enricher`], and written back under the original entry's headers. Entries
//! the enricher creates are written just before it.
//!
//! Output goes to a temporary file beside the destination that is renamed into
//! place only after the zip central directory has been written, so a failed run
//! never leaves a file at the output path.

use crate::config::ArchiveConfig;
use crate::container::{ContainerWriter, EntryLayout};
use crate::enrich::{Enricher, EntrySink};
use crate::error::{Error, Result};
use crate::records;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::{DateTime, ZipArchive};

/// Counts describing a finished rewrite
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Input entries copied through unchanged
    pub copied: usize,
    /// Whether the user directory entry was found and rewritten
    pub target_rewritten: bool,
    /// New entries injected by the enricher
    pub added: usize,
}

/// Streams an input archive to an output archive, rewriting one entry
pub struct ArchiveRewriter {
    config: ArchiveConfig,
}

impl ArchiveRewriter {
    /// Create a rewriter for the given input/output pair
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// Name of the entry this rewriter intercepts
    pub fn target_entry(&self) -> &str {
        &self.config.target_entry
    }

    /// Whether the input archive contains the target entry
    ///
    /// Lets callers skip expensive preparation (API calls) for exports without
    /// a user directory.
    pub fn input_has_target(&self) -> Result<bool> {
        let archive = self.open_input()?;
        let found = archive
            .file_names()
            .any(|name| name == self.config.target_entry);
        Ok(found)
    }

    /// Copy the input archive to the output path, rewriting the target entry
    pub async fn rewrite(&self, enricher: &dyn Enricher) -> Result<RewriteSummary> {
        let mut archive = self.open_input()?;
        let mut source = self.open_source()?;
        let existing: HashSet<String> = archive.file_names().map(str::to_owned).collect();

        let output = self.create_output()?;
        let mut writer = ContainerWriter::new(BufWriter::new(output));
        let mut summary = RewriteSummary::default();

        for index in 0..archive.len() {
            let layout = EntryLayout::of(&archive.by_index_raw(index)?);
            debug!(entry = %layout.name, "processing archive entry");

            if layout.name != self.config.target_entry {
                writer.copy_entry(&mut source, &layout)?;
                summary.copied += 1;
                continue;
            }

            info!(entry = %layout.name, "found user directory entry");
            let mut users = {
                let mut entry = archive.by_index(index)?;
                records::decode(&layout.name, &mut entry)?
            };

            let mut sink = ContainerEntrySink {
                writer: &mut writer,
                existing: &existing,
                modified: layout.modified,
                added: Vec::new(),
            };
            enricher.enrich(&layout.name, &mut users, &mut sink).await?;
            summary.added += sink.added.len();

            let encoded = records::encode(&users)?;
            writer.replace_entry(&mut source, &layout, &encoded)?;
            summary.target_rewritten = true;
        }

        if !summary.target_rewritten {
            warn!(
                entry = %self.config.target_entry,
                "input archive has no user directory entry, copied unchanged"
            );
        }

        let finalize_error = |reason: String| Error::ArchiveFile {
            operation: "finalize",
            path: self.config.output.clone(),
            reason,
        };
        let output = writer
            .finish(archive.comment())
            .map_err(|e| finalize_error(e.to_string()))?
            .into_inner()
            .map_err(|e| finalize_error(e.into_error().to_string()))?;
        output.as_file().sync_all()?;
        output
            .persist(&self.config.output)
            .map_err(|e| Error::ArchiveFile {
                operation: "create",
                path: self.config.output.clone(),
                reason: e.to_string(),
            })?;

        info!(
            output = %self.config.output.display(),
            copied = summary.copied,
            added = summary.added,
            "output archive written"
        );
        Ok(summary)
    }

    fn open_input(&self) -> Result<ZipArchive<File>> {
        let file = self.open_source()?;
        ZipArchive::new(file).map_err(|e| Error::ArchiveFile {
            operation: "open",
            path: self.config.input.clone(),
            reason: e.to_string(),
        })
    }

    /// Second handle on the input, for raw record copies
    fn open_source(&self) -> Result<File> {
        File::open(&self.config.input).map_err(|e| Error::ArchiveFile {
            operation: "open",
            path: self.config.input.clone(),
            reason: e.to_string(),
        })
    }

    fn create_output(&self) -> Result<NamedTempFile> {
        let dir = self
            .config
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        tempfile::Builder::new()
            .prefix(".slack-export-enrich-")
            .suffix(".zip.partial")
            .tempfile_in(dir)
            .map_err(|e| Error::ArchiveFile {
                operation: "create",
                path: self.config.output.clone(),
                reason: e.to_string(),
            })
    }
}

/// Writes injected entries straight into the output archive
struct ContainerEntrySink<'a> {
    writer: &'a mut ContainerWriter<BufWriter<NamedTempFile>>,
    existing: &'a HashSet<String>,
    /// Timestamp given to new entries, taken from the user directory entry
    modified: DateTime,
    added: Vec<String>,
}

impl EntrySink for ContainerEntrySink<'_> {
    fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<bool> {
        if self.existing.contains(name) || self.added.iter().any(|n| n == name) {
            return Ok(false);
        }

        // Pictures are already compressed
        self.writer.add_stored(name, bytes, self.modified)?;
        self.added.push(name.to_string());
        debug!(entry = name, bytes = bytes.len(), "added archive entry");
        Ok(true)
    }
}

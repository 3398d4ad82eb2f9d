// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Version archive: preserves flattened version metadata once the
//! corresponding manifest has been cleaned up by maintenance (§4.9
//! supplement, ported from the version-history ledger a columnar
//! dataset format keeps alongside its manifests).

use std::collections::HashMap;
use std::sync::Arc;

use contextframe_core::error::{Error, Result};
use contextframe_io::object_store::FrameObjectStore;
use contextframe_table::format::ManifestSummary;
use object_store::path::Path;
use serde::{Deserialize, Serialize};

pub const ARCHIVE_DIR: &str = "_archive";
pub const VERSION_ARCHIVE_SUBDIR: &str = "versions";
pub const VERSION_ARCHIVE_FILE_SUFFIX: &str = ".json";

const INVERTED_VERSION_OFFSET: u64 = u64::MAX;

/// Versions are named with an inverted, zero-padded number so a plain
/// lexicographic directory listing already yields newest-first order.
pub fn to_inverted_version(version: u64) -> u64 {
    INVERTED_VERSION_OFFSET - version
}

pub fn from_inverted_version(inverted: u64) -> u64 {
    INVERTED_VERSION_OFFSET - inverted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionArchiveConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_archive_files: usize,
}

impl Default for VersionArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            max_archive_files: 2,
        }
    }
}

impl VersionArchiveConfig {
    pub fn from_config(config: &HashMap<String, String>) -> Self {
        Self {
            enabled: config
                .get("contextframe.version_archive.enabled")
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            max_entries: config
                .get("contextframe.version_archive.max_entries")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            max_archive_files: config
                .get("contextframe.version_archive.max_archive_files")
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: u64,
    pub timestamp_millis: i64,
    pub manifest_summary: ManifestSummary,
    pub is_tagged: bool,
    pub is_cleaned_up: bool,
    pub transaction_uuid: Option<String>,
    pub read_version: Option<u64>,
    pub operation_type: Option<String>,
    pub transaction_properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ArchiveFile {
    versions: Vec<VersionSummary>,
    latest_version_number: u64,
    dataset_created_millis: u64,
    created_at_millis: u64,
}

/// Version archive with persistence capability.
#[derive(Debug, Clone)]
pub struct VersionArchive {
    pub versions: Vec<VersionSummary>,
    pub latest_version_number: u64,
    pub dataset_created_millis: u64,
    pub created_at_millis: u64,
    config: VersionArchiveConfig,
    base: Path,
    object_store: Arc<FrameObjectStore>,
}

impl VersionArchive {
    pub fn archive_dir(&self) -> Path {
        self.base.child(ARCHIVE_DIR).child(VERSION_ARCHIVE_SUBDIR)
    }

    async fn list_archive_files(
        object_store: &FrameObjectStore,
        archive_dir: &Path,
    ) -> Result<Vec<(u64, Path)>> {
        let mut archives = Vec::new();
        for path in object_store.list_prefix(archive_dir).await? {
            if let Some(filename) = path.filename() {
                if let Some(inverted) = filename
                    .strip_suffix(VERSION_ARCHIVE_FILE_SUFFIX)
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    archives.push((from_inverted_version(inverted), path));
                }
            }
        }
        archives.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(archives)
    }

    /// Load the latest archive from storage, trying older files if the
    /// newest is corrupted, falling back to a fresh empty archive if
    /// none can be read.
    pub async fn load_or_new(
        base: Path,
        object_store: Arc<FrameObjectStore>,
        config: VersionArchiveConfig,
    ) -> Result<Self> {
        let archive_dir = base.child(ARCHIVE_DIR).child(VERSION_ARCHIVE_SUBDIR);
        let archives = Self::list_archive_files(&object_store, &archive_dir).await?;

        for (_, path) in &archives {
            match Self::load_from_path(&base, object_store.clone(), path, config).await {
                Ok(archive) => return Ok(archive),
                Err(e) => {
                    tracing::warn!("failed to load archive file {path}: {e}");
                }
            }
        }

        Ok(Self {
            versions: Vec::new(),
            latest_version_number: 0,
            dataset_created_millis: 0,
            created_at_millis: now_millis(),
            config,
            base,
            object_store,
        })
    }

    pub async fn load_latest(
        base: Path,
        object_store: Arc<FrameObjectStore>,
        config: VersionArchiveConfig,
    ) -> Result<Option<Self>> {
        let archive_dir = base.child(ARCHIVE_DIR).child(VERSION_ARCHIVE_SUBDIR);
        let archives = Self::list_archive_files(&object_store, &archive_dir).await?;
        for (_, path) in &archives {
            match Self::load_from_path(&base, object_store.clone(), path, config).await {
                Ok(archive) => return Ok(Some(archive)),
                Err(e) => tracing::warn!("failed to load archive file {path}: {e}"),
            }
        }
        Ok(None)
    }

    async fn load_from_path(
        base: &Path,
        object_store: Arc<FrameObjectStore>,
        path: &Path,
        config: VersionArchiveConfig,
    ) -> Result<Self> {
        let data = object_store.get_all(path).await?;
        let file: ArchiveFile = serde_json::from_slice(&data)
            .map_err(|_| Error::corruption(format!("malformed version archive at {path}")))?;
        Ok(Self {
            versions: file.versions,
            latest_version_number: file.latest_version_number,
            dataset_created_millis: file.dataset_created_millis,
            created_at_millis: file.created_at_millis,
            config,
            base: base.clone(),
            object_store,
        })
    }

    /// Append new version summaries; order is normalized on the next
    /// flush.
    pub fn add_summaries(&mut self, summaries: &[VersionSummary]) {
        if summaries.is_empty() {
            return;
        }
        self.versions.extend(summaries.iter().cloned());
    }

    fn finalize_summaries(&mut self) {
        if self.versions.is_empty() {
            return;
        }
        self.versions.sort_by_key(|v| v.version);
        if self.dataset_created_millis == 0 {
            self.dataset_created_millis = self
                .versions
                .first()
                .map(|v| v.timestamp_millis as u64)
                .unwrap_or(0);
        }
        if self.versions.len() > self.config.max_entries {
            let remove_count = self.versions.len() - self.config.max_entries;
            self.versions.drain(0..remove_count);
        }
        self.latest_version_number = self.versions.iter().map(|v| v.version).max().unwrap_or(0);
        self.created_at_millis = now_millis();
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.finalize_summaries();
        if self.versions.is_empty() {
            return Ok(());
        }

        let inverted = to_inverted_version(self.latest_version_number);
        let filename = format!("{inverted:020}{VERSION_ARCHIVE_FILE_SUFFIX}");
        let path = self.archive_dir().child(filename);

        let file = ArchiveFile {
            versions: self.versions.clone(),
            latest_version_number: self.latest_version_number,
            dataset_created_millis: self.dataset_created_millis,
            created_at_millis: self.created_at_millis,
        };
        let bytes = serde_json::to_vec(&file)?;
        self.object_store.put(&path, bytes).await?;

        self.cleanup_old_archives().await?;
        Ok(())
    }

    async fn cleanup_old_archives(&self) -> Result<()> {
        let archive_dir = self.archive_dir();
        let archives = Self::list_archive_files(&self.object_store, &archive_dir).await?;
        if archives.len() > self.config.max_archive_files {
            let delete_count = archives.len() - self.config.max_archive_files;
            for (_, path) in archives.iter().take(delete_count) {
                if let Err(e) = self.object_store.delete(path).await {
                    tracing::warn!("failed to delete old archive file {path}: {e}");
                }
            }
        }
        Ok(())
    }

    /// Flag every archived summary in `versions` as cleaned up, so a
    /// `versions()` caller can tell a GC'd version apart from one whose
    /// manifest is simply older (§4.9 `cleanup_old_versions`).
    pub fn mark_cleaned_up(&mut self, versions: &std::collections::HashSet<u64>) {
        for summary in &mut self.versions {
            if versions.contains(&summary.version) {
                summary.is_cleaned_up = true;
            }
        }
    }

    /// Flag the archived summary for `version`, if present, as tagged.
    pub fn mark_tagged(&mut self, version: u64, tagged: bool) {
        if let Some(summary) = self.versions.iter_mut().find(|v| v.version == version) {
            summary.is_tagged = tagged;
        }
    }

    pub fn latest_version(&self) -> u64 {
        self.latest_version_number
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[cfg(test)]
    fn config(&self) -> VersionArchiveConfig {
        self.config
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_summary(version: u64) -> VersionSummary {
        VersionSummary {
            version,
            timestamp_millis: version as i64 * 1000,
            manifest_summary: ManifestSummary {
                total_fragments: version,
                total_data_files: version,
                total_deletion_files: 0,
                total_rows: version * 100,
            },
            is_tagged: false,
            is_cleaned_up: false,
            transaction_uuid: None,
            read_version: None,
            operation_type: None,
            transaction_properties: HashMap::new(),
        }
    }

    async fn new_archive(config: VersionArchiveConfig) -> (VersionArchive, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FrameObjectStore::local(dir.path()).unwrap());
        let archive = VersionArchive::load_or_new(Path::from("test"), store, config)
            .await
            .unwrap();
        (archive, dir)
    }

    #[tokio::test]
    async fn load_or_new_starts_empty() {
        let (archive, _dir) = new_archive(VersionArchiveConfig::default()).await;
        assert!(archive.versions.is_empty());
        assert_eq!(archive.latest_version(), 0);
    }

    #[tokio::test]
    async fn add_summaries_and_flush_round_trips() {
        let (mut archive, _dir) = new_archive(VersionArchiveConfig::default()).await;
        archive.add_summaries(&[test_summary(1), test_summary(2)]);
        archive.flush().await.unwrap();

        let loaded = VersionArchive::load_or_new(
            archive.base.clone(),
            archive.object_store.clone(),
            archive.config(),
        )
        .await
        .unwrap();
        assert_eq!(loaded.versions.len(), 2);
        assert_eq!(loaded.latest_version(), 2);
    }

    #[tokio::test]
    async fn truncates_to_max_entries_keeping_newest() {
        let (mut archive, _dir) = new_archive(VersionArchiveConfig {
            max_entries: 2,
            ..Default::default()
        })
        .await;
        archive.add_summaries(&[test_summary(1), test_summary(2), test_summary(3)]);
        archive.flush().await.unwrap();
        assert_eq!(archive.versions.len(), 2);
        assert_eq!(archive.versions[0].version, 2);
        assert_eq!(archive.versions[1].version, 3);
    }

    #[tokio::test]
    async fn corrupted_newest_file_falls_back_to_older_one() {
        let (mut archive, _dir) = new_archive(VersionArchiveConfig::default()).await;
        archive.add_summaries(&[test_summary(1)]);
        archive.flush().await.unwrap();

        let path = archive
            .archive_dir()
            .child(format!("{:020}.json", to_inverted_version(1)));
        archive.object_store.put(&path, "not json").await.unwrap();

        let loaded = VersionArchive::load_or_new(
            archive.base.clone(),
            archive.object_store.clone(),
            archive.config(),
        )
        .await
        .unwrap();
        assert!(loaded.versions.is_empty());
    }

    #[tokio::test]
    async fn old_archive_files_are_cleaned_up() {
        let (mut archive, _dir) = new_archive(VersionArchiveConfig {
            max_archive_files: 2,
            ..Default::default()
        })
        .await;
        for i in 1..=4 {
            archive.add_summaries(&[test_summary(i)]);
            archive.flush().await.unwrap();
        }
        let listed = archive
            .object_store
            .list_prefix(&archive.archive_dir())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn version_inversion_round_trips_and_reverses_order() {
        assert_eq!(from_inverted_version(to_inverted_version(1)), 1);
        assert_eq!(from_inverted_version(to_inverted_version(100)), 100);
        assert!(to_inverted_version(1) > to_inverted_version(2));
    }
}

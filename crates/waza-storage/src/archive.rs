//! Raw API payload archive, one directory per remote resource.
//!
//! Layout: `<endpoint>/<resource>/<hash prefix>.json`, where `resource` is the
//! competition id, `<competition>-<weight>` pair, contest code or person id the
//! payload was requested for. A resource directory therefore holds every
//! distinct version of that resource ever fetched.

use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

/// Hex characters of the content hash kept in archived file names.
const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedPayload {
    pub path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
    /// False when this exact version of the resource was already archived.
    pub newly_written: bool,
}

#[derive(Debug, Clone)]
pub struct PayloadArchive {
    root: PathBuf,
}

impl PayloadArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    pub fn resource_dir(&self, endpoint: &str, resource: &str) -> PathBuf {
        self.root
            .join(path_segment(endpoint))
            .join(path_segment(resource))
    }

    pub async fn archive(
        &self,
        endpoint: &str,
        resource: &str,
        bytes: &[u8],
    ) -> anyhow::Result<ArchivedPayload> {
        let content_hash = Self::content_hash(bytes);
        let dir = self.resource_dir(endpoint, resource);
        let path = dir.join(format!("{}.json", &content_hash[..HASH_PREFIX_LEN]));

        let newly_written = if fs::try_exists(&path).await.unwrap_or(false) {
            false
        } else {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
            let temp = dir.join(format!(".{}.partial", Uuid::new_v4()));
            fs::write(&temp, bytes)
                .await
                .with_context(|| format!("writing {}", temp.display()))?;
            if let Err(err) = fs::rename(&temp, &path).await {
                let _ = fs::remove_file(&temp).await;
                return Err(err).with_context(|| format!("publishing {}", path.display()));
            }
            true
        };

        Ok(ArchivedPayload {
            path,
            content_hash,
            byte_size: bytes.len(),
            newly_written,
        })
    }

    /// Archived versions of one resource, oldest first.
    pub async fn versions(&self, endpoint: &str, resource: &str) -> anyhow::Result<Vec<PathBuf>> {
        let dir = self.resource_dir(endpoint, resource);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("listing {}", dir.display()))?;
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let modified = entry.metadata().await?.modified()?;
                versions.push((modified, path));
            }
        }
        versions.sort();
        Ok(versions.into_iter().map(|(_, path)| path).collect())
    }
}

fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn each_resource_keeps_its_distinct_versions() {
        let dir = tempdir().expect("tempdir");
        let archive = PayloadArchive::new(dir.path());

        let first = archive
            .archive("contest.find", "wc2023_m_0060_0001", br#"{"contests":[]}"#)
            .await
            .expect("first");
        let repeat = archive
            .archive("contest.find", "wc2023_m_0060_0001", br#"{"contests":[]}"#)
            .await
            .expect("repeat");
        let changed = archive
            .archive("contest.find", "wc2023_m_0060_0001", br#"{"contests":[{}]}"#)
            .await
            .expect("changed");
        archive
            .archive("contest.find", "wc2023_m_0060_0002", br#"{"contests":[]}"#)
            .await
            .expect("other contest");

        assert!(first.newly_written);
        assert!(!repeat.newly_written);
        assert_eq!(first.path, repeat.path);
        assert!(changed.newly_written);
        assert!(first
            .path
            .starts_with(dir.path().join("contest_find").join("wc2023_m_0060_0001")));

        let versions = archive
            .versions("contest.find", "wc2023_m_0060_0001")
            .await
            .expect("versions");
        assert_eq!(versions.len(), 2);
        assert!(archive
            .versions("contest.find", "never-fetched")
            .await
            .expect("empty")
            .is_empty());
    }

    #[test]
    fn resource_segments_cannot_escape_the_root() {
        assert_eq!(path_segment("competition.get_list"), "competition_get_list");
        assert_eq!(path_segment("../etc"), "___etc");
        assert_eq!(path_segment("2653-1"), "2653-1");
        assert_eq!(path_segment("  "), "_");
    }
}

//! Optional ordering manifest stored next to the media in the remote source.
//!
//! ```toml
//! [[items]]
//! file = "welcome.png"
//! duration_ms = 15000
//!
//! [[items]]
//! file = "summer-sale.mp4"
//! start = "2024-06-01T00:00:00Z"
//! end = "2024-07-01T00:00:00Z"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::media::MediaItem;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistManifest {
    #[serde(default)]
    pub items: Vec<ManifestEntry>,
}

/// Display settings for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl PlaylistManifest {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Order the locally available files into a playlist.
///
/// Manifest entries come first, in manifest order. Entries naming a file that
/// is not available are skipped. Files the manifest does not mention follow,
/// sorted by name.
pub fn build_playlist(available: &[String], manifest: Option<&PlaylistManifest>) -> Vec<MediaItem> {
    let present: HashSet<&str> = available.iter().map(String::as_str).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut items = Vec::with_capacity(available.len());

    if let Some(manifest) = manifest {
        for entry in &manifest.items {
            if !present.contains(entry.file.as_str()) {
                warn!("Manifest entry {} has no matching media file", entry.file);
                continue;
            }
            if !placed.insert(entry.file.as_str()) {
                warn!("Manifest lists {} more than once, keeping the first", entry.file);
                continue;
            }

            let mut item = MediaItem::from_file_name(&entry.file);
            item.duration = entry.duration_ms;
            item.start = entry.start;
            item.end = entry.end;
            items.push(item);
        }
    }

    let mut rest: Vec<&str> = available
        .iter()
        .map(String::as_str)
        .filter(|name| !placed.contains(name))
        .collect();
    rest.sort_unstable();
    rest.dedup();
    items.extend(rest.into_iter().map(MediaItem::from_file_name));

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_without_manifest_files_are_sorted() {
        let items = build_playlist(&names(&["c.jpg", "a.png", "b.mp4"]), None);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a.png", "b.mp4", "c.jpg"]);
    }

    #[test]
    fn test_manifest_order_comes_first() {
        let manifest = PlaylistManifest::parse(
            r#"
            [[items]]
            file = "c.jpg"
            duration_ms = 4000

            [[items]]
            file = "missing.png"

            [[items]]
            file = "a.png"
            start = "2024-06-01T00:00:00Z"
            end = "2024-07-01T00:00:00Z"

            [[items]]
            file = "c.jpg"
            "#,
        )
        .unwrap();

        let items = build_playlist(&names(&["a.png", "b.mp4", "c.jpg", "d.gif"]), Some(&manifest));
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c.jpg", "a.png", "b.mp4", "d.gif"]);

        assert_eq!(items[0].duration, Some(4000));
        assert_eq!(items[1].start, Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        assert_eq!(items[2].duration, None);
    }

    #[test]
    fn test_invalid_manifest_is_rejected() {
        assert!(PlaylistManifest::parse("[[items]]\nduration_ms = 5").is_err());
        assert!(PlaylistManifest::parse("").unwrap().items.is_empty());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// URL prefix under which the canonical media directory is exposed to displays
pub const MEDIA_URL_PREFIX: &str = "/media";

/// A single entry of the display sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Display time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl MediaItem {
    /// Build an item for a file stored in the canonical media directory
    pub fn from_file_name(file_name: &str) -> Self {
        Self {
            id: file_name.to_string(),
            name: file_name.to_string(),
            path: format!("{}/{}", MEDIA_URL_PREFIX, file_name),
            media_type: media_type_for(Path::new(file_name)).map(str::to_string),
            duration: None,
            start: None,
            end: None,
        }
    }

    /// How long this item stays on screen
    pub fn display_duration(&self, default: Duration) -> Duration {
        self.duration.map(Duration::from_millis).unwrap_or(default)
    }

    /// Whether the optional scheduling window admits `now`. Items without a
    /// window are always scheduled.
    pub fn is_scheduled_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.start.map_or(true, |start| now >= start);
        let not_ended = self.end.map_or(true, |end| now < end);
        started && not_ended
    }
}

/// Classify a file by extension into the coarse kinds the display understands
pub fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "gif" => Some("gif"),
        "jpg" | "jpeg" | "png" | "bmp" | "webp" | "svg" | "tiff" => Some("image"),
        "mp4" | "webm" | "mov" | "m4v" | "mkv" | "avi" => Some("video"),
        _ => None,
    }
}

/// Check a file name against the configured extension list (case-insensitive)
pub fn is_supported(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_item_from_file_name() {
        let item = MediaItem::from_file_name("sunrise.JPG");
        assert_eq!(item.id, "sunrise.JPG");
        assert_eq!(item.path, "/media/sunrise.JPG");
        assert_eq!(item.media_type.as_deref(), Some("image"));
        assert_eq!(item.duration, None);
    }

    #[test]
    fn test_display_duration_falls_back_to_default() {
        let mut item = MediaItem::from_file_name("clip.mp4");
        assert_eq!(item.display_duration(Duration::from_secs(10)), Duration::from_secs(10));

        item.duration = Some(2500);
        assert_eq!(item.display_duration(Duration::from_secs(10)), Duration::from_millis(2500));
    }

    #[test]
    fn test_scheduling_window() {
        let mut item = MediaItem::from_file_name("promo.png");
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(item.is_scheduled_at(now));

        item.start = Some(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
        assert!(!item.is_scheduled_at(now));

        item.start = Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        item.end = Some(now);
        assert!(!item.is_scheduled_at(now), "end bound is exclusive");
    }

    #[test]
    fn test_wire_format_uses_type_key() {
        let item = MediaItem::from_file_name("loop.gif");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "gif");
        assert!(json.get("duration").is_none());

        let parsed: MediaItem = serde_json::from_value(serde_json::json!({
            "id": "a", "name": "a", "path": "/media/a"
        }))
        .unwrap();
        assert_eq!(parsed.media_type, None);
    }

    #[test]
    fn test_supported_extensions() {
        let extensions = vec!["jpg".to_string(), "mp4".to_string()];
        assert!(is_supported(Path::new("a.JPG"), &extensions));
        assert!(is_supported(Path::new("b.mp4"), &extensions));
        assert!(!is_supported(Path::new("notes.txt"), &extensions));
        assert!(!is_supported(Path::new("README"), &extensions));
    }
}

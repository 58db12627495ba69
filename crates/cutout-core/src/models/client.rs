use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OutputFormat;

/// Client-side result of one successfully processed file.
///
/// `original_url` and `processed_url` are object references issued by the
/// client's object-URL registry; whoever removes the record must revoke them.
#[derive(Debug, Clone)]
pub struct ClientImageRecord {
    pub id: String,
    pub name: String,
    pub original_url: String,
    pub processed_url: String,
    pub format: OutputFormat,
    pub mime_type: String,
    pub blob: Vec<u8>,
}

impl ClientImageRecord {
    /// Composite dedup key: `{name}-{size}-{last_modified}`.
    pub fn composite_id(name: &str, size: u64, last_modified: i64) -> String {
        format!("{}-{}-{}", name, size, last_modified)
    }

    /// Download name: `no_bg_<stem>.<format>`, where the stem is the part of
    /// the original name before its first dot.
    pub fn download_name(&self) -> String {
        let stem = self.name.split('.').next().unwrap_or_default();
        format!("no_bg_{}.{}", stem, self.format.extension())
    }
}

/// One entry of the client's append-only download history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadHistoryEntry {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, format: OutputFormat) -> ClientImageRecord {
        ClientImageRecord {
            id: ClientImageRecord::composite_id(name, 10, 1),
            name: name.to_string(),
            original_url: "blob:cutout/1".to_string(),
            processed_url: "blob:cutout/2".to_string(),
            format,
            mime_type: format.mime_type().to_string(),
            blob: Vec::new(),
        }
    }

    #[test]
    fn test_composite_id() {
        assert_eq!(
            ClientImageRecord::composite_id("cat.png", 2048, 1700000000000),
            "cat.png-2048-1700000000000"
        );
    }

    #[test]
    fn test_download_name_uses_first_stem_segment() {
        assert_eq!(
            record("holiday.photo.png", OutputFormat::Jpg).download_name(),
            "no_bg_holiday.jpg"
        );
        assert_eq!(record("cat", OutputFormat::Png).download_name(), "no_bg_cat.png");
    }
}

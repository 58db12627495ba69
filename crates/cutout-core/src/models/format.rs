use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Output encodings supported by the background-removal endpoint.
///
/// `Jpg` and `Jpeg` encode identically but keep their own spelling so the
/// response filename matches what the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Jpg,
    Webp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Png,
        OutputFormat::Jpeg,
        OutputFormat::Jpg,
        OutputFormat::Webp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    /// File extension used for output artifacts and download names.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg | OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Encoder identifier handed to the engine (the uppercased format name).
    pub fn encoder_name(&self) -> &'static str {
        match self {
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg | OutputFormat::Jpg => "JPEG",
            OutputFormat::Webp => "WEBP",
        }
    }

    /// JPEG has no alpha channel, so the cutout is flattened over white.
    pub fn requires_opaque_background(&self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Jpg)
    }

    /// Inverse of [`OutputFormat::mime_type`]; `image/jpeg` maps to `Jpeg`.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let normalized = mime.split(';').next().unwrap_or(mime).trim().to_lowercase();
        match normalized.as_str() {
            "image/png" => Some(OutputFormat::Png),
            "image/jpeg" | "image/jpg" => Some(OutputFormat::Jpeg),
            "image/webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported output format '{0}'. Allowed formats: png, jpeg, jpg, webp")]
pub struct UnsupportedFormat(pub String);

impl FromStr for OutputFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" => Ok(OutputFormat::Jpeg),
            "jpg" => Ok(OutputFormat::Jpg),
            "webp" => Ok(OutputFormat::Webp),
            _ => Err(UnsupportedFormat(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!(" webp ".parse::<OutputFormat>().unwrap(), OutputFormat::Webp);
        assert_eq!("Jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpg);
        assert!("gif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_jpg_maps_to_jpeg_mime() {
        assert_eq!(OutputFormat::Jpg.mime_type(), "image/jpeg");
        assert_eq!(OutputFormat::Jpg.extension(), "jpg");
        assert_eq!(OutputFormat::Jpg.encoder_name(), "JPEG");
    }

    #[test]
    fn test_only_jpeg_variants_need_opaque_background() {
        let opaque: Vec<_> = OutputFormat::ALL
            .iter()
            .filter(|f| f.requires_opaque_background())
            .collect();
        assert_eq!(opaque, vec![&OutputFormat::Jpeg, &OutputFormat::Jpg]);
    }

    #[test]
    fn test_from_mime_type_strips_parameters() {
        assert_eq!(
            OutputFormat::from_mime_type("image/png; charset=binary"),
            Some(OutputFormat::Png)
        );
        assert_eq!(OutputFormat::from_mime_type("text/plain"), None);
    }
}

//! Media-domain types: container families, mime classification, and the
//! small formatting helpers used in progress text.
//!
//! Enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ContainerFamily
// ---------------------------------------------------------------------------

/// Container/codec family of a media payload, as derived from its mime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFamily {
    Mp4,
    #[serde(rename = "quicktime")]
    QuickTime,
    Webm,
    Matroska,
    Other,
}

impl ContainerFamily {
    /// Classify a mime string (e.g. `video/mp4;codecs=avc1.42E01E,mp4a.40.2`).
    ///
    /// Unknown or empty mimes classify as [`ContainerFamily::Other`].
    pub fn from_mime(mime: &str) -> Self {
        let m = mime.to_ascii_lowercase();
        if m.contains("video/mp4") {
            Self::Mp4
        } else if m.contains("quicktime") {
            Self::QuickTime
        } else if m.contains("video/webm") {
            Self::Webm
        } else if m.contains("matroska") {
            Self::Matroska
        } else {
            Self::Other
        }
    }

    /// Whether this family is accepted by the delivery target as-is.
    ///
    /// MP4 and QuickTime both count; everything else needs a container fix.
    pub fn is_delivery_compatible(self) -> bool {
        matches!(self, Self::Mp4 | Self::QuickTime)
    }

    /// File extension conventionally used for this family.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::QuickTime => "mov",
            Self::Webm => "webm",
            Self::Matroska => "mkv",
            Self::Other => "mp4",
        }
    }

    /// Output families in preference order (MP4-first).
    pub fn preferred_outputs() -> &'static [ContainerFamily] {
        &[Self::Mp4, Self::Webm]
    }
}

impl fmt::Display for ContainerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mp4 => write!(f, "mp4"),
            Self::QuickTime => write!(f, "quicktime"),
            Self::Webm => write!(f, "webm"),
            Self::Matroska => write!(f, "matroska"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Guess a mime type from a file extension (case-insensitive).
///
/// Unknown extensions default to MP4, matching the delivery preference.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mov" | "qt" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp4" | "m4v" => "video/mp4",
        _ => "video/mp4",
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Format a byte count as megabytes with one decimal, e.g. `49.5 MB`.
pub fn fmt_mb(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Format whole seconds as `Ns` or `Mm Ss`.
pub fn fmt_secs(secs: f64) -> String {
    let sec = secs.max(0.0).floor() as u64;
    if sec < 60 {
        format!("{sec}s")
    } else {
        format!("{}m {}s", sec / 60, sec % 60)
    }
}

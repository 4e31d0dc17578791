//! Core types for probe results.

use serde::{Deserialize, Serialize};

/// Duration and frame dimensions extracted from a media payload.
///
/// A failed probe yields [`SourceMeta::unknown`]; the conversion controller
/// tolerates zeros (duration is floored to one second at session start, and
/// zero dimensions defer to the configured resolution cap).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    /// Duration in seconds; `0.0` when unknown.
    pub duration_secs: f64,
    /// Width in pixels; `0` when unknown.
    pub width: u32,
    /// Height in pixels; `0` when unknown.
    pub height: u32,
}

impl SourceMeta {
    /// The degenerate result of a failed probe.
    pub fn unknown() -> Self {
        Self {
            duration_secs: 0.0,
            width: 0,
            height: 0,
        }
    }

    /// Whether any field carries real information.
    pub fn is_unknown(&self) -> bool {
        self.duration_secs <= 0.0 && self.width == 0 && self.height == 0
    }
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_default() {
        assert_eq!(SourceMeta::default(), SourceMeta::unknown());
        assert!(SourceMeta::unknown().is_unknown());
    }

    #[test]
    fn partial_metadata_is_not_unknown() {
        let meta = SourceMeta {
            duration_secs: 0.0,
            width: 1920,
            height: 1080,
        };
        assert!(!meta.is_unknown());
    }

    #[test]
    fn serde_roundtrip() {
        let meta = SourceMeta {
            duration_secs: 63.5,
            width: 1280,
            height: 720,
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: SourceMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}

//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! conversion and tools sections. Every field defaults sensibly so a
//! completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::policy::{QualityFloor, Tier, TierLadder};

/// Hard output ceiling the delivery target enforces: 50 MB.
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Safety margin kept under the ceiling: 512 KB.
pub const DEFAULT_SAFETY_BYTES: u64 = 512 * 1024;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub conversion: ConversionConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let conv = &self.conversion;

        if conv.max_attempts == 0 {
            warnings.push("conversion.max_attempts is 0; every conversion will fail".into());
        }
        if conv.fps == 0 {
            warnings.push("conversion.fps is 0; attempts cannot produce frames".into());
        }
        if conv.target_bytes() < 1024 * 1024 {
            warnings.push(format!(
                "effective target is under 1 MB ({} bytes); most sources cannot converge",
                conv.target_bytes()
            ));
        }
        if !conv
            .tier_ladder()
            .tiers()
            .iter()
            .any(|t| conv.min_quality.allows(*t))
        {
            warnings.push(format!(
                "min_quality {} excludes every ladder tier",
                conv.min_quality
            ));
        }
        if let Some(ref p) = self.tools.ffmpeg_path {
            if !p.exists() {
                warnings.push(format!("tools.ffmpeg_path {} does not exist", p.display()));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// ConversionConfig
// ---------------------------------------------------------------------------

/// Conversion policy defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Hard byte ceiling for outputs.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Margin kept under the ceiling.
    #[serde(default = "default_safety_bytes")]
    pub safety_bytes: u64,
    /// Frame rate used for re-encoding.
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Largest resolution conversion may use, as `"WxH"`.
    #[serde(default = "default_max_resolution")]
    pub max_resolution: Tier,
    /// Quality floor, as `"WxH|kbps"`.
    pub min_quality: QualityFloor,
    /// Attempt budget per session.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}
fn default_safety_bytes() -> u64 {
    DEFAULT_SAFETY_BYTES
}
fn default_fps() -> u32 {
    30
}
fn default_max_resolution() -> Tier {
    Tier::new(1280, 720)
}
fn default_max_attempts() -> u32 {
    10
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            safety_bytes: default_safety_bytes(),
            fps: default_fps(),
            max_resolution: default_max_resolution(),
            min_quality: QualityFloor::default(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ConversionConfig {
    /// The effective target: ceiling minus the safety margin.
    pub fn target_bytes(&self) -> u64 {
        self.max_bytes.saturating_sub(self.safety_bytes)
    }

    /// The downgrade ladder used by sessions with this config.
    pub fn tier_ladder(&self) -> TierLadder {
        TierLadder::default()
    }
}

// ---------------------------------------------------------------------------
// ToolsConfig
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

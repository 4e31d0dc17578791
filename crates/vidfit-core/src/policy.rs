//! Resolution tiers, the downgrade ladder, quality floor, and encode policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// A fixed (width, height) pair from the downgrade ladder.
///
/// Serializes as a `"WxH"` string (e.g. `"1280x720"`), matching the
/// configuration format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tier {
    pub width: u32,
    pub height: u32,
}

impl Tier {
    /// Create a tier from explicit dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel area of this tier.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether this tier fits within `other` on both axes.
    pub fn fits_within(self, other: Tier) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| Error::Validation(format!("invalid tier '{s}': expected WxH")))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::Validation(format!("invalid tier width in '{s}': {e}")))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::Validation(format!("invalid tier height in '{s}': {e}")))?;
        if width == 0 || height == 0 {
            return Err(Error::Validation(format!("tier '{s}' has a zero dimension")));
        }
        Ok(Tier { width, height })
    }
}

impl Serialize for Tier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TierLadder
// ---------------------------------------------------------------------------

/// Ordered sequence of resolution tiers, highest to lowest area.
///
/// Construction validates the ordering, so a ladder value is never empty.
#[derive(Debug, Clone)]
pub struct TierLadder {
    tiers: Vec<Tier>,
}

impl TierLadder {
    /// Build a ladder from the given tiers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the ladder is empty or its tiers are
    /// not in strictly decreasing area order.
    pub fn new(tiers: Vec<Tier>) -> crate::Result<Self> {
        if tiers.is_empty() {
            return Err(Error::Validation("tier ladder is empty".into()));
        }
        for pair in tiers.windows(2) {
            if pair[1].area() >= pair[0].area() {
                return Err(Error::Validation(format!(
                    "tier ladder not strictly decreasing: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { tiers })
    }

    /// The tiers in ladder order.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// The lowest (smallest-area) tier.
    pub fn lowest(&self) -> Tier {
        *self.tiers.last().expect("ladder is never empty")
    }

    /// Return the next tier strictly below `current`.
    ///
    /// If `current` is on the ladder, this is simply the next rung. If it is
    /// not (e.g. a custom resolution), the first rung with a strictly smaller
    /// area is returned. At the bottom the call is idempotent: the lowest
    /// tier is returned unchanged.
    pub fn next_lower(&self, current: Tier) -> Tier {
        if let Some(idx) = self.tiers.iter().position(|t| *t == current) {
            if idx + 1 < self.tiers.len() {
                return self.tiers[idx + 1];
            }
            return self.lowest();
        }
        self.tiers
            .iter()
            .copied()
            .find(|t| t.area() < current.area())
            .unwrap_or_else(|| self.lowest())
    }

    /// Select the tier a session starts at.
    ///
    /// The highest rung that fits within both the requested maximum and the
    /// source's native dimensions wins; if nothing fits, the lowest rung is
    /// used. A zero source dimension (probe failure) is treated as unbounded.
    pub fn starting_tier(&self, requested_max: Tier, source_width: u32, source_height: u32) -> Tier {
        let cap = Tier::new(
            if source_width > 0 {
                requested_max.width.min(source_width)
            } else {
                requested_max.width
            },
            if source_height > 0 {
                requested_max.height.min(source_height)
            } else {
                requested_max.height
            },
        );
        self.tiers
            .iter()
            .copied()
            .find(|t| t.fits_within(cap))
            .unwrap_or_else(|| self.lowest())
    }
}

impl Default for TierLadder {
    fn default() -> Self {
        Self {
            tiers: vec![
                Tier::new(1280, 720),
                Tier::new(854, 480),
                Tier::new(640, 360),
                Tier::new(426, 240),
                Tier::new(320, 180),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// QualityFloor
// ---------------------------------------------------------------------------

/// Minimum acceptable tier and its paired minimum video bitrate.
///
/// Serializes as `"WxH|kbps"` (e.g. `"640x360|250"`), matching the
/// configuration format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityFloor {
    /// Smallest resolution the controller may descend to.
    pub min_tier: Tier,
    /// Video bitrate floor in bits per second.
    pub min_video_bitrate_bps: u64,
}

impl QualityFloor {
    /// Whether `tier` is at or above this floor on both axes.
    pub fn allows(self, tier: Tier) -> bool {
        tier.width >= self.min_tier.width && tier.height >= self.min_tier.height
    }
}

impl Default for QualityFloor {
    fn default() -> Self {
        Self {
            min_tier: Tier::new(640, 360),
            min_video_bitrate_bps: 250_000,
        }
    }
}

impl fmt::Display for QualityFloor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.min_tier, self.min_video_bitrate_bps / 1000)
    }
}

impl FromStr for QualityFloor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tier, kbps) = s
            .split_once('|')
            .ok_or_else(|| Error::Validation(format!("invalid floor '{s}': expected WxH|kbps")))?;
        let min_tier: Tier = tier.parse()?;
        let kbps = kbps
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::Validation(format!("invalid floor bitrate in '{s}': {e}")))?;
        Ok(QualityFloor {
            min_tier,
            min_video_bitrate_bps: kbps * 1000,
        })
    }
}

impl Serialize for QualityFloor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QualityFloor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// EncodePolicy
// ---------------------------------------------------------------------------

/// The full parameter tuple for one encode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodePolicy {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate_bps: u64,
    pub audio_bitrate_bps: u64,
}

impl EncodePolicy {
    /// Build a policy at the given tier.
    pub fn new(tier: Tier, fps: u32, video_bitrate_bps: u64, audio_bitrate_bps: u64) -> Self {
        Self {
            width: tier.width,
            height: tier.height,
            fps,
            video_bitrate_bps,
            audio_bitrate_bps,
        }
    }

    /// The resolution tier this policy encodes at.
    pub fn tier(&self) -> Tier {
        Tier::new(self.width, self.height)
    }

    /// Return a copy with the video bitrate clamped to `[min, max]`.
    ///
    /// The floor wins when the bounds cross (a configured floor above the
    /// retry cap still takes effect).
    pub fn clamp_video_bitrate(mut self, min: u64, max: u64) -> Self {
        self.video_bitrate_bps = self.video_bitrate_bps.min(max).max(min);
        self
    }

    /// Return a copy moved to a different tier, bitrates unchanged.
    pub fn at_tier(mut self, tier: Tier) -> Self {
        self.width = tier.width;
        self.height = tier.height;
        self
    }
}

impl fmt::Display for EncodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps, ~{} kbps video",
            self.width,
            self.height,
            self.fps,
            self.video_bitrate_bps / 1000
        )
    }
}

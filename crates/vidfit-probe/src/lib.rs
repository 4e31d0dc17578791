//! # vidfit-probe
//!
//! Metadata probing for vidfit: extract duration and frame dimensions from an
//! in-memory media payload.
//!
//! This crate provides:
//!
//! - **The probing seam** ([`MetadataProber`]) -- implemented by backends and
//!   consumed by the conversion controller.
//! - **A pure-Rust ISO-BMFF backend** ([`Mp4Prober`]) -- walks `moov`/`mvhd`/
//!   `tkhd` boxes directly, covering MP4 and QuickTime sources with no
//!   external tools.
//! - **An ffprobe backend** ([`FfprobeProber`]) -- shells out for everything
//!   the native parser does not cover (WebM, Matroska, ...).
//! - **The never-fails wrapper** ([`probe_or_default`]) -- the controller's
//!   contract: any probe failure degrades to zero metadata instead of an
//!   error.

pub mod ffprobe;
pub mod mp4;
pub mod prober;
pub mod types;

// ---- Re-exports for convenience ----

pub use ffprobe::FfprobeProber;
pub use mp4::Mp4Prober;
pub use prober::{probe_or_default, MetadataProber, ProberStack};
pub use types::SourceMeta;

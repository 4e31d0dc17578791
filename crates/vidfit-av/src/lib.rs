//! # vidfit-av
//!
//! The encoding side of vidfit: the Encoder capability boundary, the real
//! ffmpeg backend, external tool management, and the single-attempt executor.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Attempt workspace** ([`AttemptWorkspace`]) -- tempdir lifecycle for
//!   one encode attempt's staged input and output.
//! - **The encoder seam** ([`Encoder`], [`EncodeSession`]) -- the opaque
//!   capability the controller drives; backends advertise which container
//!   families they can produce.
//! - **The ffmpeg backend** ([`FfmpegEncoder`]) -- H.264/AAC MP4 encoding
//!   with streamed progress and cooperative abort.
//! - **The attempt executor** ([`AttemptExecutor`]) -- runs one encode pass,
//!   forwarding throttled progress and honoring cancellation.

pub mod attempt;
pub mod command;
pub mod encoder;
pub mod ffmpeg;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use attempt::{AttemptExecutor, AttemptFailure, AttemptOutcome};
pub use command::{ToolCommand, ToolOutput};
pub use encoder::{preferred_output, EncodeSession, EncodeStep, EncodedOutput, Encoder};
pub use ffmpeg::FfmpegEncoder;
pub use tools::{ToolInfo, ToolRegistry};
pub use workspace::AttemptWorkspace;

//! vidfit - compress a video so the output fits under a hard byte ceiling.
//!
//! This library crate exposes the conversion controller for embedding and
//! integration testing; the binary wraps it in a CLI.

pub mod controller;
pub mod source;

pub use controller::{ConversionOutput, ConvergenceController, SessionHandle};
pub use source::SourceMedia;

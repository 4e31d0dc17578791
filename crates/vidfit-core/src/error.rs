//! Unified error type for the vidfit workspace.
//!
//! All crates funnel their failures into [`Error`]. Terminal conversion
//! failures carry enough context (last tried policy, attempt count, last
//! output size) for callers to render an actionable message.

use crate::policy::EncodePolicy;

/// Unified error type covering all failure modes in vidfit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller requested cancellation. Not a defect; surfaced as an error
    /// so the request resolves with exactly one terminal classification.
    #[error("conversion cancelled")]
    Cancelled,

    /// The source could not be decoded or read at all.
    #[error("decode failure: {0}")]
    Decode(String),

    /// The backend cannot realize the requested policy (or any policy).
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// The backend failed mid-attempt. Recoverable: the controller retries
    /// with a downgraded policy until the attempt budget runs out.
    #[error("encoder runtime error: {0}")]
    EncoderRuntime(String),

    /// The quality floor was reached without meeting the size target.
    #[error(
        "quality floor reached after {attempts} attempts \
         (last policy {last_policy}, last output {last_output_bytes:?} bytes)"
    )]
    FloorReached {
        /// Attempts consumed before giving up.
        attempts: u32,
        /// The policy used by the final attempt.
        last_policy: EncodePolicy,
        /// Size of the last produced output, if any attempt completed.
        last_output_bytes: Option<u64>,
    },

    /// The attempt budget was exhausted without an output under the target.
    #[error(
        "max attempts ({attempts}) exceeded \
         (last policy {last_policy}, last output {last_output_bytes:?} bytes)"
    )]
    MaxAttemptsExceeded {
        /// The attempt budget that was consumed.
        attempts: u32,
        /// The policy used by the final attempt.
        last_policy: EncodePolicy,
        /// Size of the last produced output, if any attempt completed.
        last_output_bytes: Option<u64>,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("io error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Input data or configuration failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error terminates the conversion as a whole.
    ///
    /// [`Error::EncoderRuntime`] is the one recoverable variant: the
    /// controller absorbs it into the retry/backoff loop unless the attempt
    /// budget is already spent.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::EncoderRuntime(_))
    }

    /// Convenience constructor for [`Error::Decode`].
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode(message.into())
    }

    /// Convenience constructor for [`Error::EncoderRuntime`].
    pub fn encoder_runtime(message: impl Into<String>) -> Self {
        Error::EncoderRuntime(message.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

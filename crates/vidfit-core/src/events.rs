//! Progress reporting contract between the conversion core and its caller.
//!
//! Sinks are advisory: the controller and executor call them fire-and-forget,
//! and a sink must never block an encoding suspension point or fail an
//! attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ProgressUpdate
// ---------------------------------------------------------------------------

/// A normalized progress event for one in-flight attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// 1-based attempt number within the session.
    pub attempt: u32,
    /// Fraction of the source consumed, in `[0, 1]`.
    pub fraction: f64,
    /// Source seconds consumed so far.
    pub elapsed_source_secs: f64,
    /// Total source duration in seconds.
    pub total_source_secs: f64,
    /// Wall-clock estimate of time remaining for this attempt.
    ///
    /// `None` below 2% progress, where the estimate would be noise; render
    /// as "estimating".
    pub eta: Option<Duration>,
}

// ---------------------------------------------------------------------------
// ConversionReport
// ---------------------------------------------------------------------------

/// Terminal event for a conversion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ConversionReport {
    /// The session produced an output at or below the target.
    Success {
        /// Final output size in bytes.
        final_size_bytes: u64,
    },
    /// The session ended without a conforming output.
    Failure {
        /// Size of the last produced output, if any attempt completed.
        last_size_bytes: Option<u64>,
    },
}

// ---------------------------------------------------------------------------
// ProgressSink
// ---------------------------------------------------------------------------

/// Receiver for progress and terminal events.
///
/// Implementations must be cheap and non-blocking; they are invoked from the
/// encode loop's suspension points.
pub trait ProgressSink: Send + Sync {
    /// An attempt made measurable forward progress.
    fn progress(&self, update: ProgressUpdate);

    /// The session reached a terminal state.
    fn finished(&self, report: ConversionReport);
}

/// A sink that discards everything.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn progress(&self, _update: ProgressUpdate) {}
    fn finished(&self, _report: ConversionReport) {}
}

/// A sink that forwards events to caller-supplied callbacks.
pub struct CallbackSink {
    on_progress: Box<dyn Fn(ProgressUpdate) + Send + Sync>,
    on_finished: Box<dyn Fn(ConversionReport) + Send + Sync>,
}

impl CallbackSink {
    /// Create a sink from the given callbacks.
    pub fn new(
        on_progress: impl Fn(ProgressUpdate) + Send + Sync + 'static,
        on_finished: impl Fn(ConversionReport) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_progress: Box::new(on_progress),
            on_finished: Box::new(on_finished),
        }
    }
}

impl ProgressSink for CallbackSink {
    fn progress(&self, update: ProgressUpdate) {
        (self.on_progress)(update);
    }

    fn finished(&self, report: ConversionReport) {
        (self.on_finished)(report);
    }
}

impl std::fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

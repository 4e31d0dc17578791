//! Single-attempt execution: drive one encode pass through the backend,
//! forwarding throttled progress and honoring cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use vidfit_core::events::{ProgressSink, ProgressUpdate};
use vidfit_core::{ContainerFamily, EncodePolicy, Error};

use crate::encoder::{preferred_output, Encoder};
use crate::workspace::AttemptWorkspace;

/// Minimum cadence between progress events.
const PROGRESS_THROTTLE: Duration = Duration::from_millis(250);

/// Below this fraction an ETA would be noise; report `None` instead.
const MIN_ETA_FRACTION: f64 = 0.02;

/// How one attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The backend cannot realize the requested policy at all.
    EncoderUnavailable(String),
    /// The source could not be read.
    Decode(String),
    /// The backend failed mid-attempt; the controller may retry at a
    /// downgraded policy.
    Runtime(String),
}

/// The result of one encode attempt. Produced once, never mutated.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The pass completed; whether it met the size target is the
    /// controller's judgment, not the executor's.
    Completed {
        /// Encoded payload.
        bytes: Bytes,
        /// Mime type reported by the backend.
        mime: String,
    },
    /// Cancellation was observed at a suspension point; partial output has
    /// been discarded.
    Cancelled,
    /// The attempt failed; resources have been released.
    Failed(AttemptFailure),
}

impl AttemptOutcome {
    /// Size of the produced output, if the attempt completed.
    pub fn output_size(&self) -> Option<u64> {
        match self {
            AttemptOutcome::Completed { bytes, .. } => Some(bytes.len() as u64),
            _ => None,
        }
    }
}

/// Runs encode attempts against a backend, one at a time.
pub struct AttemptExecutor {
    encoder: Arc<dyn Encoder>,
    progress_throttle: Duration,
}

impl AttemptExecutor {
    /// Create an executor over the given backend.
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self {
            encoder,
            progress_throttle: PROGRESS_THROTTLE,
        }
    }

    /// Override the progress throttle (tests use a zero throttle).
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.progress_throttle = throttle;
        self
    }

    /// The backend this executor drives.
    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    /// Run one encode pass at the given policy.
    ///
    /// Cancellation is checked before the attempt starts and at every
    /// suspension point; a cancelled attempt aborts the backend, discards
    /// partial output, and resolves with [`AttemptOutcome::Cancelled`]
    /// rather than an error. All per-attempt resources (staged input,
    /// encoder session, output scratch) are released on every path.
    pub async fn run_attempt(
        &self,
        input: &[u8],
        input_mime: &str,
        policy: &EncodePolicy,
        total_source_secs: f64,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
        attempt: u32,
    ) -> AttemptOutcome {
        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        let input_ext = ContainerFamily::from_mime(input_mime).extension();
        let output_ext = preferred_output(self.encoder.as_ref())
            .unwrap_or(ContainerFamily::Mp4)
            .extension();

        let workspace = match AttemptWorkspace::stage(input, input_ext, output_ext) {
            Ok(ws) => ws,
            Err(e) => return AttemptOutcome::Failed(classify(e)),
        };

        let mut session = match self
            .encoder
            .start(&workspace, policy, total_source_secs)
            .await
        {
            Ok(session) => session,
            Err(e) => return AttemptOutcome::Failed(classify(e)),
        };

        let started = Instant::now();
        let mut last_emit: Option<Instant> = None;

        loop {
            // The advance future is dropped when the select resolves, so the
            // session is free to be aborted or advanced again afterwards.
            let advanced = tokio::select! {
                _ = cancel.cancelled() => None,
                step = session.advance() => Some(step),
            };

            let Some(step) = advanced else {
                session.abort().await;
                tracing::info!("attempt {attempt} cancelled; partial output discarded");
                return AttemptOutcome::Cancelled;
            };

            let step = match step {
                Ok(step) => step,
                Err(e) => {
                    session.abort().await;
                    return AttemptOutcome::Failed(classify(e));
                }
            };

            let now = Instant::now();
            let due = last_emit
                .map_or(true, |prev| now.duration_since(prev) >= self.progress_throttle);
            if due || step.finished {
                last_emit = Some(now);
                sink.progress(self.make_update(attempt, started, &step, total_source_secs));
            }

            if step.finished {
                break;
            }
        }

        match session.finish().await {
            Ok(output) => AttemptOutcome::Completed {
                bytes: output.bytes,
                mime: output.mime,
            },
            Err(e) => AttemptOutcome::Failed(classify(e)),
        }
        // workspace drops here (and on every early return), removing the
        // attempt's scratch before the next attempt can start.
    }

    fn make_update(
        &self,
        attempt: u32,
        started: Instant,
        step: &crate::encoder::EncodeStep,
        total_source_secs: f64,
    ) -> ProgressUpdate {
        let fraction = if total_source_secs > 0.0 {
            (step.elapsed_source_secs / total_source_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let eta = if fraction > MIN_ETA_FRACTION {
            let wall = started.elapsed().as_secs_f64();
            Some(Duration::from_secs_f64((wall / fraction - wall).max(0.0)))
        } else {
            None
        };

        ProgressUpdate {
            attempt,
            fraction,
            elapsed_source_secs: step.elapsed_source_secs,
            total_source_secs,
            eta,
        }
    }
}

fn classify(e: Error) -> AttemptFailure {
    match e {
        Error::EncoderUnavailable(m) => AttemptFailure::EncoderUnavailable(m),
        Error::Decode(m) => AttemptFailure::Decode(m),
        other => AttemptFailure::Runtime(other.to_string()),
    }
}

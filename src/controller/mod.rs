//! The convergence controller: the attempt sequence that lands an output at
//! or below the byte target.
//!
//! One `convert` call walks Probing, an optional forced container-fix
//! pre-pass, and the attempting/evaluating loop, and resolves in exactly one
//! terminal state: success, `FloorReached`, `MaxAttemptsExceeded`, a fatal
//! backend failure, or `Cancelled`. Backoff is bitrate-first: shrinking the
//! bitrate preserves framing and is cheap to retry, while a tier drop is
//! irreversible within the session and degrades most visibly, so it only
//! happens once the bitrate sits within 15% of the floor.

mod session;

pub use session::SessionHandle;
use session::CompressionSession;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;
use vidfit_av::{preferred_output, AttemptExecutor, AttemptFailure, AttemptOutcome, Encoder};
use vidfit_core::config::ConversionConfig;
use vidfit_core::events::{ConversionReport, NoopSink, ProgressSink};
use vidfit_core::media::fmt_mb;
use vidfit_core::planner::{plan_bitrates, MIN_VIDEO_BPS};
use vidfit_core::{EncodePolicy, Error, Result, TierLadder};
use vidfit_probe::ProberStack;

use crate::source::SourceMedia;

/// Video bitrate cap for the first attempt and the normalization pass.
const INITIAL_VIDEO_CAP_BPS: u64 = 2_000_000;

/// Tighter video bitrate cap applied when a tier drop restarts the plan.
const RETRY_VIDEO_CAP_BPS: u64 = 1_200_000;

/// Multiplier applied to the video bitrate on an oversized result.
const BITRATE_DECAY: f64 = 0.72;

/// Bitrates within this factor of the floor stop decaying and trigger a
/// tier drop instead.
const BITRATE_FLOOR_SLACK: f64 = 1.15;

/// The normalization pass never aims below this many bytes.
const FORCED_FIX_MIN_TARGET: u64 = 1_000_000;

/// The normalization pass aims just under the current size to avoid growing
/// the output.
const FORCED_FIX_SHRINK: f64 = 0.98;

/// The product of a resolved conversion request.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The delivered payload.
    pub bytes: Bytes,
    /// Mime type of the payload.
    pub mime: String,
    /// Attempts consumed (zero for a pass-through).
    pub attempts: u32,
    /// Whether the source was returned unchanged.
    pub passthrough: bool,
    /// Identifier of the session that produced this output.
    pub session_id: Uuid,
}

impl ConversionOutput {
    /// Size of the delivered payload in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Orchestrates the attempt sequence for conversion requests.
pub struct ConvergenceController {
    executor: AttemptExecutor,
    probers: ProberStack,
    config: ConversionConfig,
    ladder: TierLadder,
    sink: Arc<dyn ProgressSink>,
}

impl ConvergenceController {
    /// Create a controller over the given backend and prober stack.
    pub fn new(encoder: Arc<dyn Encoder>, probers: ProberStack, config: ConversionConfig) -> Self {
        Self {
            executor: AttemptExecutor::new(encoder),
            probers,
            config,
            ladder: TierLadder::default(),
            sink: Arc::new(NoopSink),
        }
    }

    /// Builder: attach a progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Builder: replace the resolution ladder.
    pub fn with_ladder(mut self, ladder: TierLadder) -> Self {
        self.ladder = ladder;
        self
    }

    /// Builder: override the executor's progress throttle (tests).
    pub fn with_progress_throttle(mut self, throttle: Duration) -> Self {
        self.executor = self.executor.with_throttle(throttle);
        self
    }

    /// Convert `source` into an output of at most `target_bytes` bytes.
    ///
    /// Cancellable at any time through `handle`; cancellation yields
    /// [`Error::Cancelled`] and discards partial output.
    ///
    /// # Errors
    ///
    /// - [`Error::FloorReached`] when the next tier would fall below the
    ///   configured quality floor.
    /// - [`Error::MaxAttemptsExceeded`] when the attempt budget runs out.
    /// - [`Error::Decode`] / [`Error::EncoderUnavailable`] for unrecoverable
    ///   backend failures.
    /// - [`Error::Cancelled`] on caller cancellation.
    pub async fn convert(
        &self,
        source: SourceMedia,
        target_bytes: u64,
        handle: &SessionHandle,
    ) -> Result<ConversionOutput> {
        let mut session = CompressionSession::new(target_bytes);
        let cancel = handle.token();

        tracing::info!(
            "session {}: {} ({}) -> target <= {}",
            session.id,
            fmt_mb(source.len()),
            source.declared_mime(),
            fmt_mb(target_bytes)
        );

        // Probing. A failed probe yields zeros; duration is floored to 1s.
        let meta = source.metadata(&self.probers);
        let duration_secs = (meta.duration_secs.round() as u64).max(1);
        tracing::info!(
            "duration ~{duration_secs}s | meta {}x{}",
            meta.width,
            meta.height
        );

        let preferred = preferred_output(self.executor.encoder().as_ref());
        let force_fix = match preferred {
            Some(family) => source.family() != family,
            None => false,
        };

        // Pass-through: already small enough, already in the preferred
        // family. Zero attempts.
        if source.len() <= target_bytes && !force_fix {
            tracing::info!("already under limit (<= {})", fmt_mb(target_bytes));
            self.sink.finished(ConversionReport::Success {
                final_size_bytes: source.len(),
            });
            let mime = source.declared_mime().to_string();
            return Ok(ConversionOutput {
                bytes: source.into_bytes(),
                mime,
                attempts: 0,
                passthrough: true,
                session_id: session.id,
            });
        }

        let source_len = source.len();
        let mut working_mime = source.declared_mime().to_string();
        let mut working_bytes = source.into_bytes();

        // ForcedFixCheck: under the limit but in the wrong family. One
        // size-preserving normalization attempt; its output either ships
        // directly or becomes the working input for the normal loop.
        if source_len <= target_bytes && force_fix {
            if cancel.is_cancelled() {
                return self.fail(&session, Error::Cancelled);
            }

            tracing::info!(
                "under limit but source is {working_mime} -> forcing container normalization"
            );
            session.forced_fix_applied = true;

            let start_tier =
                self.ladder
                    .starting_tier(self.config.max_resolution, meta.width, meta.height);
            let fix_target = normalization_target(source_len, target_bytes);
            let plan = plan_bitrates(duration_secs, fix_target);
            let policy = EncodePolicy::new(start_tier, self.config.fps, plan.video_bps, plan.audio_bps)
                .clamp_video_bitrate(MIN_VIDEO_BPS, INITIAL_VIDEO_CAP_BPS);

            let attempt = session.begin_attempt(policy);
            let outcome = self
                .executor
                .run_attempt(
                    &working_bytes,
                    &working_mime,
                    &policy,
                    duration_secs as f64,
                    cancel,
                    self.sink.as_ref(),
                    attempt,
                )
                .await;

            match outcome {
                AttemptOutcome::Cancelled => return self.fail(&session, Error::Cancelled),
                AttemptOutcome::Failed(failure) => {
                    // A size-preserving pass that fails outright will not
                    // fare better under the tighter loop targets.
                    return self.fail(&session, failure_to_error(failure));
                }
                AttemptOutcome::Completed { bytes, mime } => {
                    let len = bytes.len() as u64;
                    session.last_output_size = Some(len);
                    tracing::info!("normalized output: {} | mime: {mime}", fmt_mb(len));
                    if len <= target_bytes {
                        return self.succeed(&session, bytes, mime);
                    }
                    tracing::info!("normalized output exceeded target -> continuing compression");
                    working_bytes = bytes;
                    working_mime = mime;
                }
            }
        }

        // Attempting/Evaluating loop.
        let min_video = self.config.min_quality.min_video_bitrate_bps;
        let start_tier =
            self.ladder
                .starting_tier(self.config.max_resolution, meta.width, meta.height);
        let plan = plan_bitrates(duration_secs, target_bytes);
        let initial_policy =
            EncodePolicy::new(start_tier, self.config.fps, plan.video_bps, plan.audio_bps)
                .clamp_video_bitrate(MIN_VIDEO_BPS, INITIAL_VIDEO_CAP_BPS);
        let mut policy = initial_policy;

        let mut loop_attempts = 0;
        while loop_attempts < self.config.max_attempts {
            if cancel.is_cancelled() {
                return self.fail(&session, Error::Cancelled);
            }
            loop_attempts += 1;

            let attempt = session.begin_attempt(policy);
            tracing::info!("--- Attempt {attempt} ---");
            tracing::info!("Try {policy}");

            let outcome = self
                .executor
                .run_attempt(
                    &working_bytes,
                    &working_mime,
                    &policy,
                    duration_secs as f64,
                    cancel,
                    self.sink.as_ref(),
                    attempt,
                )
                .await;

            match outcome {
                AttemptOutcome::Cancelled => return self.fail(&session, Error::Cancelled),

                AttemptOutcome::Failed(AttemptFailure::EncoderUnavailable(m)) => {
                    return self.fail(&session, Error::EncoderUnavailable(m));
                }
                AttemptOutcome::Failed(AttemptFailure::Decode(m)) => {
                    return self.fail(&session, Error::Decode(m));
                }
                AttemptOutcome::Failed(AttemptFailure::Runtime(m)) => {
                    // Recoverable: drop a tier and restart the plan from the
                    // original target. The failed pass still consumed its
                    // attempt slot.
                    tracing::warn!("attempt {attempt} failed: {m}");
                    let next = self.ladder.next_lower(policy.tier());
                    let plan = plan_bitrates(duration_secs, target_bytes);
                    policy =
                        EncodePolicy::new(next, self.config.fps, plan.video_bps, plan.audio_bps)
                            .clamp_video_bitrate(min_video, RETRY_VIDEO_CAP_BPS);
                }

                AttemptOutcome::Completed { bytes, mime } => {
                    let len = bytes.len() as u64;
                    session.last_output_size = Some(len);
                    tracing::info!("Output: {} | mime: {mime}", fmt_mb(len));

                    if len <= target_bytes {
                        return self.succeed(&session, bytes, mime);
                    }

                    if should_decay(policy.video_bitrate_bps, min_video) {
                        policy.video_bitrate_bps =
                            decayed_bitrate(policy.video_bitrate_bps, min_video);
                        tracing::info!(
                            "Still too big -> lowering bitrate to ~{} kbps",
                            policy.video_bitrate_bps / 1000
                        );
                    } else {
                        let next = self.ladder.next_lower(policy.tier());
                        if !self.config.min_quality.allows(next) {
                            return self.fail(
                                &session,
                                Error::FloorReached {
                                    attempts: session.attempt_count,
                                    last_policy: policy,
                                    last_output_bytes: session.last_output_size,
                                },
                            );
                        }
                        let plan = plan_bitrates(duration_secs, target_bytes);
                        policy = EncodePolicy::new(
                            next,
                            self.config.fps,
                            plan.video_bps,
                            plan.audio_bps,
                        )
                        .clamp_video_bitrate(min_video, RETRY_VIDEO_CAP_BPS);
                        tracing::info!(
                            "Bitrate floor reached -> downscaling to {}, reset bitrate ~{} kbps",
                            next,
                            policy.video_bitrate_bps / 1000
                        );
                    }
                }
            }
        }

        let last_policy = session.current_policy.unwrap_or(initial_policy);
        self.fail(
            &session,
            Error::MaxAttemptsExceeded {
                attempts: session.attempt_count,
                last_policy,
                last_output_bytes: session.last_output_size,
            },
        )
    }

    fn succeed(
        &self,
        session: &CompressionSession,
        bytes: Bytes,
        mime: String,
    ) -> Result<ConversionOutput> {
        tracing::info!(
            "session {}: success under limit (<= {}) in {} attempt(s){}",
            session.id,
            fmt_mb(session.target_bytes),
            session.attempt_count,
            if session.forced_fix_applied {
                " after container normalization"
            } else {
                ""
            }
        );
        self.sink.finished(ConversionReport::Success {
            final_size_bytes: bytes.len() as u64,
        });
        Ok(ConversionOutput {
            bytes,
            mime,
            attempts: session.attempt_count,
            passthrough: false,
            session_id: session.id,
        })
    }

    fn fail(&self, session: &CompressionSession, error: Error) -> Result<ConversionOutput> {
        tracing::info!("session {}: {error}", session.id);
        self.sink.finished(ConversionReport::Failure {
            last_size_bytes: session.last_output_size,
        });
        Err(error)
    }
}

/// Target for the forced normalization pass: just under the current size,
/// never below 1 MB, never above the real target.
fn normalization_target(source_len: u64, target_bytes: u64) -> u64 {
    target_bytes.min(FORCED_FIX_MIN_TARGET.max((source_len as f64 * FORCED_FIX_SHRINK) as u64))
}

/// Whether the bitrate still has room to decay before a tier drop.
fn should_decay(video_bps: u64, min_video_bps: u64) -> bool {
    video_bps as f64 > min_video_bps as f64 * BITRATE_FLOOR_SLACK
}

/// One decay step, floored at the minimum video bitrate.
fn decayed_bitrate(video_bps: u64, min_video_bps: u64) -> u64 {
    min_video_bps.max((video_bps as f64 * BITRATE_DECAY) as u64)
}

fn failure_to_error(failure: AttemptFailure) -> Error {
    match failure {
        AttemptFailure::EncoderUnavailable(m) => Error::EncoderUnavailable(m),
        AttemptFailure::Decode(m) => Error::Decode(m),
        AttemptFailure::Runtime(m) => Error::EncoderRuntime(m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_target_aims_just_under_source() {
        // 10 MB source, 49.5 MB target: 98% of the source wins.
        let source = 10 * 1024 * 1024;
        let target = 50 * 1024 * 1024 - 512 * 1024;
        assert_eq!(
            normalization_target(source, target),
            (source as f64 * 0.98) as u64
        );
    }

    #[test]
    fn normalization_target_never_below_one_megabyte() {
        assert_eq!(normalization_target(500_000, 49_000_000), 1_000_000);
    }

    #[test]
    fn normalization_target_capped_at_real_target() {
        // A source just under the ceiling still aims at most at the target.
        let target = 10_000_000;
        assert_eq!(normalization_target(10_200_000, target), target);
    }

    #[test]
    fn decay_stops_within_slack_of_floor() {
        let min = 250_000;
        assert!(should_decay(1_000_000, min));
        assert!(should_decay(288_000, min));
        // 287,500 = 1.15 * 250,000 exactly: no longer strictly above.
        assert!(!should_decay(287_500, min));
        assert!(!should_decay(250_000, min));
    }

    #[test]
    fn decayed_bitrate_floors_at_minimum() {
        assert_eq!(decayed_bitrate(1_000_000, 250_000), 720_000);
        assert_eq!(decayed_bitrate(300_000, 250_000), 250_000);
    }

    #[test]
    fn decay_is_strictly_decreasing_above_floor() {
        let mut v = 2_000_000u64;
        let min = 250_000u64;
        while should_decay(v, min) {
            let next = decayed_bitrate(v, min);
            assert!(next < v);
            v = next;
        }
        assert!(v <= 287_500);
    }
}

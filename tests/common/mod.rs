//! Shared test harness for integration tests.
//!
//! Provides a deterministic [`MockEncoder`] whose output size is a pure
//! function of the attempted policy, a [`StubProber`] with fixed metadata,
//! and a [`RecordingSink`] capturing every progress and terminal event.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use vidfit_av::{AttemptWorkspace, EncodeSession, EncodeStep, EncodedOutput, Encoder};
use vidfit_core::events::{ConversionReport, ProgressSink, ProgressUpdate};
use vidfit_core::{ContainerFamily, EncodePolicy};
use vidfit_probe::{MetadataProber, ProberStack, SourceMeta};

/// Deterministic encoding backend.
///
/// The produced payload has exactly
/// `(video_bps + audio_bps) * duration / 8 * inflation` bytes, so tests can
/// predict every outcome of the convergence loop from the policy sequence.
pub struct MockEncoder {
    duration_secs: f64,
    inflation: f64,
    starts: AtomicUsize,
    policies: Mutex<Vec<EncodePolicy>>,
    /// 1-based attempt indices that die with a runtime error mid-session.
    fail_on: Vec<usize>,
    /// 1-based attempt indices that hang until cancelled.
    hang_on: Vec<usize>,
    aborted: AtomicBool,
}

impl MockEncoder {
    pub fn new(duration_secs: f64, inflation: f64) -> Self {
        Self {
            duration_secs,
            inflation,
            starts: AtomicUsize::new(0),
            policies: Mutex::new(Vec::new()),
            fail_on: Vec::new(),
            hang_on: Vec::new(),
            aborted: AtomicBool::new(false),
        }
    }

    /// Make the given 1-based attempt fail with a runtime error.
    pub fn failing_on(mut self, attempt: usize) -> Self {
        self.fail_on.push(attempt);
        self
    }

    /// Make the given 1-based attempt hang until cancellation.
    pub fn hanging_on(mut self, attempt: usize) -> Self {
        self.hang_on.push(attempt);
        self
    }

    /// Every policy the controller attempted, in order.
    pub fn policies(&self) -> Vec<EncodePolicy> {
        self.policies.lock().unwrap().clone()
    }

    /// Number of encode sessions started.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Whether any session was aborted.
    pub fn was_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn model_size(&self, policy: &EncodePolicy) -> u64 {
        let total_bps = (policy.video_bitrate_bps + policy.audio_bitrate_bps) as f64;
        (total_bps * self.duration_secs / 8.0 * self.inflation) as u64
    }
}

/// Newtype wrapping a shared [`MockEncoder`] so it can implement the foreign
/// [`Encoder`] trait (the orphan rule forbids `impl Encoder for Arc<_>`).
pub struct SharedMockEncoder(pub Arc<MockEncoder>);

#[async_trait]
impl Encoder for SharedMockEncoder {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn supports_container(&self, family: ContainerFamily) -> bool {
        family == ContainerFamily::Mp4
    }

    async fn start(
        &self,
        _workspace: &AttemptWorkspace,
        policy: &EncodePolicy,
        _total_source_secs: f64,
    ) -> vidfit_core::Result<Box<dyn EncodeSession>> {
        let n = self.0.starts.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.policies.lock().unwrap().push(*policy);

        Ok(Box::new(MockSession {
            encoder: Arc::clone(&self.0),
            size: self.0.model_size(policy),
            total: self.0.duration_secs,
            fail: self.0.fail_on.contains(&n),
            hang: self.0.hang_on.contains(&n),
            progressed: false,
        }))
    }
}

struct MockSession {
    encoder: Arc<MockEncoder>,
    size: u64,
    total: f64,
    fail: bool,
    hang: bool,
    progressed: bool,
}

#[async_trait]
impl EncodeSession for MockSession {
    async fn advance(&mut self) -> vidfit_core::Result<EncodeStep> {
        if !self.progressed {
            self.progressed = true;
            return Ok(EncodeStep {
                elapsed_source_secs: self.total / 2.0,
                finished: false,
            });
        }
        if self.hang {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            unreachable!("hanging session should be cancelled")
        }
        if self.fail {
            return Err(vidfit_core::Error::encoder_runtime("scripted failure"));
        }
        Ok(EncodeStep {
            elapsed_source_secs: self.total,
            finished: true,
        })
    }

    async fn finish(self: Box<Self>) -> vidfit_core::Result<EncodedOutput> {
        Ok(EncodedOutput {
            bytes: Bytes::from(vec![0u8; self.size as usize]),
            mime: "video/mp4".to_string(),
        })
    }

    async fn abort(self: Box<Self>) {
        self.encoder.aborted.store(true, Ordering::SeqCst);
    }
}

/// Prober returning fixed metadata for any payload.
pub struct StubProber {
    pub meta: SourceMeta,
}

impl MetadataProber for StubProber {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn probe(&self, _bytes: &[u8], _mime: &str) -> vidfit_core::Result<SourceMeta> {
        Ok(self.meta)
    }

    fn supports(&self, _bytes: &[u8], _mime: &str) -> bool {
        true
    }
}

/// Build a prober stack that always reports the given metadata.
pub fn stub_probers(duration_secs: f64, width: u32, height: u32) -> ProberStack {
    ProberStack::new(vec![Box::new(StubProber {
        meta: SourceMeta {
            duration_secs,
            width,
            height,
        },
    })])
}

/// Build a prober stack whose probe always fails.
pub fn failing_probers() -> ProberStack {
    ProberStack::new(vec![])
}

/// Sink capturing everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub updates: Mutex<Vec<ProgressUpdate>>,
    pub reports: Mutex<Vec<ConversionReport>>,
}

impl ProgressSink for RecordingSink {
    fn progress(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }

    fn finished(&self, report: ConversionReport) {
        self.reports.lock().unwrap().push(report);
    }
}

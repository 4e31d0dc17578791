//! Integration tests for the convergence controller against a deterministic
//! mock backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{failing_probers, stub_probers, MockEncoder, RecordingSink};
use vidfit::{ConvergenceController, SessionHandle, SourceMedia};
use vidfit_core::config::ConversionConfig;
use vidfit_core::events::ConversionReport;
use vidfit_core::{Error, Tier};

const MB: u64 = 1024 * 1024;
const TARGET_50: u64 = 50 * MB - 512 * 1024;

fn controller(
    mock: &Arc<MockEncoder>,
    probers: vidfit_probe::ProberStack,
    config: ConversionConfig,
) -> ConvergenceController {
    ConvergenceController::new(
        Arc::new(common::SharedMockEncoder(Arc::clone(mock))),
        probers,
        config,
    )
        .with_progress_throttle(Duration::ZERO)
}

fn source_of(len: usize, mime: &str) -> SourceMedia {
    SourceMedia::new(vec![0u8; len], mime)
}

// ---------------------------------------------------------------------------
// Pass-through and forced container fix
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pass_through_returns_source_unchanged() {
    let mock = Arc::new(MockEncoder::new(60.0, 1.0));
    let ctl = controller(
        &mock,
        stub_probers(60.0, 1920, 1080),
        ConversionConfig::default(),
    );

    let out = ctl
        .convert(source_of(1024, "video/mp4"), TARGET_50, &SessionHandle::new())
        .await
        .unwrap();

    assert!(out.passthrough);
    assert_eq!(out.attempts, 0);
    assert_eq!(out.size(), 1024);
    assert_eq!(out.mime, "video/mp4");
    // The backend was never touched.
    assert_eq!(mock.starts(), 0);
}

#[tokio::test]
async fn forced_fix_runs_exactly_one_attempt() {
    // 10 MB QuickTime source, already under the target: one normalization
    // pass at a size-preserving budget, then done.
    let mock = Arc::new(MockEncoder::new(30.0, 0.5));
    let ctl = controller(
        &mock,
        stub_probers(30.0, 1920, 1080),
        ConversionConfig::default(),
    );

    let out = ctl
        .convert(
            source_of(10 * MB as usize, "video/quicktime"),
            TARGET_50,
            &SessionHandle::new(),
        )
        .await
        .unwrap();

    assert!(!out.passthrough);
    assert_eq!(out.attempts, 1);
    assert_eq!(out.mime, "video/mp4");
    assert!(out.size() <= TARGET_50);
    assert_eq!(mock.starts(), 1);

    // The normalization pass aims just under the input size with the
    // first-attempt bitrate cap applied.
    let policies = mock.policies();
    assert!(policies[0].video_bitrate_bps <= 2_000_000);
    assert_eq!(policies[0].tier(), Tier::new(1280, 720));
}

#[tokio::test]
async fn oversized_forced_fix_feeds_the_normal_loop() {
    // The normalized blob comes out over an 8 MB target, so the session
    // keeps compressing it with the usual bitrate-first backoff.
    let target = 8 * MB;
    let mock = Arc::new(MockEncoder::new(30.0, 1.5));
    let ctl = controller(
        &mock,
        stub_probers(30.0, 1920, 1080),
        ConversionConfig::default(),
    );

    let out = ctl
        .convert(
            source_of(7 * MB as usize, "video/quicktime"),
            target,
            &SessionHandle::new(),
        )
        .await
        .unwrap();

    assert!(out.size() <= target);
    assert!(out.attempts > 1, "expected the loop to continue after the fix");
    assert_eq!(mock.starts() as u32, out.attempts);

    // All loop attempts after the forced pass stay at or below its tier.
    let policies = mock.policies();
    let fix_area = policies[0].tier().area();
    assert!(policies[1..].iter().all(|p| p.tier().area() <= fix_area));
}

// ---------------------------------------------------------------------------
// Convergence scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_converges_by_decaying_bitrate() {
    // 80 MB source, 60 s: the first attempt runs at the 2 Mbps cap and
    // oversizes; one 0.72 decay is enough.
    let mock = Arc::new(MockEncoder::new(60.0, 4.0));
    let ctl = controller(
        &mock,
        stub_probers(60.0, 1920, 1080),
        ConversionConfig::default(),
    );

    let out = ctl
        .convert(
            source_of(80 * MB as usize, "video/mp4"),
            TARGET_50,
            &SessionHandle::new(),
        )
        .await
        .unwrap();

    assert!(out.size() <= TARGET_50);
    assert!(out.attempts <= 4, "took {} attempts", out.attempts);

    let policies = mock.policies();
    assert_eq!(policies[0].video_bitrate_bps, 2_000_000);
    assert_eq!(policies[1].video_bitrate_bps, 1_440_000);
    // Bitrate reduction happens before any resolution change.
    assert_eq!(policies[0].tier(), policies[1].tier());
}

#[tokio::test]
async fn scenario_c_stops_at_the_quality_floor() {
    // Long source, hopeless inflation: the controller walks the ladder down
    // and refuses to go below 640x360.
    let mut config = ConversionConfig::default();
    config.min_quality = "640x360|250".parse().unwrap();

    let mock = Arc::new(MockEncoder::new(600.0, 10.0));
    let ctl = controller(&mock, stub_probers(600.0, 1280, 720), config);

    let err = ctl
        .convert(
            source_of(6 * MB as usize, "video/mp4"),
            5 * MB,
            &SessionHandle::new(),
        )
        .await
        .unwrap_err();

    assert_matches!(
        err,
        Error::FloorReached {
            attempts,
            last_policy,
            last_output_bytes: Some(_),
        } if attempts == 3 && last_policy.tier() == Tier::new(640, 360)
    );

    // Dimensions only ever went down.
    let policies = mock.policies();
    for pair in policies.windows(2) {
        assert!(pair[1].tier().area() <= pair[0].tier().area());
    }
}

#[tokio::test]
async fn scenario_d_cancellation_mid_attempt() {
    let mock = Arc::new(MockEncoder::new(60.0, 4.0).hanging_on(1));
    let sink = Arc::new(RecordingSink::default());
    let ctl = controller(
        &mock,
        stub_probers(60.0, 1920, 1080),
        ConversionConfig::default(),
    )
    .with_sink(sink.clone());

    let handle = SessionHandle::new();
    let canceller = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = ctl
        .convert(
            source_of(80 * MB as usize, "video/mp4"),
            TARGET_50,
            &handle,
        )
        .await
        .unwrap_err();

    assert_matches!(err, Error::Cancelled);
    // The in-flight session was aborted and nothing further was attempted.
    assert!(mock.was_aborted());
    assert_eq!(mock.starts(), 1);
    assert_eq!(
        *sink.reports.lock().unwrap(),
        vec![ConversionReport::Failure {
            last_size_bytes: None
        }]
    );
}

#[tokio::test]
async fn attempt_budget_is_a_hard_bound() {
    // Floor low enough that the ladder bottom is allowed: the session can
    // never converge and must classify as MaxAttemptsExceeded, not loop.
    let mut config = ConversionConfig::default();
    config.min_quality = "320x180|80".parse().unwrap();

    let mock = Arc::new(MockEncoder::new(600.0, 1000.0));
    let ctl = controller(&mock, stub_probers(600.0, 1920, 1080), config);

    let err = ctl
        .convert(
            source_of(80 * MB as usize, "video/mp4"),
            TARGET_50,
            &SessionHandle::new(),
        )
        .await
        .unwrap_err();

    assert_matches!(
        err,
        Error::MaxAttemptsExceeded { attempts: 10, .. }
    );
    assert_eq!(mock.starts(), 10);
}

#[tokio::test]
async fn backoff_is_monotonic() {
    let mut config = ConversionConfig::default();
    config.min_quality = "320x180|80".parse().unwrap();

    let mock = Arc::new(MockEncoder::new(600.0, 1000.0));
    let ctl = controller(&mock, stub_probers(600.0, 1920, 1080), config);

    let _ = ctl
        .convert(
            source_of(80 * MB as usize, "video/mp4"),
            TARGET_50,
            &SessionHandle::new(),
        )
        .await;

    let policies = mock.policies();
    assert!(policies.len() > 2);
    for pair in policies.windows(2) {
        // Dimensions never increase.
        assert!(pair[1].tier().area() <= pair[0].tier().area());
        // Within a tier, the video bitrate only decays.
        if pair[0].tier() == pair[1].tier() {
            assert!(pair[1].video_bitrate_bps <= pair[0].video_bitrate_bps);
        }
    }
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runtime_error_retries_one_tier_down() {
    let mock = Arc::new(MockEncoder::new(60.0, 1.0).failing_on(1));
    let ctl = controller(
        &mock,
        stub_probers(60.0, 1920, 1080),
        ConversionConfig::default(),
    );

    let out = ctl
        .convert(
            source_of(80 * MB as usize, "video/mp4"),
            TARGET_50,
            &SessionHandle::new(),
        )
        .await
        .unwrap();

    // The failed pass consumed an attempt slot; the retry dropped a tier and
    // restarted from the plan under the tighter retry cap.
    assert_eq!(out.attempts, 2);
    let policies = mock.policies();
    assert_eq!(policies[0].tier(), Tier::new(1280, 720));
    assert_eq!(policies[1].tier(), Tier::new(854, 480));
    assert!(policies[1].video_bitrate_bps <= 1_200_000);
    assert!(out.size() <= TARGET_50);
}

#[tokio::test]
async fn encoder_unavailable_is_fatal() {
    use async_trait::async_trait;
    use vidfit_av::{AttemptWorkspace, EncodeSession, Encoder};
    use vidfit_core::{ContainerFamily, EncodePolicy};

    struct NoBackend;

    #[async_trait]
    impl Encoder for NoBackend {
        fn name(&self) -> &'static str {
            "none"
        }
        fn supports_container(&self, _family: ContainerFamily) -> bool {
            false
        }
        async fn start(
            &self,
            _workspace: &AttemptWorkspace,
            _policy: &EncodePolicy,
            _total_source_secs: f64,
        ) -> vidfit_core::Result<Box<dyn EncodeSession>> {
            Err(Error::EncoderUnavailable("no codecs on this host".into()))
        }
    }

    let ctl = ConvergenceController::new(
        Arc::new(NoBackend),
        stub_probers(60.0, 1920, 1080),
        ConversionConfig::default(),
    );

    let err = ctl
        .convert(
            source_of(80 * MB as usize, "video/mp4"),
            TARGET_50,
            &SessionHandle::new(),
        )
        .await
        .unwrap_err();

    assert_matches!(err, Error::EncoderUnavailable(_));
}

#[tokio::test]
async fn unknown_metadata_is_tolerated() {
    // Probe failure: duration clamps to 1 s, the tier cap alone picks the
    // starting resolution, and the session still converges.
    let mock = Arc::new(MockEncoder::new(1.0, 1.0));
    let ctl = controller(&mock, failing_probers(), ConversionConfig::default());

    let out = ctl
        .convert(
            source_of(80 * MB as usize, "video/mp4"),
            TARGET_50,
            &SessionHandle::new(),
        )
        .await
        .unwrap();

    assert!(out.size() <= TARGET_50);
    assert_eq!(out.attempts, 1);
    assert_eq!(mock.policies()[0].tier(), Tier::new(1280, 720));
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_and_terminal_events_flow_to_the_sink() {
    let mock = Arc::new(MockEncoder::new(60.0, 4.0));
    let sink = Arc::new(RecordingSink::default());
    let ctl = controller(
        &mock,
        stub_probers(60.0, 1920, 1080),
        ConversionConfig::default(),
    )
    .with_sink(sink.clone());

    let out = ctl
        .convert(
            source_of(80 * MB as usize, "video/mp4"),
            TARGET_50,
            &SessionHandle::new(),
        )
        .await
        .unwrap();

    let updates = sink.updates.lock().unwrap();
    assert!(!updates.is_empty());
    assert!(updates.iter().all(|u| (0.0..=1.0).contains(&u.fraction)));
    assert!(updates.iter().any(|u| u.attempt == 1));
    assert!(updates.iter().any(|u| u.attempt == out.attempts));

    let reports = sink.reports.lock().unwrap();
    assert_eq!(
        *reports,
        vec![ConversionReport::Success {
            final_size_bytes: out.size()
        }]
    );
}

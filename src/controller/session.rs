//! Per-request session state and the caller-facing cancellation handle.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vidfit_core::EncodePolicy;

/// Cancellation handle scoped to one conversion request.
///
/// Clone it, hand a copy to whatever owns the cancel button, and call
/// [`SessionHandle::cancel`]; the controller observes the request at the top
/// of its loop and the executor at every encode suspension point.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    token: CancellationToken,
}

impl SessionHandle {
    /// Create a fresh handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the associated conversion.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Mutable state for one conversion request.
///
/// Created per `convert` call, mutated only by the controller, and dropped
/// when the request resolves. There is never more than one active session
/// per request, and its attempts run strictly sequentially.
pub(crate) struct CompressionSession {
    pub id: Uuid,
    pub target_bytes: u64,
    /// Total attempts issued, the forced normalization pass included.
    /// Monotonically increasing.
    pub attempt_count: u32,
    pub current_policy: Option<EncodePolicy>,
    pub last_output_size: Option<u64>,
    pub forced_fix_applied: bool,
}

impl CompressionSession {
    pub fn new(target_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_bytes,
            attempt_count: 0,
            current_policy: None,
            last_output_size: None,
            forced_fix_applied: false,
        }
    }

    /// Record the start of a new attempt and return its 1-based number.
    pub fn begin_attempt(&mut self, policy: EncodePolicy) -> u32 {
        self.attempt_count += 1;
        self.current_policy = Some(policy);
        self.attempt_count
    }
}

//! The Encoder capability boundary.
//!
//! The conversion controller never talks to a codec directly; it drives an
//! opaque [`Encoder`] that advertises which container families it can
//! produce and hands out one [`EncodeSession`] per attempt. `advance` is the
//! cooperative suspension point: the executor checks cancellation between
//! calls, and backends do their frame ingestion inside them.

use async_trait::async_trait;
use bytes::Bytes;
use vidfit_core::{ContainerFamily, EncodePolicy};

use crate::workspace::AttemptWorkspace;

/// Final product of a completed encode session.
#[derive(Debug, Clone)]
pub struct EncodedOutput {
    /// The encoded payload.
    pub bytes: Bytes,
    /// Mime type of the payload (e.g. `video/mp4`).
    pub mime: String,
}

/// One unit of forward progress from a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeStep {
    /// Source seconds consumed so far.
    pub elapsed_source_secs: f64,
    /// Whether the source has been fully consumed.
    pub finished: bool,
}

/// An in-flight encode pass.
///
/// Sessions are single-owner: exactly one attempt drives a session, and the
/// session's resources are torn down (via [`EncodeSession::finish`],
/// [`EncodeSession::abort`], or drop) before the next attempt starts.
#[async_trait]
pub trait EncodeSession: Send {
    /// Ingest the next slice of the source.
    ///
    /// Suspends while the backend works; returns the progress made. Called
    /// repeatedly until a step reports `finished`.
    async fn advance(&mut self) -> vidfit_core::Result<EncodeStep>;

    /// Drain the backend and collect the finished output.
    async fn finish(self: Box<Self>) -> vidfit_core::Result<EncodedOutput>;

    /// Stop the backend and discard partial output.
    ///
    /// Best-effort: errors during teardown are logged, not surfaced.
    async fn abort(self: Box<Self>);
}

/// An encoding backend.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Whether this backend can produce the given container family.
    fn supports_container(&self, family: ContainerFamily) -> bool;

    /// Begin an encode pass over the staged input at the given policy.
    ///
    /// # Errors
    ///
    /// - [`vidfit_core::Error::EncoderUnavailable`] if no backend tool can
    ///   realize the policy at all.
    /// - [`vidfit_core::Error::Decode`] if the staged input is unreadable.
    async fn start(
        &self,
        workspace: &AttemptWorkspace,
        policy: &EncodePolicy,
        total_source_secs: f64,
    ) -> vidfit_core::Result<Box<dyn EncodeSession>>;
}

/// The output family a conversion should aim for with this backend.
///
/// MP4-first: the first entry of [`ContainerFamily::preferred_outputs`] the
/// backend supports wins. `None` means the backend cannot produce any
/// preferred family and conversion is limited to whatever it emits natively.
pub fn preferred_output(encoder: &dyn Encoder) -> Option<ContainerFamily> {
    ContainerFamily::preferred_outputs()
        .iter()
        .copied()
        .find(|family| encoder.supports_container(*family))
}

//! The immutable source payload a conversion request operates on.

use std::sync::OnceLock;

use bytes::Bytes;
use vidfit_core::ContainerFamily;
use vidfit_probe::{probe_or_default, ProberStack, SourceMeta};

/// An in-memory media payload with its declared mime type.
///
/// Duration and dimensions are probed lazily on first access and cached for
/// the life of the value; a failed probe degrades to zero metadata, which
/// the conversion controller tolerates.
pub struct SourceMedia {
    bytes: Bytes,
    declared_mime: String,
    meta: OnceLock<SourceMeta>,
}

impl SourceMedia {
    /// Wrap a payload and its declared mime type.
    pub fn new(bytes: impl Into<Bytes>, declared_mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            declared_mime: declared_mime.into(),
            meta: OnceLock::new(),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw payload.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume the value, returning the payload.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// The mime type the caller declared for this payload.
    pub fn declared_mime(&self) -> &str {
        &self.declared_mime
    }

    /// Container family derived from the declared mime.
    pub fn family(&self) -> ContainerFamily {
        ContainerFamily::from_mime(&self.declared_mime)
    }

    /// Probed duration and dimensions, cached after the first call.
    pub fn metadata(&self, probers: &ProberStack) -> SourceMeta {
        *self
            .meta
            .get_or_init(|| probe_or_default(probers, &self.bytes, &self.declared_mime))
    }
}

impl std::fmt::Debug for SourceMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceMedia")
            .field("len", &self.bytes.len())
            .field("declared_mime", &self.declared_mime)
            .finish_non_exhaustive()
    }
}

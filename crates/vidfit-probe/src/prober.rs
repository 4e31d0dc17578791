//! The [`MetadataProber`] trait and the never-fails probe wrapper.

use crate::types::SourceMeta;

/// A metadata prober capable of extracting duration and dimensions from an
/// in-memory media payload.
///
/// Implementations must be safe to share across threads (`Send + Sync`).
pub trait MetadataProber: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Probe the payload and extract metadata.
    ///
    /// Returns a [`SourceMeta`] on success, or an error if the payload cannot
    /// be read or parsed. Any transient resources (temp files, decode
    /// contexts) must be released on every exit path.
    fn probe(&self, bytes: &[u8], declared_mime: &str) -> vidfit_core::Result<SourceMeta>;

    /// Check whether this prober is likely to handle the given payload.
    ///
    /// Typically checks the declared mime or magic bytes. A return value of
    /// `true` does not guarantee that [`MetadataProber::probe`] will succeed.
    fn supports(&self, bytes: &[u8], declared_mime: &str) -> bool;
}

/// An ordered list of probers tried in sequence.
///
/// The first backend that claims support and probes successfully wins;
/// backends that decline or fail are skipped.
pub struct ProberStack {
    probers: Vec<Box<dyn MetadataProber>>,
}

impl ProberStack {
    /// Build a stack from the given backends, tried in order.
    pub fn new(probers: Vec<Box<dyn MetadataProber>>) -> Self {
        Self { probers }
    }

    /// Probe with the first backend that supports the payload.
    ///
    /// # Errors
    ///
    /// Returns the last backend's error if every supporting backend fails, or
    /// [`vidfit_core::Error::Decode`] if no backend supports the payload.
    pub fn probe(&self, bytes: &[u8], declared_mime: &str) -> vidfit_core::Result<SourceMeta> {
        let mut last_err = None;
        for prober in &self.probers {
            if !prober.supports(bytes, declared_mime) {
                continue;
            }
            match prober.probe(bytes, declared_mime) {
                Ok(meta) => {
                    tracing::debug!(
                        "probe via {}: {}x{}, {:.1}s",
                        prober.name(),
                        meta.width,
                        meta.height,
                        meta.duration_secs
                    );
                    return Ok(meta);
                }
                Err(e) => {
                    tracing::debug!("prober {} failed: {e}", prober.name());
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            vidfit_core::Error::decode(format!("no prober supports '{declared_mime}'"))
        }))
    }
}

/// Probe a payload, degrading to zero metadata on any failure.
///
/// This is the contract the conversion controller relies on: probing never
/// fails, it only gets less informative. Failures are logged at warn level.
pub fn probe_or_default(stack: &ProberStack, bytes: &[u8], declared_mime: &str) -> SourceMeta {
    match stack.probe(bytes, declared_mime) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!("metadata probe failed ({e}); continuing with unknown metadata");
            SourceMeta::unknown()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProber {
        name: &'static str,
        supports: bool,
        result: Result<SourceMeta, &'static str>,
    }

    impl MetadataProber for FixedProber {
        fn name(&self) -> &'static str {
            self.name
        }

        fn probe(&self, _bytes: &[u8], _mime: &str) -> vidfit_core::Result<SourceMeta> {
            self.result
                .map_err(|e| vidfit_core::Error::decode(e.to_string()))
        }

        fn supports(&self, _bytes: &[u8], _mime: &str) -> bool {
            self.supports
        }
    }

    fn meta(w: u32, h: u32) -> SourceMeta {
        SourceMeta {
            duration_secs: 10.0,
            width: w,
            height: h,
        }
    }

    #[test]
    fn first_supporting_prober_wins() {
        let stack = ProberStack::new(vec![
            Box::new(FixedProber {
                name: "declines",
                supports: false,
                result: Ok(meta(99, 99)),
            }),
            Box::new(FixedProber {
                name: "accepts",
                supports: true,
                result: Ok(meta(1280, 720)),
            }),
        ]);
        let result = stack.probe(b"data", "video/mp4").unwrap();
        assert_eq!(result.width, 1280);
    }

    #[test]
    fn failed_prober_falls_through() {
        let stack = ProberStack::new(vec![
            Box::new(FixedProber {
                name: "broken",
                supports: true,
                result: Err("corrupt"),
            }),
            Box::new(FixedProber {
                name: "works",
                supports: true,
                result: Ok(meta(640, 360)),
            }),
        ]);
        let result = stack.probe(b"data", "video/mp4").unwrap();
        assert_eq!(result.width, 640);
    }

    #[test]
    fn no_supporting_prober_errors() {
        let stack = ProberStack::new(vec![Box::new(FixedProber {
            name: "declines",
            supports: false,
            result: Ok(meta(1, 1)),
        })]);
        assert!(stack.probe(b"data", "video/weird").is_err());
    }

    #[test]
    fn probe_or_default_never_fails() {
        let stack = ProberStack::new(vec![Box::new(FixedProber {
            name: "broken",
            supports: true,
            result: Err("corrupt"),
        })]);
        let result = probe_or_default(&stack, b"data", "video/mp4");
        assert!(result.is_unknown());
    }

    #[test]
    fn probe_or_default_with_empty_stack() {
        let stack = ProberStack::new(vec![]);
        assert!(probe_or_default(&stack, b"", "").is_unknown());
    }
}

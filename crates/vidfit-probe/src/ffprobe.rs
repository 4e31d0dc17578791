//! ffprobe-based metadata probing.
//!
//! Fallback backend for payloads the native ISO-BMFF parser does not cover
//! (WebM, Matroska, anything exotic). The payload is staged in a temp file
//! for the tool; the file is removed on every exit path by RAII.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use serde::Deserialize;
use vidfit_core::config::ToolsConfig;
use vidfit_core::{ContainerFamily, Error, Result};

use crate::prober::MetadataProber;
use crate::types::SourceMeta;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Prober that shells out to `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: PathBuf,
}

impl FfprobeProber {
    /// Create a prober using the given executable path.
    pub fn new(ffprobe: PathBuf) -> Self {
        Self { ffprobe }
    }

    /// Locate `ffprobe` from the tools config or `PATH`.
    ///
    /// Returns `None` when the tool cannot be found; callers then run with
    /// the native backends only.
    pub fn discover(tools: &ToolsConfig) -> Option<Self> {
        if let Some(ref p) = tools.ffprobe_path {
            if p.exists() {
                return Some(Self::new(p.clone()));
            }
        }
        which::which("ffprobe").ok().map(Self::new)
    }
}

impl MetadataProber for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, bytes: &[u8], declared_mime: &str) -> Result<SourceMeta> {
        // Stage the payload with a matching extension so container detection
        // does not depend on content sniffing alone.
        let suffix = format!(".{}", ContainerFamily::from_mime(declared_mime).extension());
        let mut staged = tempfile::Builder::new()
            .prefix("vidfit-probe-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| Error::tool("ffprobe", format!("failed to stage payload: {e}")))?;
        staged.write_all(bytes)?;
        staged.flush()?;

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(staged.path())
            .output()
            .map_err(|e| Error::tool("ffprobe", format!("failed to spawn: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::tool(
                "ffprobe",
                format!("exited with status {}: {}", output.status, stderr.trim()),
            ));
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::decode(format!("unparseable ffprobe output: {e}")))?;

        Ok(to_source_meta(parsed))
    }

    fn supports(&self, _bytes: &[u8], _declared_mime: &str) -> bool {
        // ffprobe handles every container this tool meets; it is the
        // catch-all at the bottom of the prober stack.
        true
    }
}

fn to_source_meta(output: FfprobeOutput) -> SourceMeta {
    let mut meta = SourceMeta::unknown();

    if let Some(format) = output.format {
        if let Some(d) = format.duration.and_then(|s| s.parse::<f64>().ok()) {
            meta.duration_secs = d;
        }
    }

    for stream in output.streams {
        if stream.codec_type.as_deref() != Some("video") {
            continue;
        }
        let (w, h) = (stream.width.unwrap_or(0), stream.height.unwrap_or(0));
        if u64::from(w) * u64::from(h) > u64::from(meta.width) * u64::from(meta.height) {
            meta.width = w;
            meta.height = h;
        }
        // Some containers only carry duration on the stream.
        if meta.duration_secs <= 0.0 {
            if let Some(d) = stream.duration.as_deref().and_then(|s| s.parse::<f64>().ok()) {
                meta.duration_secs = d;
            }
        }
    }

    meta
}

//! H.264/AAC MP4 encoding backend using ffmpeg.
//!
//! ffmpeg runs with `-progress pipe:2 -nostats`; the session parses the
//! progress blocks it writes to stderr, so each block boundary becomes one
//! suspension point for the attempt executor.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use vidfit_core::{ContainerFamily, EncodePolicy, Error};

use crate::encoder::{EncodeSession, EncodeStep, EncodedOutput, Encoder};
use crate::tools::ToolRegistry;
use crate::workspace::AttemptWorkspace;

/// Encoding backend driving an external ffmpeg process.
pub struct FfmpegEncoder {
    tools: Arc<ToolRegistry>,
}

impl FfmpegEncoder {
    /// Create a backend over the given tool registry.
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

/// Build the full ffmpeg argument list for one attempt.
///
/// Bitrate-targeted H.264 High with AAC stereo; the source is letterboxed
/// into the exact policy dimensions (scale to fit, then pad), matching how
/// the frame source composites frames.
fn build_args(input: &str, output: &str, policy: &EncodePolicy) -> Vec<String> {
    let (w, h) = (policy.width, policy.height);
    let vf = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease:force_divisible_by=2,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
    );

    let mut args: Vec<String> = Vec::new();
    args.extend(
        ["-y", "-progress", "pipe:2", "-nostats", "-i", input].map(String::from),
    );
    args.extend(["-c:v", "libx264", "-profile:v", "high", "-preset", "veryfast"].map(String::from));
    args.extend([
        "-b:v".to_string(),
        policy.video_bitrate_bps.to_string(),
        "-maxrate".to_string(),
        policy.video_bitrate_bps.to_string(),
        "-bufsize".to_string(),
        (policy.video_bitrate_bps * 2).to_string(),
    ]);
    args.extend(["-r".to_string(), policy.fps.to_string()]);
    args.extend(["-vf".to_string(), vf]);
    args.extend([
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        policy.audio_bitrate_bps.to_string(),
        "-ac".to_string(),
        "2".to_string(),
    ]);
    args.extend(["-movflags", "+faststart"].map(String::from));
    args.push(output.to_string());
    args
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn supports_container(&self, family: ContainerFamily) -> bool {
        family == ContainerFamily::Mp4
    }

    async fn start(
        &self,
        workspace: &AttemptWorkspace,
        policy: &EncodePolicy,
        _total_source_secs: f64,
    ) -> vidfit_core::Result<Box<dyn EncodeSession>> {
        let ffmpeg = self.tools.require("ffmpeg")?;

        let args = build_args(
            &workspace.input().to_string_lossy(),
            &workspace.output().to_string_lossy(),
            policy,
        );
        tracing::debug!("ffmpeg args: {args:?}");

        let mut child = Command::new(&ffmpeg.path)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::EncoderUnavailable(format!("failed to spawn ffmpeg: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::encoder_runtime("ffmpeg stderr not captured"))?;

        Ok(Box::new(FfmpegSession {
            child,
            lines: BufReader::new(stderr).lines(),
            output_path: workspace.output().to_path_buf(),
            elapsed_secs: 0.0,
        }))
    }
}

struct FfmpegSession {
    child: Child,
    lines: Lines<BufReader<ChildStderr>>,
    output_path: PathBuf,
    elapsed_secs: f64,
}

#[async_trait]
impl EncodeSession for FfmpegSession {
    async fn advance(&mut self) -> vidfit_core::Result<EncodeStep> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(val) = line.strip_prefix("out_time_us=") {
                        if let Ok(us) = val.trim().parse::<i64>() {
                            self.elapsed_secs = us.max(0) as f64 / 1_000_000.0;
                        }
                    } else if let Some(val) = line.strip_prefix("progress=") {
                        // End of a progress block.
                        return Ok(EncodeStep {
                            elapsed_source_secs: self.elapsed_secs,
                            finished: val.trim() == "end",
                        });
                    }
                }
                // Stderr closed: the process is draining; let finish() judge.
                Ok(None) => {
                    return Ok(EncodeStep {
                        elapsed_source_secs: self.elapsed_secs,
                        finished: true,
                    })
                }
                Err(e) => {
                    return Err(Error::encoder_runtime(format!(
                        "progress stream error: {e}"
                    )))
                }
            }
        }
    }

    async fn finish(mut self: Box<Self>) -> vidfit_core::Result<EncodedOutput> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| Error::encoder_runtime(format!("waiting for ffmpeg: {e}")))?;

        if !status.success() {
            return Err(Error::encoder_runtime(format!(
                "ffmpeg exited with status {status}"
            )));
        }

        let bytes = std::fs::read(&self.output_path)
            .map(Bytes::from)
            .map_err(|e| Error::encoder_runtime(format!("reading encoder output: {e}")))?;

        Ok(EncodedOutput {
            bytes,
            mime: "video/mp4".to_string(),
        })
    }

    async fn abort(mut self: Box<Self>) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("killing ffmpeg after cancellation: {e}");
        }
    }
}

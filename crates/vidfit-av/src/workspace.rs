//! Per-attempt workspace.
//!
//! Each encode attempt owns an [`AttemptWorkspace`]: a temporary directory
//! holding the staged input payload and the encoder's output file. Dropping
//! the workspace removes both, which is the teardown guarantee the resource
//! model depends on -- no attempt's scratch outlives it, on any exit path.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;

/// Scratch space for one encode attempt.
pub struct AttemptWorkspace {
    temp_dir: TempDir,
    input_path: PathBuf,
    output_path: PathBuf,
}

impl AttemptWorkspace {
    /// Create a workspace and stage the input payload into it.
    ///
    /// The extensions determine the container hints given to the backend
    /// (e.g. `"mov"` in, `"mp4"` out).
    pub fn stage(input: &[u8], input_ext: &str, output_ext: &str) -> vidfit_core::Result<Self> {
        let temp_dir = TempDir::new().map_err(|e| vidfit_core::Error::Tool {
            tool: "workspace".to_string(),
            message: format!("failed to create temp dir: {e}"),
        })?;

        let input_path = temp_dir.path().join(format!("source.{input_ext}"));
        let output_path = temp_dir.path().join(format!("encoded.{output_ext}"));
        std::fs::write(&input_path, input)?;

        Ok(Self {
            temp_dir,
            input_path,
            output_path,
        })
    }

    /// Path of the staged input file.
    pub fn input(&self) -> &Path {
        &self.input_path
    }

    /// Path the backend must write its output to.
    pub fn output(&self) -> &Path {
        &self.output_path
    }

    /// Path to the temporary directory.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Read the produced output back into memory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the backend did not produce the file.
    pub fn read_output(&self) -> vidfit_core::Result<Bytes> {
        let data = std::fs::read(&self.output_path)?;
        Ok(Bytes::from(data))
    }
}

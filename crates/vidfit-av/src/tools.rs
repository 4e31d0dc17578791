//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! CLI tools vidfit drives (ffmpeg, ffprobe) and provides lookup methods for
//! the rest of the crate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Configuration for a single external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// For each known tool, if the [`vidfit_core::config::ToolsConfig`]
    /// supplies a custom path **and** that path exists, it is used directly.
    /// Otherwise [`which::which`] is used to locate the tool in `PATH`.
    /// Tools that are not found are silently omitted from the registry.
    pub fn discover(tools_config: &vidfit_core::config::ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = if let Some(p) = custom_path {
                if p.exists() {
                    Some(p.to_path_buf())
                } else {
                    // Custom path does not exist; fall back to PATH.
                    which::which(name).ok()
                }
            } else {
                which::which(name).ok()
            };

            if let Some(path) = resolved {
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                    },
                );
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit entries (used in tests).
    pub fn from_entries(entries: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        let tools = entries
            .into_iter()
            .map(|(name, path)| {
                (
                    name.clone(),
                    ToolConfig { name, path },
                )
            })
            .collect();
        Self { tools }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.get(name)
    }

    /// Look up a tool, erroring if it was not discovered.
    pub fn require(&self, name: &str) -> vidfit_core::Result<&ToolConfig> {
        self.get(name).ok_or_else(|| {
            vidfit_core::Error::EncoderUnavailable(format!("{name} not found on this system"))
        })
    }

    /// Query availability and version of every known tool.
    pub async fn check_all(&self) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());
        for &name in KNOWN_TOOLS {
            let info = match self.get(name) {
                Some(tool) => {
                    let version = query_version(&tool.path).await;
                    ToolInfo {
                        name: name.to_string(),
                        available: true,
                        version,
                        path: Some(tool.path.clone()),
                    }
                }
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            };
            infos.push(info);
        }
        infos
    }
}

/// Query a tool's version line without failing loudly.
async fn query_version(path: &std::path::Path) -> Option<String> {
    let output = crate::command::ToolCommand::new(path.to_path_buf())
        .arg("-version")
        .timeout(Duration::from_secs(5))
        .execute()
        .await
        .ok()?;
    output.stdout.lines().next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_requires_nothing() {
        let registry = ToolRegistry::default();
        assert!(registry.get("ffmpeg").is_none());
        let err = registry.require("ffmpeg").unwrap_err();
        assert!(matches!(err, vidfit_core::Error::EncoderUnavailable(_)));
    }

    #[test]
    fn from_entries_resolves() {
        let registry = ToolRegistry::from_entries([(
            "ffmpeg".to_string(),
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg"),
        )]);
        assert_eq!(
            registry.require("ffmpeg").unwrap().path,
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
    }

    #[test]
    fn discover_ignores_missing_custom_path() {
        let config = vidfit_core::config::ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
            ffprobe_path: None,
        };
        // Must not panic; resolution falls back to PATH and may be empty.
        let _ = ToolRegistry::discover(&config);
    }

    #[tokio::test]
    async fn check_all_reports_missing_tools() {
        let registry = ToolRegistry::default();
        let infos = registry.check_all().await;
        assert_eq!(infos.len(), KNOWN_TOOLS.len());
        assert!(infos.iter().all(|i| !i.available));
    }
}

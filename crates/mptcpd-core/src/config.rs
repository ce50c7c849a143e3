//! Daemon configuration: plugin directory and default policy name.
//!
//! The daemon core treats configuration as an external collaborator — it
//! only needs a plugin directory and an optional default plugin name. This
//! module loads those two values from an optional TOML file and lets CLI
//! flags override them.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct PmConfig {
    /// Directory to scan for plugin shared objects.
    pub plugin_dir: PathBuf,
    /// Plugin name to treat as default when no policy claims a token.
    pub default_plugin: Option<String>,
}

/// On-disk representation of [`PmConfig`], all fields optional so a CLI
/// flag can always win.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    plugin_dir: Option<PathBuf>,
    default_plugin: Option<String>,
}

impl PmConfig {
    /// Load configuration from `path`, if it exists, falling back to
    /// defaults for any field the file doesn't set.
    ///
    /// A missing file is not an error; an unparseable one is.
    pub fn load(path: Option<&Path>) -> Result<RawConfig> {
        let Some(path) = path else {
            return Ok(RawConfig::default());
        };

        if !path.exists() {
            return Ok(RawConfig::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("reading {}: {e}", path.display())))?;

        toml::from_str(&text)
            .map_err(|e| Error::Configuration(format!("parsing {}: {e}", path.display())))
    }

    /// Merge a loaded file with CLI overrides, applying the default plugin
    /// directory when neither specifies one.
    pub fn resolve(
        raw: RawConfig,
        plugin_dir_override: Option<PathBuf>,
        default_plugin_override: Option<String>,
    ) -> Self {
        Self {
            plugin_dir: plugin_dir_override
                .or(raw.plugin_dir)
                .unwrap_or_else(default_plugin_dir),
            default_plugin: default_plugin_override.or(raw.default_plugin),
        }
    }
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("/usr/lib/mptcpd/plugins")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let raw = PmConfig::load(None).unwrap();
        let cfg = PmConfig::resolve(raw, None, None);
        assert_eq!(cfg.plugin_dir, default_plugin_dir());
        assert!(cfg.default_plugin.is_none());
    }

    #[test]
    fn cli_override_wins_over_file() {
        let raw = RawConfig {
            plugin_dir: Some(PathBuf::from("/from/file")),
            default_plugin: Some("rr".to_string()),
        };
        let cfg = PmConfig::resolve(raw, Some(PathBuf::from("/from/cli")), None);
        assert_eq!(cfg.plugin_dir, PathBuf::from("/from/cli"));
        assert_eq!(cfg.default_plugin.as_deref(), Some("rr"));
    }
}

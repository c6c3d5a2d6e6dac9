//! Configuration schema for stagecache
//!
//! Configuration is stored at `~/.config/stagecache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Stage cache settings
    pub cache: CacheConfig,

    /// Build execution settings
    pub build: BuildConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Stage cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Object store location (default: state dir)
    pub dir: Option<PathBuf>,

    /// Hard-link checked-out files to store objects instead of copying
    pub hardlinks: bool,

    /// Remove unused stages and prune after a successful build
    pub gc: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            hardlinks: false,
            gc: true,
        }
    }
}

/// Build execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Working directory stages build into, relative to the pipeline file
    pub app_dir: PathBuf,

    /// Interpreter stage commands run under (`<shell> -c <command>`)
    pub shell: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("app"),
            shell: "/bin/sh".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[build]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert!(!config.cache.hardlinks);
        assert!(config.cache.gc);
        assert_eq!(config.build.shell, "/bin/sh");
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            dir = "/var/cache/stagecache"
            hardlinks = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.dir, Some(PathBuf::from("/var/cache/stagecache")));
        assert!(config.cache.hardlinks);
        assert!(config.cache.gc); // default preserved
        assert_eq!(config.build.app_dir, PathBuf::from("app"));
    }
}

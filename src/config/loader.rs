use std::path::{Path, PathBuf};

use crate::config::types::PolyrunConfig;
use crate::error::{PolyrunError, Result};

/// Get the default configuration file path
pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "polyrun", "polyrun") {
        proj_dirs.config_dir().join("config.toml")
    } else {
        // Fallback to home directory
        dirs_fallback().join(".polyrun").join("config.toml")
    }
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load configuration from file, with defaults for missing values.
///
/// An explicitly requested path must exist; the default path may be absent.
pub fn load_config(config_path: Option<&Path>) -> Result<PolyrunConfig> {
    let path = match config_path {
        Some(path) => {
            if !path.exists() {
                return Err(PolyrunError::ConfigNotFound {
                    path: path.display().to_string(),
                });
            }
            path.to_path_buf()
        }
        None => get_config_path(),
    };

    if !path.exists() {
        return Ok(PolyrunConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<PolyrunConfig> {
    toml::from_str(content).map_err(|e| PolyrunError::TomlParse(e.to_string()))
}

/// Get the cache directory for downloaded runtimes and installed packages
pub fn get_cache_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "polyrun", "polyrun") {
        proj_dirs.cache_dir().to_path_buf()
    } else {
        dirs_fallback().join(".cache").join("polyrun")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, PolyrunError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[script]\ntimeout_seconds = 2\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.script.timeout_seconds, 2);
    }

    #[test]
    fn test_invalid_toml_reports_parse_error() {
        let err = parse_config("[script\n").unwrap_err();
        assert!(matches!(err, PolyrunError::TomlParse(_)));
    }
}

//! Path Utilities
//!
//! Resolves the taskforge home directory (`~/.taskforge/`).

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the taskforge directory (~/.taskforge/)
pub fn taskforge_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".taskforge"))
}

/// Get the default config file path (~/.taskforge/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(taskforge_dir()?.join("config.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_under_taskforge_dir() {
        if let (Ok(dir), Ok(config)) = (taskforge_dir(), config_path()) {
            assert!(dir.ends_with(".taskforge"));
            assert_eq!(config.parent(), Some(dir.as_path()));
        }
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
    }
}

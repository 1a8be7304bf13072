//! User-level directory management.
//!
//! Keeps the location of user-editable snipbox files in one place so the
//! policy loader and the CLI agree on it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File name of the package policy inside a snipbox configuration directory.
pub const POLICY_FILE_NAME: &str = "package_config.toml";

/// Directory structure for user-level snipbox configuration.
///
/// ```text
/// <config dir>/            # e.g. ~/.config on Linux
/// └── snipbox/
///     └── package_config.toml
/// ```
#[derive(Debug, Clone)]
pub struct SnipboxDirs {
    /// The `snipbox` configuration directory itself.
    pub config_dir: PathBuf,
}

impl SnipboxDirs {
    /// Resolve the per-user configuration directory.
    ///
    /// Returns `None` when the platform has no notion of one (e.g. no `HOME`).
    /// Nothing is created on disk.
    pub fn user() -> Option<Self> {
        dirs::config_dir().map(|base| Self::from_base_dir(&base))
    }

    /// Build the structure under an arbitrary base directory.
    pub fn from_base_dir(base: &Path) -> Self {
        Self {
            config_dir: base.join("snipbox"),
        }
    }

    /// Path of the user-level package policy file.
    pub fn policy_file(&self) -> PathBuf {
        self.config_dir.join(POLICY_FILE_NAME)
    }

    /// Create the configuration directory if it does not exist.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_policy_file_location() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs = SnipboxDirs::from_base_dir(temp.path());

        assert!(dirs.config_dir.ends_with("snipbox"));
        assert_eq!(
            dirs.policy_file(),
            temp.path().join("snipbox").join(POLICY_FILE_NAME)
        );
        assert!(!dirs.config_dir.exists());
    }

    #[test]
    fn test_ensure_creates_directory() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs = SnipboxDirs::from_base_dir(temp.path());

        dirs.ensure().expect("Failed to create dirs");
        assert!(dirs.config_dir.is_dir());

        // Idempotent
        dirs.ensure().expect("Second ensure failed");
    }
}

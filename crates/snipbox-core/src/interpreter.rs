//! Python interpreter discovery.
//!
//! Locates the interpreter that workers and the package installer run with.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// Environment variable that overrides interpreter discovery.
pub const PYTHON_ENV_VAR: &str = "SNIPBOX_PYTHON";

/// Probe run by [`Interpreter::has_module`]. Resolves the spec without importing.
const FIND_SPEC_PROBE: &str = "import importlib.util, sys\n\
try:\n    found = importlib.util.find_spec(sys.argv[1]) is not None\n\
except (ImportError, ValueError):\n    found = False\n\
sys.exit(0 if found else 1)\n";

/// A Python 3 interpreter on this machine.
#[derive(Debug, Clone)]
pub struct Interpreter {
    /// Path to the interpreter executable.
    path: PathBuf,

    /// Version string, e.g. `Python 3.12.4`.
    version: String,

    /// Extra import directories, searched before any inherited `PYTHONPATH`.
    search_path: Vec<PathBuf>,
}

impl Interpreter {
    /// Find an interpreter.
    ///
    /// Looks in the following order:
    /// 1. `SNIPBOX_PYTHON` environment variable
    /// 2. `python3` on PATH
    /// 3. `python` on PATH
    pub fn discover() -> Result<Self> {
        if let Some(path) = std::env::var_os(PYTHON_ENV_VAR) {
            return Self::at(PathBuf::from(path));
        }

        for name in ["python3", "python"] {
            if let Ok(path) = which::which(name) {
                match Self::at(&path) {
                    Ok(interpreter) => return Ok(interpreter),
                    Err(e) => tracing::debug!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        Err(Error::Interpreter(
            "no Python 3 interpreter found on PATH".to_string(),
        ))
    }

    /// Use the interpreter at `path`, verifying that it is Python 3.
    pub fn at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let version = Self::get_version(&path)?;

        if !version.starts_with("Python 3") {
            return Err(Error::Interpreter(format!(
                "{} reports '{}', Python 3 is required",
                path.display(),
                version
            )));
        }

        tracing::debug!("Using interpreter {} ({})", path.display(), version);
        Ok(Self {
            path,
            version,
            search_path: Vec::new(),
        })
    }

    /// Add import directories for every process run with this interpreter.
    pub fn with_search_path(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_path.extend(dirs);
        self
    }

    /// Path to the interpreter executable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Extra import directories.
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Export the extra import directories to `command` through `PYTHONPATH`.
    pub(crate) fn apply_search_path(&self, command: &mut Command) {
        if self.search_path.is_empty() {
            return;
        }
        let inherited = std::env::var_os("PYTHONPATH");
        let dirs = self
            .search_path
            .iter()
            .cloned()
            .chain(inherited.iter().flat_map(|value| std::env::split_paths(value)));
        match std::env::join_paths(dirs) {
            Ok(joined) => {
                command.env("PYTHONPATH", joined);
            }
            Err(e) => tracing::warn!("Ignoring extra import directories: {}", e),
        }
    }

    /// Check whether `module` can be resolved, without importing it.
    pub fn has_module(&self, module: &str) -> Result<bool> {
        let mut command = Command::new(&self.path);
        self.apply_search_path(&mut command);
        let status = command
            .args(["-c", FIND_SPEC_PROBE, module])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                Error::Interpreter(format!("Failed to run {}: {}", self.path.display(), e))
            })?;

        Ok(status.success())
    }

    /// Get the interpreter version string.
    fn get_version(path: &Path) -> Result<String> {
        let output = Command::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::Interpreter(format!("Failed to run {}: {}", path.display(), e))
            })?;

        if !output.status.success() {
            return Err(Error::Interpreter(format!(
                "{} --version exited with {}",
                path.display(),
                output.status
            )));
        }

        // Very old interpreters print the version on stderr.
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            Ok(String::from_utf8_lossy(&output.stderr).trim().to_string())
        } else {
            Ok(stdout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_interpreter_is_an_error() {
        let err = Interpreter::at("/definitely/not/a/python").unwrap_err();
        assert!(matches!(err, Error::Interpreter(_)));
    }

    #[test]
    fn test_interpreter_detection() {
        let Ok(interpreter) = Interpreter::discover() else {
            eprintln!("skipping: no Python 3 interpreter available");
            return;
        };
        assert!(interpreter.version().starts_with("Python 3"));
        assert!(interpreter.has_module("json").unwrap());
        assert!(!interpreter.has_module("snipbox_no_such_module_xyz").unwrap());
    }

    #[test]
    fn test_search_path_is_visible() {
        let Ok(interpreter) = Interpreter::discover() else {
            eprintln!("skipping: no Python 3 interpreter available");
            return;
        };
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("snipbox_local_mod.py"), "X = 1\n").unwrap();

        assert!(!interpreter.has_module("snipbox_local_mod").unwrap());
        let interpreter = interpreter.with_search_path([temp.path().to_path_buf()]);
        assert_eq!(interpreter.search_path(), [temp.path().to_path_buf()]);
        assert!(interpreter.has_module("snipbox_local_mod").unwrap());
    }
}

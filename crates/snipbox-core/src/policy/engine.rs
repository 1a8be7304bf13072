//! Policy-gated package installation.
//!
//! Every install or uninstall goes through the policy first. A name the
//! policy does not allow is refused before any process is spawned.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::interpreter::Interpreter;

use super::PackagePolicy;

static MISSING_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"No module named ['"]([A-Za-z_][A-Za-z0-9_.]*)['"]"#)
        .expect("missing-module pattern is valid")
});

/// How packages get into the interpreter's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Installer {
    /// `uv pip` when it is on PATH, otherwise `python -m pip`.
    #[default]
    Auto,
    /// A custom program, run as `<program> <args>... install|uninstall <distribution>`.
    Command(Vec<String>),
}

/// Outcome of a successful [`PolicyEngine::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    /// The package was already importable; nothing ran.
    AlreadyInstalled,
    /// The installer ran and succeeded.
    Installed,
}

/// Outcome of a successful [`PolicyEngine::uninstall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UninstallStatus {
    /// The package was not installed; nothing ran.
    NotInstalled,
    /// The installer ran and removed the package.
    Uninstalled,
}

/// Applies a [`PackagePolicy`] to one interpreter's environment.
///
/// Concurrent installs of different packages are not serialized against
/// each other; the underlying installer is expected to cope.
pub struct PolicyEngine {
    policy: Arc<PackagePolicy>,
    interpreter: Interpreter,
    installer: Installer,
    /// Memoized `find_spec` results, keyed by module name.
    resolution_cache: Mutex<HashMap<String, bool>>,
}

impl PolicyEngine {
    /// Create an engine for `interpreter` governed by `policy`.
    pub fn new(policy: Arc<PackagePolicy>, interpreter: Interpreter) -> Self {
        Self {
            policy,
            interpreter,
            installer: Installer::Auto,
            resolution_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Use `installer` instead of discovering uv or pip.
    pub fn with_installer(mut self, installer: Installer) -> Self {
        self.installer = installer;
        self
    }

    /// The governing policy.
    pub fn policy(&self) -> &PackagePolicy {
        &self.policy
    }

    /// The interpreter whose environment is managed.
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// True if `name` may be installed on demand.
    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.policy.is_whitelisted(name)
    }

    /// Check whether `name` resolves in the interpreter, without importing it.
    pub fn is_installed(&self, name: &str) -> Result<bool> {
        if let Some(&known) = self.cache().get(name) {
            return Ok(known);
        }

        let installed = self.interpreter.has_module(name)?;
        self.cache().insert(name.to_string(), installed);
        Ok(installed)
    }

    /// Install a whitelisted package.
    pub fn install(&self, name: &str) -> Result<InstallStatus> {
        if !self.is_whitelisted(name) {
            tracing::warn!("Refusing to install '{}': not whitelisted", name);
            return Err(Error::NotWhitelisted(name.to_string()));
        }

        if self.is_installed(name)? {
            tracing::debug!("Package '{}' is already installed", name);
            return Ok(InstallStatus::AlreadyInstalled);
        }

        let distribution = self.policy.distribution_name(name);
        tracing::info!("Installing package '{}' ({})...", name, distribution);

        let result = self.run_installer("install", distribution);
        self.invalidate_caches();

        result.map_err(|message| Error::Install {
            package: name.to_string(),
            message,
        })?;

        tracing::info!("Package '{}' installed successfully", name);
        Ok(InstallStatus::Installed)
    }

    /// Uninstall a whitelisted package.
    ///
    /// Callers holding module aliases for the package should drop them; see
    /// [`Sandbox::uninstall`](crate::Sandbox::uninstall).
    pub fn uninstall(&self, name: &str) -> Result<UninstallStatus> {
        if !self.is_whitelisted(name) {
            return Err(Error::NotWhitelisted(name.to_string()));
        }

        if !self.is_installed(name)? {
            return Ok(UninstallStatus::NotInstalled);
        }

        let distribution = self.policy.distribution_name(name);
        tracing::info!("Uninstalling package '{}' ({})...", name, distribution);

        let result = self.run_installer("uninstall", distribution);
        self.invalidate_caches();

        result.map_err(|message| Error::Install {
            package: name.to_string(),
            message,
        })?;

        Ok(UninstallStatus::Uninstalled)
    }

    /// Pull the top-level module name out of a "module not found" message.
    ///
    /// No policy check: use [`extract_offending_package`](Self::extract_offending_package)
    /// to decide whether the name may be installed.
    pub fn parse_missing_module(message: &str) -> Option<String> {
        let captures = MISSING_MODULE.captures(message)?;
        let full = captures.get(1)?.as_str();
        full.split('.').next().map(str::to_string)
    }

    /// The package to install for a "module not found" message, if any.
    ///
    /// Returns a name only if the policy whitelists it, so a parsed name can
    /// never by itself trigger an unapproved install.
    pub fn extract_offending_package(&self, message: &str) -> Option<String> {
        Self::parse_missing_module(message).filter(|name| self.is_whitelisted(name))
    }

    /// Run the configured installer for `action` (`install` or `uninstall`).
    fn run_installer(&self, action: &str, distribution: &str) -> std::result::Result<(), String> {
        let mut command = match &self.installer {
            Installer::Command(parts) => {
                let Some((program, args)) = parts.split_first() else {
                    return Err("installer command is empty".to_string());
                };
                let mut command = Command::new(program);
                command.args(args).args([action, distribution]);
                command
            }
            Installer::Auto => match which::which("uv") {
                Ok(uv) => {
                    let mut command = Command::new(uv);
                    command
                        .args(["pip", action, "--python"])
                        .arg(self.interpreter.path())
                        .arg(distribution);
                    command
                }
                Err(_) => {
                    let mut command = Command::new(self.interpreter.path());
                    command.args(["-m", "pip", action]);
                    // uv never prompts, pip does on uninstall.
                    if action == "uninstall" {
                        command.arg("-y");
                    }
                    command.arg(distribution);
                    command
                }
            },
        };
        self.interpreter.apply_search_path(&mut command);

        tracing::debug!("Running installer: {:?}", command);

        let output = command
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to run installer: {}", e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            Err(format!("installer exited with {}", output.status))
        } else {
            Err(stderr)
        }
    }

    fn invalidate_caches(&self) {
        self.cache().clear();
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, bool>> {
        self.resolution_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

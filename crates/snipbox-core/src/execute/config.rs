//! Sandbox and per-call configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::Installer;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default encoded-size budget for a single returned binding (32MB).
pub const DEFAULT_MAX_VALUE_BYTES: usize = 32 * 1024 * 1024;

/// Sandbox-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Interpreter to run workers with. Discovered if unset.
    pub python: Option<PathBuf>,
    /// Explicit policy file, tried before the user-level one.
    pub policy_path: Option<PathBuf>,
    /// Extra time a worker gets on top of the caller's timeout.
    pub grace_period: Duration,
    /// How long to wait for the result channel after the worker exits.
    pub result_wait: Duration,
    /// Most distinct packages installed for a single call.
    pub max_install_retries: usize,
    /// Block direct imports of policy-blocked modules from snippet code.
    pub enforce_blocked_imports: bool,
    /// Address-space cap for workers, in bytes.
    pub memory_limit_bytes: Option<u64>,
    /// Bindings whose encoded form exceeds this come back as placeholders.
    pub max_value_bytes: usize,
    /// Extra import directories for workers and install checks.
    pub python_path: Vec<PathBuf>,
    /// Package installer used for on-demand installs.
    pub installer: Installer,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: None,
            policy_path: None,
            grace_period: Duration::from_secs(1),
            result_wait: Duration::from_secs(5),
            max_install_retries: 5,
            enforce_blocked_imports: true,
            memory_limit_bytes: None,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            python_path: Vec::new(),
            installer: Installer::Auto,
        }
    }
}

impl SandboxConfig {
    /// Use a specific interpreter.
    pub fn with_python(mut self, path: impl Into<PathBuf>) -> Self {
        self.python = Some(path.into());
        self
    }

    /// Use a specific policy file.
    pub fn with_policy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy_path = Some(path.into());
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_result_wait(mut self, result_wait: Duration) -> Self {
        self.result_wait = result_wait;
        self
    }

    pub fn with_max_install_retries(mut self, retries: usize) -> Self {
        self.max_install_retries = retries;
        self
    }

    pub fn with_blocked_imports(mut self, enforce: bool) -> Self {
        self.enforce_blocked_imports = enforce;
        self
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = Some(bytes);
        self
    }

    pub fn with_max_value_bytes(mut self, bytes: usize) -> Self {
        self.max_value_bytes = bytes;
        self
    }

    /// Add an import directory, searched before the interpreter's own paths.
    pub fn with_python_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.python_path.push(dir.into());
        self
    }

    /// Install packages with a custom command instead of uv or pip.
    pub fn with_installer_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.installer = Installer::Command(command.into_iter().map(Into::into).collect());
        self
    }
}

/// Per-call options for [`Sandbox::execute`](super::Sandbox::execute).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Merge new bindings into the persistent namespace on success.
    pub persist_namespace: bool,
    /// Wall-clock budget for the snippet.
    pub timeout: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            persist_namespace: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ExecuteOptions {
    /// Options for a persistent run.
    pub fn persistent() -> Self {
        Self {
            persist_namespace: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// JSON input schema for one execution, as used by tool callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Snippet source.
    pub code: String,
    #[serde(default)]
    pub persist_namespace: bool,
    /// Timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            persist_namespace: false,
            timeout: default_timeout_seconds(),
        }
    }

    /// The per-call options this request describes.
    pub fn options(&self) -> ExecuteOptions {
        ExecuteOptions {
            persist_namespace: self.persist_namespace,
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

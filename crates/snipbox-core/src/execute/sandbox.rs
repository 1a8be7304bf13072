//! The supervisor: runs snippets in workers and owns the persistent namespace.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;

use crate::error::{Error, Result};
use crate::interpreter::Interpreter;
use crate::ipc::{WorkerHandle, WorkerLimits, WorkerRequest};
use crate::namespace::{Namespace, NamespaceStore};
use crate::policy::{InstallStatus, PackagePolicy, PolicyEngine, UninstallStatus, load_policy};
use crate::split::{SplitResult, split};

use super::config::{ExecuteOptions, ExecuteRequest, SandboxConfig};
use super::result::{ExceptionInfo, ExecutionResult};

/// Runs snippets in isolated worker processes.
///
/// Non-persistent calls share nothing and may run concurrently from any
/// number of threads. Persistent calls hold the namespace store for their
/// whole duration, so they are applied one at a time in lock order.
pub struct Sandbox {
    config: SandboxConfig,
    policy: PolicyEngine,
    limits: WorkerLimits,
    /// Import names workers refuse from snippet code.
    blocked_imports: Vec<String>,
    store: Mutex<NamespaceStore>,
}

impl Sandbox {
    /// Create a sandbox, locating the interpreter and loading the policy.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let interpreter = match &config.python {
            Some(path) => Interpreter::at(path)?,
            None => Interpreter::discover()?,
        }
        .with_search_path(config.python_path.iter().cloned());

        // An explicit file must not be shadowed by a policy another sandbox
        // already cached for the process.
        let policy = match &config.policy_path {
            Some(path) => Arc::new(PackagePolicy::resolve(Some(path.as_path()))),
            None => load_policy(None),
        };
        tracing::debug!(
            "Sandbox using {} with policy from {}",
            interpreter.version(),
            policy.source
        );

        let blocked_imports = if config.enforce_blocked_imports {
            policy.blocked.iter().cloned().collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            limits: WorkerLimits {
                memory_limit_bytes: config.memory_limit_bytes,
            },
            policy: PolicyEngine::new(policy, interpreter).with_installer(config.installer.clone()),
            blocked_imports,
            store: Mutex::new(NamespaceStore::new()),
            config,
        })
    }

    /// The sandbox configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The policy engine governing installs.
    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Execute a snippet.
    ///
    /// Never fails: every problem, including ones in the sandbox itself, is
    /// reported through the returned [`ExecutionResult`].
    pub fn execute(&self, code: &str, options: ExecuteOptions) -> ExecutionResult {
        let split = match split(code) {
            Ok(split) => split,
            Err(e) => {
                return ExecutionResult::failure(ExceptionInfo::new(
                    "SplitterError",
                    e.to_string(),
                ));
            }
        };

        if let Some(error) = &split.syntax_error {
            tracing::debug!("Rejecting snippet before spawn: {}", error);
            return ExecutionResult::failure(ExceptionInfo::syntax_error(error));
        }

        if split.is_empty() {
            return ExecutionResult {
                success: true,
                ..ExecutionResult::default()
            };
        }

        if !options.persist_namespace {
            return self.run_snippet(&split, &Namespace::new(), options.timeout);
        }

        let mut store = self.lock_store();
        let snapshot = store.snapshot();
        let result = self.run_snippet(&split, &snapshot, options.timeout);
        if result.success {
            store.commit(&result.namespace, &result.modules);
            tracing::debug!(
                "Committed {} bindings and {} modules",
                result.namespace.len(),
                result.modules.len()
            );
        }
        result
    }

    /// Execute a JSON-shaped request.
    pub fn execute_request(&self, request: &ExecuteRequest) -> ExecutionResult {
        self.execute(&request.code, request.options())
    }

    /// Copy of the persistent namespace.
    pub fn persistent_namespace(&self) -> Namespace {
        self.lock_store().snapshot()
    }

    /// Forget every persisted binding.
    pub fn reset_namespace(&self) {
        self.lock_store().reset();
    }

    /// Uninstall a package and drop persisted module aliases that point into it.
    pub fn uninstall(&self, name: &str) -> Result<UninstallStatus> {
        let status = self.policy.uninstall(name)?;
        let removed = self.lock_store().purge_package(name);
        if !removed.is_empty() {
            tracing::info!("Dropped module aliases {:?} for '{}'", removed, name);
        }
        Ok(status)
    }

    /// Run a split snippet, installing whitelisted packages and retrying
    /// from the same snapshot while imports fail.
    fn run_snippet(
        &self,
        split: &SplitResult,
        snapshot: &Namespace,
        timeout: Duration,
    ) -> ExecutionResult {
        let request = WorkerRequest::new(split, snapshot)
            .with_blocked_imports(self.blocked_imports.iter().cloned())
            .with_max_value_bytes(self.config.max_value_bytes);
        let mut installed: Vec<String> = Vec::new();

        loop {
            let mut result = self.run_worker(&request, timeout);
            result.retain_new_bindings(snapshot);

            if !result.is_missing_module() {
                return result;
            }

            let message = result
                .error
                .as_ref()
                .map(|error| error.message.clone())
                .unwrap_or_default();

            let Some(package) = self.policy.extract_offending_package(&message) else {
                if let Some(name) = PolicyEngine::parse_missing_module(&message) {
                    tracing::info!("Not installing '{}': not whitelisted", name);
                    attach(&mut result, "package_not_whitelisted", json!(name));
                }
                return result;
            };

            if installed.contains(&package) {
                tracing::warn!("'{}' still missing after install, giving up", package);
                return result;
            }
            if installed.len() >= self.config.max_install_retries {
                tracing::warn!(
                    "Install limit ({}) reached, not installing '{}'",
                    self.config.max_install_retries,
                    package
                );
                return result;
            }

            match self.policy.install(&package) {
                Ok(InstallStatus::Installed) => {
                    tracing::info!("Installed '{}', re-running snippet", package);
                    installed.push(package);
                }
                Ok(InstallStatus::AlreadyInstalled) => {
                    // The import failed for some other reason; reinstalling won't help.
                    return result;
                }
                Err(e) => {
                    let message = match e {
                        Error::Install { message, .. } => message,
                        other => other.to_string(),
                    };
                    let details = json!({"package": package, "message": message});
                    attach(&mut result, "package_install_failed", details);
                    return result;
                }
            }
        }
    }

    /// One worker lifetime: spawn, send, wait, collect.
    fn run_worker(&self, request: &WorkerRequest, timeout: Duration) -> ExecutionResult {
        let mut worker = match WorkerHandle::spawn(self.policy.interpreter(), &self.limits) {
            Ok(worker) => worker,
            Err(e) => return ExecutionResult::failure(ExceptionInfo::spawn_error(e.to_string())),
        };

        if let Err(e) = worker.send_request(request) {
            worker.kill();
            let stderr = worker.stderr_output(self.config.result_wait);
            return ExecutionResult::failure(
                ExceptionInfo::channel_error(e.to_string()).with_context("worker_stderr", stderr),
            );
        }

        let deadline = timeout.saturating_add(self.config.grace_period);
        let status = match worker.wait_timeout(deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::debug!("Worker {} timed out after {:?}, killing", worker.pid(), timeout);
                worker.kill();
                return ExecutionResult::failure(ExceptionInfo::timeout(timeout));
            }
            Err(e) => {
                worker.kill();
                return ExecutionResult::failure(ExceptionInfo::channel_error(e.to_string()));
            }
        };

        match worker.take_response(self.config.result_wait) {
            Ok(Some(result)) => result,
            Ok(None) => {
                let stderr = worker.stderr_output(self.config.result_wait);
                tracing::warn!("Worker exited ({}) without a result", status);
                ExecutionResult::failure(ExceptionInfo::channel_empty(status.to_string(), stderr))
            }
            Err(e) => ExecutionResult::failure(
                ExceptionInfo::channel_error(e.to_string())
                    .with_context("exit_status", status.to_string()),
            ),
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, NamespaceStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn attach(result: &mut ExecutionResult, key: &str, value: serde_json::Value) {
    if let Some(error) = result.error.as_mut() {
        error.extra_context.insert(key.to_string(), value);
    }
}

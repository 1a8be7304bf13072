//! Execution outcomes reported to callers.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::namespace::{Namespace, Value, is_reserved};
use crate::split::SyntaxError;

/// Exception kinds that trigger the install-and-retry path.
const MISSING_MODULE_KINDS: &[&str] = &["ModuleNotFoundError", "ImportError"];

/// Structured description of a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Exception type name, e.g. `NameError` or `TimeoutError`.
    pub kind: String,
    /// Exception message.
    pub message: String,
    /// Formatted traceback. Empty for failures raised by the supervisor.
    #[serde(default)]
    pub trace: String,
    /// Additional diagnostics.
    #[serde(default)]
    pub extra_context: BTreeMap<String, serde_json::Value>,
}

impl ExceptionInfo {
    /// Create an exception with no trace or context.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a diagnostic entry.
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra_context.insert(key.into(), value.into());
        self
    }

    /// The snippet does not parse.
    pub fn syntax_error(error: &SyntaxError) -> Self {
        Self::new("SyntaxError", error.to_string())
            .with_context("line", error.line)
            .with_context("column", error.column)
            .with_context("text", error.text.clone())
    }

    /// The worker ran past its deadline and was killed.
    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            "TimeoutError",
            format!("Execution exceeded {} seconds", format_seconds(timeout)),
        )
        .with_context("timeout_seconds", timeout.as_secs_f64())
    }

    /// The worker exited without delivering a result.
    pub fn channel_empty(
        exit_status: impl Into<String>,
        worker_stderr: impl Into<String>,
    ) -> Self {
        let exit_status = exit_status.into();
        Self::new(
            "ChannelEmptyError",
            format!("Worker exited ({}) without returning a result", exit_status),
        )
        .with_context("exit_status", exit_status)
        .with_context("worker_stderr", worker_stderr.into())
    }

    /// The result channel could not be read or decoded.
    pub fn channel_error(message: impl Into<String>) -> Self {
        Self::new("ChannelError", message)
    }

    /// The worker process could not be started.
    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self::new("WorkerSpawnError", message)
    }
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured output, see the worker output rules.
    #[serde(default)]
    pub output: String,
    /// Set when the run failed.
    #[serde(default)]
    pub error: Option<ExceptionInfo>,
    /// Bindings created by this run. Never includes names that already existed.
    #[serde(default)]
    pub namespace: BTreeMap<String, Value>,
    /// Module aliases created by this run (alias → import path).
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
    /// True if the snippet ran to completion.
    #[serde(default)]
    pub success: bool,
}

impl ExecutionResult {
    /// A failed result with no output.
    pub fn failure(error: ExceptionInfo) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// True if this failed because an import could not be resolved.
    pub fn is_missing_module(&self) -> bool {
        !self.success
            && self
                .error
                .as_ref()
                .is_some_and(|error| MISSING_MODULE_KINDS.contains(&error.kind.as_str()))
    }

    /// Drop reserved names and anything that was already in `snapshot`.
    ///
    /// Returns how many entries were removed.
    pub fn retain_new_bindings(&mut self, snapshot: &Namespace) -> usize {
        let before = self.namespace.len() + self.modules.len();
        self.namespace
            .retain(|name, _| !is_reserved(name) && !snapshot.contains(name));
        self.modules
            .retain(|alias, _| !is_reserved(alias) && !snapshot.contains(alias));
        before - (self.namespace.len() + self.modules.len())
    }
}

fn format_seconds(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{:.2}", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_module_detection() {
        let mut result = ExecutionResult::failure(ExceptionInfo::new(
            "ModuleNotFoundError",
            "No module named 'numpy'",
        ));
        assert!(result.is_missing_module());

        result.error = Some(ExceptionInfo::new("NameError", "name 'x' is not defined"));
        assert!(!result.is_missing_module());
    }

    #[test]
    fn test_retain_new_bindings() {
        let mut snapshot = Namespace::new();
        snapshot.insert("x", 1);
        snapshot.insert_module("np", "numpy");

        let mut result = ExecutionResult {
            success: true,
            ..ExecutionResult::default()
        };
        result.namespace.insert("x".to_string(), Value::from(2));
        result.namespace.insert("y".to_string(), Value::from(3));
        result.namespace.insert("__builtins__".to_string(), Value::from("b"));
        result.modules.insert("np".to_string(), "numpy".to_string());
        result.modules.insert("m".to_string(), "math".to_string());

        assert_eq!(result.retain_new_bindings(&snapshot), 3);
        assert_eq!(result.namespace.keys().collect::<Vec<_>>(), vec!["y"]);
        assert_eq!(result.modules.keys().collect::<Vec<_>>(), vec!["m"]);
    }

    #[test]
    fn test_timeout_context() {
        let info = ExceptionInfo::timeout(Duration::from_secs(2));
        assert_eq!(info.kind, "TimeoutError");
        assert_eq!(info.message, "Execution exceeded 2 seconds");
        assert_eq!(info.extra_context["timeout_seconds"], json!(2.0));
    }

    #[test]
    fn test_result_json_shape() {
        let result = ExecutionResult::failure(
            ExceptionInfo::channel_empty("signal: 9 (SIGKILL)", "Killed"),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["kind"], json!("ChannelEmptyError"));
        assert_eq!(value["error"]["extra_context"]["worker_stderr"], json!("Killed"));
        assert_eq!(value["namespace"], json!({}));
    }
}

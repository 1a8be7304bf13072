//! Core engine for the snipbox snippet sandbox.
//!
//! This crate provides:
//! - A splitter that partitions a snippet into statements and a trailing expression
//! - Process-isolated workers that run each snippet in a fresh interpreter
//! - A supervisor with timeouts, install-and-retry, and namespace persistence
//! - A layered package policy deciding what may be imported or installed

pub mod error;
pub mod execute;
pub mod interpreter;
pub mod ipc;
pub mod namespace;
pub mod paths;
pub mod policy;
pub mod split;

pub use error::{Error, Result};
pub use execute::{
    ExceptionInfo, ExecuteOptions, ExecuteRequest, ExecutionResult, Sandbox, SandboxConfig,
};
pub use interpreter::Interpreter;
pub use namespace::{Namespace, NamespaceStore, PickledValue, Value};
pub use paths::SnipboxDirs;
pub use policy::{
    InstallStatus, Installer, PackagePolicy, PolicyEngine, PolicySource, UninstallStatus,
    load_policy, user_policy_path,
};
pub use split::{SplitResult, Splitter, SyntaxError, split};

//! Snippet execution for snipbox.
//!
//! Every call runs in a fresh worker process that can be killed at any time,
//! so an infinite loop, a crash, or a runaway allocation never reaches the
//! host.
//!
//! # Architecture
//!
//! ```text
//! Sandbox::execute(code, options)
//!     │
//!     ├── split()              syntax errors stop here, nothing is spawned
//!     │
//!     ├── snapshot             persistent store (locked) or a fresh Namespace
//!     │
//!     └── run_snippet ◀─────────────────────────────────────┐
//!             │                                             │
//!             └── WorkerHandle (python -c bootstrap)         │
//!                     │                                     │
//!                     ├── stdin:  WorkerRequest frame       │
//!                     ├── stdout: ExecutionResult frame     │
//!                     ├── SIGKILL to the process group      │
//!                     │   after timeout + grace             │
//!                     │                                     │
//!                     └── ModuleNotFoundError ──▶ PolicyEngine::install
//!                                                   (whitelisted only)
//! ```
//!
//! On success with persistence requested, the new bindings and module
//! aliases are committed to the store.

mod config;
mod result;
mod sandbox;

pub use config::{
    DEFAULT_MAX_VALUE_BYTES, DEFAULT_TIMEOUT, ExecuteOptions, ExecuteRequest, SandboxConfig,
};
pub use result::{ExceptionInfo, ExecutionResult};
pub use sandbox::Sandbox;

//! Inter-process communication with snippet worker processes.
//!
//! This module provides the wire protocol and the process handle used by
//! the supervisor to run one snippet per worker.

pub mod protocol;
mod worker;

pub use protocol::{
    WorkerRequest, WorkerResponse, decode_channel, read_message, write_message,
};
pub use worker::{WorkerHandle, WorkerLimits};

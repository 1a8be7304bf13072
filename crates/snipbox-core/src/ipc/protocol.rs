//! IPC protocol messages for snipbox worker processes.
//!
//! Uses length-prefixed JSON messages over the worker's pipes.
//! Format: 4-byte length (u32 LE) + UTF-8 JSON body.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::execute::ExecutionResult;
use crate::namespace::{Namespace, Value};
use crate::split::SplitResult;

/// Upper bound on a single frame (100MB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Request sent from the supervisor to a worker process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Top-level constructs to execute before the trailing expression.
    pub statements: Option<Vec<String>>,
    /// Expression whose value becomes the output. Empty if none.
    pub trailing_expr: String,
    /// Snapshot of the bindings visible to the snippet.
    pub namespace: BTreeMap<String, Value>,
    /// Module registry to re-import before running (alias → import path).
    pub modules: BTreeMap<String, String>,
    /// Top-level module names snippet code may not import directly.
    pub blocked_imports: Vec<String>,
    /// Encoded size above which a new binding comes back as a placeholder.
    /// The worker's own default applies when unset.
    pub max_value_bytes: Option<usize>,
}

impl WorkerRequest {
    /// Build a request for a split snippet against a namespace snapshot.
    pub fn new(split: &SplitResult, snapshot: &Namespace) -> Self {
        Self {
            statements: split.statements.clone(),
            trailing_expr: split.trailing_expr.clone(),
            namespace: snapshot.bindings().clone(),
            modules: snapshot.modules().clone(),
            blocked_imports: Vec::new(),
            max_value_bytes: None,
        }
    }

    /// Set the import blocklist.
    pub fn with_blocked_imports<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_imports = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-binding size budget.
    pub fn with_max_value_bytes(mut self, bytes: usize) -> Self {
        self.max_value_bytes = Some(bytes);
        self
    }
}

/// Response sent from a worker to the supervisor.
pub type WorkerResponse = ExecutionResult;

/// Write a message to a writer using length-prefixed JSON encoding.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {}", e)))?;

    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(Error::Ipc(format!(
            "IPC message too large: {} bytes",
            bytes.len()
        )));
    }

    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read a message from a reader using length-prefixed JSON encoding.
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Deserialization(format!("Failed to decode IPC message: {}", e)))
}

/// Decode everything a worker wrote to its result channel.
///
/// An empty channel is `Ok(None)`; anything present must be one whole frame.
pub fn decode_channel<T: DeserializeOwned>(bytes: &[u8]) -> Result<Option<T>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mut cursor = std::io::Cursor::new(bytes);
    let message = read_message(&mut cursor)?;
    if (cursor.position() as usize) < bytes.len() {
        tracing::warn!(
            "Ignoring {} trailing bytes after worker result",
            bytes.len() - cursor.position() as usize
        );
    }
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::split;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_request_roundtrip() {
        let mut snapshot = Namespace::new();
        snapshot.insert("x", 10);
        snapshot.insert_module("np", "numpy");
        let request = WorkerRequest::new(&split("y = x * 2\ny").unwrap(), &snapshot)
            .with_blocked_imports(["os", "sys"])
            .with_max_value_bytes(4096);

        let mut buf = Vec::new();
        write_message(&mut buf, &request).unwrap();
        assert_eq!(
            u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize,
            buf.len() - 4
        );

        let mut cursor = Cursor::new(buf);
        let decoded: WorkerRequest = read_message(&mut cursor).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.statements, Some(vec!["y = x * 2".to_string()]));
        assert_eq!(decoded.trailing_expr, "y");
        assert_eq!(decoded.blocked_imports, vec!["os", "sys"]);
        assert_eq!(decoded.max_value_bytes, Some(4096));
    }

    #[test]
    fn test_response_from_worker_json() {
        // Shape produced by the bootstrap script.
        let body = json!({
            "output": "15",
            "error": null,
            "namespace": {"x": {"json": 5}, "f": {"json": "<unserializable>: function"}},
            "modules": {"m": "math"},
            "success": true
        });
        let mut frame = Vec::new();
        write_message(&mut frame, &body).unwrap();

        let response: WorkerResponse = decode_channel(&frame).unwrap().unwrap();
        assert!(response.success);
        assert_eq!(response.output, "15");
        assert_eq!(response.namespace.get("x"), Some(&Value::from(5)));
        assert!(response.namespace["f"].is_placeholder());
        assert_eq!(response.modules.get("m").map(String::as_str), Some("math"));
    }

    #[test]
    fn test_empty_channel() {
        let decoded: Option<WorkerResponse> = decode_channel(&[]).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_truncated_frame() {
        let mut frame = Vec::new();
        write_message(&mut frame, &json!({"output": "partial"})).unwrap();
        frame.truncate(frame.len() - 3);

        let err = decode_channel::<serde_json::Value>(&frame).unwrap_err();
        assert!(matches!(err, Error::Ipc(_)));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut frame = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();
        frame.extend_from_slice(b"{}");
        let err = read_message::<_, serde_json::Value>(&mut Cursor::new(frame)).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_garbage_body() {
        let mut frame = 3u32.to_le_bytes().to_vec();
        frame.extend_from_slice(b"{{{");
        let err = decode_channel::<WorkerResponse>(&frame).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}

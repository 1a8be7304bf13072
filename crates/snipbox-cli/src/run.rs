//! Run command implementation for snipbox CLI.
//!
//! Executes a snippet file once and reports the result.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use snipbox_core::{ExecuteOptions, ExecutionResult, Sandbox};

use crate::colors::{Style, paint};

/// Execute a snippet file. Returns whether the snippet succeeded.
pub fn execute(
    sandbox: &Sandbox,
    path: &Path,
    persist: bool,
    timeout: u64,
    json: bool,
) -> anyhow::Result<bool> {
    let code = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let options = ExecuteOptions {
        persist_namespace: persist,
        timeout: Duration::from_secs(timeout),
    };

    let start = Instant::now();
    let result = sandbox.execute(&code, options);
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(result.success);
    }

    print_result(&result);

    if result.success {
        let mut names: Vec<&str> = result
            .namespace
            .keys()
            .chain(result.modules.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        if !names.is_empty() {
            println!("{}", paint(Style::Dim, format!("new bindings: {}", names.join(", "))));
        }
        println!("{} in {:.2}s", paint(Style::Ok, "Completed"), elapsed.as_secs_f64());
    }

    Ok(result.success)
}

/// Print a result for a human reader.
pub fn print_result(result: &ExecutionResult) {
    if !result.output.is_empty() {
        println!("{}", result.output);
    }

    let Some(error) = &result.error else {
        return;
    };

    if !error.trace.is_empty() {
        println!("{}", paint(Style::Dim, error.trace.trim_end()));
    }
    println!("{}: {}", paint(Style::Error, &error.kind), error.message);

    for (key, value) in &error.extra_context {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !value.is_empty() {
            println!("  {} {}", paint(Style::Warn, format!("{}:", key)), value);
        }
    }
}

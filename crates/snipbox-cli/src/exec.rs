//! Exec command: JSON in on stdin, JSON out on stdout.
//!
//! This is the contract tool callers use; nothing else is written to stdout.

use std::io::Read;

use anyhow::Context;
use snipbox_core::{ExecuteRequest, Sandbox};

pub fn execute(sandbox: &Sandbox) -> anyhow::Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read request from stdin")?;

    let request: ExecuteRequest =
        serde_json::from_str(&input).context("Invalid execute request")?;

    let result = sandbox.execute_request(&request);
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

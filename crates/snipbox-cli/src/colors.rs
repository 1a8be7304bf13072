//! Styling for human-readable CLI output.
//!
//! Styles are dropped when `NO_COLOR` is set or stdout is not a terminal, so
//! `snipbox run snippet.py > out.txt` never writes escape codes to the file.
//! The `exec` command bypasses this module entirely.

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::OnceLock;

const RESET: &str = "\x1b[0m";

/// What a piece of output means, rendered as an ANSI style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Headings and binding names.
    Bold,
    /// Tracebacks, hints, secondary details.
    Dim,
    /// Completed runs and names the policy allows.
    Ok,
    /// Diagnostics and names outside the policy.
    Warn,
    /// Exception kinds and blocked names.
    Error,
    /// REPL prompts.
    Prompt,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "\x1b[1m",
            Style::Dim => "\x1b[2m",
            Style::Ok => "\x1b[32m",
            Style::Warn => "\x1b[33m",
            Style::Error => "\x1b[31m",
            Style::Prompt => "\x1b[36m",
        }
    }
}

fn enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal())
}

/// Render `text` in `style`, or as-is when styling is off.
pub fn paint(style: Style, text: impl Display) -> String {
    if enabled() {
        format!("{}{}{}", style.code(), text, RESET)
    } else {
        text.to_string()
    }
}

/// Flush stdout so a prompt without a trailing newline is visible.
pub fn flush_stdout() {
    io::stdout().flush().ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_keeps_text() {
        for style in [Style::Bold, Style::Dim, Style::Ok, Style::Warn, Style::Error, Style::Prompt] {
            let painted = paint(style, "numpy");
            assert!(painted.contains("numpy"));
            if painted != "numpy" {
                assert!(painted.starts_with(style.code()));
                assert!(painted.ends_with(RESET));
            }
        }
    }
}

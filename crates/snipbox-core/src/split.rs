//! Snippet splitter using tree-sitter to separate a trailing expression.
//!
//! Reproduces interactive-console semantics: everything up to the last
//! top-level construct is executed, and if that construct is a bare
//! expression its value is reported separately.

use std::fmt;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

use crate::error::{Error, Result};

/// Expression-statement children that make it a statement rather than a value.
const NON_VALUE_KINDS: &[&str] = &["assignment", "augmented_assignment", "yield"];

/// Python 2 statement forms the grammar still accepts. Python 3 rejects them.
const LEGACY_STATEMENT_KINDS: &[&str] = &["print_statement", "exec_statement"];

/// Outcome of splitting a snippet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResult {
    /// Source text of each top-level construct to execute, in order.
    /// `None` when there is nothing to execute before the trailing expression.
    pub statements: Option<Vec<String>>,
    /// Source text of the trailing expression, or empty if there is none.
    pub trailing_expr: String,
    /// Set when the snippet could not be parsed. No other field is populated then.
    pub syntax_error: Option<SyntaxError>,
}

impl SplitResult {
    fn empty() -> Self {
        Self::default()
    }

    fn failed(error: SyntaxError) -> Self {
        Self {
            statements: None,
            trailing_expr: String::new(),
            syntax_error: Some(error),
        }
    }

    /// True when there is neither a statement nor an expression to run.
    pub fn is_empty(&self) -> bool {
        self.statements.is_none() && self.trailing_expr.is_empty() && self.syntax_error.is_none()
    }
}

/// Location and description of the first syntax problem in a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    /// Human-readable description.
    pub message: String,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
    /// The offending source line.
    pub text: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.column)
    }
}

/// Splitter for Python snippets.
pub struct Splitter {
    parser: Parser,
}

impl Splitter {
    /// Create a new splitter.
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| Error::Parse(format!("Failed to load Python grammar: {}", e)))?;
        Ok(Self { parser })
    }

    /// Split a snippet into leading statements and an optional trailing expression.
    pub fn split(&mut self, code: &str) -> SplitResult {
        if code.trim().is_empty() {
            return SplitResult::empty();
        }

        let Some(tree) = self.parser.parse(code, None) else {
            return SplitResult::failed(SyntaxError {
                message: "parser gave up on input".to_string(),
                line: 1,
                column: 1,
                text: code.lines().next().unwrap_or_default().to_string(),
            });
        };

        let root = tree.root_node();
        if root.has_error() {
            let node = first_error(root).unwrap_or(root);
            return SplitResult::failed(describe_error(node, code));
        }
        if let Some(node) = first_legacy_statement(root) {
            return SplitResult::failed(describe_legacy_statement(node, code));
        }

        let mut cursor = root.walk();
        let constructs: Vec<Node<'_>> = root
            .named_children(&mut cursor)
            .filter(|node| node.kind() != "comment")
            .collect();

        let Some((last, leading)) = constructs.split_last() else {
            return SplitResult::empty();
        };

        let text = |node: &Node<'_>| code[node.byte_range()].trim_end().to_string();

        if is_bare_expression(*last) {
            let statements = if leading.is_empty() {
                None
            } else {
                Some(leading.iter().map(text).collect())
            };
            SplitResult {
                statements,
                trailing_expr: text(last),
                syntax_error: None,
            }
        } else {
            SplitResult {
                statements: Some(constructs.iter().map(text).collect()),
                trailing_expr: String::new(),
                syntax_error: None,
            }
        }
    }
}

/// Split a snippet with a freshly created [`Splitter`].
pub fn split(code: &str) -> Result<SplitResult> {
    Ok(Splitter::new()?.split(code))
}

fn is_bare_expression(node: Node<'_>) -> bool {
    if node.kind() != "expression_statement" {
        return false;
    }
    let mut cursor = node.walk();
    let kinds: Vec<&str> = node
        .named_children(&mut cursor)
        .map(|child| child.kind())
        .filter(|kind| *kind != "comment")
        .collect();
    !kinds.is_empty() && kinds.iter().all(|kind| !NON_VALUE_KINDS.contains(kind))
}

/// Depth-first search for the first ERROR or MISSING node.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// Depth-first search for a Python 2 `print` or `exec` statement.
fn first_legacy_statement(node: Node<'_>) -> Option<Node<'_>> {
    if LEGACY_STATEMENT_KINDS.contains(&node.kind()) {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children.into_iter().find_map(first_legacy_statement)
}

fn describe_error(node: Node<'_>, code: &str) -> SyntaxError {
    let message = if node.is_missing() {
        format!("expected '{}'", node.kind())
    } else {
        "invalid syntax".to_string()
    };
    syntax_error_at(node, code, message)
}

fn describe_legacy_statement(node: Node<'_>, code: &str) -> SyntaxError {
    let keyword = node.kind().trim_end_matches("_statement");
    let message = format!(
        "Missing parentheses in call to '{}'. Did you mean {}(...)?",
        keyword, keyword
    );
    syntax_error_at(node, code, message)
}

fn syntax_error_at(node: Node<'_>, code: &str, message: String) -> SyntaxError {
    let position = node.start_position();
    SyntaxError {
        message,
        line: position.row + 1,
        column: position.column + 1,
        text: code
            .lines()
            .nth(position.row)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

//! Error types for snipbox-core.

use thiserror::Error;

/// Result type for snipbox-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in snipbox-core.
///
/// These never escape [`Sandbox::execute`](crate::Sandbox::execute); the
/// supervisor folds them into an [`ExecutionResult`](crate::ExecutionResult).
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to set up the snippet parser.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid package policy or sandbox configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable Python interpreter.
    #[error("interpreter error: {0}")]
    Interpreter(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IPC communication error with a worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The package policy does not allow installing this package.
    #[error("package '{0}' is not whitelisted for installation")]
    NotWhitelisted(String),

    /// The package installer ran and failed.
    #[error("failed to install package '{package}': {message}")]
    Install { package: String, message: String },
}

impl Error {
    /// Render the error together with a recovery hint for terminal output.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Interpreter(_) => {
                Some("install Python 3, or point SNIPBOX_PYTHON / --python at an interpreter")
            }
            Error::Config(_) => {
                Some("check the [stdlib] and [third_party] tables of the policy file")
            }
            Error::NotWhitelisted(_) => {
                Some("add the package to [third_party].whitelisted in the policy file")
            }
            Error::Install { .. } => {
                Some("check network access and that pip or uv works for this interpreter")
            }
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_is_appended() {
        let err = Error::NotWhitelisted("requests".to_string());
        let rendered = err.with_hint();
        assert!(rendered.starts_with("package 'requests' is not whitelisted"));
        assert!(rendered.contains("hint:"));
    }

    #[test]
    fn test_no_hint_for_ipc() {
        let err = Error::Ipc("broken pipe".to_string());
        assert_eq!(err.with_hint(), "IPC error: broken pipe");
    }
}

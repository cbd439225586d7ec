//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code. Snapshot
//! corruption is the only one logged at FATAL severity.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::state::StateError;
use crate::txn::TransactionError;
use crate::version::VersionError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (snapshot file, stdout)
    IoError,
    /// Snapshot already exists
    AlreadyInitialized,
    /// Snapshot does not exist
    NotInitialized,
    /// Snapshot failed verification
    SnapshotCorrupted,
    /// Verification found problems
    GraphInconsistent,
    /// A store, transaction or graph operation failed
    OperationFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "VV_CLI_CONFIG_ERROR",
            Self::IoError => "VV_CLI_IO_ERROR",
            Self::AlreadyInitialized => "VV_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "VV_CLI_NOT_INITIALIZED",
            Self::SnapshotCorrupted => "VV_CLI_SNAPSHOT_CORRUPTED",
            Self::GraphInconsistent => "VV_CLI_GRAPH_INCONSISTENT",
            Self::OperationFailed => "VV_CLI_OPERATION_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn already_initialized(path: &str) -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            format!("Snapshot {} already exists", path),
        )
    }

    pub fn not_initialized(path: &str) -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            format!("Snapshot {} not found. Run 'versionvault init' first.", path),
        )
    }

    pub fn graph_inconsistent(problems: usize) -> Self {
        Self::new(
            CliErrorCode::GraphInconsistent,
            format!("Version graph has {} problem(s)", problems),
        )
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<StateError> for CliError {
    fn from(e: StateError) -> Self {
        let code = match &e {
            StateError::Corruption(_) => CliErrorCode::SnapshotCorrupted,
            StateError::Io { .. } => CliErrorCode::IoError,
            _ => CliErrorCode::OperationFailed,
        };
        Self::new(code, format!("{} ({})", e, e.code()))
    }
}

impl From<TransactionError> for CliError {
    fn from(e: TransactionError) -> Self {
        Self::new(CliErrorCode::OperationFailed, format!("{} ({})", e, e.code()))
    }
}

impl From<VersionError> for CliError {
    fn from(e: VersionError) -> Self {
        match e {
            VersionError::State(inner) => inner.into(),
            other => Self::new(
                CliErrorCode::OperationFailed,
                format!("{} ({})", other, other.code()),
            ),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

//! Error types for the restaking engine

use ethers::types::{H256, U256};
use restaker_chain::ChainError;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, RestakerError>;

/// How the decision loop reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network and RPC failures, receipts not yet available: back off and retry
    Transient,

    /// Reserve balance cannot cover fees: fixed cooldown
    ResourceInsufficient,

    /// On-chain revert or unexpected receipt logs: restart the cycle
    ExecutionFailed,

    /// Configuration or numeric precondition violated: stop
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::ResourceInsufficient => "resource_insufficient",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum RestakerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("Insufficient window data: elapsed {elapsed_secs}s")]
    InsufficientWindowData { elapsed_secs: i64 },

    #[error("Degenerate gain rate: {gain_rate}")]
    DegenerateGainRate { gain_rate: f64 },

    #[error("Optimizer did not converge (fee_ratio={fee_ratio}, gain_rate={gain_rate}): {reason}")]
    NonConvergence {
        fee_ratio: f64,
        gain_rate: f64,
        reason: String,
    },

    #[error("Estimated gas greater than last block limit: estimated={estimated}, block_limit={block_limit}")]
    GasLimitExceeded { estimated: U256, block_limit: U256 },

    #[error("Execution reverted: {operation} ({tx_hash:?})")]
    ExecutionReverted { operation: String, tx_hash: H256 },

    #[error("Receipt log error: {operation} - {message}")]
    ReceiptLog { operation: String, message: String },

    #[error("Receipt not available after {waited_secs}s: {tx_hash:?}")]
    ReceiptTimeout { tx_hash: H256, waited_secs: u64 },

    #[error("Unsupported position: {0}")]
    UnsupportedPosition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RestakerError {
    /// Create a new receipt log error
    pub fn receipt_log<S: Into<String>>(operation: S, message: S) -> Self {
        Self::ReceiptLog {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a new non-convergence error
    pub fn non_convergence<S: Into<String>>(fee_ratio: f64, gain_rate: f64, reason: S) -> Self {
        Self::NonConvergence {
            fee_ratio,
            gain_rate,
            reason: reason.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Classify the error for the decision loop
    pub fn kind(&self) -> ErrorKind {
        match self {
            RestakerError::Chain(ChainError::Signing(_)) => ErrorKind::Fatal,
            RestakerError::Chain(e) if e.is_retryable() => ErrorKind::Transient,
            RestakerError::Chain(_) => ErrorKind::ExecutionFailed,
            RestakerError::Io(_) => ErrorKind::Transient,
            RestakerError::ReceiptTimeout { .. } => ErrorKind::Transient,
            RestakerError::InsufficientWindowData { .. } => ErrorKind::Transient,
            RestakerError::ExecutionReverted { .. } => ErrorKind::ExecutionFailed,
            RestakerError::ReceiptLog { .. } => ErrorKind::ExecutionFailed,
            RestakerError::Internal(_) => ErrorKind::ExecutionFailed,
            RestakerError::Config(_)
            | RestakerError::Serialization(_)
            | RestakerError::DegenerateGainRate { .. }
            | RestakerError::NonConvergence { .. }
            | RestakerError::GasLimitExceeded { .. }
            | RestakerError::UnsupportedPosition(_) => ErrorKind::Fatal,
        }
    }

    /// Error category for log fields; chain errors keep their own
    pub fn category(&self) -> &'static str {
        match self {
            RestakerError::Chain(e) => e.category(),
            RestakerError::Config(_) => "config",
            RestakerError::Io(_) => "io",
            RestakerError::Serialization(_) => "serialization",
            RestakerError::InsufficientWindowData { .. } | RestakerError::DegenerateGainRate { .. } => "gain_rate",
            RestakerError::NonConvergence { .. } => "optimizer",
            RestakerError::GasLimitExceeded { .. }
            | RestakerError::ExecutionReverted { .. }
            | RestakerError::ReceiptTimeout { .. } => "submission",
            RestakerError::ReceiptLog { .. } => "receipt_log",
            RestakerError::UnsupportedPosition(_) => "position",
            RestakerError::Internal(_) => "internal",
        }
    }

    /// Check if this error must stop the engine
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    /// Check if this error is worth retrying after a backoff
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }

    /// Numeric precondition violations, reported separately from other fatal errors
    pub fn is_convergence_failure(&self) -> bool {
        matches!(
            self,
            RestakerError::NonConvergence { .. } | RestakerError::DegenerateGainRate { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(
            RestakerError::Chain(ChainError::Explorer("short page".into())).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            RestakerError::receipt_log("stake", "no log found").kind(),
            ErrorKind::ExecutionFailed
        );
        assert_eq!(
            RestakerError::GasLimitExceeded {
                estimated: U256::from(150u64),
                block_limit: U256::from(100u64),
            }
            .kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            RestakerError::ReceiptTimeout {
                tx_hash: H256::zero(),
                waited_secs: 10
            }
            .kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_convergence_failure_is_distinguished() {
        let err = RestakerError::non_convergence(1.2, 1e-8, "fee ratio outside [0, 1)");
        assert!(err.is_fatal());
        assert!(err.is_convergence_failure());
        assert!(err.to_string().contains("fee_ratio=1.2"));

        let other = RestakerError::UnsupportedPosition("vault".into());
        assert!(other.is_fatal());
        assert!(!other.is_convergence_failure());
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(RestakerError::Chain(ChainError::Explorer("short page".into())).category(), "explorer");

        let signing = RestakerError::Chain(ChainError::Signing("bad key".into()));
        assert_eq!(signing.category(), "signing");
        assert_eq!(signing.kind(), ErrorKind::Fatal);

        assert_eq!(RestakerError::non_convergence(1.2, 1e-8, "diverged").category(), "optimizer");
        assert_eq!(
            RestakerError::ReceiptTimeout {
                tx_hash: H256::zero(),
                waited_secs: 0
            }
            .category(),
            "submission"
        );
    }
}

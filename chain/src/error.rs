//! Error types for the chain layer

use thiserror::Error;

/// Result type alias for chain layer operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors raised while talking to the ledger and its satellite services
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(#[from] ethers::providers::ProviderError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Decode error: {call} - {message}")]
    Decode { call: String, message: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Price unavailable for {token}: {message}")]
    PriceUnavailable { token: String, message: String },

    #[error("Explorer error: {0}")]
    Explorer(String),

    #[error("Block not found: {0}")]
    MissingBlock(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(call: S, message: S) -> Self {
        Self::Decode {
            call: call.into(),
            message: message.into(),
        }
    }

    /// Create a new price error
    pub fn price_unavailable<S: Into<String>>(token: S, message: S) -> Self {
        Self::PriceUnavailable {
            token: token.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::Rpc(_) => true,
            ChainError::Network(_) => true,
            ChainError::Explorer(_) => true,
            ChainError::PriceUnavailable { .. } => true,
            ChainError::MissingBlock(_) => true,
            _ => false,
        }
    }

    /// Get the error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            ChainError::Rpc(_) => "rpc",
            ChainError::Network(_) => "network",
            ChainError::Serialization(_) => "serialization",
            ChainError::Url(_) => "config",
            ChainError::Abi(_) => "abi",
            ChainError::Decode { .. } => "decode",
            ChainError::Signing(_) => "signing",
            ChainError::PriceUnavailable { .. } => "price",
            ChainError::Explorer(_) => "explorer",
            ChainError::MissingBlock(_) => "rpc",
            ChainError::Internal(_) => "internal",
        }
    }
}

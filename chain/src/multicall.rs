//! Batched read-only calls through the Multicall2 aggregator
//!
//! All calls of one batch execute against the same block, which is what
//! makes a position snapshot consistent.

use std::sync::Arc;

use ethers::abi::Token;
use ethers::types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest};
use tracing::debug;

use crate::contracts::{token_uint, AbiManager, ViewCall, MULTICALL2_ABI};
use crate::{ChainError, LedgerClient, Result};

/// Multicall2 client
#[derive(Clone)]
pub struct Multicall {
    ledger: Arc<dyn LedgerClient>,
    address: Address,
}

impl Multicall {
    pub fn new(ledger: Arc<dyn LedgerClient>, address: Address) -> Self {
        Self { ledger, address }
    }

    /// Execute `calls` at the latest block
    pub async fn aggregate(&self, calls: &[ViewCall]) -> Result<(u64, Vec<Vec<Token>>)> {
        self.aggregate_at(calls, None).await
    }

    /// Execute `calls`, optionally pinned to `block`. Results keep call order.
    pub async fn aggregate_at(
        &self,
        calls: &[ViewCall],
        block: Option<u64>,
    ) -> Result<(u64, Vec<Vec<Token>>)> {
        let encoded = calls
            .iter()
            .map(|call| {
                Ok(Token::Tuple(vec![
                    Token::Address(call.target),
                    Token::Bytes(call.encode()?.to_vec()),
                ]))
            })
            .collect::<Result<Vec<_>>>()?;

        let data = AbiManager::encode_function_call(&MULTICALL2_ABI, "aggregate", &[Token::Array(encoded)])?;
        let tx: TypedTransaction = TransactionRequest::new().to(self.address).data(data).into();

        let output = self.ledger.call(&tx, block).await?;
        let mut decoded = AbiManager::decode_function_output(&MULTICALL2_ABI, "aggregate", &output)?;
        if decoded.len() != 2 {
            return Err(ChainError::decode(
                "aggregate".to_string(),
                format!("expected 2 outputs, got {}", decoded.len()),
            ));
        }

        let return_data = match decoded.pop() {
            Some(Token::Array(items)) => items,
            other => {
                return Err(ChainError::decode(
                    "aggregate".to_string(),
                    format!("unexpected return data {:?}", other),
                ))
            }
        };
        let block_number = token_uint(&decoded[0], "aggregate.blockNumber")?.low_u64();

        if return_data.len() != calls.len() {
            return Err(ChainError::decode(
                "aggregate".to_string(),
                format!("{} calls but {} results", calls.len(), return_data.len()),
            ));
        }

        let results = calls
            .iter()
            .zip(return_data)
            .map(|(call, data)| match data {
                Token::Bytes(bytes) => call.decode(&bytes),
                other => Err(ChainError::decode(
                    call.function.to_string(),
                    format!("expected bytes, got {:?}", other),
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(calls = calls.len(), block_number, "Multicall aggregated");
        Ok((block_number, results))
    }
}

//! Historical gas usage of contract functions
//!
//! Gas estimates for multi-step operations cannot come from
//! `eth_estimateGas` (later steps depend on earlier ones), so the restaker
//! prices an operation by the median gas used by its recent successful
//! invocations as reported by the block explorer.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use ethers::utils::id;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{ChainError, Result};

const PAGE_SIZE: usize = 100;

/// Hard stop for explorers that never return enough matches
const MAX_PAGES: usize = 50;

/// Gas usage statistics of contract functions
#[async_trait]
pub trait GasUsageHistory: Send + Sync {
    /// Rounded median gas used by the last `samples` successful calls of
    /// `signature` (e.g. `"stake(uint256)"`) on `contract`
    async fn median_gas_used(&self, contract: Address, signature: &str, samples: usize) -> Result<u64>;
}

/// 4-byte selector of a canonical function signature, as `0x`-prefixed hex
pub fn selector_hex(signature: &str) -> String {
    format!("0x{}", hex::encode(id(signature)))
}

#[derive(Debug, Deserialize)]
struct ExplorerPage {
    results: Vec<ExplorerTx>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExplorerTx {
    hash: String,
    input: String,
    status: Value,
    gas_used: Value,
}

impl ExplorerTx {
    fn succeeded(&self) -> bool {
        match &self.status {
            Value::Number(n) => n.as_u64() == Some(1),
            Value::Bool(b) => *b,
            Value::String(s) => s == "1" || s == "0x1",
            _ => false,
        }
    }

    fn gas_used(&self) -> Option<u64> {
        match &self.gas_used {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Explorer-backed gas history
#[derive(Debug, Clone)]
pub struct ExplorerGasHistory {
    client: Client,
    base_url: String,
}

impl ExplorerGasHistory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_page(&self, contract: Address, from: usize) -> Result<Vec<ExplorerTx>> {
        let url = format!("{}/txs/{:?}", self.base_url, contract);
        let page: ExplorerPage = self
            .client
            .get(&url)
            .query(&[("from", from), ("size", PAGE_SIZE)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if page.results.len() != PAGE_SIZE {
            return Err(ChainError::Explorer(format!(
                "Results with less items than expected: got {}, expected {}",
                page.results.len(),
                PAGE_SIZE
            )));
        }
        Ok(page.results)
    }
}

#[async_trait]
impl GasUsageHistory for ExplorerGasHistory {
    async fn median_gas_used(&self, contract: Address, signature: &str, samples: usize) -> Result<u64> {
        let selector = selector_hex(signature);
        let mut seen = HashSet::new();
        let mut gas = Vec::with_capacity(samples);

        for page in 0..MAX_PAGES {
            if gas.len() >= samples {
                break;
            }
            let txs = self.fetch_page(contract, page * PAGE_SIZE).await?;
            gas.extend(matching_gas(&txs, &selector, &mut seen));
        }

        gas.truncate(samples);
        let median = median(&mut gas).ok_or_else(|| {
            ChainError::Explorer(format!("no successful {} calls found on {:?}", signature, contract))
        })?;

        debug!(signature, samples = gas.len(), median, "Estimated gas from explorer history");
        Ok(median)
    }
}

/// Gas used by the successful, not yet seen transactions calling `selector`
fn matching_gas(txs: &[ExplorerTx], selector: &str, seen: &mut HashSet<String>) -> Vec<u64> {
    txs.iter()
        .filter(|tx| tx.input.to_lowercase().starts_with(selector) && tx.succeeded())
        .filter(|tx| seen.insert(tx.hash.clone()))
        .filter_map(ExplorerTx::gas_used)
        .collect()
}

/// Rounded median (half-way values round to even, as the explorer-based
/// estimator always has)
fn median(values: &mut [u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        return Some(values[mid]);
    }
    let sum = values[mid - 1] + values[mid];
    let half = sum / 2;
    if sum % 2 == 1 && half % 2 == 1 {
        Some(half + 1)
    } else {
        Some(half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(hash: &str, input: &str, status: Value, gas: Value) -> ExplorerTx {
        ExplorerTx {
            hash: hash.to_string(),
            input: input.to_string(),
            status,
            gas_used: gas,
        }
    }

    #[test]
    fn test_selector_hex() {
        assert_eq!(selector_hex("transfer(address,uint256)"), "0xa9059cbb");
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [5, 1, 3]), Some(3));
        assert_eq!(median(&mut [1, 2]), Some(2));
        assert_eq!(median(&mut [2, 3]), Some(2));
        assert_eq!(median(&mut [100, 200, 300, 400]), Some(250));
    }

    #[test]
    fn test_matching_gas_filters_and_dedups() {
        let sel = selector_hex("stake(uint256)");
        let input = format!("{}00ff", sel);
        let txs = vec![
            tx("0x1", &input, json!(1), json!(50_000)),
            tx("0x1", &input, json!(1), json!(50_000)),
            tx("0x2", &input, json!(0), json!(60_000)),
            tx("0x3", "0xdeadbeef", json!(1), json!(70_000)),
            tx("0x4", &input, json!(1), json!("55000")),
        ];

        let mut seen = HashSet::new();
        assert_eq!(matching_gas(&txs, &sel, &mut seen), vec![50_000, 55_000]);
        assert!(matching_gas(&txs, &sel, &mut seen).is_empty());
    }
}

//! USD price feeds

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{ChainError, Result};

/// Source of USD token prices
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Price of every token in `tokens`; a missing token is an error
    async fn usd_prices(&self, tokens: &[Address]) -> Result<HashMap<Address, f64>>;
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: Option<f64>,
}

/// CoinGecko `simple/token_price` client
#[derive(Debug, Clone)]
pub struct CoinGeckoPriceFeed {
    client: Client,
    base_url: String,
    platform: String,
}

impl CoinGeckoPriceFeed {
    pub fn new(base_url: impl Into<String>, platform: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            platform: platform.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/simple/token_price/{}", self.base_url, self.platform)
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoPriceFeed {
    async fn usd_prices(&self, tokens: &[Address]) -> Result<HashMap<Address, f64>> {
        let addresses = tokens
            .iter()
            .map(|a| format!("{:?}", a))
            .collect::<Vec<_>>()
            .join(",");

        let quotes: HashMap<String, UsdQuote> = self
            .client
            .get(self.endpoint())
            .query(&[("contract_addresses", addresses.as_str()), ("vs_currencies", "usd")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let prices = collect_prices(tokens, &quotes)?;
        debug!(tokens = tokens.len(), "Fetched USD prices");
        Ok(prices)
    }
}

/// Match quotes (keyed by lowercase hex address) back to the requested tokens
fn collect_prices(tokens: &[Address], quotes: &HashMap<String, UsdQuote>) -> Result<HashMap<Address, f64>> {
    tokens
        .iter()
        .map(|token| {
            let key = format!("{:?}", token);
            let price = quotes
                .get(&key)
                .and_then(|q| q.usd)
                .ok_or_else(|| ChainError::price_unavailable(key.clone(), "no USD quote".to_string()))?;
            Ok((*token, price))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_prices() {
        let a = Address::repeat_byte(0xab);
        let b = Address::repeat_byte(0x01);
        let quotes: HashMap<String, UsdQuote> = serde_json::from_str(&format!(
            r#"{{"{:?}": {{"usd": 2.5}}, "{:?}": {{}}}}"#,
            a, b
        ))
        .unwrap();

        let prices = collect_prices(&[a], &quotes).unwrap();
        assert_eq!(prices[&a], 2.5);

        let err = collect_prices(&[a, b], &quotes).unwrap_err();
        assert!(matches!(err, ChainError::PriceUnavailable { .. }));
    }

    #[test]
    fn test_endpoint() {
        let feed = CoinGeckoPriceFeed::new("https://api.coingecko.com/api/v3/", "ronin", Duration::from_secs(5)).unwrap();
        assert_eq!(feed.endpoint(), "https://api.coingecko.com/api/v3/simple/token_price/ronin");
    }
}

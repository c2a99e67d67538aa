//! Transaction signing
//!
//! The key material stays inside the signer; callers only ever see the
//! wallet address and RLP-encoded signed payloads.

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{transaction::eip2718::TypedTransaction, Address, Bytes};

use crate::{ChainError, Result};

/// Signs transactions for a single wallet
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign `tx` and return the raw bytes ready for broadcast
    async fn sign(&self, tx: &TypedTransaction) -> Result<Bytes>;
}

#[async_trait]
impl TransactionSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign(&self, tx: &TypedTransaction) -> Result<Bytes> {
        let mut tx = tx.clone();
        tx.set_chain_id(self.chain_id());

        let signature = self
            .sign_transaction(&tx)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        Ok(tx.rlp_signed(&signature))
    }
}

/// Build a wallet bound to `chain_id` from a hex private key
pub fn wallet_from_key(private_key: &str, chain_id: u64) -> Result<LocalWallet> {
    let wallet: LocalWallet = private_key
        .trim()
        .trim_start_matches("0x")
        .parse()
        .map_err(|e: ethers::signers::WalletError| ChainError::Signing(e.to_string()))?;
    Ok(wallet.with_chain_id(chain_id))
}

//! Signing seam for the wallet engine.
//!
//! Key custody is external: the engine only hands canonical unsigned bytes to
//! a [`SignerInterface`] and receives a signed payload back.

use async_trait::async_trait;
use thiserror::Error;
use wallet_types::{Address, ChainId};

pub mod implementations;

pub use implementations::local::LocalSigner;

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Unknown account {0}")]
	UnknownAccount(Address),
}

#[async_trait]
pub trait SignerInterface: Send + Sync {
	/// Signs `payload` on behalf of `from` for `chain`.
	async fn sign(
		&self,
		chain: &ChainId,
		from: &Address,
		payload: &[u8],
	) -> Result<Vec<u8>, AccountError>;
}

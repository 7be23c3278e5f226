//! Chain access for the wallet engine.
//!
//! The per-chain RPC wire protocol lives outside this workspace. This crate
//! defines the [`ChainClient`] capability the engine requires from each chain
//! and the [`ChainRegistry`] that maps chain ids to clients and their static
//! [`ChainSettings`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wallet_types::{Address, ChainId, SignedTransaction, TransactionId};

pub mod implementations;
pub mod registry;

pub use implementations::memory::MemoryChain;
pub use registry::{ChainEntry, ChainRegistry};
pub use wallet_types::ChainSettings;

/// Errors that can occur while talking to a chain.
#[derive(Debug, Error)]
pub enum ChainError {
	/// Transport or node failure; safe to retry later.
	#[error("RPC error: {0}")]
	Rpc(String),
	/// The node refused the transaction (insufficient funds, stale nonce, ...).
	#[error("Rejected: {0}")]
	Rejected(String),
	#[error("Request timed out")]
	Timeout,
	#[error("Chain {0} not configured")]
	NotConfigured(ChainId),
	#[error("Chain {0} already registered")]
	AlreadyRegistered(ChainId),
}

/// Fee market snapshot, per-gas values in the smallest native unit.
///
/// Chains with a base fee are EIP-1559 style; chains that only report a gas
/// price use legacy pricing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeData {
	pub gas_price: Option<u128>,
	pub base_fee_per_gas: Option<u128>,
	pub max_priority_fee_per_gas: Option<u128>,
}

/// Transaction as seen by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
	pub id: TransactionId,
	/// Block the transaction was included in, if any.
	pub block_number: Option<u64>,
}

/// Execution receipt of an included transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReceipt {
	pub block_number: u64,
	pub success: bool,
	pub gas_used: u64,
	/// Per-gas price actually paid, in the smallest native unit.
	pub effective_gas_price: u128,
}

/// Per-chain RPC capability.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Chain this client talks to.
	fn chain_id(&self) -> ChainId;

	/// Next nonce for `address`, counting pending transactions.
	async fn get_nonce(&self, address: &Address) -> Result<u64, ChainError>;

	async fn get_fee_data(&self) -> Result<FeeData, ChainError>;

	/// Submits a signed transaction and returns its network hash.
	async fn broadcast(&self, signed: &SignedTransaction) -> Result<TransactionId, ChainError>;

	async fn get_transaction_by_hash(
		&self,
		id: &TransactionId,
	) -> Result<Option<ChainTransaction>, ChainError>;

	async fn get_receipt(&self, id: &TransactionId) -> Result<Option<ChainReceipt>, ChainError>;

	async fn get_latest_block_number(&self) -> Result<u64, ChainError>;

	/// Looks up a transaction that consumed `nonce` for `from`.
	///
	/// Most nodes offer no mempool introspection, so the default reports
	/// nothing and the monitor falls back to drop detection.
	async fn find_replacement(
		&self,
		_from: &Address,
		_nonce: u64,
	) -> Result<Option<TransactionId>, ChainError> {
		Ok(None)
	}
}

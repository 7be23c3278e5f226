//! In-memory chain implementation.
//!
//! `MemoryChain` behaves like a node whose block production is driven by the
//! caller: broadcasts land in a mempool and stay there until [`include`] or
//! [`forget`] is called. It backs local simulation and the engine's tests.
//!
//! [`include`]: MemoryChain::include
//! [`forget`]: MemoryChain::forget

use crate::{ChainClient, ChainError, ChainReceipt, ChainTransaction, FeeData};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use wallet_types::{Address, ChainId, SignedTransaction, TransactionId};

#[derive(Debug, Clone)]
struct MemoryTransaction {
	receipt: Option<ChainReceipt>,
}

#[derive(Debug, Default)]
struct MemoryChainState {
	latest_block: u64,
	fee_data: FeeData,
	nonces: HashMap<Address, u64>,
	transactions: HashMap<TransactionId, MemoryTransaction>,
	broadcasts: Vec<SignedTransaction>,
	replacements: HashMap<(Address, u64), TransactionId>,
	reject_reason: Option<String>,
	offline: bool,
}

pub struct MemoryChain {
	chain_id: ChainId,
	state: Mutex<MemoryChainState>,
}

impl MemoryChain {
	pub fn new(chain_id: impl Into<ChainId>) -> Self {
		Self {
			chain_id: chain_id.into(),
			state: Mutex::new(MemoryChainState::default()),
		}
	}

	/// Starts the chain with the given fee market.
	pub fn with_fee_data(mut self, fee_data: FeeData) -> Self {
		self.state.get_mut().fee_data = fee_data;
		self
	}

	pub async fn set_fee_data(&self, fee_data: FeeData) {
		self.state.lock().await.fee_data = fee_data;
	}

	/// Sets the pending-inclusive nonce reported for `address`.
	pub async fn set_nonce(&self, address: &Address, nonce: u64) {
		self.state.lock().await.nonces.insert(address.clone(), nonce);
	}

	pub async fn advance_blocks(&self, blocks: u64) {
		self.state.lock().await.latest_block += blocks;
	}

	/// Mines a known transaction into the next block and returns that block.
	pub async fn include(
		&self,
		id: &TransactionId,
		success: bool,
		gas_used: u64,
		effective_gas_price: u128,
	) -> Option<u64> {
		let mut state = self.state.lock().await;
		if !state.transactions.contains_key(id) {
			return None;
		}

		state.latest_block += 1;
		let block_number = state.latest_block;
		let transaction = state.transactions.get_mut(id)?;
		transaction.receipt = Some(ChainReceipt {
			block_number,
			success,
			gas_used,
			effective_gas_price,
		});
		debug!(chain = %self.chain_id, tx = %id, block_number, "Included transaction");
		Some(block_number)
	}

	/// Evicts a transaction from the mempool as if it was never seen.
	pub async fn forget(&self, id: &TransactionId) {
		self.state.lock().await.transactions.remove(id);
	}

	/// Makes every following broadcast fail with `ChainError::Rejected`.
	pub async fn reject_broadcasts(&self, reason: Option<String>) {
		self.state.lock().await.reject_reason = reason;
	}

	/// Makes every RPC call fail with `ChainError::Rpc` while set.
	pub async fn set_offline(&self, offline: bool) {
		self.state.lock().await.offline = offline;
	}

	/// Registers a transaction observed under `(from, nonce)`.
	pub async fn set_replacement(&self, from: &Address, nonce: u64, id: TransactionId) {
		self.state
			.lock()
			.await
			.replacements
			.insert((from.clone(), nonce), id);
	}

	/// Signed payloads received so far, in broadcast order.
	pub async fn broadcasts(&self) -> Vec<SignedTransaction> {
		self.state.lock().await.broadcasts.clone()
	}

	fn check_online(&self, state: &MemoryChainState) -> Result<(), ChainError> {
		if state.offline {
			return Err(ChainError::Rpc(format!("chain {} unreachable", self.chain_id)));
		}
		Ok(())
	}
}

#[async_trait]
impl ChainClient for MemoryChain {
	fn chain_id(&self) -> ChainId {
		self.chain_id.clone()
	}

	async fn get_nonce(&self, address: &Address) -> Result<u64, ChainError> {
		let state = self.state.lock().await;
		self.check_online(&state)?;
		Ok(state.nonces.get(address).copied().unwrap_or(0))
	}

	async fn get_fee_data(&self) -> Result<FeeData, ChainError> {
		let state = self.state.lock().await;
		self.check_online(&state)?;
		Ok(state.fee_data)
	}

	async fn broadcast(&self, signed: &SignedTransaction) -> Result<TransactionId, ChainError> {
		let mut state = self.state.lock().await;
		self.check_online(&state)?;
		if let Some(reason) = &state.reject_reason {
			return Err(ChainError::Rejected(reason.clone()));
		}

		let id = TransactionId(format!("0x{}", uuid::Uuid::new_v4().simple()));
		state
			.transactions
			.insert(id.clone(), MemoryTransaction { receipt: None });
		state.broadcasts.push(signed.clone());
		debug!(chain = %self.chain_id, tx = %id, "Accepted broadcast");
		Ok(id)
	}

	async fn get_transaction_by_hash(
		&self,
		id: &TransactionId,
	) -> Result<Option<ChainTransaction>, ChainError> {
		let state = self.state.lock().await;
		self.check_online(&state)?;
		Ok(state.transactions.get(id).map(|tx| ChainTransaction {
			id: id.clone(),
			block_number: tx.receipt.map(|receipt| receipt.block_number),
		}))
	}

	async fn get_receipt(&self, id: &TransactionId) -> Result<Option<ChainReceipt>, ChainError> {
		let state = self.state.lock().await;
		self.check_online(&state)?;
		Ok(state.transactions.get(id).and_then(|tx| tx.receipt))
	}

	async fn get_latest_block_number(&self) -> Result<u64, ChainError> {
		let state = self.state.lock().await;
		self.check_online(&state)?;
		Ok(state.latest_block)
	}

	async fn find_replacement(
		&self,
		from: &Address,
		nonce: u64,
	) -> Result<Option<TransactionId>, ChainError> {
		let state = self.state.lock().await;
		self.check_online(&state)?;
		Ok(state.replacements.get(&(from.clone(), nonce)).cloned())
	}
}

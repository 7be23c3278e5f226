//! Transaction lifecycle state machine.
//!
//! Every transaction the wallet creates is owned by one
//! [`TransactionStateMachine`]. Callers drive the pre-network steps
//! (`build`, `sign`, `broadcast`, `cancel`, `speed_up`, `discard`); the monitor
//! reports chain observations through [`apply_update`], the only path that
//! moves a broadcast transaction forward.
//!
//! [`apply_update`]: TransactionStateMachine::apply_update

use crate::{DeliveryError, PendingTransactionRegistry, StatusUpdate};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use wallet_account::SignerInterface;
use wallet_chains::ChainRegistry;
use wallet_gas::GasEstimator;
use wallet_types::{
	Address, ChainId, Clock, EventBus, NonceKey, Replacement, SignedTransaction, Timestamp,
	Transaction, TransactionEvent, TransactionId, TransactionKind, TransactionStatus,
	TransferRequest,
};

/// All transactions by local id, with network-id aliases and the signed
/// payload cache.
#[derive(Default)]
struct TransactionTable {
	transactions: HashMap<TransactionId, Transaction>,
	aliases: HashMap<TransactionId, TransactionId>,
	signed: HashMap<TransactionId, SignedTransaction>,
}

impl TransactionTable {
	fn resolve(&self, id: &TransactionId) -> Option<TransactionId> {
		if self.transactions.contains_key(id) {
			Some(id.clone())
		} else {
			self.aliases.get(id).cloned()
		}
	}

	fn get(&self, id: &TransactionId) -> Option<&Transaction> {
		self.resolve(id)
			.and_then(|local_id| self.transactions.get(&local_id))
	}

	fn insert(&mut self, transaction: Transaction) {
		if transaction.id != transaction.local_id {
			self.aliases
				.insert(transaction.id.clone(), transaction.local_id.clone());
		}
		self.transactions
			.insert(transaction.local_id.clone(), transaction);
	}

	/// One past the highest nonce held by a live transaction of the sender.
	fn next_local_nonce(&self, chain: &ChainId, from: &Address) -> Option<u64> {
		self.transactions
			.values()
			.filter(|tx| !tx.is_terminal() && &tx.chain == chain && &tx.from == from)
			.map(|tx| tx.nonce + 1)
			.max()
	}

	fn holds_nonce(&self, key: &NonceKey) -> bool {
		self.transactions
			.values()
			.any(|tx| !tx.is_terminal() && tx.nonce_key() == *key)
	}
}

pub struct TransactionStateMachine {
	chains: Arc<ChainRegistry>,
	gas: Arc<GasEstimator>,
	signer: Arc<dyn SignerInterface>,
	clock: Arc<dyn Clock>,
	events: EventBus,
	registry: PendingTransactionRegistry,
	table: RwLock<TransactionTable>,
	/// Serializes nonce allocation.
	nonce_lock: Mutex<()>,
	/// Per-transaction signing locks, keyed by local id.
	signing: DashMap<TransactionId, Arc<Mutex<()>>>,
}

impl TransactionStateMachine {
	pub fn new(
		chains: Arc<ChainRegistry>,
		gas: Arc<GasEstimator>,
		signer: Arc<dyn SignerInterface>,
		clock: Arc<dyn Clock>,
		events: EventBus,
	) -> Self {
		Self {
			chains,
			gas,
			signer,
			clock,
			events,
			registry: PendingTransactionRegistry::new(),
			table: RwLock::new(TransactionTable::default()),
			nonce_lock: Mutex::new(()),
			signing: DashMap::new(),
		}
	}

	pub fn chains(&self) -> &Arc<ChainRegistry> {
		&self.chains
	}

	pub fn registry(&self) -> &PendingTransactionRegistry {
		&self.registry
	}

	/// Builds a new transfer in `Created` status.
	pub async fn build(&self, request: TransferRequest) -> Result<Transaction, DeliveryError> {
		self.build_with_kind(request, TransactionKind::Transfer)
			.await
	}

	async fn build_with_kind(
		&self,
		request: TransferRequest,
		kind: TransactionKind,
	) -> Result<Transaction, DeliveryError> {
		let entry = self
			.chains
			.get(&request.chain)
			.ok_or_else(|| DeliveryError::UnsupportedChain(request.chain.clone()))?;

		let is_transfer = kind == TransactionKind::Transfer;
		if request.amount < Decimal::ZERO || (is_transfer && request.amount.is_zero()) {
			return Err(DeliveryError::InvalidRequest(format!(
				"amount must be positive, got {}",
				request.amount
			)));
		}
		if request.from.0.is_empty() || request.to.0.is_empty() {
			return Err(DeliveryError::InvalidRequest(
				"sender and recipient are required".to_string(),
			));
		}

		let fee = match request.fee {
			Some(fee) => fee,
			None => {
				self.gas
					.estimate(
						&request.chain,
						request.tier.unwrap_or_default(),
						request.gas_limit,
					)
					.await?
			}
		};

		let guard = self.nonce_lock.lock().await;
		let nonce = match request.nonce {
			Some(nonce) => {
				let key = NonceKey {
					chain: request.chain.clone(),
					from: request.from.clone(),
					nonce,
				};
				if is_transfer && self.table.read().await.holds_nonce(&key) {
					return Err(DeliveryError::InvalidRequest(format!(
						"nonce {} is already in use; cancel or speed up instead",
						nonce
					)));
				}
				nonce
			}
			None => {
				let chain_nonce = entry
					.client
					.get_nonce(&request.from)
					.await
					.map_err(|e| DeliveryError::Chain(e.to_string()))?;
				let local_nonce = self
					.table
					.read()
					.await
					.next_local_nonce(&request.chain, &request.from);
				local_nonce.map_or(chain_nonce, |local| local.max(chain_nonce))
			}
		};

		let now = self.clock.now();
		let id = TransactionId::local();
		let transaction = Transaction {
			id: id.clone(),
			local_id: id,
			chain: request.chain,
			from: request.from,
			to: request.to,
			amount: request.amount,
			asset: request.asset,
			data: request.data,
			nonce,
			fee,
			status: TransactionStatus::Created,
			kind,
			created_at: now,
			updated_at: now,
			broadcast_at: None,
			finalized_at: None,
			block: None,
			realized_fee: None,
			replacement: None,
			failure_reason: None,
		};
		self.table.write().await.insert(transaction.clone());
		drop(guard);

		info!(
			tx_id = %transaction.id,
			chain = %transaction.chain,
			nonce = transaction.nonce,
			"Built transaction"
		);
		self.events
			.publish_transaction(TransactionEvent::Created(transaction.clone()));
		Ok(transaction)
	}

	/// Signs a built transaction.
	///
	/// The signed payload is cached: signing the same transaction again
	/// returns it without invoking the signer. Concurrent calls for one
	/// transaction wait for the first signature instead of requesting another.
	pub async fn sign(&self, id: &TransactionId) -> Result<SignedTransaction, DeliveryError> {
		let local_id = self
			.table
			.read()
			.await
			.resolve(id)
			.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
		let lock = self.signing.entry(local_id.clone()).or_default().clone();

		let result = {
			let _guard = lock.lock().await;
			self.sign_exclusive(id).await
		};
		// Only the map and this call hold the lock when nobody is waiting.
		self.signing
			.remove_if(&local_id, |_, lock| Arc::strong_count(lock) <= 2);
		result
	}

	async fn sign_exclusive(&self, id: &TransactionId) -> Result<SignedTransaction, DeliveryError> {
		let transaction = {
			let table = self.table.read().await;
			let local_id = table
				.resolve(id)
				.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
			if let Some(signed) = table.signed.get(&local_id) {
				debug!(tx_id = %id, "Returning cached signature");
				return Ok(signed.clone());
			}
			let transaction = table
				.transactions
				.get(&local_id)
				.cloned()
				.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
			if !matches!(
				transaction.status,
				TransactionStatus::Created | TransactionStatus::Signed
			) {
				return Err(DeliveryError::InvalidTransition {
					from: transaction.status,
					to: TransactionStatus::Signed,
				});
			}
			transaction
		};

		let payload = transaction
			.unsigned_payload()
			.map_err(|e| DeliveryError::SigningFailed(e.to_string()))?;
		let bytes = self
			.signer
			.sign(&transaction.chain, &transaction.from, &payload)
			.await
			.map_err(|e| {
				warn!(tx_id = %transaction.id, error = %e, "Signing failed");
				DeliveryError::SigningFailed(e.to_string())
			})?;
		let signed = SignedTransaction::new(
			transaction.local_id.clone(),
			transaction.chain.clone(),
			&bytes,
		);

		let updated = {
			let mut table = self.table.write().await;
			if let Some(existing) = table.signed.get(&transaction.local_id) {
				return Ok(existing.clone());
			}
			let now = self.clock.now();
			let tx = table
				.transactions
				.get_mut(&transaction.local_id)
				.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
			let updated = match tx.status {
				TransactionStatus::Created => {
					tx.status = TransactionStatus::Signed;
					tx.updated_at = now;
					Some(tx.clone())
				}
				TransactionStatus::Signed => None,
				status => {
					return Err(DeliveryError::InvalidTransition {
						from: status,
						to: TransactionStatus::Signed,
					})
				}
			};
			table
				.signed
				.insert(transaction.local_id.clone(), signed.clone());
			updated
		};

		if let Some(transaction) = updated {
			debug!(tx_id = %transaction.id, "Signed transaction");
			self.events
				.publish_transaction(TransactionEvent::Signed(transaction));
		}
		Ok(signed)
	}

	/// Submits a signed transaction to its chain.
	///
	/// On success the transaction becomes `Pending`, takes the network id and
	/// enters the pending registry. On rejection it stays `Signed`.
	pub async fn broadcast(
		&self,
		signed: &SignedTransaction,
	) -> Result<Transaction, DeliveryError> {
		let transaction = self
			.get(&signed.transaction_id)
			.await
			.ok_or_else(|| DeliveryError::NotFound(signed.transaction_id.clone()))?;
		if transaction.status != TransactionStatus::Signed {
			return Err(DeliveryError::InvalidTransition {
				from: transaction.status,
				to: TransactionStatus::Pending,
			});
		}

		let client = self
			.chains
			.client(&transaction.chain)
			.map_err(|_| DeliveryError::UnsupportedChain(transaction.chain.clone()))?;
		let network_id = client.broadcast(signed).await.map_err(|e| {
			warn!(
				tx_id = %transaction.id,
				chain = %transaction.chain,
				error = %e,
				"Broadcast rejected"
			);
			DeliveryError::BroadcastFailed(e.to_string())
		})?;

		let updated = {
			let mut table = self.table.write().await;
			let now = self.clock.now();
			let tx = table
				.transactions
				.get_mut(&transaction.local_id)
				.ok_or_else(|| DeliveryError::NotFound(transaction.local_id.clone()))?;
			if !tx.status.can_transition_to(TransactionStatus::Pending) {
				return Err(DeliveryError::InvalidTransition {
					from: tx.status,
					to: TransactionStatus::Pending,
				});
			}
			tx.id = network_id.clone();
			tx.status = TransactionStatus::Pending;
			tx.broadcast_at = Some(now);
			tx.updated_at = now;
			let updated = tx.clone();
			table.aliases.insert(network_id, updated.local_id.clone());
			self.registry.upsert(&updated);
			updated
		};

		info!(
			tx_id = %updated.id,
			local_id = %updated.local_id,
			chain = %updated.chain,
			nonce = updated.nonce,
			"Broadcast transaction"
		);
		self.events
			.publish_transaction(TransactionEvent::Broadcast(updated.clone()));
		Ok(updated)
	}

	/// Competes for the nonce of an in-flight transaction with a zero-value
	/// self-transfer at a bumped fee.
	///
	/// Returns the cancellation transaction. The original is marked
	/// `Replaced` only once the cancellation lands.
	pub async fn cancel(&self, id: &TransactionId) -> Result<Transaction, DeliveryError> {
		let original = self
			.get(id)
			.await
			.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
		if !original.status.is_in_flight() {
			return Err(DeliveryError::NotCancellable {
				id: original.id,
				status: original.status,
			});
		}
		if matches!(original.kind, TransactionKind::Cancellation { .. }) {
			return Err(DeliveryError::UnsupportedOperation(
				"a cancellation cannot be cancelled; speed it up instead".to_string(),
			));
		}

		let native_asset = self
			.chains
			.settings(&original.chain)
			.map_err(|_| DeliveryError::UnsupportedChain(original.chain.clone()))?
			.native_asset
			.clone();
		let fee = self.gas.replacement_quote(&original.fee)?;
		let request = TransferRequest::new(
			original.chain.clone(),
			original.from.clone(),
			original.from.clone(),
			Decimal::ZERO,
			native_asset,
		)
		.with_nonce(original.nonce)
		.with_fee(fee);

		info!(tx_id = %original.id, nonce = original.nonce, "Cancelling transaction");
		let cancellation = self
			.build_with_kind(
				request,
				TransactionKind::Cancellation {
					original: original.id.clone(),
				},
			)
			.await?;
		self.submit_replacement(cancellation).await
	}

	/// Re-sends a pending transfer at the same nonce with a bumped fee.
	pub async fn speed_up(&self, id: &TransactionId) -> Result<Transaction, DeliveryError> {
		let original = self
			.get(id)
			.await
			.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
		if original.status != TransactionStatus::Pending {
			return Err(DeliveryError::NotCancellable {
				id: original.id,
				status: original.status,
			});
		}

		let fee = self.gas.replacement_quote(&original.fee)?;
		let request = TransferRequest {
			chain: original.chain.clone(),
			from: original.from.clone(),
			to: original.to.clone(),
			amount: original.amount,
			asset: original.asset.clone(),
			data: original.data.clone(),
			nonce: Some(original.nonce),
			fee: Some(fee),
			tier: None,
			gas_limit: None,
		};

		info!(tx_id = %original.id, nonce = original.nonce, "Speeding up transaction");
		let replacement = self
			.build_with_kind(
				request,
				TransactionKind::SpeedUp {
					original: original.id.clone(),
				},
			)
			.await?;
		self.submit_replacement(replacement).await
	}

	async fn submit_replacement(
		&self,
		transaction: Transaction,
	) -> Result<Transaction, DeliveryError> {
		let submitted = match self.sign(&transaction.id).await {
			Ok(signed) => self.broadcast(&signed).await,
			Err(e) => Err(e),
		};

		if submitted.is_err() {
			if let Err(e) = self.discard(&transaction.id).await {
				warn!(tx_id = %transaction.id, error = %e, "Failed to discard replacement");
			}
		}
		submitted
	}

	/// Abandons a transaction that never reached the network.
	pub async fn discard(&self, id: &TransactionId) -> Result<Transaction, DeliveryError> {
		let updated = {
			let mut table = self.table.write().await;
			let local_id = table
				.resolve(id)
				.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
			let now = self.clock.now();
			let tx = table
				.transactions
				.get_mut(&local_id)
				.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
			if !matches!(
				tx.status,
				TransactionStatus::Created | TransactionStatus::Signed
			) {
				return Err(DeliveryError::NotCancellable {
					id: tx.id.clone(),
					status: tx.status,
				});
			}
			tx.status = TransactionStatus::Cancelled;
			tx.updated_at = now;
			tx.finalized_at = Some(now);
			let updated = tx.clone();
			table.signed.remove(&local_id);
			updated
		};

		info!(tx_id = %updated.id, "Discarded transaction");
		self.events
			.publish_transaction(TransactionEvent::Cancelled(updated.clone()));
		Ok(updated)
	}

	/// Applies a chain observation to a broadcast transaction.
	///
	/// Backward or repeated transitions are rejected with `InvalidTransition`,
	/// except that a `Confirming` transaction accepts `Confirming` again to
	/// refresh its block, publishing `Confirming` when the block changed. When the transaction lands, every other live
	/// transaction at the same nonce is displaced.
	pub async fn apply_update(
		&self,
		id: &TransactionId,
		update: StatusUpdate,
	) -> Result<Transaction, DeliveryError> {
		let mut events = Vec::new();

		let updated = {
			let mut table = self.table.write().await;
			let local_id = table
				.resolve(id)
				.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;
			let now = self.clock.now();
			let tx = table
				.transactions
				.get_mut(&local_id)
				.ok_or_else(|| DeliveryError::NotFound(id.clone()))?;

			let target = update.status();
			if let (TransactionStatus::Confirming, StatusUpdate::Confirming { block }) =
				(tx.status, &update)
			{
				if tx.block != Some(*block) {
					tx.block = Some(*block);
					tx.updated_at = now;
					self.registry.upsert(tx);
					self.events
						.publish_transaction(TransactionEvent::Confirming(tx.clone()));
				}
				return Ok(tx.clone());
			}
			if !tx.status.can_transition_to(target) {
				return Err(DeliveryError::InvalidTransition {
					from: tx.status,
					to: target,
				});
			}

			let lands = update.lands();
			let make_event: fn(Transaction) -> TransactionEvent = match update {
				StatusUpdate::Confirming { block } => {
					tx.block = Some(block);
					TransactionEvent::Confirming
				}
				StatusUpdate::Confirmed {
					block,
					realized_fee,
				} => {
					tx.block = Some(block);
					tx.realized_fee = realized_fee;
					TransactionEvent::Confirmed
				}
				StatusUpdate::Failed {
					reason,
					block,
					realized_fee,
				} => {
					tx.block = block;
					tx.realized_fee = realized_fee;
					tx.failure_reason = Some(reason);
					TransactionEvent::Failed
				}
				StatusUpdate::Dropped => {
					tx.failure_reason = Some("dropped from mempool".to_string());
					TransactionEvent::Dropped
				}
				StatusUpdate::Replaced(replacement) => {
					tx.replacement = Some(replacement);
					TransactionEvent::Replaced
				}
			};
			tx.status = target;
			tx.updated_at = now;
			if target.is_terminal() {
				tx.finalized_at = Some(now);
			}

			let updated = tx.clone();
			self.registry.upsert(&updated);
			info!(
				tx_id = %updated.id,
				chain = %updated.chain,
				status = %updated.status,
				"Transaction status changed"
			);
			events.push(make_event(updated.clone()));

			if lands {
				events.extend(self.displace_competitors(&mut table, &updated, now));
			}
			updated
		};

		for event in events {
			self.events.publish_transaction(event);
		}
		Ok(updated)
	}

	/// Finalizes every other live transaction at the nonce `landed` consumed.
	fn displace_competitors(
		&self,
		table: &mut TransactionTable,
		landed: &Transaction,
		now: Timestamp,
	) -> Vec<TransactionEvent> {
		let key = landed.nonce_key();
		let replacement = Replacement {
			id: landed.id.clone(),
			reason: landed.kind.replacement_reason(),
		};
		let mut events = Vec::new();
		let mut unsigned = Vec::new();

		for tx in table.transactions.values_mut() {
			if tx.local_id == landed.local_id || tx.is_terminal() || tx.nonce_key() != key {
				continue;
			}

			tx.replacement = Some(replacement.clone());
			tx.updated_at = now;
			tx.finalized_at = Some(now);
			if tx.status.is_in_flight() {
				tx.status = TransactionStatus::Replaced;
				events.push(TransactionEvent::Replaced(tx.clone()));
			} else {
				// Never reached the network; the nonce is gone.
				tx.status = TransactionStatus::Cancelled;
				tx.failure_reason = Some(format!("nonce {} consumed by {}", tx.nonce, landed.id));
				unsigned.push(tx.local_id.clone());
				events.push(TransactionEvent::Cancelled(tx.clone()));
			}
			self.registry.upsert(tx);
			info!(
				tx_id = %tx.id,
				replaced_by = %landed.id,
				reason = ?replacement.reason,
				"Transaction displaced"
			);
		}

		for local_id in unsigned {
			table.signed.remove(&local_id);
		}
		events
	}

	/// A different transaction that already consumed the nonce of `key` on
	/// chain, if one is known locally.
	pub async fn landed_at(&self, key: &NonceKey, exclude: &TransactionId) -> Option<Transaction> {
		self.table
			.read()
			.await
			.transactions
			.values()
			.find(|tx| {
				tx.nonce_key() == *key
					&& &tx.id != exclude
					&& &tx.local_id != exclude
					&& (tx.status == TransactionStatus::Confirmed
						|| (tx.status == TransactionStatus::Failed && tx.block.is_some()))
			})
			.cloned()
	}

	/// Looks a transaction up by local or network id.
	pub async fn get(&self, id: &TransactionId) -> Option<Transaction> {
		self.table.read().await.get(id).cloned()
	}

	/// All transactions, oldest first.
	pub async fn list(&self) -> Vec<Transaction> {
		let mut transactions = self
			.table
			.read()
			.await
			.transactions
			.values()
			.cloned()
			.collect::<Vec<_>>();
		transactions.sort_by(|a, b| {
			(a.created_at, a.nonce, a.local_id.as_str())
				.cmp(&(b.created_at, b.nonce, b.local_id.as_str()))
		});
		transactions
	}

	/// In-flight transactions awaiting reconciliation.
	pub fn pending(&self) -> Vec<Transaction> {
		self.registry.snapshot()
	}

	/// Reloads persisted transactions, re-registering the in-flight ones.
	///
	/// Signed payloads are not persisted, so restored `Signed` transactions
	/// are signed again on their next `sign` call.
	pub async fn restore(&self, transactions: Vec<Transaction>) -> usize {
		let mut table = self.table.write().await;
		let mut registered = 0;

		for transaction in transactions {
			if transaction.status.is_in_flight() {
				self.registry.upsert(&transaction);
				registered += 1;
			}
			table.insert(transaction);
		}

		info!(
			transactions = table.transactions.len(),
			registered, "Restored transaction table"
		);
		registered
	}
}

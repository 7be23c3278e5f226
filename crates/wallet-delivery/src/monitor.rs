//! Reconciliation of in-flight transactions against their chains.

use crate::{StatusUpdate, TransactionStateMachine};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wallet_chains::{ChainClient, ChainEntry, ChainError};
use wallet_gas::native_amount;
use wallet_types::{BlockRef, Clock, Replacement, ReplacementReason, Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
	/// Seconds between sweeps.
	#[serde(default = "default_interval_secs")]
	pub interval_secs: u64,
	/// Upper bound on each RPC call.
	#[serde(default = "default_rpc_timeout_secs")]
	pub rpc_timeout_secs: u64,
	/// Seconds a transaction may be missing from the node before it is
	/// considered dropped.
	#[serde(default = "default_drop_timeout_secs")]
	pub drop_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
	15
}

fn default_rpc_timeout_secs() -> u64 {
	10
}

fn default_drop_timeout_secs() -> u64 {
	3600
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			interval_secs: default_interval_secs(),
			rpc_timeout_secs: default_rpc_timeout_secs(),
			drop_timeout_secs: default_drop_timeout_secs(),
		}
	}
}

/// Periodically reconciles every registered transaction with its chain.
///
/// Each sweep checks all entries concurrently. RPC failures and timeouts
/// leave the entry untouched until the next sweep.
pub struct PendingTransactionMonitor {
	state_machine: Arc<TransactionStateMachine>,
	clock: Arc<dyn Clock>,
	config: MonitorConfig,
}

impl PendingTransactionMonitor {
	pub fn new(
		state_machine: Arc<TransactionStateMachine>,
		clock: Arc<dyn Clock>,
		config: MonitorConfig,
	) -> Self {
		Self {
			state_machine,
			clock,
			config,
		}
	}

	pub fn config(&self) -> &MonitorConfig {
		&self.config
	}

	/// Runs one reconciliation pass and returns how many transactions
	/// changed status.
	pub async fn sweep(&self) -> usize {
		let pending = self.state_machine.pending();
		if pending.is_empty() {
			return 0;
		}

		debug!(count = pending.len(), "Reconciling pending transactions");
		let observed = join_all(pending.iter().map(|tx| self.reconcile(tx))).await;

		let mut updates = pending
			.iter()
			.zip(observed)
			.filter_map(|(tx, update)| update.map(|update| (tx, update)))
			.collect::<Vec<_>>();
		// Landings first, so their competitors are resolved as replaced
		// rather than dropped.
		updates.sort_by_key(|(_, update)| !update.lands());

		let mut changed = 0;
		for (tx, update) in updates {
			match self.state_machine.apply_update(&tx.id, update).await {
				Ok(updated) if updated.status != tx.status => changed += 1,
				Ok(_) => {}
				Err(e) => debug!(tx_id = %tx.id, error = %e, "Skipped stale update"),
			}
		}
		changed
	}

	async fn reconcile(&self, tx: &Transaction) -> Option<StatusUpdate> {
		let Some(entry) = self.state_machine.chains().get(&tx.chain) else {
			warn!(tx_id = %tx.id, chain = %tx.chain, "No client for pending transaction");
			return None;
		};

		match self.check(tx, entry).await {
			Ok(update) => update,
			Err(e) => {
				debug!(
					tx_id = %tx.id,
					chain = %tx.chain,
					error = %e,
					"Reconciliation failed, retrying next sweep"
				);
				None
			}
		}
	}

	async fn call<T>(
		&self,
		request: impl Future<Output = Result<T, ChainError>>,
	) -> Result<T, ChainError> {
		tokio::time::timeout(Duration::from_secs(self.config.rpc_timeout_secs), request)
			.await
			.unwrap_or(Err(ChainError::Timeout))
	}

	async fn check(
		&self,
		tx: &Transaction,
		entry: &ChainEntry,
	) -> Result<Option<StatusUpdate>, ChainError> {
		let client = entry.client.as_ref();
		let settings = &entry.settings;

		let Some(seen) = self.call(client.get_transaction_by_hash(&tx.id)).await? else {
			return self.check_missing(tx, client).await;
		};

		let receipt = self.call(client.get_receipt(&tx.id)).await?;
		let included_in = receipt
			.map(|receipt| receipt.block_number)
			.or(seen.block_number);
		let Some(number) = included_in else {
			return Ok(None);
		};
		let latest = self.call(client.get_latest_block_number()).await?;
		let block = BlockRef {
			number,
			confirmations: latest.saturating_sub(number) + 1,
		};

		let Some(receipt) = receipt else {
			return Ok(settings
				.supports_confirming
				.then_some(StatusUpdate::Confirming { block }));
		};

		let realized_fee = native_amount(
			receipt.effective_gas_price,
			receipt.gas_used,
			settings.native_decimals,
		)
		.ok();

		if !receipt.success {
			return Ok(Some(StatusUpdate::Failed {
				reason: "execution reverted".to_string(),
				block: Some(block),
				realized_fee,
			}));
		}
		if block.confirmations >= settings.required_confirmations {
			return Ok(Some(StatusUpdate::Confirmed {
				block,
				realized_fee,
			}));
		}
		Ok(settings
			.supports_confirming
			.then_some(StatusUpdate::Confirming { block }))
	}

	/// The node no longer knows the transaction: it was replaced or dropped,
	/// or the node simply has not seen it yet.
	async fn check_missing(
		&self,
		tx: &Transaction,
		client: &dyn ChainClient,
	) -> Result<Option<StatusUpdate>, ChainError> {
		if let Some(landed) = self.state_machine.landed_at(&tx.nonce_key(), &tx.id).await {
			return Ok(Some(StatusUpdate::Replaced(Replacement {
				id: landed.id,
				reason: landed.kind.replacement_reason(),
			})));
		}

		if let Some(other) = self.call(client.find_replacement(&tx.from, tx.nonce)).await? {
			if other != tx.id {
				let reason = self
					.state_machine
					.get(&other)
					.await
					.map(|known| known.kind.replacement_reason())
					.unwrap_or(ReplacementReason::Superseded);
				return Ok(Some(StatusUpdate::Replaced(Replacement { id: other, reason })));
			}
		}

		let since = tx.broadcast_at.unwrap_or(tx.created_at);
		let missing_for = self.clock.now().saturating_sub(since);
		if missing_for > self.config.drop_timeout_secs {
			warn!(tx_id = %tx.id, missing_for, "Transaction dropped from mempool");
			return Ok(Some(StatusUpdate::Dropped));
		}
		Ok(None)
	}
}

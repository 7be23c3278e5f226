//! Writes every published transaction and crosschain record to storage.

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};
use wallet_delivery::TransactionStateMachine;
use wallet_storage::{StorageError, StorageService};
use wallet_tracker::CrosschainTransactionTracker;
use wallet_types::{CrosschainTransaction, Transaction, WalletEvent};

/// Namespace of persisted transactions, keyed by local id.
pub const TRANSACTIONS_NAMESPACE: &str = "transactions";
/// Namespace of persisted crosschain records, keyed by record id.
pub const CROSSCHAIN_NAMESPACE: &str = "crosschain";

pub struct Persistence {
	storage: Arc<StorageService>,
	state_machine: Arc<TransactionStateMachine>,
	tracker: Arc<CrosschainTransactionTracker>,
}

impl Persistence {
	pub fn new(
		storage: Arc<StorageService>,
		state_machine: Arc<TransactionStateMachine>,
		tracker: Arc<CrosschainTransactionTracker>,
	) -> Self {
		Self {
			storage,
			state_machine,
			tracker,
		}
	}

	pub async fn persist_transaction(&self, transaction: &Transaction) -> Result<(), StorageError> {
		self.storage
			.store_indexed(
				TRANSACTIONS_NAMESPACE,
				transaction.local_id.as_str(),
				transaction,
			)
			.await
	}

	pub async fn persist_crosschain(
		&self,
		record: &CrosschainTransaction,
	) -> Result<(), StorageError> {
		self.storage
			.store_indexed(CROSSCHAIN_NAMESPACE, &record.id, record)
			.await
	}

	pub async fn persist_event(&self, event: &WalletEvent) -> Result<(), StorageError> {
		match event {
			WalletEvent::Transaction(event) => {
				self.persist_transaction(event.transaction()).await
			}
			WalletEvent::Crosschain(event) => self.persist_crosschain(event.record()).await,
		}
	}

	/// Writes the current state of every known entity.
	pub async fn persist_all(&self) -> Result<(), StorageError> {
		for transaction in self.state_machine.list().await {
			self.persist_transaction(&transaction).await?;
		}
		for record in self.tracker.list().await {
			self.persist_crosschain(&record).await?;
		}
		Ok(())
	}

	pub async fn load_transactions(&self) -> Result<Vec<Transaction>, StorageError> {
		self.storage.retrieve_all(TRANSACTIONS_NAMESPACE).await
	}

	pub async fn load_crosschain(&self) -> Result<Vec<CrosschainTransaction>, StorageError> {
		self.storage.retrieve_all(CROSSCHAIN_NAMESPACE).await
	}

	/// Persists events until shutdown, then drains what is still buffered.
	///
	/// A lagging receiver has lost events, so the full state is written
	/// instead.
	pub async fn run(
		&self,
		mut events: broadcast::Receiver<WalletEvent>,
		mut shutdown: broadcast::Receiver<()>,
	) {
		info!("Persistence task started");
		loop {
			tokio::select! {
				biased;
				received = events.recv() => match received {
					Ok(event) => self.write(&event).await,
					Err(RecvError::Lagged(missed)) => self.resync(missed).await,
					Err(RecvError::Closed) => break,
				},
				_ = shutdown.recv() => break,
			}
		}

		loop {
			match events.try_recv() {
				Ok(event) => self.write(&event).await,
				Err(TryRecvError::Lagged(missed)) => self.resync(missed).await,
				Err(_) => break,
			}
		}
		info!("Persistence task stopped");
	}

	async fn write(&self, event: &WalletEvent) {
		if let Err(e) = self.persist_event(event).await {
			warn!("Failed to persist event: {}", e);
		} else {
			debug!("Persisted event");
		}
	}

	async fn resync(&self, missed: u64) {
		warn!(missed, "Persistence lagged behind the event bus, writing full state");
		if let Err(e) = self.persist_all().await {
			warn!("Failed to persist state: {}", e);
		}
	}
}

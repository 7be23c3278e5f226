//! Wallet events and the broadcast bus they travel on.
//!
//! Every state transition of a [`Transaction`] or [`CrosschainTransaction`]
//! is published with the full updated entity, so subscribers never need to
//! read back from the engine.

use crate::{CrosschainTransaction, Transaction};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalletEvent {
	Transaction(TransactionEvent),
	Crosschain(CrosschainEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionEvent {
	Created(Transaction),
	Signed(Transaction),
	Broadcast(Transaction),
	Confirming(Transaction),
	Confirmed(Transaction),
	Failed(Transaction),
	/// Failed because it vanished from the mempool.
	Dropped(Transaction),
	Replaced(Transaction),
	Cancelled(Transaction),
}

impl TransactionEvent {
	pub fn transaction(&self) -> &Transaction {
		match self {
			Self::Created(tx)
			| Self::Signed(tx)
			| Self::Broadcast(tx)
			| Self::Confirming(tx)
			| Self::Confirmed(tx)
			| Self::Failed(tx)
			| Self::Dropped(tx)
			| Self::Replaced(tx)
			| Self::Cancelled(tx) => tx,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::Created(_) => "created",
			Self::Signed(_) => "signed",
			Self::Broadcast(_) => "broadcast",
			Self::Confirming(_) => "confirming",
			Self::Confirmed(_) => "confirmed",
			Self::Failed(_) => "failed",
			Self::Dropped(_) => "dropped",
			Self::Replaced(_) => "replaced",
			Self::Cancelled(_) => "cancelled",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrosschainEvent {
	Started(CrosschainTransaction),
	Updated(CrosschainTransaction),
	Completed(CrosschainTransaction),
	Failed(CrosschainTransaction),
}

impl CrosschainEvent {
	pub fn record(&self) -> &CrosschainTransaction {
		match self {
			Self::Started(record)
			| Self::Updated(record)
			| Self::Completed(record)
			| Self::Failed(record) => record,
		}
	}
}

/// Event bus for broadcasting wallet events to multiple subscribers.
///
/// Cloning an EventBus creates a new handle to the same underlying channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<WalletEvent>,
}

impl EventBus {
	/// Creates a new EventBus with the specified channel capacity.
	///
	/// Slow subscribers lag and lose the oldest events once the capacity
	/// is exceeded.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Having no subscribers is not an error for the wallet, so the send
	/// result is discarded.
	pub fn publish(&self, event: WalletEvent) {
		let _ = self.sender.send(event);
	}

	pub fn publish_transaction(&self, event: TransactionEvent) {
		self.publish(WalletEvent::Transaction(event));
	}

	pub fn publish_crosschain(&self, event: CrosschainEvent) {
		self.publish(WalletEvent::Crosschain(event));
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}

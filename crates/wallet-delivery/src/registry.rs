//! Registry of in-flight transactions.

use dashmap::DashMap;
use wallet_types::{Transaction, TransactionId};

/// Non-terminal broadcast transactions, keyed by network id.
///
/// Holds a snapshot of each transaction as of its last update; entries are
/// removed as soon as a transaction reaches a terminal status.
#[derive(Debug, Default)]
pub struct PendingTransactionRegistry {
	entries: DashMap<TransactionId, Transaction>,
}

impl PendingTransactionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts or refreshes `transaction`, dropping it instead if terminal.
	pub fn upsert(&self, transaction: &Transaction) {
		if transaction.is_terminal() {
			self.entries.remove(&transaction.id);
		} else {
			self.entries
				.insert(transaction.id.clone(), transaction.clone());
		}
	}

	pub fn remove(&self, id: &TransactionId) -> Option<Transaction> {
		self.entries.remove(id).map(|(_, transaction)| transaction)
	}

	pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
		self.entries.get(id).map(|entry| entry.value().clone())
	}

	pub fn contains(&self, id: &TransactionId) -> bool {
		self.entries.contains_key(id)
	}

	/// Snapshot of all entries, oldest first.
	pub fn snapshot(&self) -> Vec<Transaction> {
		let mut transactions = self
			.entries
			.iter()
			.map(|entry| entry.value().clone())
			.collect::<Vec<_>>();
		transactions.sort_by_key(|tx| (tx.created_at, tx.nonce));
		transactions
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

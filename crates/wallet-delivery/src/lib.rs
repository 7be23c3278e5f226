//! Transaction delivery for the wallet engine.
//!
//! The [`TransactionStateMachine`] builds, signs, broadcasts and owns every
//! on-chain transaction; the [`PendingTransactionMonitor`] reconciles the
//! in-flight ones against their chains.

use rust_decimal::Decimal;
use thiserror::Error;
use wallet_gas::GasError;
use wallet_types::{BlockRef, ChainId, Replacement, TransactionId, TransactionStatus};

pub mod monitor;
pub mod registry;
pub mod state_machine;

#[cfg(test)]
mod test_utils;

pub use monitor::{MonitorConfig, PendingTransactionMonitor};
pub use registry::PendingTransactionRegistry;
pub use state_machine::TransactionStateMachine;

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Unsupported chain: {0}")]
	UnsupportedChain(ChainId),
	#[error("Unsupported operation: {0}")]
	UnsupportedOperation(String),
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Broadcast failed: {0}")]
	BroadcastFailed(String),
	#[error("Transaction {id} is {status} and cannot be replaced")]
	NotCancellable {
		id: TransactionId,
		status: TransactionStatus,
	},
	#[error("Transaction {0} not found")]
	NotFound(TransactionId),
	#[error("Invalid transition from {from} to {to}")]
	InvalidTransition {
		from: TransactionStatus,
		to: TransactionStatus,
	},
	#[error("Gas estimation failed: {0}")]
	Gas(#[from] GasError),
	#[error("Chain error: {0}")]
	Chain(String),
}

/// Observed change to a broadcast transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
	/// Included in a block but not final yet. Re-applying refreshes the block.
	Confirming { block: BlockRef },
	Confirmed {
		block: BlockRef,
		realized_fee: Option<Decimal>,
	},
	/// Failed on chain (reverted) or for another terminal reason.
	Failed {
		reason: String,
		block: Option<BlockRef>,
		realized_fee: Option<Decimal>,
	},
	/// Vanished from the mempool past the drop timeout.
	Dropped,
	Replaced(Replacement),
}

impl StatusUpdate {
	pub fn status(&self) -> TransactionStatus {
		match self {
			Self::Confirming { .. } => TransactionStatus::Confirming,
			Self::Confirmed { .. } => TransactionStatus::Confirmed,
			Self::Failed { .. } | Self::Dropped => TransactionStatus::Failed,
			Self::Replaced(_) => TransactionStatus::Replaced,
		}
	}

	/// Whether the transaction consumed its nonce on chain.
	pub fn lands(&self) -> bool {
		matches!(
			self,
			Self::Confirmed { .. } | Self::Failed { block: Some(_), .. }
		)
	}
}

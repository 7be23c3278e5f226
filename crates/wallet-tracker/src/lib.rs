//! Execution tracking for selected routes.
//!
//! The [`CrosschainTransactionTracker`] walks a route leg by leg, handing
//! on-chain legs to the transaction state machine and off-chain legs to
//! their provider, then polls every leg until the operation is terminal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use wallet_types::{Address, ChainId};

pub mod tracker;

pub use tracker::CrosschainTransactionTracker;

#[derive(Debug, Error)]
pub enum TrackerError {
	#[error("Invalid route: {0}")]
	InvalidRoute(String),
	#[error("Crosschain transaction {0} not found")]
	NotFound(String),
	#[error("Unknown provider: {0}")]
	UnknownProvider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
	/// Seconds between polling sweeps.
	#[serde(default = "default_interval_secs")]
	pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
	30
}

impl Default for TrackerConfig {
	fn default() -> Self {
		Self {
			interval_secs: default_interval_secs(),
		}
	}
}

/// Sender addresses used to execute a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionAccounts {
	/// Own address on every chain the route touches.
	pub addresses: HashMap<ChainId, Address>,
	/// Final recipient. Defaults to the own address on the target chain.
	#[serde(default)]
	pub recipient: Option<Address>,
}

impl ExecutionAccounts {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_address(mut self, chain: impl Into<ChainId>, address: impl Into<Address>) -> Self {
		self.addresses.insert(chain.into(), address.into());
		self
	}

	pub fn with_recipient(mut self, recipient: impl Into<Address>) -> Self {
		self.recipient = Some(recipient.into());
		self
	}

	pub fn address(&self, chain: &ChainId) -> Option<&Address> {
		self.addresses.get(chain)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_defaults() {
		let config: TrackerConfig = serde_json::from_str("{}").unwrap();
		assert_eq!(config.interval_secs, 30);
	}

	#[test]
	fn test_accounts() {
		let accounts = ExecutionAccounts::new()
			.with_address("ethereum", "0xaaa")
			.with_recipient("0xccc");
		assert_eq!(
			accounts.address(&ChainId::from("ethereum")),
			Some(&Address::from("0xaaa"))
		);
		assert!(accounts.address(&ChainId::from("polygon")).is_none());
		assert_eq!(accounts.recipient, Some(Address::from("0xccc")));
	}
}

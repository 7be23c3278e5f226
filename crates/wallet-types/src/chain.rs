//! Chain, asset and address identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain identifier.
///
/// Chains are named rather than numbered so that non-EVM networks fit the
/// same registry as EVM ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub String);

impl ChainId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for ChainId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

/// Asset symbol, e.g. `USDT` or `ETH`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(pub String);

impl Asset {
	pub fn new(symbol: impl Into<String>) -> Self {
		Self(symbol.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Asset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for Asset {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

/// Account address on some chain, kept in the chain's own textual encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
	pub fn new(address: impl Into<String>) -> Self {
		Self(address.into())
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for Address {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

/// Static per-chain settings that shape fee estimation and confirmation
/// semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSettings {
	/// Native gas asset, priced in USD for fee quotes.
	pub native_asset: Asset,
	/// Decimals of the native asset's smallest unit.
	#[serde(default = "default_native_decimals")]
	pub native_decimals: u32,
	/// Blocks (inclusive of the inclusion block) before a transaction is final.
	#[serde(default = "default_required_confirmations")]
	pub required_confirmations: u64,
	/// Gas limit used for plain value transfers.
	#[serde(default = "default_transfer_gas_limit")]
	pub transfer_gas_limit: u64,
	/// Whether the chain exposes a "seen in a block but not final" signal.
	#[serde(default = "default_supports_confirming")]
	pub supports_confirming: bool,
}

fn default_native_decimals() -> u32 {
	18
}

fn default_required_confirmations() -> u64 {
	1
}

fn default_transfer_gas_limit() -> u64 {
	21_000
}

fn default_supports_confirming() -> bool {
	true
}

impl ChainSettings {
	pub fn new(native_asset: Asset) -> Self {
		Self {
			native_asset,
			native_decimals: default_native_decimals(),
			required_confirmations: default_required_confirmations(),
			transfer_gas_limit: default_transfer_gas_limit(),
			supports_confirming: default_supports_confirming(),
		}
	}

	pub fn with_required_confirmations(mut self, confirmations: u64) -> Self {
		self.required_confirmations = confirmations;
		self
	}

	pub fn with_confirming_signal(mut self, supported: bool) -> Self {
		self.supports_confirming = supported;
		self
	}

	pub fn with_native_decimals(mut self, decimals: u32) -> Self {
		self.native_decimals = decimals;
		self
	}
}

//! Configuration types for the wallet engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use wallet_delivery::MonitorConfig;
use wallet_gas::GasConfig;
use wallet_routing::RoutingConfig;
use wallet_tracker::TrackerConfig;
use wallet_types::{ChainId, ChainSettings};

/// Complete wallet engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
	#[serde(default)]
	pub wallet: WalletSettings,
	/// Pending transaction reconciliation
	#[serde(default)]
	pub monitor: MonitorConfig,
	/// Crosschain execution polling
	#[serde(default)]
	pub tracker: TrackerConfig,
	#[serde(default)]
	pub routing: RoutingConfig,
	/// Fee tiers, replacement bump and static USD prices
	#[serde(default)]
	pub gas: GasConfig,
	#[serde(default)]
	pub storage: StorageConfig,
	/// Per-chain settings, keyed by chain id
	#[serde(default)]
	pub chains: HashMap<ChainId, ChainSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSettings {
	#[serde(default = "default_name")]
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Buffered events per subscriber before slow subscribers lag.
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,
}

fn default_name() -> String {
	"wallet-engine".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_event_capacity() -> usize {
	1000
}

impl Default for WalletSettings {
	fn default() -> Self {
		Self {
			name: default_name(),
			log_level: default_log_level(),
			event_capacity: default_event_capacity(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
	#[default]
	Memory,
	File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
	#[serde(default)]
	pub backend: StorageBackend,
	/// Directory of the file backend.
	#[serde(default = "default_storage_path")]
	pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
	PathBuf::from("./data")
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: StorageBackend::default(),
			path: default_storage_path(),
		}
	}
}

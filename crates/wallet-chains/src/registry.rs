//! Registry of chain clients.
//!
//! The `ChainRegistry` maps each supported chain to its [`ChainClient`] and
//! static [`ChainSettings`]. It is populated once at startup and then shared
//! read-only behind an `Arc`; it performs no interior locking.

use crate::{ChainClient, ChainError};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::info;
use wallet_types::{ChainId, ChainSettings};

/// A registered chain: its RPC client and static settings.
#[derive(Clone)]
pub struct ChainEntry {
	pub client: Arc<dyn ChainClient>,
	pub settings: ChainSettings,
}

pub struct ChainRegistry {
	chains: HashMap<ChainId, ChainEntry>,
}

impl ChainRegistry {
	pub fn new() -> Self {
		Self {
			chains: HashMap::new(),
		}
	}

	/// Registers a chain client under the chain id it reports.
	///
	/// # Errors
	///
	/// Returns `ChainError::AlreadyRegistered` if the chain is already known.
	pub fn register(
		&mut self,
		client: Arc<dyn ChainClient>,
		settings: ChainSettings,
	) -> Result<(), ChainError> {
		let chain_id = client.chain_id();
		info!("Registering chain client for chain {}", chain_id);

		if self.chains.contains_key(&chain_id) {
			return Err(ChainError::AlreadyRegistered(chain_id));
		}

		self.chains.insert(chain_id, ChainEntry { client, settings });
		Ok(())
	}

	pub fn get(&self, chain_id: &ChainId) -> Option<&ChainEntry> {
		self.chains.get(chain_id)
	}

	/// Like [`get`](Self::get), but reports an unknown chain as an error.
	pub fn get_required(&self, chain_id: &ChainId) -> Result<&ChainEntry, ChainError> {
		self.get(chain_id)
			.ok_or_else(|| ChainError::NotConfigured(chain_id.clone()))
	}

	pub fn client(&self, chain_id: &ChainId) -> Result<Arc<dyn ChainClient>, ChainError> {
		self.get_required(chain_id).map(|entry| entry.client.clone())
	}

	pub fn settings(&self, chain_id: &ChainId) -> Result<&ChainSettings, ChainError> {
		self.get_required(chain_id).map(|entry| &entry.settings)
	}

	pub fn contains(&self, chain_id: &ChainId) -> bool {
		self.chains.contains_key(chain_id)
	}

	/// Returns all registered chain ids, sorted.
	pub fn chains(&self) -> Vec<ChainId> {
		let mut chains = self.chains.keys().cloned().collect::<Vec<_>>();
		chains.sort();
		chains
	}
}

impl Default for ChainRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for ChainRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChainRegistry")
			.field("chains", &self.chains())
			.finish()
	}
}

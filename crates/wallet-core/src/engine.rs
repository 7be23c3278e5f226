use crate::{
	error::CoreError,
	persistence::Persistence,
	scheduler::Scheduler,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use wallet_account::{LocalSigner, SignerInterface};
use wallet_chains::{ChainClient, ChainRegistry};
use wallet_config::{StorageBackend, WalletConfig};
use wallet_delivery::{PendingTransactionMonitor, TransactionStateMachine};
use wallet_gas::{FixedPriceOracle, GasEstimator, PriceOracle};
use wallet_providers::{ProviderAdapter, ProviderRegistry};
use wallet_routing::RouteEngine;
use wallet_storage::{FileStorage, MemoryStorage, StorageInterface, StorageService};
use wallet_tracker::CrosschainTransactionTracker;
use wallet_types::{ChainSettings, Clock, EventBus, SystemClock, WalletEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	Running,
	Stopped,
}

impl fmt::Display for EngineState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Idle => write!(f, "Idle"),
			Self::Running => write!(f, "Running"),
			Self::Stopped => write!(f, "Stopped"),
		}
	}
}

/// Active entities re-registered by a restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
	pub transactions: usize,
	pub crosschain: usize,
}

/// One wallet engine instance and everything it owns.
pub struct WalletEngine {
	config: WalletConfig,
	chains: Arc<ChainRegistry>,
	gas: Arc<GasEstimator>,
	providers: Arc<ProviderRegistry>,
	state_machine: Arc<TransactionStateMachine>,
	monitor: Arc<PendingTransactionMonitor>,
	routes: Arc<RouteEngine>,
	tracker: Arc<CrosschainTransactionTracker>,
	events: EventBus,
	persistence: Arc<Persistence>,
	/// Subscribed at build time so nothing published before `start` is lost.
	event_rx: Mutex<Option<broadcast::Receiver<WalletEvent>>>,
	scheduler: Scheduler,
	state: Mutex<EngineState>,
}

impl WalletEngine {
	pub fn config(&self) -> &WalletConfig {
		&self.config
	}

	pub fn chains(&self) -> &Arc<ChainRegistry> {
		&self.chains
	}

	pub fn gas(&self) -> &Arc<GasEstimator> {
		&self.gas
	}

	pub fn providers(&self) -> &Arc<ProviderRegistry> {
		&self.providers
	}

	pub fn state_machine(&self) -> &Arc<TransactionStateMachine> {
		&self.state_machine
	}

	pub fn monitor(&self) -> &Arc<PendingTransactionMonitor> {
		&self.monitor
	}

	pub fn route_engine(&self) -> &Arc<RouteEngine> {
		&self.routes
	}

	pub fn tracker(&self) -> &Arc<CrosschainTransactionTracker> {
		&self.tracker
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn persistence(&self) -> &Arc<Persistence> {
		&self.persistence
	}

	pub async fn state(&self) -> EngineState {
		*self.state.lock().await
	}

	/// Reloads persisted transactions and crosschain records.
	///
	/// Only allowed before the engine is started.
	pub async fn restore(&self) -> Result<RestoreSummary, CoreError> {
		let state = self.state.lock().await;
		if *state != EngineState::Idle {
			return Err(CoreError::Lifecycle(format!(
				"Cannot restore while {}",
				*state
			)));
		}
		self.restore_from_storage().await
	}

	async fn restore_from_storage(&self) -> Result<RestoreSummary, CoreError> {
		let transactions = self.persistence.load_transactions().await?;
		let records = self.persistence.load_crosschain().await?;

		let summary = RestoreSummary {
			transactions: self.state_machine.restore(transactions).await,
			crosschain: self.tracker.restore(records).await,
		};
		info!(
			transactions = summary.transactions,
			crosschain = summary.crosschain,
			"Restored persisted state"
		);
		Ok(summary)
	}

	/// Restores persisted state and starts the persistence task and both
	/// reconciliation loops.
	pub async fn start(&self) -> Result<RestoreSummary, CoreError> {
		let mut state = self.state.lock().await;
		if *state != EngineState::Idle {
			return Err(CoreError::Lifecycle(format!(
				"Cannot start engine while {}",
				*state
			)));
		}
		info!(name = %self.config.wallet.name, "Starting wallet engine");

		let summary = self.restore_from_storage().await?;

		let events = self
			.event_rx
			.lock()
			.await
			.take()
			.ok_or_else(|| CoreError::Lifecycle("Event subscription already taken".to_string()))?;
		let persistence = self.persistence.clone();
		self.scheduler
			.spawn(move |shutdown| async move { persistence.run(events, shutdown).await })
			.await;

		let monitor = self.monitor.clone();
		self.scheduler
			.spawn_repeating(
				"pending-monitor",
				Duration::from_secs(self.config.monitor.interval_secs),
				move || {
					let monitor = monitor.clone();
					async move {
						let changed = monitor.sweep().await;
						if changed > 0 {
							debug!(changed, "Monitor sweep updated transactions");
						}
					}
				},
			)
			.await;

		let tracker = self.tracker.clone();
		self.scheduler
			.spawn_repeating(
				"crosschain-tracker",
				Duration::from_secs(self.config.tracker.interval_secs),
				move || {
					let tracker = tracker.clone();
					async move {
						let changed = tracker.poll_all().await;
						if changed > 0 {
							debug!(changed, "Tracker sweep updated records");
						}
					}
				},
			)
			.await;

		*state = EngineState::Running;
		info!("Wallet engine started");
		Ok(summary)
	}

	/// Stops the background tasks and writes the final state.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		let mut state = self.state.lock().await;
		if *state != EngineState::Running {
			return Err(CoreError::Lifecycle(format!(
				"Cannot shut down engine while {}",
				*state
			)));
		}
		info!("Shutting down wallet engine");

		self.scheduler.shutdown().await;
		self.persistence.persist_all().await?;

		*state = EngineState::Stopped;
		info!("Wallet engine shutdown complete");
		Ok(())
	}
}

/// Builder for creating a [`WalletEngine`] instance
pub struct WalletBuilder {
	config: WalletConfig,
	chains: Vec<(Arc<dyn ChainClient>, Option<ChainSettings>)>,
	signer: Option<Arc<dyn SignerInterface>>,
	oracle: Option<Arc<dyn PriceOracle>>,
	providers: Vec<Arc<dyn ProviderAdapter>>,
	storage: Option<Box<dyn StorageInterface>>,
	clock: Option<Arc<dyn Clock>>,
}

impl WalletBuilder {
	pub fn new(config: WalletConfig) -> Self {
		Self {
			config,
			chains: Vec::new(),
			signer: None,
			oracle: None,
			providers: Vec::new(),
			storage: None,
			clock: None,
		}
	}

	/// Adds a chain client using the settings configured for its chain id.
	pub fn with_chain(mut self, client: Arc<dyn ChainClient>) -> Self {
		self.chains.push((client, None));
		self
	}

	pub fn with_chain_settings(
		mut self,
		client: Arc<dyn ChainClient>,
		settings: ChainSettings,
	) -> Self {
		self.chains.push((client, Some(settings)));
		self
	}

	pub fn with_signer(mut self, signer: Arc<dyn SignerInterface>) -> Self {
		self.signer = Some(signer);
		self
	}

	/// Replaces the static price table from `gas.usd_prices`.
	pub fn with_price_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
		self.oracle = Some(oracle);
		self
	}

	pub fn with_provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
		self.providers.push(provider);
		self
	}

	/// Replaces the backend selected by the `[storage]` section.
	pub fn with_storage(mut self, storage: Box<dyn StorageInterface>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	pub fn build(self) -> Result<WalletEngine, CoreError> {
		wallet_config::validate(&self.config)?;
		let config = self.config;

		let mut chains = ChainRegistry::new();
		for (client, settings) in self.chains {
			let chain_id = client.chain_id();
			let settings = match settings.or_else(|| config.chains.get(&chain_id).cloned()) {
				Some(settings) => settings,
				None => {
					return Err(CoreError::Configuration(format!(
						"No settings configured for chain {}",
						chain_id
					)))
				}
			};
			chains.register(client, settings)?;
		}
		for chain_id in config.chains.keys() {
			if !chains.contains(chain_id) {
				warn!(chain = %chain_id, "Configured chain has no client");
			}
		}
		let chains = Arc::new(chains);

		let mut providers = ProviderRegistry::new();
		for provider in self.providers {
			providers.register(provider)?;
		}
		let providers = Arc::new(providers);

		let oracle: Arc<dyn PriceOracle> = match self.oracle {
			Some(oracle) => oracle,
			None => Arc::new(
				config
					.gas
					.usd_prices
					.iter()
					.map(|(asset, price)| (asset.as_str(), *price))
					.collect::<FixedPriceOracle>(),
			),
		};
		let signer: Arc<dyn SignerInterface> = match self.signer {
			Some(signer) => signer,
			None => {
				warn!("No signer configured, transactions cannot be signed");
				Arc::new(LocalSigner::new())
			}
		};
		let clock: Arc<dyn Clock> = match self.clock {
			Some(clock) => clock,
			None => Arc::new(SystemClock),
		};
		let storage: Box<dyn StorageInterface> = match (self.storage, config.storage.backend) {
			(Some(storage), _) => storage,
			(None, StorageBackend::Memory) => Box::new(MemoryStorage::new()),
			(None, StorageBackend::File) => Box::new(FileStorage::new(config.storage.path.clone())),
		};

		let events = EventBus::new(config.wallet.event_capacity);
		let event_rx = events.subscribe();

		let gas = Arc::new(GasEstimator::new(
			chains.clone(),
			oracle,
			config.gas.clone(),
		));
		let state_machine = Arc::new(TransactionStateMachine::new(
			chains.clone(),
			gas.clone(),
			signer,
			clock.clone(),
			events.clone(),
		));
		let monitor = Arc::new(PendingTransactionMonitor::new(
			state_machine.clone(),
			clock.clone(),
			config.monitor.clone(),
		));
		let routes = Arc::new(RouteEngine::new(
			gas.clone(),
			providers.clone(),
			config.routing.clone(),
		));
		let tracker = Arc::new(CrosschainTransactionTracker::new(
			state_machine.clone(),
			providers.clone(),
			clock,
			events.clone(),
		));
		let persistence = Arc::new(Persistence::new(
			Arc::new(StorageService::new(storage)),
			state_machine.clone(),
			tracker.clone(),
		));

		info!(
			chains = chains.chains().len(),
			providers = providers.len(),
			"Wallet engine built"
		);

		Ok(WalletEngine {
			config,
			chains,
			gas,
			providers,
			state_machine,
			monitor,
			routes,
			tracker,
			events,
			persistence,
			event_rx: Mutex::new(Some(event_rx)),
			scheduler: Scheduler::new(),
			state: Mutex::new(EngineState::Idle),
		})
	}
}

use crate::{ExecutionAccounts, TrackerError};
use dashmap::DashSet;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use wallet_delivery::{DeliveryError, TransactionStateMachine};
use wallet_providers::{ExecuteRequest, ProviderExecution, ProviderRegistry, ProviderState};
use wallet_types::{
	Address, ChainId, Clock, CrosschainEvent, CrosschainStatus, CrosschainTransaction, EventBus, Leg,
	LegStatus, ReplacementReason, Route, RouteStep, StepKind, Transaction, TransactionId,
	TransactionStatus, TransferRequest,
};

/// Upper bound on speed-up hops followed from a leg's transaction.
const MAX_REPLACEMENT_HOPS: usize = 8;

/// What a leg was accepted as.
struct LegStart {
	provider_ref: Option<String>,
	onchain_tx_id: Option<TransactionId>,
}

/// Claim on a record while it is being executed or polled.
struct Busy<'a> {
	set: &'a DashSet<String>,
	id: String,
}

impl<'a> Busy<'a> {
	fn acquire(set: &'a DashSet<String>, id: &str) -> Option<Self> {
		set.insert(id.to_string()).then(|| Self {
			set,
			id: id.to_string(),
		})
	}
}

impl Drop for Busy<'_> {
	fn drop(&mut self) {
		self.set.remove(&self.id);
	}
}

/// Executes routes and converges their records to a terminal state.
///
/// A record is owned by one task at a time: polls skip records that are
/// still being executed or polled elsewhere.
pub struct CrosschainTransactionTracker {
	state_machine: Arc<TransactionStateMachine>,
	providers: Arc<ProviderRegistry>,
	clock: Arc<dyn Clock>,
	events: EventBus,
	records: RwLock<HashMap<String, CrosschainTransaction>>,
	busy: DashSet<String>,
}

impl CrosschainTransactionTracker {
	pub fn new(
		state_machine: Arc<TransactionStateMachine>,
		providers: Arc<ProviderRegistry>,
		clock: Arc<dyn Clock>,
		events: EventBus,
	) -> Self {
		Self {
			state_machine,
			providers,
			clock,
			events,
			records: RwLock::new(HashMap::new()),
			busy: DashSet::new(),
		}
	}

	/// Starts executing a route.
	///
	/// Fails only when the route cannot be executed at all. A leg that is not
	/// accepted fails the returned record instead.
	pub async fn execute(
		&self,
		route: Route,
		accounts: &ExecutionAccounts,
	) -> Result<CrosschainTransaction, TrackerError> {
		route
			.validate()
			.map_err(|e| TrackerError::InvalidRoute(e.to_string()))?;
		let parties = self.parties(&route, accounts)?;

		let mut record = CrosschainTransaction::new(route, self.clock.now());
		let _busy = Busy::acquire(&self.busy, &record.id);
		self.store(&record).await;
		info!(
			crosschain_id = %record.id,
			kind = %record.route.kind,
			legs = record.legs.len(),
			"Executing route"
		);
		self.events
			.publish_crosschain(CrosschainEvent::Started(record.clone()));

		for (index, (sender, recipient)) in parties.iter().enumerate() {
			let step = &record.route.steps[index];
			let input = match index.checked_sub(1) {
				Some(upstream) => self
					.realized_output(&record.legs[upstream])
					.await
					.unwrap_or(step.from_amount),
				None => step.from_amount,
			};

			let started = self.start_leg(step, input, sender, recipient).await;
			let now = self.clock.now();
			let leg = &mut record.legs[index];
			leg.input_amount = Some(input);
			record.updated_at = now;

			match started {
				Ok(started) => {
					leg.status = LegStatus::Pending;
					leg.provider_ref = started.provider_ref;
					leg.onchain_tx_id = started.onchain_tx_id;
					debug!(crosschain_id = %record.id, leg = index, "Leg accepted");
				}
				Err(reason) => {
					warn!(
						crosschain_id = %record.id,
						leg = index,
						error = %reason,
						"Leg was not accepted"
					);
					leg.status = LegStatus::Failed;
					leg.error = Some(reason);
					for later in record.legs.iter_mut().skip(index + 1) {
						later.status = LegStatus::Skipped;
					}
					record.refresh_status(now);
					break;
				}
			}
			self.store(&record).await;
		}

		self.store(&record).await;
		self.publish(&record);
		Ok(record)
	}

	/// Sender and recipient of every step, checked before anything is
	/// submitted.
	fn parties(
		&self,
		route: &Route,
		accounts: &ExecutionAccounts,
	) -> Result<Vec<(Address, Address)>, TrackerError> {
		let last = route.steps.len().saturating_sub(1);
		let own_address = |chain: &ChainId| {
			accounts.address(chain).cloned().ok_or_else(|| {
				TrackerError::InvalidRoute(format!("no sender address on chain {}", chain))
			})
		};

		route
			.steps
			.iter()
			.enumerate()
			.map(|(index, step)| {
				if step.kind != StepKind::Transfer {
					let provider_id = step.provider_id.as_deref().ok_or_else(|| {
						TrackerError::InvalidRoute(format!("step {} has no provider", index))
					})?;
					if self.providers.get(provider_id).is_none() {
						return Err(TrackerError::UnknownProvider(provider_id.to_string()));
					}
				}

				let sender = own_address(&step.from_chain)?;
				let recipient = match &accounts.recipient {
					Some(recipient) if index == last => recipient.clone(),
					_ => own_address(&step.to_chain)?,
				};
				Ok((sender, recipient))
			})
			.collect()
	}

	async fn start_leg(
		&self,
		step: &RouteStep,
		amount: Decimal,
		sender: &Address,
		recipient: &Address,
	) -> Result<LegStart, String> {
		if step.kind == StepKind::Transfer {
			let request = TransferRequest::new(
				step.from_chain.clone(),
				sender.clone(),
				recipient.clone(),
				amount,
				step.from_asset.clone(),
			);
			let tx = self.submit(request).await.map_err(|e| e.to_string())?;
			return Ok(LegStart {
				provider_ref: None,
				onchain_tx_id: Some(tx.id),
			});
		}

		let provider_id = step.provider_id.as_deref().unwrap_or_default();
		let provider = self
			.providers
			.get(provider_id)
			.ok_or_else(|| format!("unknown provider {}", provider_id))?;
		let request = ExecuteRequest {
			quote_id: step.quote_id.clone(),
			kind: step.kind,
			from_chain: step.from_chain.clone(),
			to_chain: step.to_chain.clone(),
			from_asset: step.from_asset.clone(),
			to_asset: step.to_asset.clone(),
			amount,
			sender: sender.clone(),
			recipient: recipient.clone(),
		};

		match provider.execute(&request).await.map_err(|e| e.to_string())? {
			ProviderExecution::Submitted(reference) => Ok(LegStart {
				provider_ref: Some(reference),
				onchain_tx_id: None,
			}),
			ProviderExecution::Onchain {
				reference,
				to,
				data,
				amount,
				asset,
			} => {
				let mut deposit =
					TransferRequest::new(step.from_chain.clone(), sender.clone(), to, amount, asset);
				deposit.data = data;
				let tx = self
					.submit(deposit)
					.await
					.map_err(|e| format!("deposit for {} failed: {}", reference, e))?;
				Ok(LegStart {
					provider_ref: Some(reference),
					onchain_tx_id: Some(tx.id),
				})
			}
		}
	}

	/// Builds, signs and broadcasts; a transaction that never reaches the
	/// network is discarded so its nonce is released.
	async fn submit(&self, request: TransferRequest) -> Result<Transaction, DeliveryError> {
		let tx = self.state_machine.build(request).await?;
		let submitted = match self.state_machine.sign(&tx.id).await {
			Ok(signed) => self.state_machine.broadcast(&signed).await,
			Err(e) => Err(e),
		};

		if submitted.is_err() {
			if let Err(e) = self.state_machine.discard(&tx.id).await {
				warn!(tx_id = %tx.id, error = %e, "Failed to discard leg transaction");
			}
		}
		submitted
	}

	/// Amount the provider reports a leg actually delivered, if known yet.
	async fn realized_output(&self, leg: &Leg) -> Option<Decimal> {
		let provider = self.providers.get(leg.provider_id.as_deref()?)?;
		let reference = leg.provider_ref.as_deref()?;
		match provider.status(reference).await {
			Ok(status) => status.output_amount,
			Err(e) => {
				debug!(reference, error = %e, "Upstream output unavailable");
				None
			}
		}
	}

	/// Reconciles every unfinished leg of a record once.
	pub async fn poll(&self, id: &str) -> Result<CrosschainTransaction, TrackerError> {
		self.poll_record(id).await.map(|(record, _)| record)
	}

	/// Polls every non-terminal record and returns how many changed.
	pub async fn poll_all(&self) -> usize {
		let active = self
			.records
			.read()
			.await
			.values()
			.filter(|record| !record.is_terminal())
			.map(|record| record.id.clone())
			.collect::<Vec<_>>();
		if active.is_empty() {
			return 0;
		}

		debug!(count = active.len(), "Polling crosschain transactions");
		join_all(active.iter().map(|id| self.poll_record(id)))
			.await
			.into_iter()
			.filter(|result| matches!(result, Ok((_, true))))
			.count()
	}

	async fn poll_record(&self, id: &str) -> Result<(CrosschainTransaction, bool), TrackerError> {
		// Claim before reading so a poll never works from a stale copy.
		let busy = Busy::acquire(&self.busy, id);
		let mut record = self
			.get(id)
			.await
			.ok_or_else(|| TrackerError::NotFound(id.to_string()))?;
		if busy.is_none() || record.is_terminal() {
			return Ok((record, false));
		}

		let mut changed = false;
		for (step, leg) in record.route.steps.iter().zip(record.legs.iter_mut()) {
			if leg.status != LegStatus::Pending {
				continue;
			}
			match self.check_leg(step, leg).await {
				Ok(leg_changed) => changed |= leg_changed,
				Err(e) => debug!(
					crosschain_id = %id,
					leg = leg.step_index,
					error = %e,
					"Leg check failed, retrying next sweep"
				),
			}
		}
		if !changed {
			return Ok((record, false));
		}

		let now = self.clock.now();
		record.updated_at = now;
		record.refresh_status(now);
		self.store(&record).await;
		self.publish(&record);
		Ok((record, true))
	}

	/// Advances one pending leg. Returns whether it changed.
	async fn check_leg(&self, step: &RouteStep, leg: &mut Leg) -> Result<bool, String> {
		let mut changed = false;

		if let Some(tx_id) = leg.onchain_tx_id.clone() {
			let tx = self
				.follow(&tx_id)
				.await
				.ok_or_else(|| format!("transaction {} unknown", tx_id))?;
			if tx.id != tx_id {
				leg.onchain_tx_id = Some(tx.id.clone());
				changed = true;
			}

			match tx.status {
				TransactionStatus::Confirmed => {}
				TransactionStatus::Failed
				| TransactionStatus::Replaced
				| TransactionStatus::Cancelled => {
					leg.status = LegStatus::Failed;
					leg.error = Some(Self::describe_failure(&tx));
					return Ok(true);
				}
				_ => return Ok(changed),
			}

			if leg.provider_ref.is_none() {
				leg.status = LegStatus::Confirmed;
				leg.output_amount = leg.input_amount.or(Some(step.to_amount));
				return Ok(true);
			}
		}

		let Some(reference) = leg.provider_ref.as_deref() else {
			return Ok(changed);
		};
		let provider_id = leg.provider_id.as_deref().unwrap_or_default();
		let provider = self
			.providers
			.get(provider_id)
			.ok_or_else(|| format!("unknown provider {}", provider_id))?;
		let status = provider.status(reference).await.map_err(|e| e.to_string())?;

		match status.state {
			ProviderState::Pending => Ok(changed),
			ProviderState::Completed => {
				leg.status = LegStatus::Confirmed;
				leg.output_amount = status.output_amount.or(Some(step.to_amount));
				Ok(true)
			}
			ProviderState::Failed => {
				leg.status = LegStatus::Failed;
				leg.error = Some(
					status
						.error
						.unwrap_or_else(|| "provider reported failure".to_string()),
				);
				Ok(true)
			}
		}
	}

	/// Resolves a transaction, following sped-up replacements to the one
	/// that took its place.
	async fn follow(&self, id: &TransactionId) -> Option<Transaction> {
		let mut tx = self.state_machine.get(id).await?;
		for _ in 0..MAX_REPLACEMENT_HOPS {
			let successor = match (&tx.status, &tx.replacement) {
				(TransactionStatus::Replaced, Some(replacement))
					if replacement.reason == ReplacementReason::SpedUp =>
				{
					replacement.id.clone()
				}
				_ => break,
			};
			tx = self.state_machine.get(&successor).await?;
		}
		Some(tx)
	}

	fn describe_failure(tx: &Transaction) -> String {
		match (&tx.status, &tx.replacement, &tx.failure_reason) {
			(_, _, Some(reason)) => reason.clone(),
			(TransactionStatus::Replaced, Some(replacement), None) => {
				format!("replaced by {} ({:?})", replacement.id, replacement.reason)
			}
			(status, _, None) => format!("transaction {}", status),
		}
	}

	fn publish(&self, record: &CrosschainTransaction) {
		let event = match record.status {
			CrosschainStatus::Pending => CrosschainEvent::Updated(record.clone()),
			CrosschainStatus::Confirmed => {
				info!(crosschain_id = %record.id, "Crosschain transaction completed");
				CrosschainEvent::Completed(record.clone())
			}
			CrosschainStatus::Failed => {
				warn!(crosschain_id = %record.id, "Crosschain transaction failed");
				CrosschainEvent::Failed(record.clone())
			}
		};
		self.events.publish_crosschain(event);
	}

	async fn store(&self, record: &CrosschainTransaction) {
		self.records
			.write()
			.await
			.insert(record.id.clone(), record.clone());
	}

	pub async fn get(&self, id: &str) -> Option<CrosschainTransaction> {
		self.records.read().await.get(id).cloned()
	}

	/// All records, oldest first.
	pub async fn list(&self) -> Vec<CrosschainTransaction> {
		let mut records = self
			.records
			.read()
			.await
			.values()
			.cloned()
			.collect::<Vec<_>>();
		records.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
		records
	}

	/// Reloads persisted records and returns how many are still active.
	pub async fn restore(&self, records: Vec<CrosschainTransaction>) -> usize {
		let mut table = self.records.write().await;
		let mut active = 0;
		for record in records {
			if !record.is_terminal() {
				active += 1;
			}
			table.insert(record.id.clone(), record);
		}
		info!(records = table.len(), active, "Restored crosschain records");
		active
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wallet_account::LocalSigner;
	use wallet_chains::{ChainRegistry, FeeData, MemoryChain};
	use wallet_delivery::{MonitorConfig, PendingTransactionMonitor};
	use wallet_gas::{FixedPriceOracle, GasConfig, GasEstimator};
	use wallet_providers::{MemoryProvider, ProviderAdapter, ProviderCapabilities};
	use wallet_types::{Asset, ChainId, ChainSettings, ManualClock, RouteKind, WalletEvent};

	const GWEI: u128 = 1_000_000_000;
	const SECRET: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

	fn dec(value: &str) -> Decimal {
		value.parse().unwrap()
	}

	struct Harness {
		tracker: CrosschainTransactionTracker,
		machine: Arc<TransactionStateMachine>,
		monitor: PendingTransactionMonitor,
		ethereum: Arc<MemoryChain>,
		events: EventBus,
	}

	fn harness(providers: Vec<Arc<dyn ProviderAdapter>>) -> Harness {
		let fee_data = FeeData {
			gas_price: Some(20 * GWEI),
			..Default::default()
		};
		let ethereum = Arc::new(MemoryChain::new("ethereum").with_fee_data(fee_data));
		let arbitrum = Arc::new(MemoryChain::new("arbitrum").with_fee_data(fee_data));

		let mut chains = ChainRegistry::new();
		chains
			.register(ethereum.clone(), ChainSettings::new(Asset::from("ETH")))
			.unwrap();
		chains
			.register(arbitrum, ChainSettings::new(Asset::from("ETH")))
			.unwrap();
		let chains = Arc::new(chains);

		let gas = Arc::new(GasEstimator::new(
			chains.clone(),
			Arc::new(FixedPriceOracle::new().with_price("ETH", Decimal::from(3000))),
			GasConfig::default(),
		));
		let signer = LocalSigner::new()
			.with_key(Address::from("0xaaa"), SECRET)
			.unwrap();
		let clock = ManualClock::new(1_000);
		let events = EventBus::new(100);
		let machine = Arc::new(TransactionStateMachine::new(
			chains,
			gas,
			Arc::new(signer),
			clock.clone(),
			events.clone(),
		));

		let mut registry = ProviderRegistry::new();
		for provider in providers {
			registry.register(provider).unwrap();
		}

		Harness {
			tracker: CrosschainTransactionTracker::new(
				machine.clone(),
				Arc::new(registry),
				clock.clone(),
				events.clone(),
			),
			monitor: PendingTransactionMonitor::new(
				machine.clone(),
				clock,
				MonitorConfig::default(),
			),
			machine,
			ethereum,
			events,
		}
	}

	fn capabilities(kinds: Vec<StepKind>) -> ProviderCapabilities {
		ProviderCapabilities {
			supported_chains: vec!["ethereum".into(), "arbitrum".into()],
			supported_assets: vec![],
			min_amount: None,
			max_amount: None,
			kinds,
			cross_chain_swaps: false,
		}
	}

	fn accounts() -> ExecutionAccounts {
		ExecutionAccounts::new()
			.with_address("ethereum", "0xaaa")
			.with_address("arbitrum", "0xaaa")
	}

	fn step(
		kind: StepKind,
		provider: Option<&str>,
		from: (&str, &str, &str),
		to: (&str, &str, &str),
	) -> RouteStep {
		RouteStep {
			kind,
			provider_id: provider.map(str::to_string),
			quote_id: None,
			from_chain: from.0.into(),
			to_chain: to.0.into(),
			from_asset: from.1.into(),
			to_asset: to.1.into(),
			from_amount: dec(from.2),
			to_amount: dec(to.2),
			fee_usd: Decimal::ONE,
			eta_minutes: 5,
		}
	}

	fn direct_route() -> Route {
		Route::from_steps(
			RouteKind::Direct,
			vec![step(
				StepKind::Transfer,
				None,
				("ethereum", "ETH", "1"),
				("ethereum", "ETH", "1"),
			)],
		)
		.unwrap()
	}

	fn bridge_then_swap() -> Route {
		Route::from_steps(
			RouteKind::Complex,
			vec![
				step(
					StepKind::Bridge,
					Some("hop"),
					("ethereum", "USDC", "100"),
					("arbitrum", "USDC", "99"),
				),
				step(
					StepKind::Swap,
					Some("uni"),
					("arbitrum", "USDC", "99"),
					("arbitrum", "WETH", "0.0495"),
				),
			],
		)
		.unwrap()
	}

	fn hop() -> MemoryProvider {
		MemoryProvider::new("hop", capabilities(vec![StepKind::Bridge]))
			.with_offer(
				("ethereum", "USDC"),
				("arbitrum", "USDC"),
				dec("0.99"),
				Decimal::ONE,
				10,
			)
			.with_deposit_address("0xbridge")
	}

	fn uni() -> MemoryProvider {
		MemoryProvider::new("uni", capabilities(vec![StepKind::Swap])).with_offer(
			("arbitrum", "USDC"),
			("arbitrum", "WETH"),
			dec("0.0005"),
			Decimal::ONE,
			2,
		)
	}

	async fn confirm(h: &Harness, id: &TransactionId, success: bool) {
		h.ethereum.include(id, success, 21_000, 20 * GWEI).await.unwrap();
		h.monitor.sweep().await;
	}

	#[tokio::test]
	async fn test_direct_route_confirms() {
		let h = harness(vec![]);
		let mut events = h.events.subscribe();

		let record = h.tracker.execute(direct_route(), &accounts()).await.unwrap();
		assert_eq!(record.status, CrosschainStatus::Pending);
		assert_eq!(record.legs[0].status, LegStatus::Pending);
		let tx_id = record.legs[0].onchain_tx_id.clone().unwrap();

		let unchanged = h.tracker.poll(&record.id).await.unwrap();
		assert_eq!(unchanged.status, CrosschainStatus::Pending);

		confirm(&h, &tx_id, true).await;
		let record = h.tracker.poll(&record.id).await.unwrap();
		assert_eq!(record.status, CrosschainStatus::Confirmed);
		assert_eq!(record.legs[0].status, LegStatus::Confirmed);
		assert_eq!(record.legs[0].output_amount, Some(Decimal::ONE));
		assert_eq!(record.completed_at, Some(1_000));

		let mut names = Vec::new();
		while let Ok(event) = events.try_recv() {
			if let WalletEvent::Crosschain(event) = event {
				names.push(match event {
					CrosschainEvent::Started(_) => "started",
					CrosschainEvent::Updated(_) => "updated",
					CrosschainEvent::Completed(_) => "completed",
					CrosschainEvent::Failed(_) => "failed",
				});
			}
		}
		assert_eq!(names, vec!["started", "updated", "completed"]);
	}

	#[tokio::test]
	async fn test_bridge_deposit_then_swap() {
		let hop = Arc::new(hop());
		let uni = Arc::new(uni());
		let h = harness(vec![hop.clone(), uni.clone()]);

		let record = h
			.tracker
			.execute(bridge_then_swap(), &accounts())
			.await
			.unwrap();
		assert!(record
			.legs
			.iter()
			.all(|leg| leg.status == LegStatus::Pending));

		// The bridge hands back a deposit the wallet broadcasts itself.
		let deposit_id = record.legs[0].onchain_tx_id.clone().unwrap();
		let deposit = h.machine.get(&deposit_id).await.unwrap();
		assert_eq!(deposit.to, Address::from("0xbridge"));
		assert_eq!(deposit.amount, Decimal::from(100));
		assert_eq!(deposit.asset, Asset::from("USDC"));
		assert!(deposit.data.is_some());

		// Upstream output unknown at start, so the quoted amount is used.
		let swap = &uni.executions().await[0];
		assert_eq!(swap.amount, dec("99"));
		assert!(record.legs[1].onchain_tx_id.is_none());

		confirm(&h, &deposit_id, true).await;
		let record = h.tracker.poll(&record.id).await.unwrap();
		assert_eq!(record.legs[0].status, LegStatus::Pending);

		let bridge_ref = record.legs[0].provider_ref.clone().unwrap();
		assert!(hop.complete(&bridge_ref, dec("98.9")).await);
		let record = h.tracker.poll(&record.id).await.unwrap();
		assert_eq!(record.legs[0].status, LegStatus::Confirmed);
		assert_eq!(record.legs[0].output_amount, Some(dec("98.9")));
		assert_eq!(record.status, CrosschainStatus::Pending);

		let swap_ref = record.legs[1].provider_ref.clone().unwrap();
		assert!(uni.complete(&swap_ref, dec("0.04945")).await);
		assert_eq!(h.tracker.poll_all().await, 1);

		let record = h.tracker.get(&record.id).await.unwrap();
		assert_eq!(record.status, CrosschainStatus::Confirmed);
		assert_eq!(record.legs[1].output_amount, Some(dec("0.04945")));
		assert!(record.completed_at.is_some());
	}

	#[tokio::test]
	async fn test_next_leg_uses_realized_output() {
		let swapper = Arc::new(
			MemoryProvider::new("uni", capabilities(vec![StepKind::Swap]))
				.with_offer(
					("ethereum", "DAI"),
					("ethereum", "USDC"),
					dec("0.99"),
					Decimal::ONE,
					1,
				)
				.with_instant_settlement(),
		);
		let bridge = Arc::new(
			MemoryProvider::new("hop", capabilities(vec![StepKind::Bridge])).with_offer(
				("ethereum", "USDC"),
				("arbitrum", "USDC"),
				dec("0.99"),
				Decimal::ONE,
				10,
			),
		);
		let h = harness(vec![swapper.clone(), bridge.clone()]);

		let route = Route::from_steps(
			RouteKind::Complex,
			vec![
				step(
					StepKind::Swap,
					Some("uni"),
					("ethereum", "DAI", "100"),
					("ethereum", "USDC", "99.5"),
				),
				step(
					StepKind::Bridge,
					Some("hop"),
					("ethereum", "USDC", "99.5"),
					("arbitrum", "USDC", "98.5"),
				),
			],
		)
		.unwrap();
		let record = h.tracker.execute(route, &accounts()).await.unwrap();

		assert_eq!(bridge.executions().await[0].amount, dec("99"));
		assert_eq!(record.legs[1].input_amount, Some(dec("99")));
	}

	#[tokio::test]
	async fn test_rejected_leg_fails_record_and_skips_rest() {
		let uni = Arc::new(uni());
		// The bridge has no liquidity for USDC.
		let hop = Arc::new(MemoryProvider::new("hop", capabilities(vec![StepKind::Bridge])));
		let h = harness(vec![hop, uni.clone()]);
		let mut events = h.events.subscribe();

		let record = h
			.tracker
			.execute(bridge_then_swap(), &accounts())
			.await
			.unwrap();

		assert_eq!(record.status, CrosschainStatus::Failed);
		assert_eq!(record.legs[0].status, LegStatus::Failed);
		assert!(record.legs[0].error.is_some());
		assert_eq!(record.legs[1].status, LegStatus::Skipped);
		assert!(record.completed_at.is_some());
		assert!(uni.executions().await.is_empty());
		assert!(h.ethereum.broadcasts().await.is_empty());

		let mut failed = false;
		while let Ok(event) = events.try_recv() {
			failed |= matches!(event, WalletEvent::Crosschain(CrosschainEvent::Failed(_)));
		}
		assert!(failed);
	}

	#[tokio::test]
	async fn test_invalid_routes_submit_nothing() {
		let h = harness(vec![Arc::new(uni())]);

		let missing_address = ExecutionAccounts::new().with_address("ethereum", "0xaaa");
		let result = h
			.tracker
			.execute(bridge_then_swap(), &missing_address)
			.await;
		assert!(matches!(result, Err(TrackerError::UnknownProvider(id)) if id == "hop"));

		let h = harness(vec![Arc::new(hop()), Arc::new(uni())]);
		let result = h
			.tracker
			.execute(bridge_then_swap(), &missing_address)
			.await;
		assert!(matches!(result, Err(TrackerError::InvalidRoute(_))));

		let mut disconnected = bridge_then_swap();
		disconnected.steps[1].from_chain = ChainId::from("polygon");
		let result = h.tracker.execute(disconnected, &accounts()).await;
		assert!(matches!(result, Err(TrackerError::InvalidRoute(_))));

		assert!(h.ethereum.broadcasts().await.is_empty());
		assert!(h.tracker.list().await.is_empty());
	}

	#[tokio::test]
	async fn test_recipient_applies_to_last_leg() {
		let h = harness(vec![]);
		let accounts = accounts().with_recipient("0xccc");

		let record = h.tracker.execute(direct_route(), &accounts).await.unwrap();
		let tx = h
			.machine
			.get(record.legs[0].onchain_tx_id.as_ref().unwrap())
			.await
			.unwrap();
		assert_eq!(tx.to, Address::from("0xccc"));
		assert_eq!(tx.from, Address::from("0xaaa"));
	}

	#[tokio::test]
	async fn test_broadcast_failure_fails_leg() {
		let h = harness(vec![]);
		h.ethereum
			.reject_broadcasts(Some("insufficient funds".into()))
			.await;

		let record = h.tracker.execute(direct_route(), &accounts()).await.unwrap();
		assert_eq!(record.status, CrosschainStatus::Failed);
		assert!(record.legs[0]
			.error
			.as_deref()
			.is_some_and(|error| error.contains("insufficient funds")));

		// The unsent transaction was released.
		let transactions = h.machine.list().await;
		assert_eq!(transactions.len(), 1);
		assert_eq!(transactions[0].status, TransactionStatus::Cancelled);
	}

	#[tokio::test]
	async fn test_reverted_transaction_fails_leg() {
		let h = harness(vec![]);
		let record = h.tracker.execute(direct_route(), &accounts()).await.unwrap();
		let tx_id = record.legs[0].onchain_tx_id.clone().unwrap();

		confirm(&h, &tx_id, false).await;
		let record = h.tracker.poll(&record.id).await.unwrap();
		assert_eq!(record.status, CrosschainStatus::Failed);
		assert_eq!(record.legs[0].error.as_deref(), Some("execution reverted"));
	}

	#[tokio::test]
	async fn test_follows_sped_up_transaction() {
		let h = harness(vec![]);
		let record = h.tracker.execute(direct_route(), &accounts()).await.unwrap();
		let original = record.legs[0].onchain_tx_id.clone().unwrap();

		let faster = h.machine.speed_up(&original).await.unwrap();
		h.ethereum.forget(&original).await;
		confirm(&h, &faster.id, true).await;

		let record = h.tracker.poll(&record.id).await.unwrap();
		assert_eq!(record.status, CrosschainStatus::Confirmed);
		assert_eq!(record.legs[0].onchain_tx_id, Some(faster.id));
	}

	#[tokio::test]
	async fn test_cancelled_transaction_fails_leg() {
		let h = harness(vec![]);
		let record = h.tracker.execute(direct_route(), &accounts()).await.unwrap();
		let original = record.legs[0].onchain_tx_id.clone().unwrap();

		let cancellation = h.machine.cancel(&original).await.unwrap();
		h.ethereum.forget(&original).await;
		confirm(&h, &cancellation.id, true).await;

		let record = h.tracker.poll(&record.id).await.unwrap();
		assert_eq!(record.status, CrosschainStatus::Failed);
		assert!(record.legs[0]
			.error
			.as_deref()
			.is_some_and(|error| error.starts_with("replaced by")));
	}

	#[tokio::test]
	async fn test_concurrent_polls_complete_once() {
		let h = harness(vec![]);
		let record = h.tracker.execute(direct_route(), &accounts()).await.unwrap();
		let tx_id = record.legs[0].onchain_tx_id.clone().unwrap();
		confirm(&h, &tx_id, true).await;
		let mut events = h.events.subscribe();

		let (first, second) = tokio::join!(h.tracker.poll(&record.id), h.tracker.poll(&record.id));
		first.unwrap();
		second.unwrap();
		let stored = h.tracker.get(&record.id).await.unwrap();
		assert_eq!(stored.status, CrosschainStatus::Confirmed);
		assert_eq!(h.tracker.poll(&record.id).await.unwrap(), stored);

		let mut completed = 0;
		while let Ok(event) = events.try_recv() {
			if matches!(event, WalletEvent::Crosschain(CrosschainEvent::Completed(_))) {
				completed += 1;
			}
		}
		assert_eq!(completed, 1);
	}

	#[tokio::test]
	async fn test_poll_terminal_and_unknown() {
		let h = harness(vec![]);
		assert!(matches!(
			h.tracker.poll("missing").await,
			Err(TrackerError::NotFound(_))
		));

		let record = h.tracker.execute(direct_route(), &accounts()).await.unwrap();
		let tx_id = record.legs[0].onchain_tx_id.clone().unwrap();
		confirm(&h, &tx_id, true).await;
		let confirmed = h.tracker.poll(&record.id).await.unwrap();

		assert_eq!(h.tracker.poll(&record.id).await.unwrap(), confirmed);
		assert_eq!(h.tracker.poll_all().await, 0);
	}

	#[tokio::test]
	async fn test_restore_counts_active_records() {
		let h = harness(vec![]);
		let active = h.tracker.execute(direct_route(), &accounts()).await.unwrap();
		let mut finished = active.clone();
		finished.id = "finished".to_string();
		finished.legs[0].status = LegStatus::Confirmed;
		finished.refresh_status(2_000);

		let restored = harness(vec![]);
		assert_eq!(
			restored
				.tracker
				.restore(vec![active.clone(), finished])
				.await,
			1
		);
		assert_eq!(restored.tracker.list().await.len(), 2);
		assert_eq!(restored.tracker.get(&active.id).await, Some(active));
	}
}

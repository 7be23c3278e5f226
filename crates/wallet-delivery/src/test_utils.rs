use crate::TransactionStateMachine;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use wallet_account::{AccountError, SignerInterface};
use wallet_chains::{ChainRegistry, FeeData, MemoryChain};
use wallet_gas::{FixedPriceOracle, GasConfig, GasEstimator};
use wallet_types::{
	Address, Asset, ChainId, ChainSettings, EventBus, ManualClock, Transaction, TransferRequest,
};

pub const GWEI: u128 = 1_000_000_000;

pub struct CountingSigner {
	pub calls: AtomicUsize,
	pub fail: AtomicBool,
}

#[async_trait]
impl SignerInterface for CountingSigner {
	async fn sign(
		&self,
		_chain: &ChainId,
		_from: &Address,
		payload: &[u8],
	) -> Result<Vec<u8>, AccountError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		// Hand control back like a remote signer would.
		tokio::task::yield_now().await;
		if self.fail.load(Ordering::SeqCst) {
			return Err(AccountError::SigningFailed("device locked".to_string()));
		}
		let mut signed = payload.to_vec();
		signed.extend_from_slice(b"sig");
		Ok(signed)
	}
}

pub struct Harness {
	pub machine: Arc<TransactionStateMachine>,
	/// The first configured chain.
	pub chain: Arc<MemoryChain>,
	pub chains: HashMap<ChainId, Arc<MemoryChain>>,
	pub signer: Arc<CountingSigner>,
	pub clock: Arc<ManualClock>,
	pub events: EventBus,
}

/// One legacy-priced `ethereum` chain with default settings.
pub fn harness() -> Harness {
	harness_with(&[("ethereum", ChainSettings::new(Asset::from("ETH")))])
}

pub fn harness_with(chains: &[(&str, ChainSettings)]) -> Harness {
	let mut registry = ChainRegistry::new();
	let mut memory = HashMap::new();
	for (id, settings) in chains {
		let chain = Arc::new(MemoryChain::new(*id).with_fee_data(FeeData {
			gas_price: Some(20 * GWEI),
			..Default::default()
		}));
		registry.register(chain.clone(), settings.clone()).unwrap();
		memory.insert(ChainId::from(*id), chain);
	}
	let registry = Arc::new(registry);

	let oracle = FixedPriceOracle::new()
		.with_price("ETH", Decimal::from(3000))
		.with_price("MATIC", Decimal::ONE);
	let gas = Arc::new(GasEstimator::new(
		registry.clone(),
		Arc::new(oracle),
		GasConfig::default(),
	));
	let signer = Arc::new(CountingSigner {
		calls: AtomicUsize::new(0),
		fail: AtomicBool::new(false),
	});
	let clock = ManualClock::new(1_000);
	let events = EventBus::new(100);
	let machine = Arc::new(TransactionStateMachine::new(
		registry,
		gas,
		signer.clone(),
		clock.clone(),
		events.clone(),
	));

	Harness {
		machine,
		chain: memory[&ChainId::from(chains[0].0)].clone(),
		chains: memory,
		signer,
		clock,
		events,
	}
}

pub fn transfer(amount: i64) -> TransferRequest {
	TransferRequest::new(
		ChainId::from("ethereum"),
		Address::from("0xaaa"),
		Address::from("0xbbb"),
		Decimal::from(amount),
		Asset::from("ETH"),
	)
}

pub async fn send(machine: &TransactionStateMachine, request: TransferRequest) -> Transaction {
	let tx = machine.build(request).await.unwrap();
	let signed = machine.sign(&tx.id).await.unwrap();
	machine.broadcast(&signed).await.unwrap()
}

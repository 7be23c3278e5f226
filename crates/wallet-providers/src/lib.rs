//! Bridge and swap providers.
//!
//! Every third-party liquidity provider is reached through one
//! [`ProviderAdapter`] implementation. Adapters describe what they can do via
//! [`ProviderCapabilities`], which the route engine uses to pre-filter them
//! before asking for quotes.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wallet_types::{Address, Asset, ChainId, RouteStep, StepKind};

pub mod implementations;
pub mod registry;

pub use implementations::memory::MemoryProvider;
pub use registry::ProviderRegistry;

#[derive(Debug, Error)]
pub enum ProviderError {
	#[error("Provider unavailable: {0}")]
	Unavailable(String),
	#[error("Provider timed out")]
	Timeout,
	#[error("Request rejected: {0}")]
	Rejected(String),
	#[error("Unknown reference: {0}")]
	UnknownReference(String),
	#[error("Provider {0} already registered")]
	AlreadyRegistered(String),
}

/// Static description of what a provider supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
	pub supported_chains: Vec<ChainId>,
	/// Empty means any asset.
	#[serde(default)]
	pub supported_assets: Vec<Asset>,
	#[serde(default)]
	pub min_amount: Option<Decimal>,
	#[serde(default)]
	pub max_amount: Option<Decimal>,
	pub kinds: Vec<StepKind>,
	/// Whether swaps may change chain as well as asset.
	#[serde(default)]
	pub cross_chain_swaps: bool,
}

impl ProviderCapabilities {
	/// Whether a quote request falls inside these capabilities.
	pub fn covers(&self, request: &QuoteRequest) -> bool {
		if !self.kinds.contains(&request.kind) {
			return false;
		}
		if request.kind == StepKind::Swap
			&& request.from_chain != request.to_chain
			&& !self.cross_chain_swaps
		{
			return false;
		}
		if !self.supported_chains.contains(&request.from_chain)
			|| !self.supported_chains.contains(&request.to_chain)
		{
			return false;
		}
		if !self.supported_assets.is_empty()
			&& (!self.supported_assets.contains(&request.from_asset)
				|| !self.supported_assets.contains(&request.to_asset))
		{
			return false;
		}
		if self.min_amount.is_some_and(|min| request.amount < min) {
			return false;
		}
		if self.max_amount.is_some_and(|max| request.amount > max) {
			return false;
		}
		true
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
	pub kind: StepKind,
	pub from_chain: ChainId,
	pub to_chain: ChainId,
	pub from_asset: Asset,
	pub to_asset: Asset,
	pub amount: Decimal,
}

/// A provider's offer for one bridge or swap step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
	pub provider_id: String,
	#[serde(default)]
	pub quote_id: Option<String>,
	pub kind: StepKind,
	pub from_chain: ChainId,
	pub to_chain: ChainId,
	pub from_asset: Asset,
	pub to_asset: Asset,
	pub from_amount: Decimal,
	pub to_amount: Decimal,
	pub fee_usd: Decimal,
	pub eta_minutes: u32,
}

impl Quote {
	pub fn into_step(self) -> RouteStep {
		RouteStep {
			kind: self.kind,
			provider_id: Some(self.provider_id),
			quote_id: self.quote_id,
			from_chain: self.from_chain,
			to_chain: self.to_chain,
			from_asset: self.from_asset,
			to_asset: self.to_asset,
			from_amount: self.from_amount,
			to_amount: self.to_amount,
			fee_usd: self.fee_usd,
			eta_minutes: self.eta_minutes,
		}
	}
}

/// Request to carry out a previously quoted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
	#[serde(default)]
	pub quote_id: Option<String>,
	pub kind: StepKind,
	pub from_chain: ChainId,
	pub to_chain: ChainId,
	pub from_asset: Asset,
	pub to_asset: Asset,
	pub amount: Decimal,
	pub sender: Address,
	pub recipient: Address,
}

/// How a provider accepted an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderExecution {
	/// The provider performs the step itself; track it by reference.
	Submitted(String),
	/// The sender must deposit on chain before the provider proceeds.
	Onchain {
		reference: String,
		to: Address,
		#[serde(default)]
		data: Option<String>,
		amount: Decimal,
		asset: Asset,
	},
}

impl ProviderExecution {
	pub fn reference(&self) -> &str {
		match self {
			Self::Submitted(reference) | Self::Onchain { reference, .. } => reference,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
	Pending,
	Completed,
	Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
	pub state: ProviderState,
	#[serde(default)]
	pub output_amount: Option<Decimal>,
	#[serde(default)]
	pub error: Option<String>,
}

impl ProviderStatus {
	pub fn pending() -> Self {
		Self {
			state: ProviderState::Pending,
			output_amount: None,
			error: None,
		}
	}
}

/// Adapter for one bridge or swap provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
	/// Stable identifier, referenced by route steps.
	fn id(&self) -> &str;

	fn capabilities(&self) -> &ProviderCapabilities;

	/// Offers for the request. An empty list means no liquidity.
	async fn quote(&self, request: &QuoteRequest) -> Result<Vec<Quote>, ProviderError>;

	async fn execute(&self, request: &ExecuteRequest) -> Result<ProviderExecution, ProviderError>;

	async fn status(&self, reference: &str) -> Result<ProviderStatus, ProviderError>;
}

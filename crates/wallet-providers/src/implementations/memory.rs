//! In-memory provider implementation.
//!
//! `MemoryProvider` quotes fixed rates configured up front and keeps every
//! execution pending until the caller settles it with [`complete`] or
//! [`fail`], unless it was built to settle instantly. It backs local
//! simulation and the engine's tests.
//!
//! [`complete`]: MemoryProvider::complete
//! [`fail`]: MemoryProvider::fail

use crate::{
	ExecuteRequest, ProviderAdapter, ProviderCapabilities, ProviderError, ProviderExecution,
	ProviderState, ProviderStatus, Quote, QuoteRequest,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use wallet_types::{Address, Asset, ChainId};

type Pair = (ChainId, Asset, ChainId, Asset);

#[derive(Debug, Clone, Copy)]
struct Offer {
	rate: Decimal,
	fee_usd: Decimal,
	eta_minutes: u32,
}

#[derive(Debug, Default)]
struct MemoryProviderState {
	offers: HashMap<Pair, Offer>,
	deposit_address: Option<Address>,
	instant: bool,
	unavailable: Option<String>,
	latency: Option<Duration>,
	executions: Vec<ExecuteRequest>,
	statuses: HashMap<String, ProviderStatus>,
	sequence: u64,
}

pub struct MemoryProvider {
	id: String,
	capabilities: ProviderCapabilities,
	state: Mutex<MemoryProviderState>,
}

impl MemoryProvider {
	pub fn new(id: impl Into<String>, capabilities: ProviderCapabilities) -> Self {
		Self {
			id: id.into(),
			capabilities,
			state: Mutex::new(MemoryProviderState::default()),
		}
	}

	/// Quotes `from → to` at `rate` output units per input unit.
	pub fn with_offer(
		mut self,
		from: (&str, &str),
		to: (&str, &str),
		rate: Decimal,
		fee_usd: Decimal,
		eta_minutes: u32,
	) -> Self {
		let pair = (from.0.into(), from.1.into(), to.0.into(), to.1.into());
		self.state.get_mut().offers.insert(
			pair,
			Offer {
				rate,
				fee_usd,
				eta_minutes,
			},
		);
		self
	}

	/// Executions hand back an on-chain deposit to `address` instead of
	/// being submitted by the provider.
	pub fn with_deposit_address(mut self, address: impl Into<Address>) -> Self {
		self.state.get_mut().deposit_address = Some(address.into());
		self
	}

	/// Completes every execution as soon as it is accepted, at the offered
	/// rate.
	pub fn with_instant_settlement(mut self) -> Self {
		self.state.get_mut().instant = true;
		self
	}

	/// Makes every call fail with `ProviderError::Unavailable` while set.
	pub async fn set_unavailable(&self, reason: Option<String>) {
		self.state.lock().await.unavailable = reason;
	}

	/// Delays every quote by `latency`.
	pub async fn set_latency(&self, latency: Option<Duration>) {
		self.state.lock().await.latency = latency;
	}

	/// Settles an execution successfully. Returns false for unknown references.
	pub async fn complete(&self, reference: &str, output_amount: Decimal) -> bool {
		self.settle(
			reference,
			ProviderStatus {
				state: ProviderState::Completed,
				output_amount: Some(output_amount),
				error: None,
			},
		)
		.await
	}

	pub async fn fail(&self, reference: &str, error: impl Into<String>) -> bool {
		self.settle(
			reference,
			ProviderStatus {
				state: ProviderState::Failed,
				output_amount: None,
				error: Some(error.into()),
			},
		)
		.await
	}

	/// Execution requests received so far, in order.
	pub async fn executions(&self) -> Vec<ExecuteRequest> {
		self.state.lock().await.executions.clone()
	}

	async fn settle(&self, reference: &str, status: ProviderStatus) -> bool {
		let mut state = self.state.lock().await;
		match state.statuses.get_mut(reference) {
			Some(current) => {
				*current = status;
				true
			}
			None => false,
		}
	}

	fn check_available(&self, state: &MemoryProviderState) -> Result<(), ProviderError> {
		match &state.unavailable {
			Some(reason) => Err(ProviderError::Unavailable(reason.clone())),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl ProviderAdapter for MemoryProvider {
	fn id(&self) -> &str {
		&self.id
	}

	fn capabilities(&self) -> &ProviderCapabilities {
		&self.capabilities
	}

	async fn quote(&self, request: &QuoteRequest) -> Result<Vec<Quote>, ProviderError> {
		let latency = self.state.lock().await.latency;
		if let Some(latency) = latency {
			tokio::time::sleep(latency).await;
		}

		let mut state = self.state.lock().await;
		self.check_available(&state)?;

		let pair = (
			request.from_chain.clone(),
			request.from_asset.clone(),
			request.to_chain.clone(),
			request.to_asset.clone(),
		);
		let Some(offer) = state.offers.get(&pair).copied() else {
			return Ok(Vec::new());
		};

		state.sequence += 1;
		let quote = Quote {
			provider_id: self.id.clone(),
			quote_id: Some(format!("{}-q{}", self.id, state.sequence)),
			kind: request.kind,
			from_chain: request.from_chain.clone(),
			to_chain: request.to_chain.clone(),
			from_asset: request.from_asset.clone(),
			to_asset: request.to_asset.clone(),
			from_amount: request.amount,
			to_amount: (request.amount * offer.rate).normalize(),
			fee_usd: offer.fee_usd,
			eta_minutes: offer.eta_minutes,
		};
		Ok(vec![quote])
	}

	async fn execute(&self, request: &ExecuteRequest) -> Result<ProviderExecution, ProviderError> {
		let mut state = self.state.lock().await;
		self.check_available(&state)?;

		let pair = (
			request.from_chain.clone(),
			request.from_asset.clone(),
			request.to_chain.clone(),
			request.to_asset.clone(),
		);
		let Some(offer) = state.offers.get(&pair).copied() else {
			return Err(ProviderError::Rejected(format!(
				"no liquidity for {} {} → {} {}",
				request.from_chain, request.from_asset, request.to_chain, request.to_asset
			)));
		};

		state.sequence += 1;
		let reference = format!("{}-x{}", self.id, state.sequence);
		let status = if state.instant {
			ProviderStatus {
				state: ProviderState::Completed,
				output_amount: Some((request.amount * offer.rate).normalize()),
				error: None,
			}
		} else {
			ProviderStatus::pending()
		};
		state.statuses.insert(reference.clone(), status);
		state.executions.push(request.clone());
		debug!(provider = %self.id, reference = %reference, "Accepted execution");

		Ok(match &state.deposit_address {
			Some(to) => ProviderExecution::Onchain {
				data: Some(format!("0x{}", hex::encode(reference.as_bytes()))),
				reference,
				to: to.clone(),
				amount: request.amount,
				asset: request.from_asset.clone(),
			},
			None => ProviderExecution::Submitted(reference),
		})
	}

	async fn status(&self, reference: &str) -> Result<ProviderStatus, ProviderError> {
		let state = self.state.lock().await;
		self.check_available(&state)?;
		state
			.statuses
			.get(reference)
			.cloned()
			.ok_or_else(|| ProviderError::UnknownReference(reference.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wallet_types::StepKind;

	fn dec(value: &str) -> Decimal {
		value.parse().unwrap()
	}

	fn swapper() -> MemoryProvider {
		MemoryProvider::new(
			"swapper",
			ProviderCapabilities {
				supported_chains: vec!["ethereum".into()],
				supported_assets: vec![],
				min_amount: None,
				max_amount: None,
				kinds: vec![StepKind::Swap],
				cross_chain_swaps: false,
			},
		)
		.with_offer(
			("ethereum", "DAI"),
			("ethereum", "USDC"),
			dec("0.998"),
			dec("2.5"),
			2,
		)
	}

	fn quote_request(to_asset: &str) -> QuoteRequest {
		QuoteRequest {
			kind: StepKind::Swap,
			from_chain: "ethereum".into(),
			to_chain: "ethereum".into(),
			from_asset: "DAI".into(),
			to_asset: to_asset.into(),
			amount: Decimal::from(100),
		}
	}

	fn execute_request() -> ExecuteRequest {
		ExecuteRequest {
			quote_id: None,
			kind: StepKind::Swap,
			from_chain: "ethereum".into(),
			to_chain: "ethereum".into(),
			from_asset: "DAI".into(),
			to_asset: "USDC".into(),
			amount: Decimal::from(100),
			sender: "0xaaa".into(),
			recipient: "0xaaa".into(),
		}
	}

	#[tokio::test]
	async fn test_quote_applies_rate() {
		let provider = swapper();
		let quotes = provider.quote(&quote_request("USDC")).await.unwrap();

		assert_eq!(quotes.len(), 1);
		assert_eq!(quotes[0].to_amount, dec("99.8"));
		assert_eq!(quotes[0].fee_usd, dec("2.5"));
		assert_eq!(quotes[0].provider_id, "swapper");
		assert!(quotes[0].quote_id.is_some());

		let none = provider.quote(&quote_request("WETH")).await.unwrap();
		assert!(none.is_empty());
	}

	#[tokio::test]
	async fn test_execution_lifecycle() {
		let provider = swapper();
		let execution = provider.execute(&execute_request()).await.unwrap();
		let ProviderExecution::Submitted(reference) = execution else {
			panic!("expected a submitted execution");
		};

		let status = provider.status(&reference).await.unwrap();
		assert_eq!(status.state, ProviderState::Pending);

		assert!(provider.complete(&reference, dec("99.7")).await);
		let status = provider.status(&reference).await.unwrap();
		assert_eq!(status.state, ProviderState::Completed);
		assert_eq!(status.output_amount, Some(dec("99.7")));

		assert!(!provider.complete("missing", Decimal::ONE).await);
		assert!(matches!(
			provider.status("missing").await,
			Err(ProviderError::UnknownReference(_))
		));
		assert_eq!(provider.executions().await.len(), 1);
	}

	#[tokio::test]
	async fn test_instant_settlement() {
		let provider = swapper().with_instant_settlement();
		let execution = provider.execute(&execute_request()).await.unwrap();

		let status = provider.status(execution.reference()).await.unwrap();
		assert_eq!(status.state, ProviderState::Completed);
		assert_eq!(status.output_amount, Some(dec("99.8")));
	}

	#[tokio::test]
	async fn test_deposit_execution() {
		let provider = swapper().with_deposit_address("0xrouter");
		let execution = provider.execute(&execute_request()).await.unwrap();

		match execution {
			ProviderExecution::Onchain {
				to, amount, asset, data, ..
			} => {
				assert_eq!(to, Address::from("0xrouter"));
				assert_eq!(amount, Decimal::from(100));
				assert_eq!(asset, Asset::from("DAI"));
				assert!(data.is_some_and(|data| data.starts_with("0x")));
			}
			other => panic!("unexpected execution {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_unavailable_and_rejected() {
		let provider = swapper();
		let mut request = execute_request();
		request.to_asset = "WETH".into();
		assert!(matches!(
			provider.execute(&request).await,
			Err(ProviderError::Rejected(_))
		));

		provider.set_unavailable(Some("maintenance".into())).await;
		assert!(matches!(
			provider.quote(&quote_request("USDC")).await,
			Err(ProviderError::Unavailable(_))
		));
	}
}

//! Route planning types.
//!
//! A [`Route`] is an immutable, ranked candidate path for moving value from
//! one (chain, asset) to another. Routes are recomputed on every query and
//! never cached.

use crate::{Asset, ChainId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
	Direct,
	Bridge,
	Swap,
	Complex,
}

impl fmt::Display for RouteKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			Self::Direct => "direct",
			Self::Bridge => "bridge",
			Self::Swap => "swap",
			Self::Complex => "complex",
		};
		write!(f, "{}", label)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
	Transfer,
	Bridge,
	Swap,
}

/// One leg of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
	pub kind: StepKind,
	#[serde(default)]
	pub provider_id: Option<String>,
	/// Provider-side quote reference, passed back on execution.
	#[serde(default)]
	pub quote_id: Option<String>,
	pub from_chain: ChainId,
	pub to_chain: ChainId,
	pub from_asset: Asset,
	pub to_asset: Asset,
	pub from_amount: Decimal,
	pub to_amount: Decimal,
	pub fee_usd: Decimal,
	pub eta_minutes: u32,
}

/// Ranked candidate execution path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
	pub kind: RouteKind,
	pub source_chain: ChainId,
	pub target_chain: ChainId,
	pub source_asset: Asset,
	pub target_asset: Asset,
	pub source_amount: Decimal,
	pub target_amount: Decimal,
	pub total_cost_usd: Decimal,
	pub eta_minutes: u32,
	pub steps: Vec<RouteStep>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteValidationError {
	#[error("Route has no steps")]
	Empty,
	#[error("Route endpoints do not match its first/last step")]
	EndpointMismatch,
	#[error("Step {0} does not continue from step {1}")]
	Disconnected(usize, usize),
	#[error("Route amounts do not match its first/last step")]
	AmountMismatch,
}

impl Route {
	/// Assembles a route from connected steps, deriving amounts, cost and ETA.
	///
	/// Returns `None` for an empty step list, or when the summed cost or ETA
	/// overflows.
	pub fn from_steps(kind: RouteKind, steps: Vec<RouteStep>) -> Option<Self> {
		let first = steps.first()?;
		let last = steps.last()?;
		let total_cost_usd = steps
			.iter()
			.try_fold(Decimal::ZERO, |total, step| total.checked_add(step.fee_usd))?;
		let eta_minutes = steps
			.iter()
			.try_fold(0u32, |total, step| total.checked_add(step.eta_minutes))?;

		Some(Self {
			kind,
			source_chain: first.from_chain.clone(),
			target_chain: last.to_chain.clone(),
			source_asset: first.from_asset.clone(),
			target_asset: last.to_asset.clone(),
			source_amount: first.from_amount,
			target_amount: last.to_amount,
			total_cost_usd,
			eta_minutes,
			steps,
		})
	}

	/// Checks that the steps form one connected chain/asset path matching
	/// the route's own endpoints and amounts.
	pub fn validate(&self) -> Result<(), RouteValidationError> {
		let (first, last) = match (self.steps.first(), self.steps.last()) {
			(Some(first), Some(last)) => (first, last),
			_ => return Err(RouteValidationError::Empty),
		};

		if first.from_chain != self.source_chain
			|| first.from_asset != self.source_asset
			|| last.to_chain != self.target_chain
			|| last.to_asset != self.target_asset
		{
			return Err(RouteValidationError::EndpointMismatch);
		}

		for (index, pair) in self.steps.windows(2).enumerate() {
			if pair[0].to_chain != pair[1].from_chain || pair[0].to_asset != pair[1].from_asset
			{
				return Err(RouteValidationError::Disconnected(index + 1, index));
			}
		}

		if first.from_amount != self.source_amount || last.to_amount != self.target_amount {
			return Err(RouteValidationError::AmountMismatch);
		}

		Ok(())
	}
}

/// Route preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOptions {
	#[serde(default = "default_true")]
	pub include_bridges: bool,
	#[serde(default = "default_true")]
	pub include_swaps: bool,
	#[serde(default)]
	pub prefer_low_fees: bool,
	#[serde(default)]
	pub prefer_speed: bool,
}

fn default_true() -> bool {
	true
}

impl Default for RouteOptions {
	fn default() -> Self {
		Self {
			include_bridges: true,
			include_swaps: true,
			prefer_low_fees: false,
			prefer_speed: false,
		}
	}
}

/// Request for candidate routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
	pub source_chain: ChainId,
	pub target_chain: ChainId,
	pub source_asset: Asset,
	pub target_asset: Asset,
	pub amount: Decimal,
	#[serde(default)]
	pub options: RouteOptions,
}

impl RouteRequest {
	pub fn is_same_chain(&self) -> bool {
		self.source_chain == self.target_chain
	}

	pub fn is_same_asset(&self) -> bool {
		self.source_asset == self.target_asset
	}
}

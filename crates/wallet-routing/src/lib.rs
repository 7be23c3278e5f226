//! Route planning for the wallet engine.
//!
//! The [`RouteEngine`] turns a [`RouteRequest`](wallet_types::RouteRequest)
//! into ranked candidate routes: a direct transfer, bridges, swaps, or a
//! swap → bridge → swap composition through an intermediate asset.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wallet_gas::GasError;
use wallet_types::ChainId;

pub mod engine;

pub use engine::RouteEngine;

#[derive(Debug, Error)]
pub enum RouteError {
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Unsupported chain: {0}")]
	UnsupportedChain(ChainId),
	#[error("Gas unavailable: {0}")]
	GasUnavailable(String),
}

impl From<GasError> for RouteError {
	fn from(error: GasError) -> Self {
		match error {
			GasError::UnsupportedChain(chain) => Self::UnsupportedChain(chain),
			other => Self::GasUnavailable(other.to_string()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
	/// Asset bridged by complex routes.
	#[serde(default = "default_intermediate_asset")]
	pub intermediate_asset: String,
	/// Upper bound on each provider quote call.
	#[serde(default = "default_provider_timeout_ms")]
	pub provider_timeout_ms: u64,
	/// Weight of the USD cost in the default ranking score.
	#[serde(default = "default_cost_weight")]
	pub cost_weight: Decimal,
	/// Weight of the ETA in minutes in the default ranking score.
	#[serde(default = "default_eta_weight")]
	pub eta_weight: Decimal,
}

fn default_intermediate_asset() -> String {
	"USDC".to_string()
}

fn default_provider_timeout_ms() -> u64 {
	5_000
}

fn default_cost_weight() -> Decimal {
	Decimal::new(7, 1)
}

fn default_eta_weight() -> Decimal {
	Decimal::new(3, 1)
}

impl Default for RoutingConfig {
	fn default() -> Self {
		Self {
			intermediate_asset: default_intermediate_asset(),
			provider_timeout_ms: default_provider_timeout_ms(),
			cost_weight: default_cost_weight(),
			eta_weight: default_eta_weight(),
		}
	}
}

//! Fee estimation for the wallet engine.
//!
//! [`GasEstimator`] turns a chain's fee market snapshot into a [`GasQuote`]
//! for an urgency tier, priced in the native asset and in USD, and derives
//! bumped quotes for replace-by-fee.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use wallet_chains::ChainRegistry;
use wallet_types::{Asset, ChainId, FeePricing, GasQuote, GasTier};

pub mod implementations;

pub use implementations::fixed::FixedPriceOracle;

#[derive(Debug, Error)]
pub enum GasError {
	#[error("Unsupported chain: {0}")]
	UnsupportedChain(ChainId),
	#[error("No usable fee data for chain {0}")]
	FeeDataUnavailable(ChainId),
	#[error("No USD price for {0}")]
	PriceUnavailable(Asset),
	#[error("Fee arithmetic overflow")]
	Overflow,
	#[error("Invalid fee multiplier {0}")]
	InvalidMultiplier(Decimal),
	#[error("Chain error: {0}")]
	Chain(String),
}

/// Source of USD prices for native gas assets.
#[async_trait]
pub trait PriceOracle: Send + Sync {
	async fn usd_price(&self, asset: &Asset) -> Option<Decimal>;
}

/// Multiplier and expected confirmation time of one urgency tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
	pub multiplier: Decimal,
	pub eta_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasConfig {
	#[serde(default = "default_slow")]
	pub slow: TierConfig,
	#[serde(default = "default_standard")]
	pub standard: TierConfig,
	#[serde(default = "default_fast")]
	pub fast: TierConfig,
	/// Priority fee used when an EIP-1559 chain does not suggest one.
	#[serde(default = "default_priority_fee_per_gas")]
	pub default_priority_fee_per_gas: u64,
	/// Fee multiplier applied by cancel and speed-up.
	#[serde(default = "default_replacement_fee_multiplier")]
	pub replacement_fee_multiplier: Decimal,
	/// Static USD prices by asset symbol, used when no oracle is injected.
	#[serde(default)]
	pub usd_prices: HashMap<String, Decimal>,
}

fn default_slow() -> TierConfig {
	TierConfig {
		multiplier: Decimal::new(9, 1),
		eta_minutes: 10,
	}
}

fn default_standard() -> TierConfig {
	TierConfig {
		multiplier: Decimal::ONE,
		eta_minutes: 3,
	}
}

fn default_fast() -> TierConfig {
	TierConfig {
		multiplier: Decimal::new(125, 2),
		eta_minutes: 1,
	}
}

fn default_priority_fee_per_gas() -> u64 {
	1_000_000_000
}

fn default_replacement_fee_multiplier() -> Decimal {
	Decimal::new(15, 1)
}

impl Default for GasConfig {
	fn default() -> Self {
		Self {
			slow: default_slow(),
			standard: default_standard(),
			fast: default_fast(),
			default_priority_fee_per_gas: default_priority_fee_per_gas(),
			replacement_fee_multiplier: default_replacement_fee_multiplier(),
			usd_prices: HashMap::new(),
		}
	}
}

impl GasConfig {
	pub fn tier(&self, tier: GasTier) -> &TierConfig {
		match tier {
			GasTier::Slow => &self.slow,
			GasTier::Standard => &self.standard,
			GasTier::Fast => &self.fast,
		}
	}
}

/// Multiplies a per-gas value, rounding up to the next integer.
fn scale(value: u128, multiplier: Decimal) -> Result<u128, GasError> {
	let value = i128::try_from(value).map_err(|_| GasError::Overflow)?;
	let value = Decimal::try_from_i128_with_scale(value, 0).map_err(|_| GasError::Overflow)?;
	value
		.checked_mul(multiplier)
		.and_then(|scaled| scaled.ceil().to_u128())
		.ok_or(GasError::Overflow)
}

/// Converts `per_gas × gas` smallest units into native units.
pub fn native_amount(per_gas: u128, gas: u64, decimals: u32) -> Result<Decimal, GasError> {
	let total = per_gas
		.checked_mul(u128::from(gas))
		.and_then(|total| i128::try_from(total).ok())
		.ok_or(GasError::Overflow)?;
	Decimal::try_from_i128_with_scale(total, decimals)
		.map(|amount| amount.normalize())
		.map_err(|_| GasError::Overflow)
}

pub struct GasEstimator {
	chains: Arc<ChainRegistry>,
	oracle: Arc<dyn PriceOracle>,
	config: GasConfig,
}

impl GasEstimator {
	pub fn new(chains: Arc<ChainRegistry>, oracle: Arc<dyn PriceOracle>, config: GasConfig) -> Self {
		Self {
			chains,
			oracle,
			config,
		}
	}

	pub fn config(&self) -> &GasConfig {
		&self.config
	}

	/// Quotes the fee of a transaction on `chain` at the given tier.
	///
	/// `gas_limit` defaults to the chain's plain-transfer limit.
	pub async fn estimate(
		&self,
		chain: &ChainId,
		tier: GasTier,
		gas_limit: Option<u64>,
	) -> Result<GasQuote, GasError> {
		let entry = self
			.chains
			.get(chain)
			.ok_or_else(|| GasError::UnsupportedChain(chain.clone()))?;
		let fee_data = entry
			.client
			.get_fee_data()
			.await
			.map_err(|e| GasError::Chain(e.to_string()))?;
		let tier_config = self.config.tier(tier);

		let (pricing, expected_per_gas) = match (fee_data.base_fee_per_gas, fee_data.gas_price) {
			(Some(base_fee), _) => {
				let suggested = fee_data
					.max_priority_fee_per_gas
					.unwrap_or(u128::from(self.config.default_priority_fee_per_gas));
				let priority = scale(suggested, tier_config.multiplier)?;
				let max_fee = base_fee
					.checked_mul(2)
					.and_then(|fee| fee.checked_add(priority))
					.ok_or(GasError::Overflow)?;
				let expected = base_fee.checked_add(priority).ok_or(GasError::Overflow)?;
				(
					FeePricing::Eip1559 {
						max_fee_per_gas: max_fee,
						max_priority_fee_per_gas: priority,
					},
					expected,
				)
			}
			(None, Some(gas_price)) => {
				let gas_price = scale(gas_price, tier_config.multiplier)?;
				(FeePricing::Legacy { gas_price }, gas_price)
			}
			(None, None) => return Err(GasError::FeeDataUnavailable(chain.clone())),
		};

		let gas_limit = gas_limit.unwrap_or(entry.settings.transfer_gas_limit);
		let native_amount =
			native_amount(expected_per_gas, gas_limit, entry.settings.native_decimals)?;
		let price = self
			.oracle
			.usd_price(&entry.settings.native_asset)
			.await
			.ok_or_else(|| GasError::PriceUnavailable(entry.settings.native_asset.clone()))?;
		let usd_amount = native_amount
			.checked_mul(price)
			.ok_or(GasError::Overflow)?
			.round_dp(6);

		debug!(
			chain = %chain,
			tier = ?tier,
			expected_per_gas,
			gas_limit,
			%usd_amount,
			"Estimated fee"
		);

		Ok(GasQuote {
			tier,
			pricing,
			gas_limit,
			native_amount,
			usd_amount,
			eta_minutes: tier_config.eta_minutes,
		})
	}

	/// Returns a copy of `quote` with every per-gas field scaled by
	/// `multiplier` (rounded up) and the cost totals scaled pro rata.
	pub fn bump(&self, quote: &GasQuote, multiplier: Decimal) -> Result<GasQuote, GasError> {
		if multiplier < Decimal::ONE {
			return Err(GasError::InvalidMultiplier(multiplier));
		}

		let pricing = match quote.pricing {
			FeePricing::Legacy { gas_price } => FeePricing::Legacy {
				gas_price: scale(gas_price, multiplier)?,
			},
			FeePricing::Eip1559 {
				max_fee_per_gas,
				max_priority_fee_per_gas,
			} => FeePricing::Eip1559 {
				max_fee_per_gas: scale(max_fee_per_gas, multiplier)?,
				max_priority_fee_per_gas: scale(max_priority_fee_per_gas, multiplier)?,
			},
		};

		Ok(GasQuote {
			pricing,
			native_amount: quote
				.native_amount
				.checked_mul(multiplier)
				.ok_or(GasError::Overflow)?
				.normalize(),
			usd_amount: quote
				.usd_amount
				.checked_mul(multiplier)
				.ok_or(GasError::Overflow)?
				.round_dp(6),
			..quote.clone()
		})
	}

	/// Bumps `quote` by the configured replacement multiplier.
	pub fn replacement_quote(&self, quote: &GasQuote) -> Result<GasQuote, GasError> {
		self.bump(quote, self.config.replacement_fee_multiplier)
	}
}

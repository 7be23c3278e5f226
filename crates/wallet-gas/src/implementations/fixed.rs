//! Price oracle backed by a fixed table.

use crate::PriceOracle;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use wallet_types::Asset;

/// Serves USD prices from a static table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct FixedPriceOracle {
	prices: HashMap<Asset, Decimal>,
}

impl FixedPriceOracle {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_price(mut self, asset: impl Into<Asset>, price: Decimal) -> Self {
		self.prices.insert(asset.into(), price);
		self
	}
}

impl<A: Into<Asset>> FromIterator<(A, Decimal)> for FixedPriceOracle {
	fn from_iter<I: IntoIterator<Item = (A, Decimal)>>(iter: I) -> Self {
		Self {
			prices: iter
				.into_iter()
				.map(|(asset, price)| (asset.into(), price))
				.collect(),
		}
	}
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
	async fn usd_price(&self, asset: &Asset) -> Option<Decimal> {
		self.prices.get(asset).copied()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_fixed_prices() {
		let oracle = [("ETH", Decimal::from(3000)), ("MATIC", Decimal::ONE)]
			.into_iter()
			.collect::<FixedPriceOracle>();

		assert_eq!(
			oracle.usd_price(&Asset::from("ETH")).await,
			Some(Decimal::from(3000))
		);
		assert_eq!(oracle.usd_price(&Asset::from("BTC")).await, None);
	}
}

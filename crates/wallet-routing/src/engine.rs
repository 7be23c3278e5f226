//! Candidate route discovery and ranking.

use crate::{RouteError, RoutingConfig};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wallet_gas::GasEstimator;
use wallet_providers::{ProviderError, ProviderRegistry, Quote, QuoteRequest};
use wallet_types::{
	Asset, ChainId, GasTier, Route, RouteKind, RouteOptions, RouteRequest, RouteStep, StepKind,
};

/// Computes ranked routes. Stateless between calls; nothing is cached.
pub struct RouteEngine {
	gas: Arc<GasEstimator>,
	providers: Arc<ProviderRegistry>,
	config: RoutingConfig,
}

impl RouteEngine {
	pub fn new(
		gas: Arc<GasEstimator>,
		providers: Arc<ProviderRegistry>,
		config: RoutingConfig,
	) -> Self {
		Self {
			gas,
			providers,
			config,
		}
	}

	pub fn config(&self) -> &RoutingConfig {
		&self.config
	}

	/// Returns every valid candidate route, best first.
	///
	/// Provider failures and timeouts only remove that provider's candidates.
	/// An empty result means no route was found.
	pub async fn find_routes(&self, request: &RouteRequest) -> Result<Vec<Route>, RouteError> {
		if request.amount <= Decimal::ZERO {
			return Err(RouteError::InvalidRequest(format!(
				"amount must be positive, got {}",
				request.amount
			)));
		}

		let candidates = if request.is_same_chain() && request.is_same_asset() {
			vec![self.direct_route(request).await?]
		} else if request.is_same_chain() {
			self.swap_routes(request).await
		} else {
			self.crosschain_routes(request).await
		};

		let mut routes = candidates
			.into_iter()
			.filter(|route| match route.validate() {
				Ok(()) if Self::serves(route, request) => true,
				Ok(()) => {
					warn!(kind = %route.kind, "Dropping route with foreign endpoints");
					false
				}
				Err(e) => {
					warn!(kind = %route.kind, error = %e, "Dropping invalid route");
					false
				}
			})
			.collect::<Vec<_>>();

		self.rank(&mut routes, &request.options);
		debug!(
			from = %request.source_chain,
			to = %request.target_chain,
			routes = routes.len(),
			"Computed routes"
		);
		Ok(routes)
	}

	async fn direct_route(&self, request: &RouteRequest) -> Result<Route, RouteError> {
		let quote = self
			.gas
			.estimate(&request.source_chain, GasTier::Standard, None)
			.await?;

		let step = RouteStep {
			kind: StepKind::Transfer,
			provider_id: None,
			quote_id: None,
			from_chain: request.source_chain.clone(),
			to_chain: request.target_chain.clone(),
			from_asset: request.source_asset.clone(),
			to_asset: request.target_asset.clone(),
			from_amount: request.amount,
			to_amount: request.amount,
			fee_usd: quote.usd_amount,
			eta_minutes: quote.eta_minutes,
		};
		Route::from_steps(RouteKind::Direct, vec![step])
			.ok_or_else(|| RouteError::InvalidRequest("empty direct route".to_string()))
	}

	async fn swap_routes(&self, request: &RouteRequest) -> Vec<Route> {
		if !request.options.include_swaps {
			return Vec::new();
		}
		let quotes = self
			.quotes(QuoteRequest {
				kind: StepKind::Swap,
				from_chain: request.source_chain.clone(),
				to_chain: request.target_chain.clone(),
				from_asset: request.source_asset.clone(),
				to_asset: request.target_asset.clone(),
				amount: request.amount,
			})
			.await;
		single_step_routes(RouteKind::Swap, quotes)
	}

	async fn crosschain_routes(&self, request: &RouteRequest) -> Vec<Route> {
		let options = &request.options;

		let bridges = async {
			if !options.include_bridges || !request.is_same_asset() {
				return Vec::new();
			}
			let quotes = self
				.quotes(QuoteRequest {
					kind: StepKind::Bridge,
					from_chain: request.source_chain.clone(),
					to_chain: request.target_chain.clone(),
					from_asset: request.source_asset.clone(),
					to_asset: request.target_asset.clone(),
					amount: request.amount,
				})
				.await;
			single_step_routes(RouteKind::Bridge, quotes)
		};
		let complex = async {
			if !options.include_bridges || !options.include_swaps {
				return Vec::new();
			}
			self.complex_routes(request).await
		};

		let (bridges, swaps, complex) = tokio::join!(bridges, self.swap_routes(request), complex);
		bridges.into_iter().chain(swaps).chain(complex).collect()
	}

	/// Swap into the intermediate asset, bridge it, swap out of it. Stages
	/// already in the intermediate asset are skipped.
	async fn complex_routes(&self, request: &RouteRequest) -> Vec<Route> {
		let intermediate = Asset::new(self.config.intermediate_asset.clone());
		let enter = request.source_asset != intermediate;
		let exit = request.target_asset != intermediate;
		if !enter && !exit {
			return Vec::new();
		}

		let mut head = Vec::new();
		let mut bridged_amount = request.amount;
		if enter {
			let Some(swap) = self
				.best_swap(
					&request.source_chain,
					&request.source_asset,
					&intermediate,
					request.amount,
				)
				.await
			else {
				return Vec::new();
			};
			bridged_amount = swap.to_amount;
			head.push(swap.into_step());
		}

		let bridges = self
			.quotes(QuoteRequest {
				kind: StepKind::Bridge,
				from_chain: request.source_chain.clone(),
				to_chain: request.target_chain.clone(),
				from_asset: intermediate.clone(),
				to_asset: intermediate.clone(),
				amount: bridged_amount,
			})
			.await;

		let candidates = bridges.into_iter().map(|bridge| {
			let mut steps = head.clone();
			let intermediate = &intermediate;
			async move {
				let arrived = bridge.to_amount;
				steps.push(bridge.into_step());
				if exit {
					let swap = self
						.best_swap(
							&request.target_chain,
							intermediate,
							&request.target_asset,
							arrived,
						)
						.await?;
					steps.push(swap.into_step());
				}
				Route::from_steps(RouteKind::Complex, steps)
			}
		});

		join_all(candidates).await.into_iter().flatten().collect()
	}

	/// Highest-output same-chain swap quote; the first one wins ties.
	async fn best_swap(
		&self,
		chain: &ChainId,
		from_asset: &Asset,
		to_asset: &Asset,
		amount: Decimal,
	) -> Option<Quote> {
		self.quotes(QuoteRequest {
			kind: StepKind::Swap,
			from_chain: chain.clone(),
			to_chain: chain.clone(),
			from_asset: from_asset.clone(),
			to_asset: to_asset.clone(),
			amount,
		})
		.await
		.into_iter()
		.reduce(|best, quote| {
			if quote.to_amount > best.to_amount {
				quote
			} else {
				best
			}
		})
	}

	/// Quotes from every capable provider, in registration order.
	async fn quotes(&self, request: QuoteRequest) -> Vec<Quote> {
		let providers = self.providers.capable(&request);
		let timeout = Duration::from_millis(self.config.provider_timeout_ms);

		let responses = join_all(providers.iter().map(|provider| {
			let request = &request;
			async move {
				let response = tokio::time::timeout(timeout, provider.quote(request))
					.await
					.unwrap_or(Err(ProviderError::Timeout));
				(provider.id(), response)
			}
		}))
		.await;

		let mut quotes = Vec::new();
		for (provider, response) in responses {
			match response {
				Ok(offers) => quotes.extend(offers),
				Err(e) => warn!(
					provider,
					kind = ?request.kind,
					error = %e,
					"Provider unavailable, skipping its routes"
				),
			}
		}
		quotes
	}

	fn serves(route: &Route, request: &RouteRequest) -> bool {
		route.source_chain == request.source_chain
			&& route.target_chain == request.target_chain
			&& route.source_asset == request.source_asset
			&& route.target_asset == request.target_asset
	}

	fn rank(&self, routes: &mut [Route], options: &RouteOptions) {
		if options.prefer_low_fees {
			routes.sort_by(|a, b| a.total_cost_usd.cmp(&b.total_cost_usd));
		} else if options.prefer_speed {
			routes.sort_by_key(|route| route.eta_minutes);
		} else {
			routes.sort_by_cached_key(|route| self.score(route));
		}
	}

	/// Weighted cost and ETA. Scores that overflow rank last.
	fn score(&self, route: &Route) -> Decimal {
		let cost = self.config.cost_weight.checked_mul(route.total_cost_usd);
		let eta = self
			.config
			.eta_weight
			.checked_mul(Decimal::from(route.eta_minutes));
		cost.zip(eta)
			.and_then(|(cost, eta)| cost.checked_add(eta))
			.unwrap_or(Decimal::MAX)
	}
}

fn single_step_routes(kind: RouteKind, quotes: Vec<Quote>) -> Vec<Route> {
	quotes
		.into_iter()
		.filter_map(|quote| Route::from_steps(kind, vec![quote.into_step()]))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use wallet_chains::{ChainRegistry, FeeData, MemoryChain};
	use wallet_gas::{FixedPriceOracle, GasConfig};
	use wallet_providers::{MemoryProvider, ProviderAdapter, ProviderCapabilities};
	use wallet_types::ChainSettings;

	const GWEI: u128 = 1_000_000_000;

	fn dec(value: &str) -> Decimal {
		value.parse().unwrap()
	}

	fn gas() -> Arc<GasEstimator> {
		let mut chains = ChainRegistry::new();
		for (chain, asset) in [("ethereum", "ETH"), ("arbitrum", "ETH")] {
			chains
				.register(
					Arc::new(MemoryChain::new(chain).with_fee_data(FeeData {
						gas_price: Some(20 * GWEI),
						..Default::default()
					})),
					ChainSettings::new(Asset::from(asset)),
				)
				.unwrap();
		}
		let oracle = FixedPriceOracle::new().with_price("ETH", Decimal::from(3000));
		Arc::new(GasEstimator::new(
			Arc::new(chains),
			Arc::new(oracle),
			GasConfig::default(),
		))
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

	fn bridge(id: &str, asset: &str, rate: &str, fee: &str, eta: u32) -> MemoryProvider {
		MemoryProvider::new(id, capabilities(vec![StepKind::Bridge])).with_offer(
			("ethereum", asset),
			("arbitrum", asset),
			dec(rate),
			dec(fee),
			eta,
		)
	}

	fn engine(providers: Vec<Arc<dyn ProviderAdapter>>, config: RoutingConfig) -> RouteEngine {
		let mut registry = ProviderRegistry::new();
		for provider in providers {
			registry.register(provider).unwrap();
		}
		RouteEngine::new(gas(), Arc::new(registry), config)
	}

	fn request(from: (&str, &str), to: (&str, &str), amount: &str) -> RouteRequest {
		RouteRequest {
			source_chain: from.0.into(),
			target_chain: to.0.into(),
			source_asset: from.1.into(),
			target_asset: to.1.into(),
			amount: dec(amount),
			options: RouteOptions::default(),
		}
	}

	fn providers_of(route: &Route) -> Vec<&str> {
		route
			.steps
			.iter()
			.filter_map(|step| step.provider_id.as_deref())
			.collect()
	}

	#[tokio::test]
	async fn test_direct_transfer_costs_gas_only() {
		let engine = engine(
			vec![Arc::new(bridge("b1", "ETH", "0.99", "1", 5))],
			RoutingConfig::default(),
		);
		let routes = engine
			.find_routes(&request(("ethereum", "ETH"), ("ethereum", "ETH"), "10"))
			.await
			.unwrap();

		assert_eq!(routes.len(), 1);
		let route = &routes[0];
		assert_eq!(route.kind, RouteKind::Direct);
		assert_eq!(route.target_amount, dec("10"));
		// 20 gwei * 21000 gas = 0.00042 ETH at $3000.
		assert_eq!(route.total_cost_usd, dec("1.26"));
		assert_eq!(route.eta_minutes, 3);
		assert_eq!(route.steps.len(), 1);
		assert_eq!(route.steps[0].kind, StepKind::Transfer);
	}

	#[tokio::test]
	async fn test_direct_transfer_on_unknown_chain() {
		let engine = engine(vec![], RoutingConfig::default());
		let result = engine
			.find_routes(&request(("solana", "SOL"), ("solana", "SOL"), "1"))
			.await;
		assert!(matches!(result, Err(RouteError::UnsupportedChain(_))));
	}

	#[tokio::test]
	async fn test_rejects_non_positive_amount() {
		let engine = engine(vec![], RoutingConfig::default());
		for amount in ["0", "-1"] {
			let result = engine
				.find_routes(&request(("ethereum", "ETH"), ("arbitrum", "ETH"), amount))
				.await;
			assert!(matches!(result, Err(RouteError::InvalidRequest(_))));
		}
	}

	#[tokio::test]
	async fn test_bridge_quote_becomes_route() {
		let engine = engine(
			vec![Arc::new(bridge("b1", "USDT", "0.995", "0.5", 15))],
			RoutingConfig::default(),
		);
		let routes = engine
			.find_routes(&request(("ethereum", "USDT"), ("arbitrum", "USDT"), "100"))
			.await
			.unwrap();

		assert_eq!(routes.len(), 1);
		let route = &routes[0];
		assert_eq!(route.kind, RouteKind::Bridge);
		assert_eq!(route.target_amount, dec("99.5"));
		assert_eq!(route.eta_minutes, 15);
		assert_eq!(route.total_cost_usd, dec("0.5"));
		assert_eq!(providers_of(route), vec!["b1"]);
	}

	#[tokio::test]
	async fn test_slow_provider_is_skipped() {
		let slow = bridge("P1", "USDT", "0.999", "0.1", 1);
		slow.set_latency(Some(Duration::from_secs(5))).await;
		let failing = bridge("P3", "USDT", "0.999", "0.1", 1);
		failing.set_unavailable(Some("maintenance".into())).await;
		let engine = engine(
			vec![
				Arc::new(slow),
				Arc::new(bridge("P2", "USDT", "0.99", "1", 10)),
				Arc::new(failing),
			],
			RoutingConfig {
				provider_timeout_ms: 50,
				..RoutingConfig::default()
			},
		);

		let routes = engine
			.find_routes(&request(("ethereum", "USDT"), ("arbitrum", "USDT"), "100"))
			.await
			.unwrap();

		assert_eq!(routes.len(), 1);
		assert_eq!(providers_of(&routes[0]), vec!["P2"]);
	}

	#[tokio::test]
	async fn test_same_chain_swaps() {
		let swapper = MemoryProvider::new("s1", capabilities(vec![StepKind::Swap])).with_offer(
			("ethereum", "DAI"),
			("ethereum", "USDC"),
			dec("0.998"),
			dec("3"),
			2,
		);
		let engine = engine(
			vec![
				Arc::new(bridge("b1", "DAI", "0.99", "1", 5)),
				Arc::new(swapper),
			],
			RoutingConfig::default(),
		);

		let routes = engine
			.find_routes(&request(("ethereum", "DAI"), ("ethereum", "USDC"), "100"))
			.await
			.unwrap();
		assert_eq!(routes.len(), 1);
		assert_eq!(routes[0].kind, RouteKind::Swap);
		assert_eq!(routes[0].target_amount, dec("99.8"));

		let mut no_swaps = request(("ethereum", "DAI"), ("ethereum", "USDC"), "100");
		no_swaps.options.include_swaps = false;
		assert!(engine.find_routes(&no_swaps).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_complex_route_through_intermediate() {
		let swapper = MemoryProvider::new("s1", capabilities(vec![StepKind::Swap]))
			.with_offer(
				("ethereum", "DAI"),
				("ethereum", "USDC"),
				dec("0.99"),
				dec("2"),
				2,
			)
			.with_offer(
				("arbitrum", "USDC"),
				("arbitrum", "WETH"),
				dec("0.0005"),
				dec("1"),
				2,
			);
		let better = MemoryProvider::new("s2", capabilities(vec![StepKind::Swap])).with_offer(
			("arbitrum", "USDC"),
			("arbitrum", "WETH"),
			dec("0.0006"),
			dec("1"),
			2,
		);
		let engine = engine(
			vec![
				Arc::new(swapper),
				Arc::new(better),
				Arc::new(bridge("b1", "USDC", "0.99", "1", 10)),
				Arc::new(bridge("b2", "USDC", "0.98", "0.5", 20)),
			],
			RoutingConfig::default(),
		);

		let routes = engine
			.find_routes(&request(("ethereum", "DAI"), ("arbitrum", "WETH"), "100"))
			.await
			.unwrap();

		assert_eq!(routes.len(), 2);
		for route in &routes {
			assert_eq!(route.kind, RouteKind::Complex);
			assert_eq!(route.steps.len(), 3);
			assert!(route.validate().is_ok());
		}

		// Scores: b1 = 0.7 * 4 + 0.3 * 14 = 7.0, b2 = 0.7 * 3.5 + 0.3 * 24 = 9.65.
		let first = &routes[0];
		assert_eq!(providers_of(first), vec!["s1", "b1", "s2"]);
		// 100 DAI -> 99 USDC -> 98.01 USDC -> 0.058806 WETH
		assert_eq!(first.target_amount, dec("0.058806"));
		assert_eq!(first.total_cost_usd, dec("4"));
		assert_eq!(first.eta_minutes, 14);
		assert_eq!(providers_of(&routes[1]), vec!["s1", "b2", "s2"]);
	}

	#[tokio::test]
	async fn test_complex_route_skips_intermediate_stages() {
		let swapper = MemoryProvider::new("s1", capabilities(vec![StepKind::Swap])).with_offer(
			("arbitrum", "USDC"),
			("arbitrum", "WETH"),
			dec("0.0005"),
			dec("1"),
			2,
		);
		let engine = engine(
			vec![
				Arc::new(swapper),
				Arc::new(bridge("b1", "USDC", "0.99", "1", 10)),
			],
			RoutingConfig::default(),
		);

		let routes = engine
			.find_routes(&request(("ethereum", "USDC"), ("arbitrum", "WETH"), "100"))
			.await
			.unwrap();

		assert_eq!(routes.len(), 1);
		assert_eq!(routes[0].steps.len(), 2);
		assert_eq!(routes[0].steps[0].kind, StepKind::Bridge);
		assert_eq!(routes[0].steps[1].kind, StepKind::Swap);
	}

	#[tokio::test]
	async fn test_overflowing_eta_drops_only_that_candidate() {
		let swapper = MemoryProvider::new("s1", capabilities(vec![StepKind::Swap])).with_offer(
			("arbitrum", "USDC"),
			("arbitrum", "WETH"),
			dec("0.0005"),
			dec("1"),
			2,
		);
		let engine = engine(
			vec![
				Arc::new(swapper),
				Arc::new(bridge("stuck", "USDC", "0.99", "1", u32::MAX)),
				Arc::new(bridge("b1", "USDC", "0.98", "1", 10)),
			],
			RoutingConfig::default(),
		);

		let routes = engine
			.find_routes(&request(("ethereum", "USDC"), ("arbitrum", "WETH"), "100"))
			.await
			.unwrap();

		assert_eq!(routes.len(), 1);
		assert_eq!(providers_of(&routes[0]), vec!["b1", "s1"]);
		assert_eq!(routes[0].eta_minutes, 12);
	}

	#[tokio::test]
	async fn test_missing_stage_quote_discards_candidate() {
		// No provider swaps into WETH on the target chain.
		let swapper = MemoryProvider::new("s1", capabilities(vec![StepKind::Swap])).with_offer(
			("ethereum", "DAI"),
			("ethereum", "USDC"),
			dec("0.99"),
			dec("2"),
			2,
		);
		let engine = engine(
			vec![
				Arc::new(swapper),
				Arc::new(bridge("b1", "USDC", "0.99", "1", 10)),
			],
			RoutingConfig::default(),
		);

		let routes = engine
			.find_routes(&request(("ethereum", "DAI"), ("arbitrum", "WETH"), "100"))
			.await
			.unwrap();
		assert!(routes.is_empty());
	}

	#[tokio::test]
	async fn test_configurable_intermediate_asset() {
		let swapper = MemoryProvider::new("s1", capabilities(vec![StepKind::Swap])).with_offer(
			("ethereum", "DAI"),
			("ethereum", "USDT"),
			dec("1"),
			dec("1"),
			1,
		);
		let engine = engine(
			vec![
				Arc::new(swapper),
				Arc::new(bridge("b1", "USDT", "1", "1", 1)),
			],
			RoutingConfig {
				intermediate_asset: "USDT".to_string(),
				..RoutingConfig::default()
			},
		);

		let routes = engine
			.find_routes(&request(("ethereum", "DAI"), ("arbitrum", "USDT"), "10"))
			.await
			.unwrap();
		assert_eq!(routes.len(), 1);
		assert_eq!(routes[0].kind, RouteKind::Complex);
		assert_eq!(providers_of(&routes[0]), vec!["s1", "b1"]);
	}

	#[tokio::test]
	async fn test_cross_chain_swap_needs_capability() {
		let mut caps = capabilities(vec![StepKind::Swap]);
		caps.cross_chain_swaps = true;
		let cross = MemoryProvider::new("x1", caps).with_offer(
			("ethereum", "DAI"),
			("arbitrum", "WETH"),
			dec("0.0005"),
			dec("4"),
			6,
		);
		let local_only = MemoryProvider::new("s1", capabilities(vec![StepKind::Swap])).with_offer(
			("ethereum", "DAI"),
			("arbitrum", "WETH"),
			dec("0.0006"),
			dec("1"),
			1,
		);
		let engine = engine(
			vec![Arc::new(local_only), Arc::new(cross)],
			RoutingConfig::default(),
		);

		let routes = engine
			.find_routes(&request(("ethereum", "DAI"), ("arbitrum", "WETH"), "100"))
			.await
			.unwrap();
		assert_eq!(routes.len(), 1);
		assert_eq!(routes[0].kind, RouteKind::Swap);
		assert_eq!(providers_of(&routes[0]), vec!["x1"]);
	}

	#[tokio::test]
	async fn test_ranking_preferences() {
		let engine = engine(
			vec![
				Arc::new(bridge("cheap-slow", "USDT", "0.99", "1", 30)),
				Arc::new(bridge("pricey-fast", "USDT", "0.99", "5", 2)),
				Arc::new(bridge("balanced", "USDT", "0.99", "2", 5)),
			],
			RoutingConfig::default(),
		);
		let mut req = request(("ethereum", "USDT"), ("arbitrum", "USDT"), "100");

		// Scores: 0.7 + 9 = 9.7, 3.5 + 0.6 = 4.1, 1.4 + 1.5 = 2.9.
		let ranked = engine.find_routes(&req).await.unwrap();
		let order = ranked.iter().flat_map(providers_of).collect::<Vec<_>>();
		assert_eq!(order, vec!["balanced", "pricey-fast", "cheap-slow"]);

		req.options.prefer_speed = true;
		let ranked = engine.find_routes(&req).await.unwrap();
		let order = ranked.iter().flat_map(providers_of).collect::<Vec<_>>();
		assert_eq!(order, vec!["pricey-fast", "balanced", "cheap-slow"]);

		req.options.prefer_low_fees = true;
		let ranked = engine.find_routes(&req).await.unwrap();
		let order = ranked.iter().flat_map(providers_of).collect::<Vec<_>>();
		assert_eq!(order, vec!["cheap-slow", "balanced", "pricey-fast"]);
	}

	#[tokio::test]
	async fn test_ranking_ties_keep_registration_order() {
		let engine = engine(
			vec![
				Arc::new(bridge("first", "USDT", "0.99", "1", 5)),
				Arc::new(bridge("second", "USDT", "0.98", "1", 5)),
				Arc::new(bridge("third", "USDT", "0.97", "1", 5)),
			],
			RoutingConfig::default(),
		);
		let routes = engine
			.find_routes(&request(("ethereum", "USDT"), ("arbitrum", "USDT"), "100"))
			.await
			.unwrap();
		let order = routes.iter().flat_map(providers_of).collect::<Vec<_>>();
		assert_eq!(order, vec!["first", "second", "third"]);
	}

	#[tokio::test]
	async fn test_bridges_disabled() {
		let engine = engine(
			vec![Arc::new(bridge("b1", "USDT", "0.99", "1", 5))],
			RoutingConfig::default(),
		);
		let mut req = request(("ethereum", "USDT"), ("arbitrum", "USDT"), "100");
		req.options.include_bridges = false;
		assert!(engine.find_routes(&req).await.unwrap().is_empty());
	}
}

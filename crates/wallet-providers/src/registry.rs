//! Ordered collection of provider adapters.
//!
//! Registration order is significant: the route engine visits providers in
//! this order, and ties in ranking keep it.

use crate::{ProviderAdapter, ProviderError, QuoteRequest};
use std::{fmt, sync::Arc};
use tracing::info;

#[derive(Default)]
pub struct ProviderRegistry {
	providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, provider: Arc<dyn ProviderAdapter>) -> Result<(), ProviderError> {
		if self.get(provider.id()).is_some() {
			return Err(ProviderError::AlreadyRegistered(provider.id().to_string()));
		}
		info!(provider = provider.id(), "Registering provider");
		self.providers.push(provider);
		Ok(())
	}

	pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
		self.providers
			.iter()
			.find(|provider| provider.id() == id)
			.cloned()
	}

	/// Providers whose capabilities cover the request, in registration order.
	pub fn capable(&self, request: &QuoteRequest) -> Vec<Arc<dyn ProviderAdapter>> {
		self.providers
			.iter()
			.filter(|provider| provider.capabilities().covers(request))
			.cloned()
			.collect()
	}

	pub fn ids(&self) -> Vec<&str> {
		self.providers.iter().map(|provider| provider.id()).collect()
	}

	pub fn len(&self) -> usize {
		self.providers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.providers.is_empty()
	}
}

impl fmt::Debug for ProviderRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderRegistry")
			.field("providers", &self.ids())
			.finish()
	}
}

use thiserror::Error;
use wallet_chains::ChainError;
use wallet_config::ConfigError;
use wallet_providers::ProviderError;
use wallet_storage::StorageError;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Service initialization error: {0}")]
	ServiceInit(String),

	#[error("Lifecycle error: {0}")]
	Lifecycle(String),

	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl From<ConfigError> for CoreError {
	fn from(error: ConfigError) -> Self {
		Self::Configuration(error.to_string())
	}
}

impl From<ChainError> for CoreError {
	fn from(error: ChainError) -> Self {
		Self::ServiceInit(format!("Failed to register chain: {}", error))
	}
}

impl From<ProviderError> for CoreError {
	fn from(error: ProviderError) -> Self {
		Self::ServiceInit(format!("Failed to register provider: {}", error))
	}
}

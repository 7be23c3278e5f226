//! Configuration loading for the wallet engine.
//!
//! Configuration is read from a TOML, JSON or YAML file (chosen by
//! extension), with `${VAR}` references substituted from the environment,
//! then overridden by `WALLET_`-prefixed variables and validated.

use regex::Regex;
use rust_decimal::Decimal;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub mod types;

pub use types::{StorageBackend, StorageConfig, WalletConfig, WalletSettings};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Smallest fee multiplier a replacement may use to be accepted by nodes.
const MIN_REPLACEMENT_MULTIPLIER: Decimal = Decimal::from_parts(11, 0, 0, false, 1);

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "WALLET_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Loads the file (or defaults when none is set), applies environment
	/// overrides and validates the result.
	pub async fn load(&self) -> Result<WalletConfig, ConfigError> {
		let mut config = match &self.file_path {
			Some(path) => self.load_from_file(path).await?,
			None => {
				debug!("No configuration file, using defaults");
				WalletConfig::default()
			}
		};

		self.apply_env_overrides(&mut config)?;
		validate(&config)?;
		Ok(config)
	}

	async fn load_from_file(&self, path: &Path) -> Result<WalletConfig, ConfigError> {
		info!("Loading configuration from {:?}", path);
		if !tokio::fs::try_exists(path).await? {
			return Err(ConfigError::FileNotFound(path.display().to_string()));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let content = substitute_env_vars(&content)?;

		match path.extension().and_then(|ext| ext.to_str()) {
			Some("toml") | None => from_toml(&content),
			Some("json") => from_json(&content),
			Some("yaml") | Some("yml") => from_yaml(&content),
			Some(other) => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				other
			))),
		}
	}

	fn apply_env_overrides(&self, config: &mut WalletConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.wallet.log_level = log_level;
		}

		if let Ok(path) = env::var(format!("{}STORAGE_PATH", self.env_prefix)) {
			debug!("Overriding storage path from environment");
			config.storage.path = PathBuf::from(path);
		}

		if let Ok(interval) = env::var(format!("{}MONITOR_INTERVAL_SECS", self.env_prefix)) {
			config.monitor.interval_secs = interval.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid monitor interval: {}", e))
			})?;
		}

		Ok(())
	}
}

pub fn from_toml(content: &str) -> Result<WalletConfig, ConfigError> {
	toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

pub fn from_json(content: &str) -> Result<WalletConfig, ConfigError> {
	serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

pub fn from_yaml(content: &str) -> Result<WalletConfig, ConfigError> {
	serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Replaces `${VAR}` with the variable's value, or `${VAR:-fallback}` with
/// the fallback when the variable is unset.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
		.map_err(|e| ConfigError::ParseError(e.to_string()))?;

	let mut result = String::with_capacity(content.len());
	let mut last = 0;
	for cap in re.captures_iter(content) {
		let Some(full_match) = cap.get(0) else {
			continue;
		};
		let var_name = &cap[1];
		let value = match (env::var(var_name), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(fallback)) => fallback.as_str().to_string(),
			(Err(_), None) => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
		};

		result.push_str(&content[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&content[last..]);
	Ok(result)
}

/// Checks invariants the engine relies on.
pub fn validate(config: &WalletConfig) -> Result<(), ConfigError> {
	let invalid = |message: String| Err(ConfigError::ValidationError(message));

	if config.wallet.event_capacity == 0 {
		return invalid("wallet.event_capacity must be positive".to_string());
	}

	for (name, value) in [
		("monitor.interval_secs", config.monitor.interval_secs),
		("monitor.rpc_timeout_secs", config.monitor.rpc_timeout_secs),
		("monitor.drop_timeout_secs", config.monitor.drop_timeout_secs),
		("tracker.interval_secs", config.tracker.interval_secs),
		("routing.provider_timeout_ms", config.routing.provider_timeout_ms),
	] {
		if value == 0 {
			return invalid(format!("{} must be positive", name));
		}
	}

	if config.routing.cost_weight < Decimal::ZERO || config.routing.eta_weight < Decimal::ZERO {
		return invalid("routing weights must not be negative".to_string());
	}
	if config.routing.intermediate_asset.trim().is_empty() {
		return invalid("routing.intermediate_asset must not be empty".to_string());
	}

	if config.gas.replacement_fee_multiplier < MIN_REPLACEMENT_MULTIPLIER {
		return invalid(format!(
			"gas.replacement_fee_multiplier must be at least {}, got {}",
			MIN_REPLACEMENT_MULTIPLIER, config.gas.replacement_fee_multiplier
		));
	}
	for (name, tier) in [
		("slow", &config.gas.slow),
		("standard", &config.gas.standard),
		("fast", &config.gas.fast),
	] {
		if tier.multiplier <= Decimal::ZERO {
			return invalid(format!("gas.{}.multiplier must be positive", name));
		}
	}
	if config
		.gas
		.usd_prices
		.iter()
		.any(|(_, price)| *price < Decimal::ZERO)
	{
		return invalid("gas.usd_prices must not be negative".to_string());
	}

	for (chain, settings) in &config.chains {
		if settings.required_confirmations == 0 {
			return invalid(format!(
				"chains.{}.required_confirmations must be at least 1",
				chain
			));
		}
		if settings.transfer_gas_limit == 0 {
			return invalid(format!("chains.{}.transfer_gas_limit must be positive", chain));
		}
	}

	Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_config::{ConfigLoader, WalletConfig};
use wallet_core::{WalletBuilder, WalletEngine};
use wallet_types::ChainId;

#[derive(Parser)]
#[command(name = "wallet-engine")]
#[command(about = "Multi-chain wallet transaction and routing engine", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Path to configuration file
	#[arg(short, long, value_name = "FILE", default_value = "config/wallet.toml")]
	config: PathBuf,

	/// Log level used when RUST_LOG is not set
	#[arg(long, env = "WALLET_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Validate the configuration file
	Validate,
	/// List persisted in-flight transactions
	Pending {
		/// Only show transactions on this chain
		#[arg(long)]
		chain: Option<String>,
	},
	/// List persisted crosschain transactions
	Crosschain {
		/// Only show records that are not terminal yet
		#[arg(long)]
		active: bool,
	},
	/// Write the default configuration as TOML
	GenerateConfig {
		#[arg(short, long, default_value = "wallet.toml")]
		output: PathBuf,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match &cli.command {
		Commands::Validate => validate_config(&cli).await,
		Commands::Pending { chain } => list_pending(&cli, chain.as_deref()).await,
		Commands::Crosschain { active } => list_crosschain(&cli, *active).await,
		Commands::GenerateConfig { output } => generate_config(output).await,
	}
}

async fn load_config(cli: &Cli) -> Result<WalletConfig> {
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")
}

/// Builds an engine over the configured storage and reloads its state.
///
/// No chain clients are attached, so the engine is only used to read.
async fn restored_engine(cli: &Cli) -> Result<WalletEngine> {
	let config = load_config(cli).await?;
	let engine = WalletBuilder::new(config)
		.build()
		.context("Failed to build wallet engine")?;
	engine
		.restore()
		.await
		.context("Failed to restore persisted state")?;
	Ok(engine)
}

async fn validate_config(cli: &Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);
	let config = load_config(cli).await?;

	info!("Configuration is valid");
	info!("Wallet name: {}", config.wallet.name);
	info!("Storage: {:?} at {:?}", config.storage.backend, config.storage.path);
	info!("Intermediate asset: {}", config.routing.intermediate_asset);

	let mut chains = config.chains.iter().collect::<Vec<_>>();
	chains.sort_by(|a, b| a.0.cmp(b.0));
	for (chain, settings) in chains {
		info!(
			"  Chain: {} ({}, {} confirmation(s))",
			chain, settings.native_asset, settings.required_confirmations
		);
	}

	Ok(())
}

async fn list_pending(cli: &Cli, chain: Option<&str>) -> Result<()> {
	let engine = restored_engine(cli).await?;
	let chain = chain.map(ChainId::from);

	let pending = engine
		.state_machine()
		.list()
		.await
		.into_iter()
		.filter(|tx| tx.status.is_in_flight())
		.filter(|tx| chain.as_ref().map_or(true, |chain| &tx.chain == chain))
		.collect::<Vec<_>>();

	info!("{} in-flight transaction(s)", pending.len());
	println!(
		"{}",
		serde_json::to_string_pretty(&pending).context("Failed to serialize transactions")?
	);
	Ok(())
}

async fn list_crosschain(cli: &Cli, active: bool) -> Result<()> {
	let engine = restored_engine(cli).await?;

	let records = engine
		.tracker()
		.list()
		.await
		.into_iter()
		.filter(|record| !active || !record.is_terminal())
		.collect::<Vec<_>>();

	info!("{} crosschain transaction(s)", records.len());
	println!(
		"{}",
		serde_json::to_string_pretty(&records).context("Failed to serialize records")?
	);
	Ok(())
}

async fn generate_config(output: &PathBuf) -> Result<()> {
	let content = toml::to_string_pretty(&WalletConfig::default())
		.context("Failed to serialize default configuration")?;
	tokio::fs::write(output, content)
		.await
		.with_context(|| format!("Failed to write {:?}", output))?;

	info!("Wrote default configuration to {:?}", output);
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
		.context("Invalid log level")?;

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn test_cli_definition() {
		Cli::command().debug_assert();
	}

	#[test]
	fn test_parse_commands() {
		let cli = Cli::parse_from(["wallet-engine", "--config", "w.toml", "pending", "--chain", "polygon"]);
		assert_eq!(cli.config, PathBuf::from("w.toml"));
		assert!(matches!(cli.command, Commands::Pending { chain: Some(ref c) } if c == "polygon"));

		let cli = Cli::parse_from(["wallet-engine", "crosschain", "--active"]);
		assert!(matches!(cli.command, Commands::Crosschain { active: true }));
	}

	#[tokio::test]
	async fn test_generated_config_loads() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("wallet.toml");
		generate_config(&path).await.unwrap();

		let config = ConfigLoader::new()
			.with_file(&path)
			.with_env_prefix("WALLET_GENERATED_TEST_")
			.load()
			.await
			.unwrap();
		assert_eq!(config, WalletConfig::default());
	}
}

//! Wiring of the wallet engine.
//!
//! [`WalletBuilder`] assembles every component from a [`WalletConfig`] and
//! the injected collaborators. The resulting [`WalletEngine`] owns all state
//! and runs the reconciliation loops and the persistence task once started.
//!
//! [`WalletConfig`]: wallet_config::WalletConfig

pub mod engine;
pub mod error;
pub mod persistence;
pub mod scheduler;

pub use engine::{EngineState, RestoreSummary, WalletBuilder, WalletEngine};
pub use error::CoreError;
pub use persistence::{Persistence, CROSSCHAIN_NAMESPACE, TRANSACTIONS_NAMESPACE};
pub use scheduler::Scheduler;

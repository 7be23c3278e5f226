//! Shared data model for the wallet engine.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! chain and asset identifiers, the lifecycle-tracked [`Transaction`], fee
//! quotes, ranked [`Route`]s and the [`CrosschainTransaction`] execution record,
//! plus the event bus used to publish state transitions.

pub mod chain;
pub mod clock;
pub mod crosschain;
pub mod events;
pub mod route;
pub mod transaction;

pub use chain::*;
pub use clock::*;
pub use crosschain::*;
pub use events::*;
pub use route::*;
pub use transaction::*;

/// Decimal type used for every amount and USD value.
pub use rust_decimal::Decimal;

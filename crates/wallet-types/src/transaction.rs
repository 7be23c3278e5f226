//! Lifecycle-tracked on-chain transaction types.
//!
//! A [`Transaction`] is one logical on-chain operation. It is created locally,
//! signed through the external signer, broadcast, and then reconciled against
//! the chain until it reaches a terminal [`TransactionStatus`].

use crate::{Address, Asset, ChainId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier.
///
/// Holds a locally generated id until the transaction is broadcast, after
/// which it is replaced by the network hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

const LOCAL_PREFIX: &str = "local-";

impl TransactionId {
	/// Generates a fresh local (pre-broadcast) id.
	pub fn local() -> Self {
		Self(format!("{}{}", LOCAL_PREFIX, uuid::Uuid::new_v4()))
	}

	pub fn is_local(&self) -> bool {
		self.0.starts_with(LOCAL_PREFIX)
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TransactionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for TransactionId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
	/// Built locally, nonce and fee assigned.
	Created,
	/// Signed by the external signer, not yet accepted by the network.
	Signed,
	/// Accepted by the network, awaiting inclusion.
	Pending,
	/// Seen in a block but not yet final.
	Confirming,
	Confirmed,
	Failed,
	Replaced,
	Cancelled,
}

impl TransactionStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			Self::Confirmed | Self::Failed | Self::Replaced | Self::Cancelled
		)
	}

	/// Whether the transaction has reached the network and is still live.
	pub fn is_in_flight(&self) -> bool {
		matches!(self, Self::Pending | Self::Confirming)
	}

	/// Forward-only transition table.
	pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
		use TransactionStatus::*;
		matches!(
			(self, next),
			(Created, Signed)
				| (Created, Cancelled)
				| (Signed, Pending)
				| (Signed, Cancelled)
				| (Pending, Confirming)
				| (Pending, Confirmed)
				| (Pending, Failed)
				| (Pending, Replaced)
				| (Pending, Cancelled)
				| (Confirming, Confirmed)
				| (Confirming, Failed)
				| (Confirming, Replaced)
		)
	}
}

impl fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			Self::Created => "CREATED",
			Self::Signed => "SIGNED",
			Self::Pending => "PENDING",
			Self::Confirming => "CONFIRMING",
			Self::Confirmed => "CONFIRMED",
			Self::Failed => "FAILED",
			Self::Replaced => "REPLACED",
			Self::Cancelled => "CANCELLED",
		};
		write!(f, "{}", label)
	}
}

/// Urgency tier for fee estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasTier {
	Slow,
	#[default]
	Standard,
	Fast,
}

/// Per-gas pricing, in the chain's smallest native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePricing {
	Legacy {
		gas_price: u128,
	},
	Eip1559 {
		max_fee_per_gas: u128,
		max_priority_fee_per_gas: u128,
	},
}

/// Fee quote attached to a transaction. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasQuote {
	pub tier: GasTier,
	pub pricing: FeePricing,
	pub gas_limit: u64,
	/// Expected cost in native units (e.g. ETH, not wei).
	pub native_amount: Decimal,
	pub usd_amount: Decimal,
	pub eta_minutes: u32,
}

/// What a transaction is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
	Transfer,
	/// Zero-value self-transfer competing for the nonce of `original`.
	Cancellation { original: TransactionId },
	/// Same transfer as `original` at a higher fee.
	SpeedUp { original: TransactionId },
}

impl TransactionKind {
	/// The transaction this one is meant to replace, if any.
	pub fn original(&self) -> Option<&TransactionId> {
		match self {
			Self::Transfer => None,
			Self::Cancellation { original } | Self::SpeedUp { original } => Some(original),
		}
	}

	/// Reason recorded on the transaction this one displaces.
	pub fn replacement_reason(&self) -> ReplacementReason {
		match self {
			Self::Transfer => ReplacementReason::Superseded,
			Self::Cancellation { .. } => ReplacementReason::Cancelled,
			Self::SpeedUp { .. } => ReplacementReason::SpedUp,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementReason {
	Cancelled,
	SpedUp,
	Superseded,
}

/// Points at the transaction that took this one's nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
	pub id: TransactionId,
	pub reason: ReplacementReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
	pub number: u64,
	pub confirmations: u64,
}

/// (chain, sender, nonce) slot a transaction competes for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonceKey {
	pub chain: ChainId,
	pub from: Address,
	pub nonce: u64,
}

/// One logical on-chain operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	pub id: TransactionId,
	/// Id assigned at build time; stays stable across broadcast.
	pub local_id: TransactionId,
	pub chain: ChainId,
	pub from: Address,
	pub to: Address,
	pub amount: Decimal,
	pub asset: Asset,
	/// Hex-encoded calldata for contract interactions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
	pub nonce: u64,
	pub fee: GasQuote,
	pub status: TransactionStatus,
	pub kind: TransactionKind,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
	#[serde(default)]
	pub broadcast_at: Option<Timestamp>,
	#[serde(default)]
	pub finalized_at: Option<Timestamp>,
	#[serde(default)]
	pub block: Option<BlockRef>,
	/// Realized fee in native units once a receipt is known.
	#[serde(default)]
	pub realized_fee: Option<Decimal>,
	#[serde(default)]
	pub replacement: Option<Replacement>,
	#[serde(default)]
	pub failure_reason: Option<String>,
}

impl Transaction {
	pub fn nonce_key(&self) -> NonceKey {
		NonceKey {
			chain: self.chain.clone(),
			from: self.from.clone(),
			nonce: self.nonce,
		}
	}

	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// Canonical bytes handed to the signer.
	///
	/// Covers every field that affects on-chain semantics; local bookkeeping
	/// (status, timestamps) is excluded so re-serializing an unchanged
	/// transaction always yields the same payload.
	pub fn unsigned_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
		#[derive(Serialize)]
		struct Unsigned<'a> {
			chain: &'a ChainId,
			from: &'a Address,
			to: &'a Address,
			amount: &'a Decimal,
			asset: &'a Asset,
			data: &'a Option<String>,
			nonce: u64,
			pricing: &'a FeePricing,
			gas_limit: u64,
		}

		serde_json::to_vec(&Unsigned {
			chain: &self.chain,
			from: &self.from,
			to: &self.to,
			amount: &self.amount,
			asset: &self.asset,
			data: &self.data,
			nonce: self.nonce,
			pricing: &self.fee.pricing,
			gas_limit: self.fee.gas_limit,
		})
	}
}

/// Request to build a transfer (or contract call) on one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
	pub chain: ChainId,
	pub from: Address,
	pub to: Address,
	pub amount: Decimal,
	pub asset: Asset,
	#[serde(default)]
	pub data: Option<String>,
	/// Explicit nonce; resolved from the chain when absent.
	#[serde(default)]
	pub nonce: Option<u64>,
	/// Explicit fee; estimated when absent.
	#[serde(default)]
	pub fee: Option<GasQuote>,
	#[serde(default)]
	pub tier: Option<GasTier>,
	#[serde(default)]
	pub gas_limit: Option<u64>,
}

impl TransferRequest {
	pub fn new(
		chain: ChainId,
		from: Address,
		to: Address,
		amount: Decimal,
		asset: Asset,
	) -> Self {
		Self {
			chain,
			from,
			to,
			amount,
			asset,
			data: None,
			nonce: None,
			fee: None,
			tier: None,
			gas_limit: None,
		}
	}

	pub fn with_nonce(mut self, nonce: u64) -> Self {
		self.nonce = Some(nonce);
		self
	}

	pub fn with_fee(mut self, fee: GasQuote) -> Self {
		self.fee = Some(fee);
		self
	}

	pub fn with_tier(mut self, tier: GasTier) -> Self {
		self.tier = Some(tier);
		self
	}

	pub fn with_data(mut self, data: impl Into<String>) -> Self {
		self.data = Some(data.into());
		self
	}

	pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
		self.gas_limit = Some(gas_limit);
		self
	}
}

/// Signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
	/// Id of the transaction the payload was produced for.
	pub transaction_id: TransactionId,
	pub chain: ChainId,
	/// Hex-encoded signed payload.
	pub payload: String,
}

impl SignedTransaction {
	pub fn new(transaction_id: TransactionId, chain: ChainId, payload: &[u8]) -> Self {
		Self {
			transaction_id,
			chain,
			payload: hex::encode(payload),
		}
	}

	pub fn payload_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
		hex::decode(&self.payload)
	}
}

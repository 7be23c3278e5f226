//! Execution record of a selected route.

use crate::{Route, StepKind, Timestamp, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegStatus {
	/// Not started yet.
	Waiting,
	/// Accepted by the network or provider, not complete.
	Pending,
	Confirmed,
	Failed,
	/// Never started because an earlier leg failed.
	Skipped,
}

impl LegStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Confirmed | Self::Failed | Self::Skipped)
	}
}

/// One execution unit, corresponding to one route step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
	pub step_index: usize,
	pub kind: StepKind,
	#[serde(default)]
	pub provider_id: Option<String>,
	/// Provider-side execution reference.
	#[serde(default)]
	pub provider_ref: Option<String>,
	/// On-chain transaction submitted for this leg, if any.
	#[serde(default)]
	pub onchain_tx_id: Option<TransactionId>,
	pub status: LegStatus,
	#[serde(default)]
	pub input_amount: Option<Decimal>,
	#[serde(default)]
	pub output_amount: Option<Decimal>,
	#[serde(default)]
	pub error: Option<String>,
}

impl Leg {
	pub fn waiting(step_index: usize, kind: StepKind, provider_id: Option<String>) -> Self {
		Self {
			step_index,
			kind,
			provider_id,
			provider_ref: None,
			onchain_tx_id: None,
			status: LegStatus::Waiting,
			input_amount: None,
			output_amount: None,
			error: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrosschainStatus {
	Pending,
	Confirmed,
	Failed,
}

impl CrosschainStatus {
	/// Aggregate status derived purely from leg statuses.
	///
	/// Any failed leg fails the whole operation; otherwise it stays pending
	/// while any leg is unfinished and confirms once every leg confirmed.
	pub fn from_legs(legs: &[Leg]) -> Self {
		if legs.iter().any(|leg| leg.status == LegStatus::Failed) {
			Self::Failed
		} else if legs.iter().any(|leg| !leg.status.is_terminal()) {
			Self::Pending
		} else if legs.iter().all(|leg| leg.status == LegStatus::Confirmed) {
			Self::Confirmed
		} else {
			// Skipped legs only exist next to a failed one.
			Self::Failed
		}
	}

	pub fn is_terminal(&self) -> bool {
		!matches!(self, Self::Pending)
	}
}

impl fmt::Display for CrosschainStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			Self::Pending => "PENDING",
			Self::Confirmed => "CONFIRMED",
			Self::Failed => "FAILED",
		};
		write!(f, "{}", label)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosschainTransaction {
	pub id: String,
	pub route: Route,
	pub legs: Vec<Leg>,
	pub status: CrosschainStatus,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
	#[serde(default)]
	pub completed_at: Option<Timestamp>,
}

impl CrosschainTransaction {
	/// New record with one waiting leg per route step.
	pub fn new(route: Route, now: Timestamp) -> Self {
		let legs = route
			.steps
			.iter()
			.enumerate()
			.map(|(index, step)| Leg::waiting(index, step.kind, step.provider_id.clone()))
			.collect::<Vec<_>>();
		let status = CrosschainStatus::from_legs(&legs);

		Self {
			id: uuid::Uuid::new_v4().to_string(),
			route,
			legs,
			status,
			created_at: now,
			updated_at: now,
			completed_at: None,
		}
	}

	/// Recomputes the aggregate status; returns true if it changed.
	pub fn refresh_status(&mut self, now: Timestamp) -> bool {
		let status = CrosschainStatus::from_legs(&self.legs);
		if status == self.status {
			return false;
		}
		self.status = status;
		self.updated_at = now;
		if status.is_terminal() {
			self.completed_at = Some(now);
		}
		true
	}

	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}
}

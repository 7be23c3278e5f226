//! Time source abstraction.
//!
//! Everything that stamps or compares timestamps (drop detection, leg
//! completion) reads time through a [`Clock`] so tests can advance time
//! without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

pub trait Clock: Send + Sync {
	/// Current unix time in seconds.
	fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Timestamp {
		chrono::Utc::now().timestamp().max(0) as u64
	}
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
	now: AtomicU64,
}

impl ManualClock {
	pub fn new(start: Timestamp) -> Arc<Self> {
		Arc::new(Self {
			now: AtomicU64::new(start),
		})
	}

	pub fn advance(&self, seconds: u64) {
		self.now.fetch_add(seconds, Ordering::SeqCst);
	}

	pub fn set(&self, timestamp: Timestamp) {
		self.now.store(timestamp, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Timestamp {
		self.now.load(Ordering::SeqCst)
	}
}

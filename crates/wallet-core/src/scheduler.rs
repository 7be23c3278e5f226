//! Repeating background tasks with a shared shutdown signal.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Runs periodic jobs until [`shutdown`](Scheduler::shutdown) is called.
///
/// A job never overlaps with itself: the next tick waits for the previous
/// run to finish. Shutdown lets a running job complete before its task ends.
pub struct Scheduler {
	shutdown_tx: broadcast::Sender<()>,
	tasks: Mutex<JoinSet<()>>,
}

impl Scheduler {
	pub fn new() -> Self {
		let (shutdown_tx, _) = broadcast::channel(16);
		Self {
			shutdown_tx,
			tasks: Mutex::new(JoinSet::new()),
		}
	}

	pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
		self.shutdown_tx.subscribe()
	}

	/// Runs `job` every `period`, the first time immediately.
	pub async fn spawn_repeating<F, Fut>(&self, name: &'static str, period: Duration, job: F)
	where
		F: Fn() -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let mut shutdown_rx = self.subscribe_shutdown();
		self.tasks.lock().await.spawn(async move {
			let mut ticker = tokio::time::interval(period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			info!(task = name, period_ms = period.as_millis() as u64, "Scheduled task started");

			loop {
				tokio::select! {
					_ = ticker.tick() => {
						debug!(task = name, "Running scheduled task");
						job().await;
					}
					_ = shutdown_rx.recv() => {
						info!(task = name, "Scheduled task received shutdown signal");
						break;
					}
				}
			}
		});
	}

	/// Spawns a long-running task that is handed the shutdown signal.
	pub async fn spawn<F, Fut>(&self, task: F)
	where
		F: FnOnce(broadcast::Receiver<()>) -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let shutdown_rx = self.subscribe_shutdown();
		self.tasks.lock().await.spawn(task(shutdown_rx));
	}

	pub async fn task_count(&self) -> usize {
		self.tasks.lock().await.len()
	}

	/// Signals every task and waits for all of them to finish.
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut tasks = self.tasks.lock().await;
		while let Some(result) = tasks.join_next().await {
			if let Err(e) = result {
				warn!("Scheduled task ended abnormally: {}", e);
			}
		}
	}
}

impl Default for Scheduler {
	fn default() -> Self {
		Self::new()
	}
}

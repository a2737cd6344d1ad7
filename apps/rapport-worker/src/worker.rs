use std::time::Duration as StdDuration;

use color_eyre::Result;
use time::OffsetDateTime;
use tokio::{signal, time as tokio_time};

use rapport_config::Worker;
use rapport_service::RapportService;
use rapport_storage::counters;

/// Runs the scheduler, the memory and proactivity sweeps, and the counter purge on their own
/// timers until ctrl-c. Each loop finishes a run before sleeping, so slow runs never overlap.
pub async fn run_worker(service: &RapportService) -> Result<()> {
	let intervals = Intervals::from_config(&service.cfg.worker);

	tracing::info!(
		scheduler_secs = intervals.scheduler.as_secs(),
		sweep_secs = intervals.sweep.as_secs(),
		purge_secs = intervals.purge.as_secs(),
		"Worker started."
	);

	tokio::select! {
		_ = scheduler_loop(service, intervals.scheduler) => {},
		_ = sweep_loop(service, intervals.sweep) => {},
		_ = purge_loop(service, intervals.purge) => {},
		signal = signal::ctrl_c() => {
			signal?;

			tracing::info!("Shutdown signal received; worker stopping.");
		},
	}

	Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Intervals {
	scheduler: StdDuration,
	sweep: StdDuration,
	purge: StdDuration,
}
impl Intervals {
	fn from_config(cfg: &Worker) -> Self {
		Self {
			scheduler: StdDuration::from_secs(cfg.scheduler_tick_seconds.max(1)),
			sweep: StdDuration::from_secs(cfg.sweep_tick_seconds.max(1)),
			purge: StdDuration::from_secs(cfg.counter_purge_interval_seconds.max(1)),
		}
	}
}

async fn scheduler_loop(service: &RapportService, every: StdDuration) {
	loop {
		if let Err(err) = service.run_scheduler_tick(OffsetDateTime::now_utc()).await {
			tracing::error!(error = %err, "Scheduler tick failed.");
		}

		tokio_time::sleep(every).await;
	}
}

async fn sweep_loop(service: &RapportService, every: StdDuration) {
	loop {
		let now = OffsetDateTime::now_utc();

		if let Err(err) = service.run_memory_sweep(now).await {
			tracing::error!(error = %err, "Memory sweep failed.");
		}
		if let Err(err) = service.run_proactivity_sweep(now).await {
			tracing::error!(error = %err, "Proactivity sweep failed.");
		}

		tokio_time::sleep(every).await;
	}
}

async fn purge_loop(service: &RapportService, every: StdDuration) {
	loop {
		match counters::purge_expired(&service.db.pool, OffsetDateTime::now_utc()).await {
			Ok(0) => {},
			Ok(purged) => tracing::info!(purged, "Expired send counters purged."),
			Err(err) => tracing::error!(error = %err, "Send counter purge failed."),
		}

		tokio_time::sleep(every).await;
	}
}

use time::OffsetDateTime;

use crate::{Error, ExecutionOutcome, RapportService, Result};
use rapport_config::ProactivitySettings;
use rapport_domain::{
	quiet_hours::QuietHours,
	send_pool::{self, SendPool},
};
use rapport_storage::{actions, counters, directory, models::PendingAction};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleDecision {
	/// Inside the user's quiet window; left pending for a later tick.
	QuietHours,
	/// The pool's daily cap is used up; left pending until the UTC day rolls over.
	CapReached { pool: SendPool, sent: u32, cap: u32 },
	/// Another worker holds the lease, or the action left the queue meanwhile.
	Busy,
	Dispatched(ExecutionOutcome),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerReport {
	pub examined: usize,
	pub sent: usize,
	pub deferred: usize,
	pub cancelled: usize,
	pub failed: usize,
}

impl RapportService {
	/// Walks the pending queue oldest first and hands every sendable action to the executor.
	pub async fn run_scheduler_tick(&self, now: OffsetDateTime) -> Result<SchedulerReport> {
		let settings = self.settings.load().await?;

		if !settings.enabled {
			tracing::debug!("Proactivity disabled; skipping scheduler tick.");

			return Ok(SchedulerReport::default());
		}

		let quiet = QuietHours::from_settings(&settings);

		if quiet.is_none() {
			tracing::warn!("Quiet hours are not valid HH:MM values; ignoring them.");
		}

		let pending = actions::list_pending(
			&self.db.pool,
			now,
			i64::from(self.cfg.worker.sweep_batch_size),
		)
		.await?;
		let mut report = SchedulerReport { examined: pending.len(), ..Default::default() };

		for action in pending {
			match self.schedule_action(&action, &settings, quiet, now).await {
				Ok(ScheduleDecision::Dispatched(ExecutionOutcome::Sent { .. })) => report.sent += 1,
				Ok(ScheduleDecision::Dispatched(ExecutionOutcome::Cancelled)) =>
					report.cancelled += 1,
				Ok(ScheduleDecision::Dispatched(ExecutionOutcome::Failed { .. })) =>
					report.failed += 1,
				Ok(_) => report.deferred += 1,
				Err(err) => {
					report.failed += 1;

					tracing::error!(
						action_id = %action.action_id,
						error = %err,
						"Scheduling proactive action failed."
					);

					self.fail_action(&action, &err).await;
				},
			}
		}

		if report.examined > 0 {
			tracing::info!(
				examined = report.examined,
				sent = report.sent,
				deferred = report.deferred,
				cancelled = report.cancelled,
				failed = report.failed,
				"Scheduler tick finished."
			);
		}

		Ok(report)
	}

	/// Applies quiet hours and the daily cap to one action, then claims and executes it.
	pub async fn schedule_action(
		&self,
		action: &PendingAction,
		settings: &ProactivitySettings,
		quiet: Option<QuietHours>,
		now: OffsetDateTime,
	) -> Result<ScheduleDecision> {
		let user = directory::get_user(&self.db.pool, action.user_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("User {} does not exist.", action.user_id) }
		})?;

		if quiet.is_some_and(|window| window.is_quiet_at(now, &user.timezone)) {
			tracing::debug!(
				action_id = %action.action_id,
				timezone = %user.timezone,
				"Deferred proactive action during quiet hours."
			);

			return Ok(ScheduleDecision::QuietHours);
		}

		let pool = SendPool::for_agent(&action.agent_slug, &self.cfg.agents.primary_slug);
		let cap = pool.daily_cap(settings);
		let sent = counters::sent_count(
			&self.db.pool,
			action.user_id,
			pool.as_str(),
			send_pool::utc_day(now),
		)
		.await?;
		let sent = u32::try_from(sent).unwrap_or(0);

		if !send_pool::under_cap(sent, cap) {
			tracing::debug!(
				action_id = %action.action_id,
				pool = pool.as_str(),
				sent,
				cap,
				"Deferred proactive action at the daily cap."
			);

			return Ok(ScheduleDecision::CapReached { pool, sent, cap });
		}

		let Some(claimed) = actions::claim_action(
			&self.db.pool,
			action.action_id,
			now,
			self.cfg.worker.claim_lease_seconds,
		)
		.await?
		else {
			return Ok(ScheduleDecision::Busy);
		};
		let outcome = self.execute_action(&claimed, now).await?;

		Ok(ScheduleDecision::Dispatched(outcome))
	}

	pub(crate) async fn fail_action(&self, action: &PendingAction, err: &Error) {
		let reason = crate::sanitize_error(&err.to_string());

		if let Err(mark_err) = actions::mark_failed(&self.db.pool, action.action_id, &reason).await {
			tracing::error!(
				action_id = %action.action_id,
				error = %mark_err,
				"Failed to mark proactive action as failed."
			);
		}
	}
}

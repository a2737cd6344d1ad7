use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::{
	Error, RapportService, Result, SweepReport,
	consolidation::checkpoints,
	structured::{self, StructuredReply},
};
use rapport_config::ProactivitySettings;
use rapport_domain::{
	antispam,
	message::{self, MessageKind, Role},
	phase::{self, ProactivityPhase},
};
use rapport_providers::llm::{CompletionRequest, PromptMessage};
use rapport_storage::{actions, memories, messages, models::ChatSession, sessions};

const RECENT_TURNS: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionOutcome {
	NotDue(ProactivityPhase),
	/// The agent already sent too many unanswered messages; the model was not asked.
	SpamGuarded { streak: u32 },
	Declined,
	Queued { topic: String },
	/// The model wanted a task but one was already pending for the pair.
	AlreadyQueued,
	/// The user wrote in while the model was deciding; the decision was dropped.
	Superseded,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectionReply {
	create_task: bool,
	#[serde(default)]
	topic: String,
}
impl StructuredReply for DetectionReply {
	fn check(&self) -> Result<(), String> {
		if self.create_task && self.topic.trim().is_empty() {
			return Err("createTask is true but topic is empty.".to_string());
		}

		Ok(())
	}
}

impl RapportService {
	/// One pass of the detector over silent sessions. No-op while proactivity is disabled.
	pub async fn run_proactivity_sweep(&self, now: OffsetDateTime) -> Result<SweepReport> {
		let settings = self.settings.load().await?;

		if !settings.enabled {
			tracing::debug!("Proactivity disabled; skipping detector sweep.");

			return Ok(SweepReport::default());
		}

		let silent_before = now - Duration::seconds(settings.proactivity_timeout_seconds());
		let candidates = sessions::list_proactivity_candidates(
			&self.db.pool,
			silent_before,
			i64::from(self.cfg.worker.sweep_batch_size),
		)
		.await?;
		let mut report = SweepReport { examined: candidates.len(), ..Default::default() };

		for session in candidates {
			match self.detect_for_session(&session, &settings, now).await {
				Ok(DetectionOutcome::NotDue(_) | DetectionOutcome::Superseded) =>
					report.skipped += 1,
				Ok(_) => report.succeeded += 1,
				Err(err) => {
					report.failed += 1;

					tracing::error!(
						session_id = %session.session_id,
						error = %err,
						"Proactivity detection failed."
					);
				},
			}
		}

		if report.examined > 0 {
			tracing::info!(
				examined = report.examined,
				succeeded = report.succeeded,
				failed = report.failed,
				"Proactivity sweep finished."
			);
		}

		Ok(report)
	}

	/// Decides whether the agent should re-engage a silent user. The check timestamp advances on
	/// every completed decision, including a spam guard, but not when the model call fails.
	pub async fn detect_for_session(
		&self,
		session: &ChatSession,
		settings: &ProactivitySettings,
		now: OffsetDateTime,
	) -> Result<DetectionOutcome> {
		let checkpoints = checkpoints(session);
		let timeout = Duration::seconds(settings.proactivity_timeout_seconds());
		let phase = checkpoints.proactivity_phase(now, timeout);

		if phase != ProactivityPhase::Due {
			return Ok(DetectionOutcome::NotDue(phase));
		}

		let history = messages::list_active(&self.db.pool, session.session_id).await?;
		let streak = antispam::trailing_assistant_streak(
			history.iter().filter_map(|message| Role::parse(&message.role)).collect::<Vec<_>>(),
		);

		if antispam::exceeds_streak_limit(streak, settings.max_consecutive_messages) {
			sessions::advance_proactivity_check(&self.db.pool, session.session_id, now).await?;

			tracing::debug!(
				session_id = %session.session_id,
				streak,
				"Skipped proactivity check after unanswered messages."
			);

			return Ok(DetectionOutcome::SpamGuarded { streak });
		}

		let global_profile = memories::get_profile(&self.db.pool, session.user_id)
			.await?
			.map(|memory| memory.profile)
			.unwrap_or_default();
		let turns = history
			.iter()
			.filter(|message| message.kind == MessageKind::Turn.as_str())
			.filter_map(|message| {
				Role::parse(&message.role).map(|role| (role, message.content.as_str()))
			})
			.collect::<Vec<_>>();
		let transcript = message::format_transcript(
			turns[turns.len().saturating_sub(RECENT_TURNS)..].iter().copied(),
		);
		let silence = phase::describe_silence(checkpoints.silence(now));
		let prompt = vec![
			PromptMessage::system(settings.proactivity_prompt.as_str()),
			PromptMessage::user(format!(
				"Shared profile:\n{}\n\nYour notes:\n{}\n\nRecent conversation:\n{}\n\nThe user has been silent for {silence}.",
				crate::or_none(&global_profile),
				crate::or_none(&session.local_memory),
				crate::or_none(&transcript),
			)),
		];
		let reply: DetectionReply = structured::complete_structured(
			self.providers.llm.as_ref(),
			&self.cfg.providers.llm,
			CompletionRequest::json(&settings.proactivity_model),
			&prompt,
		)
		.await?;
		let mut tx = self.db.pool.begin().await?;
		let locked = sessions::lock_session(&mut *tx, session.session_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Session {} does not exist.", session.session_id) }
		})?;
		let outcome = if locked.last_message_at != session.last_message_at {
			DetectionOutcome::Superseded
		} else if reply.create_task {
			let topic = reply.topic.trim().to_string();
			let inserted = actions::insert_pending(
				&mut *tx,
				session.user_id,
				&session.agent_slug,
				&topic,
				now,
			)
			.await?;

			if inserted { DetectionOutcome::Queued { topic } } else { DetectionOutcome::AlreadyQueued }
		} else {
			DetectionOutcome::Declined
		};

		sessions::advance_proactivity_check(&mut *tx, session.session_id, now).await?;

		tx.commit().await?;

		tracing::info!(
			session_id = %session.session_id,
			outcome = ?outcome,
			"Proactivity decision recorded."
		);

		Ok(outcome)
	}
}

use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::{
	Error, RapportService, Result, SweepReport,
	structured::{self, StructuredReply},
};
use rapport_config::ProactivitySettings;
use rapport_domain::{
	message::{self, Role},
	phase::{Checkpoints, MemoryPhase},
};
use rapport_providers::llm::{CompletionRequest, PromptMessage};
use rapport_storage::{
	memories, messages,
	models::{AgentMemoryDigest, ChatSession},
	sessions,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsolidationOutcome {
	/// Not due yet, or nothing new since the last run.
	UpToDate,
	/// New messages existed but none were user or assistant turns; only the checkpoint moved.
	NoTurns,
	Consolidated { turns: usize, global_updated: bool },
	/// A turn landed inside the window while the model was working; nothing was written and the
	/// next sweep picks the session up again.
	Superseded,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryReply {
	memory_update: String,
	#[serde(default)]
	global_profile_update: Option<String>,
}
impl StructuredReply for MemoryReply {
	fn check(&self) -> Result<(), String> {
		if self.memory_update.trim().is_empty() {
			return Err("memoryUpdate is empty.".to_string());
		}

		Ok(())
	}
}

impl RapportService {
	/// One pass of the memory job over every due session. A failing session is logged and
	/// skipped.
	pub async fn run_memory_sweep(&self, now: OffsetDateTime) -> Result<SweepReport> {
		let settings = self.settings.load().await?;
		let summarized_before = now - Duration::seconds(settings.memory_update_interval_seconds());
		let candidates = sessions::list_memory_candidates(
			&self.db.pool,
			summarized_before,
			i64::from(self.cfg.worker.sweep_batch_size),
		)
		.await?;
		let mut report = SweepReport { examined: candidates.len(), ..Default::default() };

		for session in candidates {
			match self.consolidate_session(&session, &settings, now).await {
				Ok(ConsolidationOutcome::UpToDate | ConsolidationOutcome::Superseded) =>
					report.skipped += 1,
				Ok(_) => report.succeeded += 1,
				Err(err) => {
					report.failed += 1;

					tracing::error!(
						session_id = %session.session_id,
						error = %err,
						"Memory consolidation failed."
					);
				},
			}
		}

		if report.examined > 0 {
			tracing::info!(
				examined = report.examined,
				succeeded = report.succeeded,
				failed = report.failed,
				"Memory sweep finished."
			);
		}

		Ok(report)
	}

	/// Folds the turns since the last checkpoint into the session's local memory, and for the
	/// primary agent into the user's global profile. On any failure nothing is written.
	pub async fn consolidate_session(
		&self,
		session: &ChatSession,
		settings: &ProactivitySettings,
		now: OffsetDateTime,
	) -> Result<ConsolidationOutcome> {
		let checkpoints = checkpoints(session);
		let interval = Duration::seconds(settings.memory_update_interval_seconds());

		if checkpoints.memory_phase(now, interval) != MemoryPhase::Due {
			return Ok(ConsolidationOutcome::UpToDate);
		}

		let turns = messages::list_turns_between(
			&self.db.pool,
			session.session_id,
			session.last_summarized_at,
			now,
		)
		.await?;

		if turns.is_empty() {
			let committed = self
				.commit_consolidation(session, turns.len(), &session.local_memory, None, now)
				.await?;

			return Ok(if committed {
				ConsolidationOutcome::NoTurns
			} else {
				ConsolidationOutcome::Superseded
			});
		}

		let is_primary = self.is_primary(&session.agent_slug);
		let global_profile = memories::get_profile(&self.db.pool, session.user_id)
			.await?
			.map(|memory| memory.profile)
			.unwrap_or_default();
		let others = if is_primary {
			sessions::other_agent_memories(&self.db.pool, session.user_id, &session.agent_slug)
				.await?
		} else {
			Vec::new()
		};
		let transcript = message::format_transcript(turns.iter().filter_map(|turn| {
			Role::parse(&turn.role).map(|role| (role, turn.content.as_str()))
		}));
		let instructions =
			if is_primary { &settings.global_memory_prompt } else { &settings.memory_prompt };
		let prompt = vec![
			PromptMessage::system(instructions.as_str()),
			PromptMessage::user(memory_input(
				&session.local_memory,
				is_primary.then_some(global_profile.as_str()),
				&others,
				&transcript,
			)),
		];
		let reply: MemoryReply = structured::complete_structured(
			self.providers.llm.as_ref(),
			&self.cfg.providers.llm,
			CompletionRequest::json(&settings.memory_model),
			&prompt,
		)
		.await?;
		let global_update = reply
			.global_profile_update
			.as_deref()
			.map(str::trim)
			.filter(|update| is_primary && !update.is_empty());

		if !self
			.commit_consolidation(session, turns.len(), reply.memory_update.trim(), global_update, now)
			.await?
		{
			return Ok(ConsolidationOutcome::Superseded);
		}

		tracing::info!(
			session_id = %session.session_id,
			turns = turns.len(),
			global_updated = global_update.is_some(),
			"Session memory consolidated."
		);

		Ok(ConsolidationOutcome::Consolidated {
			turns: turns.len(),
			global_updated: global_update.is_some(),
		})
	}

	/// Writes the new memory and checkpoint under the session lock. Returns `false`, writing
	/// nothing, when the window no longer holds exactly the `consumed` turns.
	async fn commit_consolidation(
		&self,
		session: &ChatSession,
		consumed: usize,
		local_memory: &str,
		global_profile: Option<&str>,
		now: OffsetDateTime,
	) -> Result<bool> {
		let mut tx = self.db.pool.begin().await?;

		if sessions::lock_session(&mut *tx, session.session_id).await?.is_none() {
			return Err(Error::NotFound {
				message: format!("Session {} does not exist.", session.session_id),
			});
		}

		let window =
			messages::list_turns_between(&mut *tx, session.session_id, session.last_summarized_at, now)
				.await?;

		if window.len() != consumed {
			tx.rollback().await?;

			tracing::info!(
				session_id = %session.session_id,
				consumed,
				found = window.len(),
				"Consolidation superseded by new turns."
			);

			return Ok(false);
		}

		sessions::complete_consolidation(&mut *tx, session.session_id, local_memory, now).await?;

		if let Some(profile) = global_profile {
			memories::upsert_profile(&mut *tx, session.user_id, profile, now).await?;
		}

		tx.commit().await?;

		Ok(true)
	}
}

pub(crate) fn checkpoints(session: &ChatSession) -> Checkpoints {
	Checkpoints {
		last_message_at: session.last_message_at,
		last_summarized_at: session.last_summarized_at,
		last_proactivity_check_at: session.last_proactivity_check_at,
	}
}

fn memory_input(
	local_memory: &str,
	global_profile: Option<&str>,
	others: &[AgentMemoryDigest],
	transcript: &str,
) -> String {
	let mut out = format!("Current notes:\n{}\n\n", crate::or_none(local_memory));

	if let Some(profile) = global_profile {
		out.push_str(&format!("Shared profile:\n{}\n\n", crate::or_none(profile)));

		if !others.is_empty() {
			out.push_str("Other agents' notes:\n");

			for other in others {
				out.push_str(&format!(
					"- {} ({}): {}\n",
					other.agent_name,
					other.agent_slug,
					other.local_memory.trim()
				));
			}

			out.push('\n');
		}
	}

	out.push_str("New conversation:\n");
	out.push_str(transcript);

	out
}

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, LiveBroadcaster, LiveEvent, LlmProvider, RapportService, Result};
use rapport_config::{JobModel, LlmProviderConfig, ProactivitySettings};
use rapport_domain::{
	context,
	message::{self, MessageKind, Role},
};
use rapport_providers::llm::{CompletionRequest, PromptMessage};
use rapport_storage::{
	db::Db,
	directory, messages,
	models::{ChatMessage, ChatSession},
	sessions,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionOutcome {
	/// The live history already fits in `keep_last` messages, or only summaries lie outside it.
	NotNeeded,
	Compressed { archived: u64, summary_id: Uuid },
	/// Another compression archived part of the same span first; nothing was written.
	Superseded,
}

/// Everything a compression run needs, owned so it can outlive the request that started it.
#[derive(Clone)]
pub struct CompressionJob {
	db: Db,
	llm: Arc<dyn LlmProvider>,
	llm_cfg: LlmProviderConfig,
	live: Arc<dyn LiveBroadcaster>,
}
impl CompressionJob {
	/// Runs the compression on its own task. Failures are logged and leave the history untouched.
	pub fn spawn(self, session_id: Uuid, settings: ProactivitySettings) {
		tokio::spawn(async move {
			let keep_last = settings.context_compression_keep_last as usize;

			match self
				.compress(
					session_id,
					keep_last,
					&settings.compression_model,
					&settings.compression_prompt,
				)
				.await
			{
				Ok(outcome) => tracing::debug!(
					session_id = %session_id,
					outcome = ?outcome,
					"Background compression finished."
				),
				Err(err) => tracing::error!(
					session_id = %session_id,
					error = %err,
					"Background compression failed."
				),
			}
		});
	}

	/// Replaces all but the newest `keep_last` live messages with one summary. Earlier summaries in
	/// the replaced span seed the new one so summaries chain.
	pub async fn compress(
		&self,
		session_id: Uuid,
		keep_last: usize,
		model: &JobModel,
		instructions: &str,
	) -> Result<CompressionOutcome> {
		let keep_last = keep_last.max(1);
		let history = messages::list_active(&self.db.pool, session_id).await?;
		let Some(split) = context::compression_split(history.len(), keep_last) else {
			return Ok(CompressionOutcome::NotNeeded);
		};
		let (to_compress, to_keep) = history.split_at(split);
		let Some(first_kept) = to_keep.first() else {
			return Ok(CompressionOutcome::NotNeeded);
		};

		if !to_compress.iter().any(|message| message.kind == MessageKind::Turn.as_str()) {
			return Ok(CompressionOutcome::NotNeeded);
		}

		let prompt = compression_prompt(instructions, to_compress);
		let summary = self
			.llm
			.complete(&self.llm_cfg, CompletionRequest::text(model), &prompt)
			.await?
			.trim()
			.to_string();

		if summary.is_empty() {
			return Err(Error::MalformedReply { message: "Compression summary is empty.".to_string() });
		}

		let ids = to_compress.iter().map(|message| message.message_id).collect::<Vec<_>>();
		let mut tx = self.db.pool.begin().await?;

		sessions::lock_session(&mut *tx, session_id).await?.ok_or_else(|| Error::NotFound {
			message: format!("Session {session_id} does not exist."),
		})?;

		let archived = messages::archive_messages(&mut *tx, &ids).await?;

		if archived != ids.len() as u64 {
			tx.rollback().await?;

			tracing::info!(
				session_id = %session_id,
				expected = ids.len(),
				archived,
				"Compression superseded by a concurrent run."
			);

			return Ok(CompressionOutcome::Superseded);
		}

		let summary_at = first_kept.created_at - Duration::microseconds(1);
		let summary_message = messages::insert_message(
			&mut *tx,
			session_id,
			Role::System.as_str(),
			MessageKind::Summary.as_str(),
			&summary,
			summary_at,
		)
		.await?;

		tx.commit().await?;

		let user_id = sessions::get_session(&self.db.pool, session_id).await?.map(|s| s.user_id);

		if let Some(user_id) = user_id {
			self.live.broadcast(user_id, LiveEvent::SessionCompressed { session_id, archived });
		}

		tracing::info!(session_id = %session_id, archived, "Session history compressed.");

		Ok(CompressionOutcome::Compressed { archived, summary_id: summary_message.message_id })
	}
}

impl RapportService {
	pub fn compression_job(&self) -> CompressionJob {
		CompressionJob {
			db: self.db.clone(),
			llm: self.providers.llm.clone(),
			llm_cfg: self.cfg.providers.llm.clone(),
			live: self.live.clone(),
		}
	}

	/// Estimates the full prompt (system prompt plus live history) against the agent model's
	/// budget.
	pub async fn is_session_overflowing(
		&self,
		session: &ChatSession,
		settings: &ProactivitySettings,
	) -> Result<bool> {
		let agent = directory::get_agent(&self.db.pool, &session.agent_slug).await?.ok_or_else(
			|| Error::NotFound { message: format!("Agent {} does not exist.", session.agent_slug) },
		)?;
		let history = messages::list_active(&self.db.pool, session.session_id).await?;
		let limit = context::effective_token_limit(&agent.model, settings.context_soft_limit);
		let contents = std::iter::once(agent.system_prompt.as_str())
			.chain(history.iter().map(|message| message.content.as_str()));

		Ok(context::is_overflowing(contents, limit, settings.context_threshold))
	}

	/// Compresses with the current settings, in the caller's task.
	pub async fn compress_session(&self, session_id: Uuid) -> Result<CompressionOutcome> {
		let settings = self.settings.load().await?;

		self.compression_job()
			.compress(
				session_id,
				settings.context_compression_keep_last as usize,
				&settings.compression_model,
				&settings.compression_prompt,
			)
			.await
	}
}

fn compression_prompt(instructions: &str, span: &[ChatMessage]) -> Vec<PromptMessage> {
	let seed = span
		.iter()
		.filter(|message| message.kind == MessageKind::Summary.as_str())
		.map(|message| message.content.trim())
		.collect::<Vec<_>>()
		.join("\n\n");
	let transcript = message::format_transcript(span.iter().filter_map(|message| {
		if message.kind != MessageKind::Turn.as_str() {
			return None;
		}

		Role::parse(&message.role).map(|role| (role, message.content.as_str()))
	}));
	let mut body = String::new();

	if !seed.is_empty() {
		body.push_str("Previous summary:\n");
		body.push_str(&seed);
		body.push_str("\n\n");
	}

	body.push_str("Conversation:\n");
	body.push_str(&transcript);

	vec![PromptMessage::system(instructions), PromptMessage::user(body)]
}

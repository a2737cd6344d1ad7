use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, RapportService, Result};
use rapport_domain::message::{MessageKind, Role};
use rapport_providers::llm::PromptMessage;
use rapport_storage::{
	actions, directory, messages,
	models::{ChatMessage, ChatSession},
	sessions,
};

#[derive(Clone, Debug)]
pub struct RecordedMessage {
	pub session: ChatSession,
	pub message: ChatMessage,
	/// Whether a background compression was started for the session.
	pub compression_scheduled: bool,
}

impl RapportService {
	/// Returns the active session for the tuple, creating it on first use. Concurrent callers all
	/// get the same row.
	pub async fn resolve_session(
		&self,
		user_id: Uuid,
		agent_slug: &str,
		context: Option<&str>,
	) -> Result<ChatSession> {
		let agent_slug = agent_slug.trim();

		if agent_slug.is_empty() {
			return Err(Error::InvalidRequest { message: "agent_slug is required.".to_string() });
		}

		let context_key = context_key(context);

		if let Some(session) =
			sessions::find_active(&self.db.pool, user_id, agent_slug, context_key).await?
		{
			return Ok(session);
		}

		let now = OffsetDateTime::now_utc();

		match sessions::insert_session(
			&self.db.pool,
			Uuid::new_v4(),
			user_id,
			agent_slug,
			context_key,
			now,
		)
		.await
		{
			Ok(session) => {
				tracing::info!(
					session_id = %session.session_id,
					user_id = %user_id,
					agent_slug,
					"Chat session created."
				);

				Ok(session)
			},
			Err(err) if err.is_unique_violation() => {
				tracing::debug!(user_id = %user_id, agent_slug, "Lost session creation race.");

				sessions::find_active(&self.db.pool, user_id, agent_slug, context_key)
					.await?
					.ok_or_else(|| Error::Conflict {
						message: "Active session vanished after a creation race.".to_string(),
					})
			},
			Err(err) => Err(err.into()),
		}
	}

	/// Stores a user turn and cancels any queued proactive message for the pair. The session is
	/// compressed in the background when its prompt no longer fits.
	pub async fn record_user_message(
		&self,
		user_id: Uuid,
		agent_slug: &str,
		context: Option<&str>,
		content: &str,
	) -> Result<RecordedMessage> {
		let content = content.trim();

		if content.is_empty() {
			return Err(Error::InvalidRequest {
				message: "Message content must not be empty.".to_string(),
			});
		}

		let session = self.resolve_session(user_id, agent_slug, context).await?;
		let message = self.append_turn(session.session_id, Role::User, content).await?;

		// Must follow the commit: a racing detector either queued before it or sees the new turn.
		self.cancel_pending_actions(user_id, &session.agent_slug).await?;

		let settings = self.settings.load().await?;
		let compression_scheduled = match self.is_session_overflowing(&session, &settings).await {
			Ok(true) => {
				self.compression_job().spawn(session.session_id, settings);

				true
			},
			Ok(false) => false,
			Err(err) => {
				tracing::warn!(
					session_id = %session.session_id,
					error = %err,
					"Context overflow check failed."
				);

				false
			},
		};

		Ok(RecordedMessage { session, message, compression_scheduled })
	}

	/// Stores a live assistant reply produced by the external chat surface.
	pub async fn record_assistant_message(
		&self,
		session_id: Uuid,
		content: &str,
	) -> Result<ChatMessage> {
		let content = content.trim();

		if content.is_empty() {
			return Err(Error::InvalidRequest {
				message: "Message content must not be empty.".to_string(),
			});
		}

		sessions::get_session(&self.db.pool, session_id).await?.ok_or_else(|| Error::NotFound {
			message: format!("Session {session_id} does not exist."),
		})?;

		self.append_turn(session_id, Role::Assistant, content).await
	}

	/// System prompt followed by the live history, oldest first. Archived turns never appear.
	pub async fn build_prompt(&self, session: &ChatSession) -> Result<Vec<PromptMessage>> {
		let agent = directory::get_agent(&self.db.pool, &session.agent_slug).await?.ok_or_else(
			|| Error::NotFound { message: format!("Agent {} does not exist.", session.agent_slug) },
		)?;
		let history = messages::list_active(&self.db.pool, session.session_id).await?;
		let mut prompt = Vec::with_capacity(history.len() + 1);

		if !agent.system_prompt.trim().is_empty() {
			prompt.push(PromptMessage::system(agent.system_prompt));
		}

		prompt.extend(history.into_iter().map(|message| PromptMessage {
			role: Role::parse(&message.role).unwrap_or(Role::System),
			content: message.content,
		}));

		Ok(prompt)
	}

	/// Kill switch. Returns how many queued actions were removed.
	pub async fn cancel_pending_actions(&self, user_id: Uuid, agent_slug: &str) -> Result<u64> {
		let removed = actions::delete_pending_for(&self.db.pool, user_id, agent_slug).await?;

		if removed > 0 {
			tracing::info!(
				user_id = %user_id,
				agent_slug,
				removed,
				"Cancelled pending proactive action after user activity."
			);
		}

		Ok(removed)
	}

	async fn append_turn(&self, session_id: Uuid, role: Role, content: &str) -> Result<ChatMessage> {
		let mut tx = self.db.pool.begin().await?;
		let session = sessions::lock_session(&mut *tx, session_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Session {session_id} does not exist.") }
		})?;
		let message = messages::insert_message(
			&mut *tx,
			session_id,
			role.as_str(),
			MessageKind::Turn.as_str(),
			content,
			crate::message_stamp(OffsetDateTime::now_utc(), &session),
		)
		.await?;

		sessions::touch_last_message(&mut *tx, session_id, message.created_at).await?;

		tx.commit().await?;

		Ok(message)
	}
}

/// Sessions without a resource context share the empty key so the unique index can see them.
pub(crate) fn context_key(context: Option<&str>) -> &str {
	context.map(str::trim).unwrap_or("")
}

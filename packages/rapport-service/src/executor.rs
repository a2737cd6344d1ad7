use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, LiveEvent, RapportService, Result};
use rapport_domain::{
	message::{self, MessageKind, Role},
	quiet_hours,
	send_pool::{self, SendPool},
	template,
};
use rapport_providers::llm::{CompletionRequest, PromptMessage};
use rapport_storage::{
	actions, counters, directory, memories, messages,
	models::{PendingAction, User},
	sessions,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
	Sent { session_id: Uuid, message_id: Uuid },
	/// The user wrote in while the message was being generated; nothing was stored.
	Cancelled,
	/// Recorded on the action. Failed actions are not retried.
	Failed { reason: String },
}

struct Delivery {
	session_id: Uuid,
	message_id: Uuid,
	content: String,
	created_at: OffsetDateTime,
}

impl RapportService {
	/// Generates and delivers the message for a claimed action. Errors before the commit mark the
	/// action failed; notification problems after it are only logged.
	pub async fn execute_action(
		&self,
		action: &PendingAction,
		now: OffsetDateTime,
	) -> Result<ExecutionOutcome> {
		let user = match directory::get_user(&self.db.pool, action.user_id).await {
			Ok(Some(user)) => user,
			Ok(None) => {
				let err =
					Error::NotFound { message: format!("User {} does not exist.", action.user_id) };

				return self.record_failure(action, err).await;
			},
			Err(err) => return self.record_failure(action, err.into()).await,
		};
		let delivery = match self.generate_and_store(action, &user, now).await {
			Ok(Some(delivery)) => delivery,
			Ok(None) => {
				tracing::info!(
					action_id = %action.action_id,
					"Proactive action cancelled by user activity."
				);

				return Ok(ExecutionOutcome::Cancelled);
			},
			Err(err) => return self.record_failure(action, err).await,
		};

		tracing::info!(
			action_id = %action.action_id,
			session_id = %delivery.session_id,
			"Proactive message sent."
		);

		self.live.broadcast(
			user.user_id,
			LiveEvent::ProactiveMessage {
				session_id: delivery.session_id,
				agent_slug: action.agent_slug.clone(),
				message_id: delivery.message_id,
				content: delivery.content.clone(),
				created_at: delivery.created_at,
			},
		);
		self.notify(action, &user, &delivery.content).await;

		Ok(ExecutionOutcome::Sent { session_id: delivery.session_id, message_id: delivery.message_id })
	}

	/// `None` when the action disappeared before the commit.
	async fn generate_and_store(
		&self,
		action: &PendingAction,
		user: &User,
		now: OffsetDateTime,
	) -> Result<Option<Delivery>> {
		let settings = self.settings.load().await?;
		let agent = directory::get_agent(&self.db.pool, &action.agent_slug).await?.ok_or_else(
			|| Error::NotFound { message: format!("Agent {} does not exist.", action.agent_slug) },
		)?;
		let session = self.resolve_session(action.user_id, &action.agent_slug, None).await?;
		let history = messages::list_active(&self.db.pool, session.session_id).await?;
		let global_profile = memories::get_profile(&self.db.pool, user.user_id)
			.await?
			.map(|memory| memory.profile)
			.unwrap_or_default();
		let transcript = message::format_transcript(
			history
				.iter()
				.filter_map(|m| Role::parse(&m.role).map(|role| (role, m.content.as_str()))),
		);
		let message_template = agent
			.proactive_template
			.as_deref()
			.filter(|custom| !custom.trim().is_empty())
			.unwrap_or(settings.message_template.as_str());
		let current_datetime = quiet_hours::format_local_datetime(now, &user.timezone);
		let instructions = template::render(
			message_template,
			&[
				("user_name", user.display_name.as_str()),
				("current_datetime", current_datetime.as_str()),
				("global_profile", crate::or_none(&global_profile)),
				("local_memory", crate::or_none(&session.local_memory)),
				("topic", action.topic_context.as_str()),
				("history", crate::or_none(&transcript)),
			],
		);
		let mut prompt = Vec::with_capacity(2);

		if !agent.system_prompt.trim().is_empty() {
			prompt.push(PromptMessage::system(agent.system_prompt.as_str()));
		}

		prompt.push(PromptMessage::user(instructions));

		let content = self
			.providers
			.llm
			.complete(
				&self.cfg.providers.llm,
				CompletionRequest::text(&settings.message_model),
				&prompt,
			)
			.await?
			.trim()
			.to_string();

		if content.is_empty() {
			return Err(Error::MalformedReply {
				message: "Proactive message is empty.".to_string(),
			});
		}

		let mut tx = self.db.pool.begin().await?;
		let locked = sessions::lock_session(&mut *tx, session.session_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Session {} does not exist.", session.session_id) }
		})?;
		// Generation may have outlasted a memory sweep; stamp at commit time, never at tick time.
		let sent_at = crate::message_stamp(now.max(OffsetDateTime::now_utc()), &locked);

		messages::insert_message(
			&mut *tx,
			session.session_id,
			Role::System.as_str(),
			MessageKind::ProactiveTrigger.as_str(),
			&format!("Proactive message: {}", action.topic_context),
			sent_at,
		)
		.await?;

		let reply = messages::insert_message(
			&mut *tx,
			session.session_id,
			Role::Assistant.as_str(),
			MessageKind::Turn.as_str(),
			&content,
			sent_at + Duration::microseconds(1),
		)
		.await?;

		sessions::touch_last_message(&mut *tx, session.session_id, reply.created_at).await?;

		if !actions::mark_sent(&mut *tx, action.action_id, sent_at).await? {
			tx.rollback().await?;

			return Ok(None);
		}

		let pool = SendPool::for_agent(&action.agent_slug, &self.cfg.agents.primary_slug);
		let day = send_pool::utc_day(now);

		counters::increment(
			&mut *tx,
			action.user_id,
			pool.as_str(),
			day,
			send_pool::counter_expiry(day),
		)
		.await?;

		tx.commit().await?;

		Ok(Some(Delivery {
			session_id: session.session_id,
			message_id: reply.message_id,
			content,
			created_at: reply.created_at,
		}))
	}

	async fn notify(&self, action: &PendingAction, user: &User, text: &str) {
		let notifier_cfg = &self.cfg.providers.notifier;

		if !notifier_cfg.enabled {
			return;
		}

		let Some(external_id) = user.external_id.as_deref().filter(|id| !id.trim().is_empty())
		else {
			tracing::debug!(user_id = %user.user_id, "User has no notification address.");

			return;
		};

		if let Err(err) = self.providers.notifier.send_text(notifier_cfg, external_id, text).await {
			tracing::warn!(
				action_id = %action.action_id,
				error = %crate::sanitize_error(&err.to_string()),
				"Proactive message stored but notification delivery failed."
			);
		}
	}

	async fn record_failure(&self, action: &PendingAction, err: Error) -> Result<ExecutionOutcome> {
		let reason = crate::sanitize_error(&err.to_string());

		tracing::error!(
			action_id = %action.action_id,
			error = %reason,
			"Proactive action failed."
		);

		actions::mark_failed(&self.db.pool, action.action_id, &reason).await?;

		Ok(ExecutionOutcome::Failed { reason })
	}
}

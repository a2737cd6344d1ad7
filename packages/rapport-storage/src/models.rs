use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct User {
	pub user_id: Uuid,
	pub display_name: String,
	pub external_id: Option<String>,
	pub timezone: String,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Agent {
	pub slug: String,
	pub name: String,
	pub system_prompt: String,
	pub model: String,
	pub proactive_template: Option<String>,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ChatSession {
	pub session_id: Uuid,
	pub user_id: Uuid,
	pub agent_slug: String,
	/// Empty when the session is not tied to a specific resource.
	pub context_key: String,
	pub local_memory: String,
	pub active: bool,
	pub last_message_at: Option<OffsetDateTime>,
	pub last_summarized_at: Option<OffsetDateTime>,
	pub last_proactivity_check_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ChatMessage {
	pub message_id: Uuid,
	pub session_id: Uuid,
	pub role: String,
	pub kind: String,
	pub content: String,
	pub archived: bool,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct UserMemory {
	pub user_id: Uuid,
	pub profile: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct PendingAction {
	pub action_id: Uuid,
	pub user_id: Uuid,
	pub agent_slug: String,
	pub topic_context: String,
	pub status: String,
	pub last_error: Option<String>,
	pub claimed_until: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub sent_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SendCounter {
	pub user_id: Uuid,
	pub pool: String,
	pub day: Date,
	pub sent_count: i32,
	pub expires_at: OffsetDateTime,
}

/// Another agent's private notes about the same user, as fed to the primary agent.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct AgentMemoryDigest {
	pub agent_slug: String,
	pub agent_name: String,
	pub local_memory: String,
}

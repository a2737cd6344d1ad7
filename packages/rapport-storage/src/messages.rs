use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::ChatMessage};

pub async fn insert_message<'e, E>(
	executor: E,
	session_id: Uuid,
	role: &str,
	kind: &str,
	content: &str,
	created_at: OffsetDateTime,
) -> Result<ChatMessage>
where
	E: PgExecutor<'e>,
{
	let message = sqlx::query_as::<_, ChatMessage>(
		"\
INSERT INTO chat_messages (message_id, session_id, role, kind, content, archived, created_at)
VALUES ($1, $2, $3, $4, $5, false, $6)
RETURNING message_id, session_id, role, kind, content, archived, created_at",
	)
	.bind(Uuid::new_v4())
	.bind(session_id)
	.bind(role)
	.bind(kind)
	.bind(content)
	.bind(created_at)
	.fetch_one(executor)
	.await?;

	Ok(message)
}

/// The live history of a session, oldest first.
pub async fn list_active<'e, E>(executor: E, session_id: Uuid) -> Result<Vec<ChatMessage>>
where
	E: PgExecutor<'e>,
{
	let messages = sqlx::query_as::<_, ChatMessage>(
		"\
SELECT message_id, session_id, role, kind, content, archived, created_at
FROM chat_messages
WHERE session_id = $1 AND NOT archived
ORDER BY created_at ASC, message_id ASC",
	)
	.bind(session_id)
	.fetch_all(executor)
	.await?;

	Ok(messages)
}

/// User and assistant turns in `(after, until]`, archived ones included. Summaries and triggers
/// are skipped so a consolidation never re-reads its own output.
pub async fn list_turns_between<'e, E>(
	executor: E,
	session_id: Uuid,
	after: Option<OffsetDateTime>,
	until: OffsetDateTime,
) -> Result<Vec<ChatMessage>>
where
	E: PgExecutor<'e>,
{
	let messages = sqlx::query_as::<_, ChatMessage>(
		"\
SELECT message_id, session_id, role, kind, content, archived, created_at
FROM chat_messages
WHERE session_id = $1
	AND kind = 'turn'
	AND role IN ('user', 'assistant')
	AND created_at > COALESCE($2, '-infinity'::timestamptz)
	AND created_at <= $3
ORDER BY created_at ASC, message_id ASC",
	)
	.bind(session_id)
	.bind(after)
	.bind(until)
	.fetch_all(executor)
	.await?;

	Ok(messages)
}

/// Returns how many rows flipped. Rows already archived do not count.
pub async fn archive_messages<'e, E>(executor: E, message_ids: &[Uuid]) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"UPDATE chat_messages SET archived = true WHERE message_id = ANY($1) AND NOT archived",
	)
	.bind(message_ids)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

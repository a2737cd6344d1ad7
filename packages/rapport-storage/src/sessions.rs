use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{AgentMemoryDigest, ChatSession},
};

const SESSION_COLUMNS: &str = "\
session_id,
	user_id,
	agent_slug,
	context_key,
	local_memory,
	active,
	last_message_at,
	last_summarized_at,
	last_proactivity_check_at,
	created_at,
	updated_at";

pub async fn find_active<'e, E>(
	executor: E,
	user_id: Uuid,
	agent_slug: &str,
	context_key: &str,
) -> Result<Option<ChatSession>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{SESSION_COLUMNS}
FROM chat_sessions
WHERE user_id = $1 AND agent_slug = $2 AND context_key = $3 AND active
LIMIT 1"
	);
	let session = sqlx::query_as::<_, ChatSession>(&sql)
		.bind(user_id)
		.bind(agent_slug)
		.bind(context_key)
		.fetch_optional(executor)
		.await?;

	Ok(session)
}

/// Plain insert. A concurrent creator for the same tuple surfaces as a unique violation.
pub async fn insert_session<'e, E>(
	executor: E,
	session_id: Uuid,
	user_id: Uuid,
	agent_slug: &str,
	context_key: &str,
	now: OffsetDateTime,
) -> Result<ChatSession>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO chat_sessions (session_id, user_id, agent_slug, context_key, active, created_at, updated_at)
VALUES ($1, $2, $3, $4, true, $5, $5)
RETURNING
	{SESSION_COLUMNS}"
	);
	let session = sqlx::query_as::<_, ChatSession>(&sql)
		.bind(session_id)
		.bind(user_id)
		.bind(agent_slug)
		.bind(context_key)
		.bind(now)
		.fetch_one(executor)
		.await?;

	Ok(session)
}

pub async fn get_session<'e, E>(executor: E, session_id: Uuid) -> Result<Option<ChatSession>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE session_id = $1");
	let session =
		sqlx::query_as::<_, ChatSession>(&sql).bind(session_id).fetch_optional(executor).await?;

	Ok(session)
}

/// Row-locks the session for the rest of the caller's transaction.
pub async fn lock_session<'e, E>(executor: E, session_id: Uuid) -> Result<Option<ChatSession>>
where
	E: PgExecutor<'e>,
{
	let sql =
		format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE session_id = $1 FOR UPDATE");
	let session =
		sqlx::query_as::<_, ChatSession>(&sql).bind(session_id).fetch_optional(executor).await?;

	Ok(session)
}

pub async fn touch_last_message<'e, E>(
	executor: E,
	session_id: Uuid,
	at: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE chat_sessions
SET last_message_at = GREATEST(COALESCE(last_message_at, $2), $2),
	updated_at = $2
WHERE session_id = $1",
	)
	.bind(session_id)
	.bind(at)
	.execute(executor)
	.await?;

	Ok(())
}

/// Sessions with messages newer than their last consolidation, last consolidated before
/// `summarized_before`. Oldest activity first.
pub async fn list_memory_candidates<'e, E>(
	executor: E,
	summarized_before: OffsetDateTime,
	limit: i64,
) -> Result<Vec<ChatSession>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{SESSION_COLUMNS}
FROM chat_sessions
WHERE active
	AND last_message_at IS NOT NULL
	AND last_message_at > COALESCE(last_summarized_at, 'epoch'::timestamptz)
	AND COALESCE(last_summarized_at, 'epoch'::timestamptz) < $1
ORDER BY last_message_at ASC
LIMIT $2"
	);
	let sessions = sqlx::query_as::<_, ChatSession>(&sql)
		.bind(summarized_before)
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(sessions)
}

/// Sessions silent since before `silent_before` whose detector has not run since their last
/// message.
pub async fn list_proactivity_candidates<'e, E>(
	executor: E,
	silent_before: OffsetDateTime,
	limit: i64,
) -> Result<Vec<ChatSession>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{SESSION_COLUMNS}
FROM chat_sessions
WHERE active
	AND last_message_at IS NOT NULL
	AND last_message_at < $1
	AND (last_proactivity_check_at IS NULL OR last_proactivity_check_at <= last_message_at)
ORDER BY last_message_at ASC
LIMIT $2"
	);
	let sessions = sqlx::query_as::<_, ChatSession>(&sql)
		.bind(silent_before)
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(sessions)
}

/// Stores the new local memory and moves the consolidation checkpoint forward, never back.
pub async fn complete_consolidation<'e, E>(
	executor: E,
	session_id: Uuid,
	local_memory: &str,
	summarized_at: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE chat_sessions
SET local_memory = $2,
	last_summarized_at = GREATEST(COALESCE(last_summarized_at, $3), $3),
	updated_at = $3
WHERE session_id = $1",
	)
	.bind(session_id)
	.bind(local_memory)
	.bind(summarized_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn advance_proactivity_check<'e, E>(
	executor: E,
	session_id: Uuid,
	checked_at: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE chat_sessions
SET last_proactivity_check_at = GREATEST(COALESCE(last_proactivity_check_at, $2), $2),
	updated_at = $2
WHERE session_id = $1",
	)
	.bind(session_id)
	.bind(checked_at)
	.execute(executor)
	.await?;

	Ok(())
}

/// Non-empty local memories the user's other agents hold.
pub async fn other_agent_memories<'e, E>(
	executor: E,
	user_id: Uuid,
	exclude_agent_slug: &str,
) -> Result<Vec<AgentMemoryDigest>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, AgentMemoryDigest>(
		"\
SELECT
	s.agent_slug,
	a.name AS agent_name,
	s.local_memory
FROM chat_sessions s
JOIN agents a ON a.slug = s.agent_slug
WHERE s.user_id = $1
	AND s.agent_slug <> $2
	AND s.active
	AND s.local_memory <> ''
ORDER BY s.agent_slug ASC, s.context_key ASC",
	)
	.bind(user_id)
	.bind(exclude_agent_slug)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::PendingAction};

const ACTION_COLUMNS: &str = "\
action_id,
	user_id,
	agent_slug,
	topic_context,
	status,
	last_error,
	claimed_until,
	created_at,
	sent_at";

/// Queues a proactive action unless the pair already has one pending. Returns whether a row was
/// inserted.
pub async fn insert_pending<'e, E>(
	executor: E,
	user_id: Uuid,
	agent_slug: &str,
	topic_context: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO pending_actions (action_id, user_id, agent_slug, topic_context, status, created_at)
VALUES ($1, $2, $3, $4, 'pending', $5)
ON CONFLICT (user_id, agent_slug) WHERE status = 'pending' DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(user_id)
	.bind(agent_slug)
	.bind(topic_context)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn get_action<'e, E>(executor: E, action_id: Uuid) -> Result<Option<PendingAction>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {ACTION_COLUMNS} FROM pending_actions WHERE action_id = $1");
	let action =
		sqlx::query_as::<_, PendingAction>(&sql).bind(action_id).fetch_optional(executor).await?;

	Ok(action)
}

pub async fn find_pending<'e, E>(
	executor: E,
	user_id: Uuid,
	agent_slug: &str,
) -> Result<Option<PendingAction>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {ACTION_COLUMNS} FROM pending_actions \
		 WHERE user_id = $1 AND agent_slug = $2 AND status = 'pending'"
	);
	let action = sqlx::query_as::<_, PendingAction>(&sql)
		.bind(user_id)
		.bind(agent_slug)
		.fetch_optional(executor)
		.await?;

	Ok(action)
}

/// Pending actions nobody holds a live lease on, oldest first.
pub async fn list_pending<'e, E>(
	executor: E,
	now: OffsetDateTime,
	limit: i64,
) -> Result<Vec<PendingAction>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{ACTION_COLUMNS}
FROM pending_actions
WHERE status = 'pending' AND (claimed_until IS NULL OR claimed_until <= $1)
ORDER BY created_at ASC, action_id ASC
LIMIT $2"
	);
	let actions =
		sqlx::query_as::<_, PendingAction>(&sql).bind(now).bind(limit).fetch_all(executor).await?;

	Ok(actions)
}

/// Takes a lease on a pending action. `None` when it is gone, finished, or leased elsewhere.
pub async fn claim_action<'e, E>(
	executor: E,
	action_id: Uuid,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<PendingAction>>
where
	E: PgExecutor<'e>,
{
	let lease_until = now + time::Duration::seconds(lease_seconds);
	let sql = format!(
		"\
UPDATE pending_actions
SET claimed_until = $3
WHERE action_id = $1
	AND status = 'pending'
	AND (claimed_until IS NULL OR claimed_until <= $2)
RETURNING
	{ACTION_COLUMNS}"
	);
	let action = sqlx::query_as::<_, PendingAction>(&sql)
		.bind(action_id)
		.bind(now)
		.bind(lease_until)
		.fetch_optional(executor)
		.await?;

	Ok(action)
}

/// Drops the lease so the next scheduler tick can retry the action.
pub async fn release_claim<'e, E>(executor: E, action_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"UPDATE pending_actions SET claimed_until = NULL WHERE action_id = $1 AND status = 'pending'",
	)
	.bind(action_id)
	.execute(executor)
	.await?;

	Ok(())
}

/// Returns false when the action was deleted or already left the pending state.
pub async fn mark_sent<'e, E>(executor: E, action_id: Uuid, sent_at: OffsetDateTime) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE pending_actions
SET status = 'sent', sent_at = $2, claimed_until = NULL
WHERE action_id = $1 AND status = 'pending'",
	)
	.bind(action_id)
	.bind(sent_at)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn mark_failed<'e, E>(executor: E, action_id: Uuid, error: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE pending_actions
SET status = 'failed', last_error = $2, claimed_until = NULL
WHERE action_id = $1 AND status = 'pending'",
	)
	.bind(action_id)
	.bind(error)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Kill switch: removes any pending action for the pair. Sent and failed rows are kept.
pub async fn delete_pending_for<'e, E>(executor: E, user_id: Uuid, agent_slug: &str) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"DELETE FROM pending_actions WHERE user_id = $1 AND agent_slug = $2 AND status = 'pending'",
	)
	.bind(user_id)
	.bind(agent_slug)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

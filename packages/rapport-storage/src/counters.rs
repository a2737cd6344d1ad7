use sqlx::PgExecutor;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::Result;

/// Bumps the day's counter for the pool and returns the new value.
pub async fn increment<'e, E>(
	executor: E,
	user_id: Uuid,
	pool: &str,
	day: Date,
	expires_at: OffsetDateTime,
) -> Result<i32>
where
	E: PgExecutor<'e>,
{
	let count: i32 = sqlx::query_scalar(
		"\
INSERT INTO proactive_send_counters (user_id, pool, day, sent_count, expires_at)
VALUES ($1, $2, $3, 1, $4)
ON CONFLICT (user_id, pool, day) DO UPDATE
SET sent_count = proactive_send_counters.sent_count + 1,
	expires_at = GREATEST(proactive_send_counters.expires_at, EXCLUDED.expires_at)
RETURNING sent_count",
	)
	.bind(user_id)
	.bind(pool)
	.bind(day)
	.bind(expires_at)
	.fetch_one(executor)
	.await?;

	Ok(count)
}

/// Zero when no row exists for that day.
pub async fn sent_count<'e, E>(executor: E, user_id: Uuid, pool: &str, day: Date) -> Result<i32>
where
	E: PgExecutor<'e>,
{
	let count: Option<i32> = sqlx::query_scalar(
		"SELECT sent_count FROM proactive_send_counters WHERE user_id = $1 AND pool = $2 AND day = $3",
	)
	.bind(user_id)
	.bind(pool)
	.bind(day)
	.fetch_optional(executor)
	.await?;

	Ok(count.unwrap_or(0))
}

pub async fn purge_expired<'e, E>(executor: E, now: OffsetDateTime) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM proactive_send_counters WHERE expires_at <= $1")
		.bind(now)
		.execute(executor)
		.await?;

	Ok(result.rows_affected())
}

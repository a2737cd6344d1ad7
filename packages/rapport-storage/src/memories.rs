use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::UserMemory};

pub async fn get_profile<'e, E>(executor: E, user_id: Uuid) -> Result<Option<UserMemory>>
where
	E: PgExecutor<'e>,
{
	let memory = sqlx::query_as::<_, UserMemory>(
		"SELECT user_id, profile, created_at, updated_at FROM user_memories WHERE user_id = $1",
	)
	.bind(user_id)
	.fetch_optional(executor)
	.await?;

	Ok(memory)
}

pub async fn upsert_profile<'e, E>(
	executor: E,
	user_id: Uuid,
	profile: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO user_memories (user_id, profile, created_at, updated_at)
VALUES ($1, $2, $3, $3)
ON CONFLICT (user_id) DO UPDATE
SET profile = EXCLUDED.profile,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(user_id)
	.bind(profile)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

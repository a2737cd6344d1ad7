use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{Agent, User},
};

pub async fn get_user<'e, E>(executor: E, user_id: Uuid) -> Result<Option<User>>
where
	E: PgExecutor<'e>,
{
	let user = sqlx::query_as::<_, User>(
		"SELECT user_id, display_name, external_id, timezone, created_at FROM users WHERE user_id = $1",
	)
	.bind(user_id)
	.fetch_optional(executor)
	.await?;

	Ok(user)
}

pub async fn insert_user<'e, E>(
	executor: E,
	display_name: &str,
	external_id: Option<&str>,
	timezone: &str,
	now: OffsetDateTime,
) -> Result<User>
where
	E: PgExecutor<'e>,
{
	let user = sqlx::query_as::<_, User>(
		"\
INSERT INTO users (user_id, display_name, external_id, timezone, created_at)
VALUES ($1, $2, $3, $4, $5)
RETURNING user_id, display_name, external_id, timezone, created_at",
	)
	.bind(Uuid::new_v4())
	.bind(display_name)
	.bind(external_id)
	.bind(timezone)
	.bind(now)
	.fetch_one(executor)
	.await?;

	Ok(user)
}

pub async fn get_agent<'e, E>(executor: E, slug: &str) -> Result<Option<Agent>>
where
	E: PgExecutor<'e>,
{
	let agent = sqlx::query_as::<_, Agent>(
		"\
SELECT slug, name, system_prompt, model, proactive_template, created_at
FROM agents
WHERE slug = $1",
	)
	.bind(slug)
	.fetch_optional(executor)
	.await?;

	Ok(agent)
}

/// Inserts or replaces an agent definition keyed by slug.
pub async fn upsert_agent<'e, E>(
	executor: E,
	slug: &str,
	name: &str,
	system_prompt: &str,
	model: &str,
	proactive_template: Option<&str>,
) -> Result<Agent>
where
	E: PgExecutor<'e>,
{
	let agent = sqlx::query_as::<_, Agent>(
		"\
INSERT INTO agents (slug, name, system_prompt, model, proactive_template)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (slug) DO UPDATE
SET name = EXCLUDED.name,
	system_prompt = EXCLUDED.system_prompt,
	model = EXCLUDED.model,
	proactive_template = EXCLUDED.proactive_template
RETURNING slug, name, system_prompt, model, proactive_template, created_at",
	)
	.bind(slug)
	.bind(name)
	.bind(system_prompt)
	.bind(model)
	.bind(proactive_template)
	.fetch_one(executor)
	.await?;

	Ok(agent)
}

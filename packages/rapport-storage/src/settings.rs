use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;

use crate::Result;
use rapport_config::ProactivitySettings;

/// Inserts the default settings row when none exists. Existing rows are left alone.
pub async fn seed_defaults<'e, E>(executor: E) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let defaults = ProactivitySettings::default().to_json()?;

	sqlx::query(
		"\
INSERT INTO proactivity_settings (id, settings, updated_at)
VALUES (1, $1, now())
ON CONFLICT (id) DO NOTHING",
	)
	.bind(defaults)
	.execute(executor)
	.await?;

	Ok(())
}

/// Missing rows and missing keys fall back to the defaults.
pub async fn load<'e, E>(executor: E) -> Result<ProactivitySettings>
where
	E: PgExecutor<'e>,
{
	let raw: Option<Value> =
		sqlx::query_scalar("SELECT settings FROM proactivity_settings WHERE id = 1")
			.fetch_optional(executor)
			.await?;

	match raw {
		Some(value) => Ok(ProactivitySettings::from_json(value)?),
		None => Ok(ProactivitySettings::default()),
	}
}

/// Validates and stores the whole settings document.
pub async fn save<'e, E>(
	executor: E,
	settings: &ProactivitySettings,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	rapport_config::validate_settings(settings)?;

	let value = settings.to_json()?;

	sqlx::query(
		"\
INSERT INTO proactivity_settings (id, settings, updated_at)
VALUES (1, $1, $2)
ON CONFLICT (id) DO UPDATE
SET settings = EXCLUDED.settings,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(value)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

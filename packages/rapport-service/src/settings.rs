use std::sync::{Mutex, PoisonError};

use time::OffsetDateTime;

use crate::{BoxFuture, RapportService, Result};
use rapport_config::ProactivitySettings;
use rapport_storage::{db::Db, settings as settings_store};

/// Where jobs read the policy object from. Consulted once per job invocation so admin edits apply
/// on the next sweep.
pub trait SettingsSource
where
	Self: Send + Sync,
{
	fn load(&self) -> BoxFuture<'_, Result<ProactivitySettings>>;
}

pub struct DbSettings {
	db: Db,
}
impl DbSettings {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl SettingsSource for DbSettings {
	fn load(&self) -> BoxFuture<'_, Result<ProactivitySettings>> {
		Box::pin(async move { Ok(settings_store::load(&self.db.pool).await?) })
	}
}

/// Fixed in-memory settings. Tests swap values with [`StaticSettings::replace`].
pub struct StaticSettings {
	settings: Mutex<ProactivitySettings>,
}
impl StaticSettings {
	pub fn new(settings: ProactivitySettings) -> Self {
		Self { settings: Mutex::new(settings) }
	}

	pub fn replace(&self, settings: ProactivitySettings) {
		*self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings;
	}
}
impl SettingsSource for StaticSettings {
	fn load(&self) -> BoxFuture<'_, Result<ProactivitySettings>> {
		let settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner).clone();

		Box::pin(async move { Ok(settings) })
	}
}

impl RapportService {
	pub async fn load_settings(&self) -> Result<ProactivitySettings> {
		self.settings.load().await
	}

	/// Validates and persists a full settings document. Partial admin patches should be merged
	/// onto [`RapportService::load_settings`] first.
	pub async fn save_settings(
		&self,
		settings: &ProactivitySettings,
		now: OffsetDateTime,
	) -> Result<()> {
		settings_store::save(&self.db.pool, settings, now).await?;

		tracing::info!("Proactivity settings updated.");

		Ok(())
	}
}

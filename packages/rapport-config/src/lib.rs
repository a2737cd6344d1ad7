mod error;
mod settings;
mod types;

pub use error::{Error, Result};
pub use settings::{JobModel, ProactivitySettings, parse_clock_minutes, validate_settings};
pub use types::{
	Agents, Config, LlmProviderConfig, NotifierConfig, Postgres, Providers, Service, Storage,
	Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.llm.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.llm.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.llm.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.llm.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.notifier.enabled && cfg.providers.notifier.bot_token.is_none() {
		return Err(Error::Validation {
			message: "providers.notifier.bot_token is required when the notifier is enabled."
				.to_string(),
		});
	}
	if cfg.agents.primary_slug.trim().is_empty() {
		return Err(Error::Validation {
			message: "agents.primary_slug must be non-empty.".to_string(),
		});
	}

	for (label, value) in [
		("worker.scheduler_tick_seconds", cfg.worker.scheduler_tick_seconds),
		("worker.sweep_tick_seconds", cfg.worker.sweep_tick_seconds),
		("worker.counter_purge_interval_seconds", cfg.worker.counter_purge_interval_seconds),
		("worker.sweep_batch_size", u64::from(cfg.worker.sweep_batch_size)),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}

	for (key, value) in &cfg.providers.llm.default_headers {
		if !value.is_string() {
			return Err(Error::Validation {
				message: format!("providers.llm.default_headers.{key} must be a string."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.providers.notifier.bot_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.providers.notifier.bot_token = None;
	}

	cfg.agents.primary_slug = cfg.agents.primary_slug.trim().to_string();
}

pub mod consolidation;
pub mod context;
pub mod executor;
pub mod live;
pub mod proactivity;
pub mod scheduler;
pub mod session;
pub mod settings;

mod error;
mod structured;
mod time_serde;

pub use consolidation::ConsolidationOutcome;
pub use context::{CompressionJob, CompressionOutcome};
pub use error::{Error, Result};
pub use executor::ExecutionOutcome;
pub use live::{LiveEvent, LiveHub};
pub use proactivity::DetectionOutcome;
pub use scheduler::{ScheduleDecision, SchedulerReport};
pub use session::RecordedMessage;
pub use settings::{DbSettings, SettingsSource, StaticSettings};

use std::{future::Future, pin::Pin, sync::Arc};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use rapport_config::{Config, LlmProviderConfig, NotifierConfig};
use rapport_providers::{
	llm::{self, CompletionRequest, PromptMessage},
	notifier,
};
use rapport_storage::{db::Db, models::ChatSession};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const MAX_ERROR_CHARS: usize = 1_024;

pub trait LlmProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: CompletionRequest<'a>,
		messages: &'a [PromptMessage],
	) -> BoxFuture<'a, Result<String>>;
}

pub trait Notifier
where
	Self: Send + Sync,
{
	fn send_text<'a>(
		&'a self,
		cfg: &'a NotifierConfig,
		external_id: &'a str,
		text: &'a str,
	) -> BoxFuture<'a, Result<()>>;
}

pub trait LiveBroadcaster
where
	Self: Send + Sync,
{
	/// Fire and forget. Nobody listening is not an error.
	fn broadcast(&self, user_id: Uuid, event: LiveEvent);
}

/// Counts of what one sweep over sessions did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	pub examined: usize,
	pub succeeded: usize,
	pub skipped: usize,
	pub failed: usize,
}

#[derive(Clone)]
pub struct Providers {
	pub llm: Arc<dyn LlmProvider>,
	pub notifier: Arc<dyn Notifier>,
}
impl Providers {
	pub fn new(llm: Arc<dyn LlmProvider>, notifier: Arc<dyn Notifier>) -> Self {
		Self { llm, notifier }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { llm: provider.clone(), notifier: provider }
	}
}

pub struct RapportService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
	pub settings: Arc<dyn SettingsSource>,
	pub live: Arc<dyn LiveBroadcaster>,
}
impl RapportService {
	/// Production wiring: HTTP providers, settings read from Postgres, in-process live hub.
	pub fn new(cfg: Config, db: Db, live: Arc<LiveHub>) -> Self {
		let settings = Arc::new(DbSettings::new(db.clone()));

		Self { cfg, db, providers: Providers::default(), settings, live }
	}

	pub fn with_parts(
		cfg: Config,
		db: Db,
		providers: Providers,
		settings: Arc<dyn SettingsSource>,
		live: Arc<dyn LiveBroadcaster>,
	) -> Self {
		Self { cfg, db, providers, settings, live }
	}

	pub(crate) fn is_primary(&self, agent_slug: &str) -> bool {
		agent_slug == self.cfg.agents.primary_slug
	}
}

struct DefaultProviders;
impl LlmProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: CompletionRequest<'a>,
		messages: &'a [PromptMessage],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(llm::complete(cfg, request, messages).await?) })
	}
}
impl Notifier for DefaultProviders {
	fn send_text<'a>(
		&'a self,
		cfg: &'a NotifierConfig,
		external_id: &'a str,
		text: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(notifier::send_text(cfg, external_id, text).await?) })
	}
}

/// Stand-in for an empty prompt section.
pub(crate) fn or_none(text: &str) -> &str {
	let trimmed = text.trim();

	if trimmed.is_empty() { "(none)" } else { trimmed }
}

/// Creation time for a message written under the session lock. It always lands after the
/// memory checkpoint, so the next consolidation reads it.
pub(crate) fn message_stamp(at: OffsetDateTime, session: &ChatSession) -> OffsetDateTime {
	match session.last_summarized_at {
		Some(checkpoint) if checkpoint >= at => checkpoint + Duration::microseconds(1),
		_ => at,
	}
}

/// Makes an error safe to persist: credentials are masked and the text is bounded.
pub(crate) fn sanitize_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		// Bot APIs carry the token in the URL path.
		if let Some(start) = word.find("/bot") {
			let rest = &word[start + 4..];
			let end = rest.find('/').unwrap_or(rest.len());

			if end > 0 {
				word = format!("{}/bot[REDACTED]{}", &word[..start], &rest[end..]);
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_ERROR_CHARS {
		out = out.chars().take(MAX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

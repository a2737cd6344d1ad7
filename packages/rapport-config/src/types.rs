use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub agents: Agents,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub llm: LlmProviderConfig,
	pub notifier: NotifierConfig,
}

/// OpenAI-compatible chat completion endpoint. Model, temperature and token limits are chosen
/// per job from the proactivity settings, not here.
#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NotifierConfig {
	pub enabled: bool,
	pub api_base: String,
	pub bot_token: Option<String>,
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Agents {
	/// Slug of the agent that owns the global user profile.
	pub primary_slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub scheduler_tick_seconds: u64,
	pub sweep_tick_seconds: u64,
	pub counter_purge_interval_seconds: u64,
	pub claim_lease_seconds: i64,
	pub sweep_batch_size: u32,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			scheduler_tick_seconds: 60,
			sweep_tick_seconds: 120,
			counter_purge_interval_seconds: 900,
			claim_lease_seconds: 300,
			sweep_batch_size: 200,
		}
	}
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

const DEFAULT_MEMORY_PROMPT: &str = "\
You maintain the private notes an assistant keeps about one user. Merge the new conversation \
turns into the existing notes. Keep durable facts, preferences, goals and open threads; drop \
small talk. Reply with a JSON object: {\"memoryUpdate\": string}.";
const DEFAULT_GLOBAL_MEMORY_PROMPT: &str = "\
You maintain both the primary assistant's private notes and the shared profile every agent \
reads about this user. Merge the new turns and the other agents' notes into them. Reply with a \
JSON object: {\"memoryUpdate\": string, \"globalProfileUpdate\": string}.";
const DEFAULT_PROACTIVITY_PROMPT: &str = "\
Decide whether the agent should start a new conversation with a user who has been silent. \
Only say yes when there is a concrete, useful reason grounded in what you know about the user. \
Reply with a JSON object: {\"createTask\": boolean, \"topic\": string}.";
const DEFAULT_COMPRESSION_PROMPT: &str = "\
Summarize the earlier part of this conversation so it can replace the original turns. Keep \
facts, decisions, commitments and unresolved questions. If a previous summary is given, fold \
it into the new one.";
const DEFAULT_MESSAGE_TEMPLATE: &str = "\
You are writing to {user_name} without being asked. Now: {current_datetime}.
What everyone knows about them: {global_profile}
What you know about them: {local_memory}
Reason to reach out: {topic}
Conversation so far:
{history}
Write one short, natural message that opens the conversation.";

/// Model knobs for one background job.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobModel {
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
}
impl JobModel {
	fn new(model: &str, temperature: f32, max_tokens: u32) -> Self {
		Self { model: model.to_string(), temperature, max_tokens }
	}
}

/// The singleton policy object. Stored as JSON so an admin patch may omit fields; anything
/// missing falls back to the defaults below.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProactivitySettings {
	pub enabled: bool,
	/// Hours.
	pub memory_update_interval: f64,
	/// Hours.
	pub proactivity_timeout: f64,
	/// `HH:MM`, user local time.
	pub quiet_hours_start: String,
	/// `HH:MM`, user local time. May be earlier than the start, which wraps past midnight.
	pub quiet_hours_end: String,
	pub max_messages_per_day_agents: u32,
	pub max_messages_per_day_assistant: u32,
	pub max_consecutive_messages: u32,
	/// Caps the model token limit when greater than zero.
	pub context_soft_limit: u32,
	pub context_threshold: f64,
	pub context_compression_keep_last: u32,
	pub memory_model: JobModel,
	pub proactivity_model: JobModel,
	pub compression_model: JobModel,
	pub message_model: JobModel,
	pub memory_prompt: String,
	pub global_memory_prompt: String,
	pub proactivity_prompt: String,
	pub compression_prompt: String,
	pub message_template: String,
}
impl ProactivitySettings {
	pub fn from_json(value: Value) -> Result<Self> {
		serde_json::from_value(value).map_err(|source| Error::DecodeSettings { source })
	}

	pub fn to_json(&self) -> Result<Value> {
		serde_json::to_value(self).map_err(|source| Error::DecodeSettings { source })
	}

	pub fn memory_update_interval_seconds(&self) -> i64 {
		hours_to_seconds(self.memory_update_interval)
	}

	pub fn proactivity_timeout_seconds(&self) -> i64 {
		hours_to_seconds(self.proactivity_timeout)
	}
}
impl Default for ProactivitySettings {
	fn default() -> Self {
		Self {
			enabled: true,
			memory_update_interval: 6.0,
			proactivity_timeout: 24.0,
			quiet_hours_start: "22:00".to_string(),
			quiet_hours_end: "10:00".to_string(),
			max_messages_per_day_agents: 3,
			max_messages_per_day_assistant: 5,
			max_consecutive_messages: 2,
			context_soft_limit: 0,
			context_threshold: 0.9,
			context_compression_keep_last: 20,
			memory_model: JobModel::new("gpt-4o-mini", 0.3, 1_500),
			proactivity_model: JobModel::new("gpt-4o-mini", 0.5, 300),
			compression_model: JobModel::new("gpt-4o-mini", 0.2, 1_500),
			message_model: JobModel::new("gpt-4o", 0.8, 600),
			memory_prompt: DEFAULT_MEMORY_PROMPT.to_string(),
			global_memory_prompt: DEFAULT_GLOBAL_MEMORY_PROMPT.to_string(),
			proactivity_prompt: DEFAULT_PROACTIVITY_PROMPT.to_string(),
			compression_prompt: DEFAULT_COMPRESSION_PROMPT.to_string(),
			message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
		}
	}
}

pub fn validate_settings(settings: &ProactivitySettings) -> Result<()> {
	for (label, hours) in [
		("memoryUpdateInterval", settings.memory_update_interval),
		("proactivityTimeout", settings.proactivity_timeout),
	] {
		if !hours.is_finite() || hours <= 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a positive number of hours."),
			});
		}
	}
	for (label, value) in
		[("quietHoursStart", &settings.quiet_hours_start), ("quietHoursEnd", &settings.quiet_hours_end)]
	{
		if parse_clock_minutes(value).is_none() {
			return Err(Error::Validation { message: format!("{label} must be formatted as HH:MM.") });
		}
	}

	if !settings.context_threshold.is_finite()
		|| settings.context_threshold <= 0.0
		|| settings.context_threshold > 1.0
	{
		return Err(Error::Validation {
			message: "contextThreshold must be in the range (0.0, 1.0].".to_string(),
		});
	}
	if settings.context_compression_keep_last == 0 {
		return Err(Error::Validation {
			message: "contextCompressionKeepLast must be greater than zero.".to_string(),
		});
	}
	if settings.max_consecutive_messages == 0 {
		return Err(Error::Validation {
			message: "maxConsecutiveMessages must be greater than zero.".to_string(),
		});
	}

	for (label, job) in [
		("memoryModel", &settings.memory_model),
		("proactivityModel", &settings.proactivity_model),
		("compressionModel", &settings.compression_model),
		("messageModel", &settings.message_model),
	] {
		if job.model.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label}.model must be non-empty.") });
		}
		if !job.temperature.is_finite() || job.temperature < 0.0 {
			return Err(Error::Validation {
				message: format!("{label}.temperature must be zero or greater."),
			});
		}
		if job.max_tokens == 0 {
			return Err(Error::Validation {
				message: format!("{label}.maxTokens must be greater than zero."),
			});
		}
	}

	Ok(())
}

/// Parses `HH:MM` into minutes after midnight.
pub fn parse_clock_minutes(value: &str) -> Option<u32> {
	let (hours, minutes) = value.trim().split_once(':')?;

	if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
		return None;
	}

	let hours: u32 = hours.parse().ok()?;
	let minutes: u32 = minutes.parse().ok()?;

	if hours > 23 || minutes > 59 {
		return None;
	}

	Some(hours * 60 + minutes)
}

fn hours_to_seconds(hours: f64) -> i64 {
	(hours * 3_600.0).round() as i64
}

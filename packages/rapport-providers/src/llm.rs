use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};
use rapport_config::{JobModel, LlmProviderConfig};
use rapport_domain::message::Role;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PromptMessage {
	pub role: Role,
	pub content: String,
}
impl PromptMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: Role::System, content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: Role::User, content: content.into() }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self { role: Role::Assistant, content: content.into() }
	}
}

/// Per-call knobs. `json_object` asks the endpoint to constrain output to one JSON object; the
/// caller still validates the reply.
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
	pub model: &'a str,
	pub temperature: f32,
	pub max_tokens: u32,
	pub json_object: bool,
}
impl<'a> CompletionRequest<'a> {
	pub fn text(job: &'a JobModel) -> Self {
		Self {
			model: job.model.as_str(),
			temperature: job.temperature,
			max_tokens: job.max_tokens,
			json_object: false,
		}
	}

	pub fn json(job: &'a JobModel) -> Self {
		Self { json_object: true, ..Self::text(job) }
	}
}

pub async fn complete(
	cfg: &LlmProviderConfig,
	request: CompletionRequest<'_>,
	messages: &[PromptMessage],
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut body = serde_json::json!({
		"model": request.model,
		"temperature": request.temperature,
		"max_tokens": request.max_tokens,
		"messages": messages,
	});

	if request.json_object {
		body["response_format"] = serde_json::json!({ "type": "json_object" });
	}

	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_text(&json)
}

fn parse_completion_text(json: &Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or(Error::InvalidCompletion { problem: "is missing message content" })?;

	if content.trim().is_empty() {
		return Err(Error::InvalidCompletion { problem: "content is empty" });
	}

	Ok(content.to_string())
}

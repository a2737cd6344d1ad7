use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};
use rapport_config::NotifierConfig;

/// Delivers `text` to a bot-API chat. `external_id` is the chat id on the messaging platform.
pub async fn send_text(cfg: &NotifierConfig, external_id: &str, text: &str) -> Result<()> {
	let token = cfg.bot_token.as_deref().ok_or_else(|| Error::InvalidConfig {
		message: "Notifier bot_token is not configured.".to_string(),
	})?;
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}/bot{token}/sendMessage", cfg.api_base.trim_end_matches('/'));
	let body = serde_json::json!({ "chat_id": external_id, "text": text });
	let res = client.post(url).json(&body).send().await?;
	let json: Value = res.error_for_status()?.json().await?;

	check_delivery(&json)
}

fn check_delivery(json: &Value) -> Result<()> {
	if json.get("ok").and_then(Value::as_bool).unwrap_or(false) {
		return Ok(());
	}

	let description =
		json.get("description").and_then(Value::as_str).unwrap_or("no description given");

	Err(Error::DeliveryRejected { description: description.to_string() })
}

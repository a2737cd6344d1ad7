use serde::de::DeserializeOwned;

use crate::{Error, LlmProvider, Result};
use rapport_config::LlmProviderConfig;
use rapport_providers::llm::{CompletionRequest, PromptMessage};

const MAX_ATTEMPTS: usize = 3;

/// A typed model reply with rules beyond its JSON shape.
pub(crate) trait StructuredReply
where
	Self: DeserializeOwned,
{
	fn check(&self) -> Result<(), String>;
}

/// Asks for a JSON object and parses it into `T`. Malformed replies are retried; transport
/// failures are returned at once.
pub(crate) async fn complete_structured<T>(
	llm: &dyn LlmProvider,
	cfg: &LlmProviderConfig,
	request: CompletionRequest<'_>,
	messages: &[PromptMessage],
) -> Result<T>
where
	T: StructuredReply,
{
	let mut last_problem = String::new();

	for attempt in 1..=MAX_ATTEMPTS {
		let raw = llm.complete(cfg, request, messages).await?;

		match parse_reply::<T>(&raw) {
			Ok(reply) => return Ok(reply),
			Err(problem) => {
				tracing::warn!(attempt, problem = %problem, "Model reply was not usable JSON.");

				last_problem = problem;
			},
		}
	}

	Err(Error::MalformedReply {
		message: format!("No usable reply after {MAX_ATTEMPTS} attempts: {last_problem}"),
	})
}

pub(crate) fn parse_reply<T>(raw: &str) -> Result<T, String>
where
	T: StructuredReply,
{
	let body = extract_object(raw).ok_or_else(|| "Reply holds no JSON object.".to_string())?;
	let reply: T =
		serde_json::from_str(body).map_err(|err| format!("Reply does not match schema: {err}."))?;

	reply.check()?;

	Ok(reply)
}

/// The outermost `{...}` span, which also strips code fences and stray prose.
fn extract_object(raw: &str) -> Option<&str> {
	let start = raw.find('{')?;
	let end = raw.rfind('}')?;

	(start < end).then(|| &raw[start..=end])
}

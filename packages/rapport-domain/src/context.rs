//! Token budgeting for prompt construction.

pub const DEFAULT_TOKEN_LIMIT: u32 = 8_192;
pub const DEFAULT_THRESHOLD: f64 = 0.9;

const CHARS_PER_TOKEN: usize = 4;
const PER_MESSAGE_OVERHEAD: usize = 4;
const REPLY_PRIMING: usize = 3;

// Longest matching prefix wins, so more specific names must not be shadowed by shorter ones.
const MODEL_TOKEN_LIMITS: &[(&str, u32)] = &[
	("gpt-4o-mini", 128_000),
	("gpt-4o", 128_000),
	("gpt-4.1", 1_047_576),
	("gpt-4-turbo", 128_000),
	("gpt-4-32k", 32_768),
	("gpt-4", 8_192),
	("gpt-3.5-turbo", 16_385),
	("o1", 200_000),
	("o3", 200_000),
	("o4-mini", 200_000),
	("claude-3", 200_000),
	("claude-sonnet-4", 200_000),
	("claude-opus-4", 200_000),
	("gemini-1.5", 1_048_576),
	("gemini-2", 1_048_576),
	("llama-3.1", 131_072),
];

/// Context window of `model`, or [`DEFAULT_TOKEN_LIMIT`] when the model is unknown.
pub fn model_token_limit(model: &str) -> u32 {
	let name = model.trim().to_ascii_lowercase();
	let name = name.rsplit('/').next().unwrap_or(name.as_str());

	MODEL_TOKEN_LIMITS
		.iter()
		.filter(|(prefix, _)| name.starts_with(prefix))
		.max_by_key(|(prefix, _)| prefix.len())
		.map(|(_, limit)| *limit)
		.unwrap_or(DEFAULT_TOKEN_LIMIT)
}

/// Applies the configured soft limit on top of the model limit. Zero disables the soft limit.
pub fn effective_token_limit(model: &str, soft_limit: u32) -> u32 {
	let limit = model_token_limit(model);

	if soft_limit > 0 { limit.min(soft_limit) } else { limit }
}

pub fn estimate_text_tokens(text: &str) -> usize {
	text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimates the prompt size of a chat request whose messages have the given contents.
pub fn estimate_prompt_tokens<'a, I>(contents: I) -> usize
where
	I: IntoIterator<Item = &'a str>,
{
	contents.into_iter().map(|content| estimate_text_tokens(content) + PER_MESSAGE_OVERHEAD).sum::<usize>()
		+ REPLY_PRIMING
}

/// True when the prompt uses more than `threshold` of `token_limit`.
pub fn is_overflowing<'a, I>(contents: I, token_limit: u32, threshold: f64) -> bool
where
	I: IntoIterator<Item = &'a str>,
{
	let threshold = if threshold.is_finite() && threshold > 0.0 { threshold } else { DEFAULT_THRESHOLD };
	let budget = f64::from(token_limit) * threshold;

	estimate_prompt_tokens(contents) as f64 > budget
}

/// Splits `count` ordered items into the prefix to compress and the suffix to keep. Returns
/// `None` when nothing needs compressing.
pub fn compression_split(count: usize, keep_last: usize) -> Option<usize> {
	if count <= keep_last {
		return None;
	}

	Some(count - keep_last)
}

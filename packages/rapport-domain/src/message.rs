use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
	System,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
			Self::System => "system",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"user" => Some(Self::User),
			"assistant" => Some(Self::Assistant),
			"system" => Some(Self::System),
			_ => None,
		}
	}

	fn label(self) -> &'static str {
		match self {
			Self::User => "User",
			Self::Assistant => "Assistant",
			Self::System => "System",
		}
	}
}
impl Display for Role {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// What a stored message is, independent of who authored it.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
	/// A regular conversation turn.
	Turn,
	/// A compression summary standing in for archived turns.
	Summary,
	/// The marker written before a proactive message, recording why it was sent.
	ProactiveTrigger,
}
impl MessageKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Turn => "turn",
			Self::Summary => "summary",
			Self::ProactiveTrigger => "proactive_trigger",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"turn" => Some(Self::Turn),
			"summary" => Some(Self::Summary),
			"proactive_trigger" => Some(Self::ProactiveTrigger),
			_ => None,
		}
	}
}
impl Display for MessageKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Renders messages as `Role: content` lines, one message per paragraph.
pub fn format_transcript<'a, I>(messages: I) -> String
where
	I: IntoIterator<Item = (Role, &'a str)>,
{
	let mut out = String::new();

	for (role, content) in messages {
		if !out.is_empty() {
			out.push('\n');
		}

		out.push_str(role.label());
		out.push_str(": ");
		out.push_str(content.trim());
	}

	out
}

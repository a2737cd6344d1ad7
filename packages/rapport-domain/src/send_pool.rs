use time::{Date, Duration, OffsetDateTime};

use rapport_config::ProactivitySettings;

/// Daily cap bucket a proactive send counts against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendPool {
	/// The primary assistant, capped on its own.
	Assistant,
	/// Every other agent, sharing one cap.
	Agents,
}
impl SendPool {
	pub fn for_agent(agent_slug: &str, primary_slug: &str) -> Self {
		if agent_slug == primary_slug { Self::Assistant } else { Self::Agents }
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Assistant => "assistant",
			Self::Agents => "agents",
		}
	}

	pub fn daily_cap(self, settings: &ProactivitySettings) -> u32 {
		match self {
			Self::Assistant => settings.max_messages_per_day_assistant,
			Self::Agents => settings.max_messages_per_day_agents,
		}
	}
}

/// The UTC calendar day a send at `now` is counted on.
pub fn utc_day(now: OffsetDateTime) -> Date {
	now.to_offset(time::UtcOffset::UTC).date()
}

/// Counter rows only need to outlive their own day; keep one spare day for late readers.
pub fn counter_expiry(day: Date) -> OffsetDateTime {
	day.midnight().assume_utc() + Duration::days(2)
}

pub fn under_cap(sent_today: u32, cap: u32) -> bool {
	sent_today < cap
}

//! The three session checkpoints encode where a session sits relative to the background jobs.
//! Both jobs derive their gate from [`Checkpoints`] instead of comparing timestamps inline.

use time::{Duration, OffsetDateTime};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Checkpoints {
	pub last_message_at: Option<OffsetDateTime>,
	pub last_summarized_at: Option<OffsetDateTime>,
	pub last_proactivity_check_at: Option<OffsetDateTime>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryPhase {
	/// No message arrived after the last consolidation.
	UpToDate,
	/// New messages exist but the update interval has not elapsed.
	Cooling,
	Due,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProactivityPhase {
	/// The session has no messages to follow up on.
	Empty,
	/// The detector already ran after the latest message.
	AlreadyChecked,
	/// The user has not been silent for the full timeout yet.
	Active,
	Due,
}

impl Checkpoints {
	pub fn memory_phase(&self, now: OffsetDateTime, interval: Duration) -> MemoryPhase {
		let Some(last_message_at) = self.last_message_at else {
			return MemoryPhase::UpToDate;
		};
		let summarized_at = self.last_summarized_at.unwrap_or(OffsetDateTime::UNIX_EPOCH);

		if last_message_at <= summarized_at {
			return MemoryPhase::UpToDate;
		}
		if now - summarized_at <= interval {
			return MemoryPhase::Cooling;
		}

		MemoryPhase::Due
	}

	pub fn proactivity_phase(&self, now: OffsetDateTime, timeout: Duration) -> ProactivityPhase {
		let Some(last_message_at) = self.last_message_at else {
			return ProactivityPhase::Empty;
		};
		let checked_at = self.last_proactivity_check_at.unwrap_or(OffsetDateTime::UNIX_EPOCH);

		if checked_at > last_message_at {
			return ProactivityPhase::AlreadyChecked;
		}
		// With the check at or before the last message, a silence longer than the timeout also
		// puts the previous check more than one timeout in the past.
		if now - last_message_at <= timeout || now - checked_at <= timeout {
			return ProactivityPhase::Active;
		}

		ProactivityPhase::Due
	}

	/// Time since the latest message, or zero for an empty session.
	pub fn silence(&self, now: OffsetDateTime) -> Duration {
		self.last_message_at.map(|at| (now - at).max(Duration::ZERO)).unwrap_or(Duration::ZERO)
	}
}

/// Human-readable silence length for prompts, e.g. `2 days 5 hours`.
pub fn describe_silence(silence: Duration) -> String {
	let days = silence.whole_days();
	let hours = silence.whole_hours() - days * 24;

	match (days, hours) {
		(0, 0) => format!("{} minutes", silence.whole_minutes().max(0)),
		(0, h) => format!("{h} hours"),
		(d, 0) => format!("{d} days"),
		(d, h) => format!("{d} days {h} hours"),
	}
}

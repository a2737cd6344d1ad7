use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use time::OffsetDateTime;

use rapport_config::{ProactivitySettings, parse_clock_minutes};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A daily window in minutes after local midnight. `start > end` wraps past midnight and
/// `start == end` is an empty window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuietHours {
	pub start: u32,
	pub end: u32,
}
impl QuietHours {
	pub fn from_settings(settings: &ProactivitySettings) -> Option<Self> {
		Some(Self {
			start: parse_clock_minutes(&settings.quiet_hours_start)?,
			end: parse_clock_minutes(&settings.quiet_hours_end)?,
		})
	}

	pub fn contains(&self, minute_of_day: u32) -> bool {
		let minute = minute_of_day % MINUTES_PER_DAY;

		if self.start <= self.end {
			self.start <= minute && minute < self.end
		} else {
			minute >= self.start || minute < self.end
		}
	}

	pub fn is_quiet_at(&self, now: OffsetDateTime, timezone: &str) -> bool {
		self.contains(local_minute_of_day(now, timezone))
	}
}

/// Resolves an IANA zone name, falling back to UTC for unknown or empty names.
pub fn resolve_timezone(name: &str) -> Tz {
	name.trim().parse::<Tz>().unwrap_or(Tz::UTC)
}

pub fn local_minute_of_day(now: OffsetDateTime, timezone: &str) -> u32 {
	let local = to_chrono(now).with_timezone(&resolve_timezone(timezone));

	local.hour() * 60 + local.minute()
}

/// Formats `now` in the user's zone for prompt templates.
pub fn format_local_datetime(now: OffsetDateTime, timezone: &str) -> String {
	let tz = resolve_timezone(timezone);

	to_chrono(now).with_timezone(&tz).format("%A, %Y-%m-%d %H:%M (%Z)").to_string()
}

fn to_chrono(now: OffsetDateTime) -> DateTime<Utc> {
	DateTime::from_timestamp(now.unix_timestamp(), now.nanosecond()).unwrap_or_default()
}

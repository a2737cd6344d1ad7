use crate::message::Role;

/// Counts the newest run of assistant messages, walking backward from the end of `roles`
/// (ordered oldest first) until the first user message. System messages are transparent: they
/// neither extend nor break the run.
pub fn trailing_assistant_streak<I>(roles: I) -> u32
where
	I: IntoIterator<Item = Role>,
	I::IntoIter: DoubleEndedIterator,
{
	let mut streak = 0;

	for role in roles.into_iter().rev() {
		match role {
			Role::User => break,
			Role::Assistant => streak += 1,
			Role::System => {},
		}
	}

	streak
}

pub fn exceeds_streak_limit(streak: u32, max_consecutive: u32) -> bool {
	streak >= max_consecutive
}

use std::{collections::HashMap, sync::Mutex};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::LiveBroadcaster;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
	ProactiveMessage {
		session_id: Uuid,
		agent_slug: String,
		message_id: Uuid,
		content: String,
		#[serde(with = "crate::time_serde")]
		created_at: OffsetDateTime,
	},
	SessionCompressed {
		session_id: Uuid,
		archived: u64,
	},
}

/// In-process fan-out keyed by user. Channels are created on first subscribe and dropped once the
/// last receiver is gone.
#[derive(Default)]
pub struct LiveHub {
	channels: Mutex<HashMap<Uuid, broadcast::Sender<LiveEvent>>>,
}
impl LiveHub {
	pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<LiveEvent> {
		let mut channels = self.channels.lock().unwrap_or_else(|err| err.into_inner());

		channels
			.entry(user_id)
			.or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
			.subscribe()
	}

	pub fn subscriber_count(&self, user_id: Uuid) -> usize {
		let channels = self.channels.lock().unwrap_or_else(|err| err.into_inner());

		channels.get(&user_id).map(broadcast::Sender::receiver_count).unwrap_or(0)
	}
}
impl LiveBroadcaster for LiveHub {
	fn broadcast(&self, user_id: Uuid, event: LiveEvent) {
		let mut channels = self.channels.lock().unwrap_or_else(|err| err.into_inner());
		let Some(sender) = channels.get(&user_id) else {
			return;
		};

		if sender.send(event).is_err() {
			channels.remove(&user_id);

			tracing::debug!(user_id = %user_id, "Dropped live channel without subscribers.");
		}
	}
}

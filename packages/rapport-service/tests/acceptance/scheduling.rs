use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime, macros::datetime};

use rapport_config::ProactivitySettings;
use rapport_service::{ExecutionOutcome, LiveEvent};
use rapport_storage::{actions, counters, messages, models::User};

use super::{PRIMARY, StubLlm, TestEnv};

async fn queue(env: &TestEnv, user: &User, agent_slug: &str, topic: &str, at: OffsetDateTime) {
	super::seed_agent(&env.service, agent_slug).await;

	let inserted = actions::insert_pending(&env.service.db.pool, user.user_id, agent_slug, topic, at)
		.await
		.expect("Failed to queue action.");

	assert!(inserted);
}

async fn sent_on(env: &TestEnv, user: &User, pool: &str, at: OffsetDateTime) -> i32 {
	counters::sent_count(&env.service.db.pool, user.user_id, pool, at.date())
		.await
		.expect("Failed to read counter.")
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn quiet_hours_follow_the_users_timezone() {
	let Some(env) =
		super::test_env(StubLlm::replying("How did the race go?"), ProactivitySettings::default())
			.await
	else {
		eprintln!("Skipping quiet_hours_follow_the_users_timezone; set RAPPORT_PG_DSN to run.");

		return;
	};
	let user = super::seed_user(&env.service, "lea", "Asia/Tokyo").await;
	let tokyo_night = datetime!(2026-03-02 14:00 UTC);
	let tokyo_morning = datetime!(2026-03-03 02:00 UTC);

	queue(&env, &user, "coach", "Ask about the race.", tokyo_night - Duration::hours(1)).await;

	let mut live = env.hub.subscribe(user.user_id);
	let report = env.service.run_scheduler_tick(tokyo_night).await.expect("Tick failed.");

	assert_eq!(report.deferred, 1);
	assert_eq!(env.llm.count(), 0);

	let report = env.service.run_scheduler_tick(tokyo_morning).await.expect("Tick failed.");

	assert_eq!(report.sent, 1);
	assert_eq!(sent_on(&env, &user, "agents", tokyo_morning).await, 1);

	let prompt = &env.llm.prompts()[0];

	assert!(prompt.contains("You are writing to lea"));
	assert!(prompt.contains("Reason to reach out: Ask about the race."));
	assert!(prompt.contains("2026-03-03 11:00"));
	assert_eq!(
		env.notifier.deliveries(),
		vec![("chat-lea".to_string(), "How did the race go?".to_string())]
	);

	match live.try_recv().expect("Expected a live event.") {
		LiveEvent::ProactiveMessage { agent_slug, content, session_id, .. } => {
			assert_eq!(agent_slug, "coach");
			assert_eq!(content, "How did the race go?");

			let history = messages::list_active(&env.service.db.pool, session_id)
				.await
				.expect("List failed.");

			assert_eq!(
				history.iter().map(|m| (m.role.as_str(), m.kind.as_str())).collect::<Vec<_>>(),
				vec![("system", "proactive_trigger"), ("assistant", "turn")]
			);
		},
		other => panic!("Unexpected live event: {other:?}"),
	}

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn agent_pool_cap_resets_when_the_utc_day_rolls_over() {
	let settings = ProactivitySettings { max_messages_per_day_agents: 3, ..Default::default() };
	let Some(env) = super::test_env(StubLlm::replying("Hello again!"), settings).await else {
		eprintln!("Skipping agent_pool_cap_resets_when_the_utc_day_rolls_over; set RAPPORT_PG_DSN.");

		return;
	};
	let user = super::seed_user(&env.service, "max", "UTC").await;
	let day_one = datetime!(2026-03-02 14:00 UTC);
	let day_two = datetime!(2026-03-03 14:00 UTC);

	for (idx, slug) in [PRIMARY, "coach", "chef", "tutor", "muse"].into_iter().enumerate() {
		let queued_at = day_one - Duration::minutes(10 - idx as i64);

		queue(&env, &user, slug, "Check in.", queued_at).await;
	}

	let report = env.service.run_scheduler_tick(day_one).await.expect("Tick failed.");

	assert_eq!(report.sent, 4);
	assert_eq!(report.deferred, 1);
	assert_eq!(sent_on(&env, &user, "agents", day_one).await, 3);
	assert_eq!(sent_on(&env, &user, "assistant", day_one).await, 1);
	assert_eq!(super::pending_count(&env.service, &user, "muse").await, 1);

	let report = env.service.run_scheduler_tick(day_one + Duration::hours(2)).await.expect("Tick.");

	assert_eq!(report.deferred, 1);
	assert_eq!(env.llm.count(), 4);

	let report = env.service.run_scheduler_tick(day_two).await.expect("Tick failed.");

	assert_eq!(report.sent, 1);
	assert_eq!(sent_on(&env, &user, "agents", day_two).await, 1);
	assert_eq!(super::pending_count(&env.service, &user, "muse").await, 0);

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn action_cancelled_during_generation_stores_nothing() {
	let Some(env) =
		super::test_env(StubLlm::replying("Hey there!"), ProactivitySettings::default()).await
	else {
		eprintln!("Skipping action_cancelled_during_generation_stores_nothing; set RAPPORT_PG_DSN.");

		return;
	};
	let user = super::seed_user(&env.service, "ned", "UTC").await;
	let now = datetime!(2026-03-02 14:00 UTC);

	queue(&env, &user, "coach", "Say hi.", now).await;

	let pending = actions::find_pending(&env.service.db.pool, user.user_id, "coach")
		.await
		.expect("Find failed.")
		.expect("Pending action exists.");
	let claimed = actions::claim_action(&env.service.db.pool, pending.action_id, now, 300)
		.await
		.expect("Claim failed.")
		.expect("Claim should succeed.");

	env.service.cancel_pending_actions(user.user_id, "coach").await.expect("Cancel failed.");

	let outcome = env.service.execute_action(&claimed, now).await.expect("Execute failed.");

	assert_eq!(outcome, ExecutionOutcome::Cancelled);

	let session = env
		.service
		.resolve_session(user.user_id, "coach", None)
		.await
		.expect("Resolve should succeed.");

	assert!(
		messages::list_active(&env.service.db.pool, session.session_id)
			.await
			.expect("List failed.")
			.is_empty()
	);
	assert_eq!(sent_on(&env, &user, "agents", now).await, 0);
	assert!(env.notifier.deliveries().is_empty());

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn generation_failure_marks_the_action_failed_for_good() {
	let Some(env) = super::test_env(StubLlm::failing(), ProactivitySettings::default()).await else {
		eprintln!("Skipping generation_failure_marks_the_action_failed; set RAPPORT_PG_DSN to run.");

		return;
	};
	let user = super::seed_user(&env.service, "ola", "UTC").await;
	let now = datetime!(2026-03-02 14:00 UTC);

	queue(&env, &user, "coach", "Say hi.", now).await;

	let pending = actions::find_pending(&env.service.db.pool, user.user_id, "coach")
		.await
		.expect("Find failed.")
		.expect("Pending action exists.");
	let report = env.service.run_scheduler_tick(now).await.expect("Tick failed.");

	assert_eq!(report.failed, 1);

	let failed = actions::get_action(&env.service.db.pool, pending.action_id)
		.await
		.expect("Get failed.")
		.expect("Action exists.");

	assert_eq!(failed.status, "failed");
	assert!(failed.last_error.as_deref().is_some_and(|e| e.contains("upstream timed out")));

	let report = env.service.run_scheduler_tick(now + Duration::hours(1)).await.expect("Tick.");

	assert_eq!(report.examined, 0);
	assert_eq!(env.llm.count(), 1);

	env.cleanup().await;
}

fn always_open() -> ProactivitySettings {
	ProactivitySettings {
		memory_update_interval: 0.0,
		quiet_hours_start: "00:00".to_string(),
		quiet_hours_end: "00:00".to_string(),
		..Default::default()
	}
}

async fn session_of(env: &TestEnv, user: &User) -> rapport_storage::models::ChatSession {
	env.service.resolve_session(user.user_id, "coach", None).await.expect("Resolve failed.")
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn slow_delivery_racing_a_memory_sweep_is_still_consolidated() {
	let llm = StubLlm::replying(r#"{"memoryUpdate": "Asked about the race."}"#)
		.slow(StdDuration::from_millis(1_500));
	let Some(env) = super::test_env(llm, always_open()).await else {
		eprintln!("Skipping slow_delivery_racing_a_memory_sweep; set RAPPORT_PG_DSN to run.");

		return;
	};
	let user = super::seed_user(&env.service, "pia", "UTC").await;

	super::seed_agent(&env.service, "coach").await;
	env.service
		.record_user_message(user.user_id, "coach", None, "Race is on Saturday.")
		.await
		.expect("Record should succeed.");
	queue(&env, &user, "coach", "Ask about the race.", OffsetDateTime::now_utc()).await;

	let tick_at = OffsetDateTime::now_utc();
	let (tick, sweep) = tokio::join!(env.service.run_scheduler_tick(tick_at), async {
		tokio::time::sleep(StdDuration::from_millis(500)).await;

		env.service.run_memory_sweep(OffsetDateTime::now_utc()).await
	});

	assert_eq!(tick.expect("Tick failed.").sent, 1);
	assert_eq!(sweep.expect("Sweep failed.").succeeded, 1);

	let session = session_of(&env, &user).await;
	let checkpoint = session.last_summarized_at.expect("Checkpoint should advance.");
	let history =
		messages::list_active(&env.service.db.pool, session.session_id).await.expect("List failed.");
	let reply = history.iter().find(|m| m.role == "assistant").expect("Reply was stored.");

	assert!(reply.created_at > checkpoint);
	assert!(session.last_message_at.is_some_and(|at| at > checkpoint));

	let report =
		env.service.run_memory_sweep(OffsetDateTime::now_utc()).await.expect("Sweep failed.");

	assert_eq!(report.examined, 1);
	assert_eq!(report.succeeded, 1);
	assert_eq!(env.llm.count(), 3);
	assert!(env.llm.prompts()[2].contains("Assistant: {\"memoryUpdate\": \"Asked about the race.\"}"));

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn delivery_after_a_later_checkpoint_sorts_after_it() {
	let llm = StubLlm::replying(r#"{"memoryUpdate": "Knows the race date."}"#);
	let Some(env) = super::test_env(llm, always_open()).await else {
		eprintln!("Skipping delivery_after_a_later_checkpoint_sorts_after_it; set RAPPORT_PG_DSN.");

		return;
	};
	let user = super::seed_user(&env.service, "quin", "UTC").await;

	super::seed_agent(&env.service, "coach").await;
	env.service
		.record_user_message(user.user_id, "coach", None, "Race is on Saturday.")
		.await
		.expect("Record should succeed.");
	queue(&env, &user, "coach", "Ask about the race.", OffsetDateTime::now_utc()).await;

	let tick_at = OffsetDateTime::now_utc();
	let sweep_at = tick_at + Duration::minutes(5);

	env.service.run_memory_sweep(sweep_at).await.expect("Sweep failed.");

	let report = env.service.run_scheduler_tick(tick_at).await.expect("Tick failed.");

	assert_eq!(report.sent, 1);

	let session = session_of(&env, &user).await;

	let checkpoint = session.last_summarized_at.expect("Checkpoint should advance.");

	assert!((checkpoint - sweep_at).abs() < Duration::milliseconds(1));
	assert!(session.last_message_at.is_some_and(|at| at > checkpoint));

	let report =
		env.service.run_memory_sweep(sweep_at + Duration::minutes(1)).await.expect("Sweep failed.");

	assert_eq!(report.succeeded, 1);
	assert!(env.llm.prompts()[2].contains("Assistant: {\"memoryUpdate\": \"Knows the race date.\"}"));

	env.cleanup().await;
}

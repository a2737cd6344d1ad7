use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};

use rapport_config::ProactivitySettings;
use rapport_storage::{actions, messages, sessions};

use super::{StubLlm, TestEnv};

fn always_due() -> ProactivitySettings {
	ProactivitySettings { proactivity_timeout: 0.0, ..Default::default() }
}

fn later() -> OffsetDateTime {
	OffsetDateTime::now_utc() + Duration::hours(1)
}

async fn checked_at(env: &TestEnv, session_id: uuid::Uuid) -> Option<OffsetDateTime> {
	sessions::get_session(&env.service.db.pool, session_id)
		.await
		.expect("Get failed.")
		.expect("Session exists.")
		.last_proactivity_check_at
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn unanswered_streak_skips_the_model_but_advances_the_check() {
	let llm = StubLlm::replying(r#"{"createTask": true, "topic": "Follow up."}"#);
	let Some(env) = super::test_env(llm, always_due()).await else {
		eprintln!("Skipping unanswered_streak_skips_the_model; set RAPPORT_PG_DSN to run.");

		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "hal", "UTC").await;

	super::seed_agent(service, "coach").await;

	let recorded = service
		.record_user_message(user.user_id, "coach", None, "Talk later.")
		.await
		.expect("Record should succeed.");

	for text in ["Ping?", "Still there?"] {
		service
			.record_assistant_message(recorded.session.session_id, text)
			.await
			.expect("Record should succeed.");
	}

	let report = service.run_proactivity_sweep(later()).await.expect("Sweep failed.");

	assert_eq!(report.succeeded, 1);
	assert_eq!(env.llm.count(), 0);
	assert!(checked_at(&env, recorded.session.session_id).await.is_some());
	assert_eq!(super::pending_count(service, &user, "coach").await, 0);

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn at_most_one_pending_action_per_pair() {
	let llm = StubLlm::replying(r#"{"createTask": true, "topic": "Ask how the race went."}"#);
	let Some(env) = super::test_env(llm, always_due()).await else {
		eprintln!("Skipping at_most_one_pending_action_per_pair; set RAPPORT_PG_DSN to run.");

		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "ivy", "UTC").await;

	super::seed_agent(service, "coach").await;

	for context in [None, Some("plan:spring")] {
		service
			.record_user_message(user.user_id, "coach", context, "Race is on Saturday.")
			.await
			.expect("Record should succeed.");
	}

	let report = service.run_proactivity_sweep(later()).await.expect("Sweep failed.");

	assert_eq!(report.examined, 2);
	assert_eq!(report.succeeded, 2);
	assert_eq!(env.llm.count(), 2);
	assert_eq!(super::pending_count(service, &user, "coach").await, 1);

	let pending = actions::find_pending(&service.db.pool, user.user_id, "coach")
		.await
		.expect("Find failed.")
		.expect("Pending action exists.");

	assert_eq!(pending.topic_context, "Ask how the race went.");

	let report = service.run_proactivity_sweep(later()).await.expect("Sweep failed.");

	assert_eq!(report.examined, 0, "Checked sessions wait for new activity.");

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn declined_decisions_advance_and_failures_do_not() {
	let Some(env) =
		super::test_env(StubLlm::replying(r#"{"createTask": false}"#), always_due()).await
	else {
		eprintln!("Skipping declined_decisions_advance_and_failures_do_not; set RAPPORT_PG_DSN.");

		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "jo", "UTC").await;

	super::seed_agent(service, "coach").await;

	let recorded = service
		.record_user_message(user.user_id, "coach", None, "Bye for now.")
		.await
		.expect("Record should succeed.");
	let report = service.run_proactivity_sweep(later()).await.expect("Sweep failed.");

	assert_eq!(report.succeeded, 1);
	assert!(checked_at(&env, recorded.session.session_id).await.is_some());
	assert_eq!(super::pending_count(service, &user, "coach").await, 0);

	env.cleanup().await;

	let Some(env) = super::test_env(StubLlm::failing(), always_due()).await else {
		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "kai", "UTC").await;

	super::seed_agent(service, "coach").await;

	let recorded = service
		.record_user_message(user.user_id, "coach", None, "Bye for now.")
		.await
		.expect("Record should succeed.");
	let report = service.run_proactivity_sweep(later()).await.expect("Sweep failed.");

	assert_eq!(report.failed, 1);
	assert!(checked_at(&env, recorded.session.session_id).await.is_none());

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn user_returning_during_the_decision_drops_it() {
	let llm = StubLlm::replying(r#"{"createTask": true, "topic": "Check in."}"#)
		.slow(StdDuration::from_millis(1_500));
	let Some(env) = super::test_env(llm, always_due()).await else {
		eprintln!("Skipping user_returning_during_the_decision_drops_it; set RAPPORT_PG_DSN to run.");

		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "lou", "UTC").await;

	super::seed_agent(service, "coach").await;
	service
		.record_user_message(user.user_id, "coach", None, "Talk soon.")
		.await
		.expect("Record should succeed.");

	let (sweep, back) = tokio::join!(service.run_proactivity_sweep(later()), async {
		tokio::time::sleep(StdDuration::from_millis(500)).await;

		service.record_user_message(user.user_id, "coach", None, "I'm back.").await
	});
	let report = sweep.expect("Sweep failed.");

	back.expect("Record should succeed.");

	assert_eq!(report.examined, 1);
	assert_eq!(report.skipped, 1);
	assert_eq!(env.llm.count(), 1);
	assert_eq!(super::pending_count(service, &user, "coach").await, 0);

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn long_unanswered_streaks_are_counted_past_the_transcript_window() {
	let settings = ProactivitySettings { max_consecutive_messages: 25, ..always_due() };
	let llm = StubLlm::replying(r#"{"createTask": true, "topic": "Follow up."}"#);
	let Some(env) = super::test_env(llm, settings).await else {
		eprintln!("Skipping long_unanswered_streaks_are_counted; set RAPPORT_PG_DSN to run.");

		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "mia", "UTC").await;

	super::seed_agent(service, "coach").await;

	let recorded = service
		.record_user_message(user.user_id, "coach", None, "Going offline for a while.")
		.await
		.expect("Record should succeed.");
	let session_id = recorded.session.session_id;

	for idx in 0..25 {
		messages::insert_message(
			&service.db.pool,
			session_id,
			"system",
			"proactive_trigger",
			&format!("Proactive message: nudge {idx}"),
			OffsetDateTime::now_utc(),
		)
		.await
		.expect("Failed to insert trigger.");
		service
			.record_assistant_message(session_id, &format!("Nudge {idx}."))
			.await
			.expect("Record should succeed.");
	}

	let report = service.run_proactivity_sweep(later()).await.expect("Sweep failed.");

	assert_eq!(report.succeeded, 1);
	assert_eq!(env.llm.count(), 0);
	assert!(checked_at(&env, session_id).await.is_some());
	assert_eq!(super::pending_count(service, &user, "coach").await, 0);

	env.cleanup().await;
}

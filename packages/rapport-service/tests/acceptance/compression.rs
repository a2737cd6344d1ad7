use rapport_config::ProactivitySettings;
use rapport_domain::message::Role;
use rapport_service::CompressionOutcome;
use rapport_storage::{messages, sessions};

use super::{PRIMARY, StubLlm, TestEnv};

fn settings(keep_last: u32) -> ProactivitySettings {
	ProactivitySettings { context_compression_keep_last: keep_last, ..Default::default() }
}

async fn seed_conversation(env: &TestEnv, turns: usize) -> uuid::Uuid {
	let service = &env.service;
	let user = super::seed_user(service, "dee", "UTC").await;

	super::seed_agent(service, PRIMARY).await;

	let mut session_id = None;

	for idx in 0..turns / 2 {
		let recorded = service
			.record_user_message(user.user_id, PRIMARY, None, &format!("question {idx}"))
			.await
			.expect("Record should succeed.");

		service
			.record_assistant_message(recorded.session.session_id, &format!("answer {idx}"))
			.await
			.expect("Record should succeed.");

		session_id = Some(recorded.session.session_id);
	}

	session_id.expect("At least one turn pair is required.")
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn compression_keeps_the_newest_messages_and_hides_the_rest() {
	let llm = StubLlm::replying("They asked five questions.");
	let Some(env) = super::test_env(llm, settings(4)).await else {
		eprintln!("Skipping compression_keeps_the_newest_messages; set RAPPORT_PG_DSN to run.");

		return;
	};
	let session_id = seed_conversation(&env, 10).await;
	let outcome = env.service.compress_session(session_id).await.expect("Compression failed.");

	assert!(matches!(outcome, CompressionOutcome::Compressed { archived: 6, .. }));

	let live = messages::list_active(&env.service.db.pool, session_id).await.expect("List failed.");

	assert_eq!(live.len(), 5);
	assert_eq!(live[0].kind, "summary");
	assert_eq!(live[0].content, "They asked five questions.");
	assert!(live[0].created_at < live[1].created_at);
	assert_eq!(
		live[1..].iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
		vec!["question 3", "answer 3", "question 4", "answer 4"]
	);

	let session = sessions::get_session(&env.service.db.pool, session_id)
		.await
		.expect("Get failed.")
		.expect("Session exists.");
	let prompt = env.service.build_prompt(&session).await.expect("Prompt should build.");

	assert!(prompt.iter().all(|m| !m.content.contains("question 0")));
	assert_eq!(prompt[1].role, Role::System);

	let again = env.service.compress_session(session_id).await.expect("Compression failed.");

	assert_eq!(again, CompressionOutcome::NotNeeded);
	assert_eq!(env.llm.count(), 1);

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn summaries_chain_into_the_next_compression() {
	let Some(env) = super::test_env(StubLlm::replying("Rolling summary."), settings(2)).await
	else {
		eprintln!("Skipping summaries_chain_into_the_next_compression; set RAPPORT_PG_DSN to run.");

		return;
	};
	let session_id = seed_conversation(&env, 4).await;

	env.service.compress_session(session_id).await.expect("Compression failed.");

	let live = messages::list_active(&env.service.db.pool, session_id).await.expect("List failed.");
	let user_id = sessions::get_session(&env.service.db.pool, session_id)
		.await
		.expect("Get failed.")
		.expect("Session exists.")
		.user_id;

	assert_eq!(live.len(), 3);

	env.service
		.record_user_message(user_id, PRIMARY, None, "question 9")
		.await
		.expect("Record should succeed.");
	env.service.record_assistant_message(session_id, "answer 9").await.expect("Record failed.");

	let outcome = env.service.compress_session(session_id).await.expect("Compression failed.");

	assert!(matches!(outcome, CompressionOutcome::Compressed { archived: 3, .. }));

	let prompts = env.llm.prompts();

	assert!(prompts[1].starts_with("Previous summary:\nRolling summary."));
	assert!(prompts[1].contains("User: question 1"));

	let live = messages::list_active(&env.service.db.pool, session_id).await.expect("List failed.");

	assert_eq!(live.iter().filter(|m| m.kind == "summary").count(), 1);

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn failed_summary_archives_nothing() {
	let Some(env) = super::test_env(StubLlm::failing(), settings(2)).await else {
		eprintln!("Skipping failed_summary_archives_nothing; set RAPPORT_PG_DSN to run.");

		return;
	};
	let session_id = seed_conversation(&env, 6).await;

	assert!(env.service.compress_session(session_id).await.is_err());

	let live = messages::list_active(&env.service.db.pool, session_id).await.expect("List failed.");

	assert_eq!(live.len(), 6);

	env.cleanup().await;
}

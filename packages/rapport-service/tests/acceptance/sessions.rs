use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use time::OffsetDateTime;

use rapport_config::ProactivitySettings;
use rapport_domain::message::Role;
use rapport_service::{BoxFuture, RapportService, Result, SettingsSource, StaticSettings};
use rapport_storage::actions;

use super::{PRIMARY, StubLlm};

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn concurrent_resolves_share_one_session() {
	let Some(env) = super::test_env(StubLlm::replying("ok"), ProactivitySettings::default()).await
	else {
		eprintln!("Skipping concurrent_resolves_share_one_session; set RAPPORT_PG_DSN to run.");

		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "ana", "UTC").await;

	super::seed_agent(service, PRIMARY).await;

	let (a, b, c, d) = tokio::join!(
		service.resolve_session(user.user_id, PRIMARY, None),
		service.resolve_session(user.user_id, PRIMARY, None),
		service.resolve_session(user.user_id, PRIMARY, None),
		service.resolve_session(user.user_id, PRIMARY, None),
	);
	let ids = [a, b, c, d]
		.into_iter()
		.map(|result| result.expect("Resolve should succeed.").session_id)
		.collect::<Vec<_>>();

	assert!(ids.iter().all(|id| *id == ids[0]));

	let rows: i64 = sqlx::query_scalar("SELECT count(*) FROM chat_sessions WHERE user_id = $1")
		.bind(user.user_id)
		.fetch_one(&service.db.pool)
		.await
		.expect("Failed to count sessions.");

	assert_eq!(rows, 1);

	let with_context = service
		.resolve_session(user.user_id, PRIMARY, Some("task:42"))
		.await
		.expect("Resolve should succeed.");

	assert_ne!(with_context.session_id, ids[0]);

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn user_message_cancels_only_that_agents_pending_action() {
	let Some(env) = super::test_env(StubLlm::replying("ok"), ProactivitySettings::default()).await
	else {
		eprintln!("Skipping user_message_cancels_only_that_agents_pending_action; set RAPPORT_PG_DSN.");

		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "ben", "UTC").await;
	let now = OffsetDateTime::now_utc();

	super::seed_agent(service, "coach").await;
	super::seed_agent(service, "chef").await;

	for slug in ["coach", "chef"] {
		actions::insert_pending(&service.db.pool, user.user_id, slug, "check in", now)
			.await
			.expect("Failed to queue action.");
	}

	let recorded = service
		.record_user_message(user.user_id, "coach", None, "Back from vacation!")
		.await
		.expect("Record should succeed.");

	assert!(!recorded.compression_scheduled);
	assert_eq!(super::pending_count(service, &user, "coach").await, 0);
	assert_eq!(super::pending_count(service, &user, "chef").await, 1);

	let session = service
		.resolve_session(user.user_id, "coach", None)
		.await
		.expect("Resolve should succeed.");

	assert_eq!(session.last_message_at, Some(recorded.message.created_at));

	env.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn built_prompt_starts_with_system_prompt_and_keeps_order() {
	let Some(env) = super::test_env(StubLlm::replying("ok"), ProactivitySettings::default()).await
	else {
		eprintln!("Skipping built_prompt_starts_with_system_prompt; set RAPPORT_PG_DSN to run.");

		return;
	};
	let service = &env.service;
	let user = super::seed_user(service, "cy", "UTC").await;

	super::seed_agent(service, PRIMARY).await;

	let first = service
		.record_user_message(user.user_id, PRIMARY, None, "Hi there.")
		.await
		.expect("Record should succeed.");

	service
		.record_assistant_message(first.session.session_id, "Hello! How can I help?")
		.await
		.expect("Record should succeed.");

	let prompt = service.build_prompt(&first.session).await.expect("Prompt should build.");

	assert_eq!(prompt.len(), 3);
	assert_eq!(prompt[0].role, Role::System);
	assert_eq!(prompt[0].content, "You are assistant.");
	assert_eq!(prompt[1].role, Role::User);
	assert_eq!(prompt[2].role, Role::Assistant);
	assert_eq!(prompt[2].content, "Hello! How can I help?");

	env.cleanup().await;
}

/// Counts how often the policy object is read.
struct CountingSettings {
	inner: StaticSettings,
	loads: AtomicUsize,
}
impl SettingsSource for CountingSettings {
	fn load(&self) -> BoxFuture<'_, Result<ProactivitySettings>> {
		self.loads.fetch_add(1, Ordering::SeqCst);

		self.inner.load()
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn user_message_reads_settings_once() {
	let Some(env) = super::test_env(StubLlm::replying("ok"), ProactivitySettings::default()).await
	else {
		eprintln!("Skipping user_message_reads_settings_once; set RAPPORT_PG_DSN to run.");

		return;
	};
	let settings = Arc::new(CountingSettings {
		inner: StaticSettings::new(ProactivitySettings {
			context_soft_limit: 1,
			..Default::default()
		}),
		loads: AtomicUsize::new(0),
	});
	let service = RapportService::with_parts(
		super::test_config(env.test_db.dsn().to_string()),
		env.service.db.clone(),
		env.service.providers.clone(),
		settings.clone(),
		env.hub.clone(),
	);
	let user = super::seed_user(&service, "dee", "UTC").await;

	super::seed_agent(&service, "coach").await;

	let recorded = service
		.record_user_message(user.user_id, "coach", None, "A long story about my week.")
		.await
		.expect("Record should succeed.");

	assert!(recorded.compression_scheduled);
	assert_eq!(settings.loads.load(Ordering::SeqCst), 1);

	env.cleanup().await;
}

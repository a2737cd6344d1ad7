pub fn render_schema() -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_users.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_users.sql")),
				"tables/002_agents.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_agents.sql")),
				"tables/003_chat_sessions.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_chat_sessions.sql")),
				"tables/004_chat_messages.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_chat_messages.sql")),
				"tables/005_user_memories.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_user_memories.sql")),
				"tables/006_pending_actions.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_pending_actions.sql")),
				"tables/007_proactive_send_counters.sql" => out
					.push_str(include_str!("../../../sql/tables/007_proactive_send_counters.sql")),
				"tables/008_proactivity_settings.sql" =>
					out.push_str(include_str!("../../../sql/tables/008_proactivity_settings.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

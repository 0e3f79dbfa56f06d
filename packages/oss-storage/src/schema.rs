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
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_organizations.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_organizations.sql")),
				"tables/002_users.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_users.sql")),
				"tables/003_queues.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_queues.sql")),
				"tables/004_mailboxes.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_mailboxes.sql")),
				"tables/005_collision_groups.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_collision_groups.sql")),
				"tables/006_tickets.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_tickets.sql")),
				"tables/007_canonical_messages.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_canonical_messages.sql")),
				"tables/008_message_attachments.sql" =>
					out.push_str(include_str!("../../../sql/tables/008_message_attachments.sql")),
				"tables/009_message_occurrences.sql" =>
					out.push_str(include_str!("../../../sql/tables/009_message_occurrences.sql")),
				"tables/010_ticket_events.sql" =>
					out.push_str(include_str!("../../../sql/tables/010_ticket_events.sql")),
				"tables/011_recipient_allowlist.sql" =>
					out.push_str(include_str!("../../../sql/tables/011_recipient_allowlist.sql")),
				"tables/012_routing_rules.sql" =>
					out.push_str(include_str!("../../../sql/tables/012_routing_rules.sql")),
				"tables/013_jobs.sql" =>
					out.push_str(include_str!("../../../sql/tables/013_jobs.sql")),
				"tables/014_mailbox_sync_events.sql" =>
					out.push_str(include_str!("../../../sql/tables/014_mailbox_sync_events.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

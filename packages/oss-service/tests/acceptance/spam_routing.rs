use super::suite::{self, EmailSpec};

/// No recipient evidence means no routing: the ticket is created, then
/// immediately marked spam with an audit trail.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn unknown_recipient_marks_the_ticket_spam() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;

	suite::seed_allowlist(&ctx, org, "*@example.com").await;

	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;

	// No workspace headers, and the To address is outside the org domains,
	// so recipient resolution lands on `unknown`.
	ctx.provider.add_message(
		"journal@example.com",
		"prov-1",
		suite::rfc822(&EmailSpec {
			to: "someone@elsewhere.net",
			x_gm_original_to: None,
			delivered_to: None,
			..Default::default()
		})
		.into_bytes(),
	);
	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	let occurrence: (String, String, Option<uuid::Uuid>) = sqlx::query_as(
		"\
SELECT state, recipient_source, ticket_id
FROM message_occurrences
WHERE provider_message_id = 'prov-1'",
	)
	.fetch_one(&ctx.service.db.pool)
	.await
	.expect("Occurrence query must succeed.");

	assert_eq!(occurrence.0, "routed");
	assert_eq!(occurrence.1, "unknown");

	let ticket_id = occurrence.2.expect("A ticket must have been created.");
	let ticket = oss_storage::tickets::fetch(&ctx.service.db.pool, org, ticket_id)
		.await
		.expect("Ticket fetch must succeed.")
		.expect("Ticket must exist.");

	assert_eq!(ticket.status, "spam");

	let events = oss_storage::tickets::list_events(&ctx.service.db.pool, org, ticket_id)
		.await
		.expect("Event listing must succeed.");

	assert!(events.iter().any(|event| event.event_type == "auto_spam"));
	// Rule evaluation never ran, so no routing_applied event exists.
	assert!(events.iter().all(|event| event.event_type != "routing_applied"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

/// An allowlisted recipient with no matching rule stays `new`.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn allowlisted_recipient_without_rules_stays_new() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;

	suite::seed_allowlist(&ctx, org, "support@example.com").await;

	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;

	ctx.provider.add_message(
		"journal@example.com",
		"prov-1",
		suite::rfc822(&EmailSpec::default()).into_bytes(),
	);
	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	let tickets: Vec<(String,)> =
		sqlx::query_as("SELECT status FROM tickets WHERE organization_id = $1")
			.bind(org)
			.fetch_all(&ctx.service.db.pool)
			.await
			.expect("Ticket query must succeed.");

	assert_eq!(tickets.len(), 1);
	assert_eq!(tickets[0].0, "new");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

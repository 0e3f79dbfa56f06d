use super::suite::{self, EmailSpec};

/// Two copies of the same email, two mailboxes, one canonical message, one
/// ticket. The fingerprint is the single source of exactly-once identity.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn duplicate_delivery_dedupes_to_one_ticket() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;

	suite::seed_allowlist(&ctx, org, "*@example.com").await;

	let journal = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;
	let user_box = suite::seed_mailbox(&ctx, org, "user", "support@example.com").await;
	let raw = suite::rfc822(&EmailSpec { message_id: Some("msg-1@customer.org"), ..Default::default() });

	ctx.provider.add_message("journal@example.com", "prov-journal-1", raw.clone().into_bytes());
	ctx.provider.add_message("support@example.com", "prov-user-1", raw.into_bytes());

	ctx.service.trigger_backfill(org, journal).await.expect("Backfill trigger must succeed.");
	ctx.service.trigger_backfill(org, user_box).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	let (occurrence_count,): (i64,) =
		sqlx::query_as("SELECT COUNT(*) FROM message_occurrences WHERE organization_id = $1")
			.bind(org)
			.fetch_one(&ctx.service.db.pool)
			.await
			.expect("Occurrence count must succeed.");
	let (routed_count,): (i64,) = sqlx::query_as(
		"SELECT COUNT(*) FROM message_occurrences WHERE organization_id = $1 AND state = 'routed'",
	)
	.bind(org)
	.fetch_one(&ctx.service.db.pool)
	.await
	.expect("Routed count must succeed.");
	let (canonical_count,): (i64,) =
		sqlx::query_as("SELECT COUNT(*) FROM canonical_messages WHERE organization_id = $1")
			.bind(org)
			.fetch_one(&ctx.service.db.pool)
			.await
			.expect("Canonical count must succeed.");
	let tickets: Vec<(uuid::Uuid, String)> =
		sqlx::query_as("SELECT ticket_id, status FROM tickets WHERE organization_id = $1")
			.bind(org)
			.fetch_all(&ctx.service.db.pool)
			.await
			.expect("Ticket query must succeed.");

	assert_eq!(occurrence_count, 2);
	assert_eq!(routed_count, 2);
	assert_eq!(canonical_count, 1);
	assert_eq!(tickets.len(), 1);
	assert_eq!(tickets[0].1, "new");

	// Both occurrences point at the same canonical message.
	let links: Vec<(Option<uuid::Uuid>,)> = sqlx::query_as(
		"SELECT canonical_message_id FROM message_occurrences WHERE organization_id = $1",
	)
	.bind(org)
	.fetch_all(&ctx.service.db.pool)
	.await
	.expect("Link query must succeed.");

	assert!(links.iter().all(|(link,)| link.is_some()));
	assert_eq!(links[0].0, links[1].0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

use oss_storage::routing::{NewRoutingRule, insert_rule};

use super::suite::{self, EmailSpec};

/// First matching rule wins and assigns the queue; the audit trail records
/// before/after.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn first_matching_rule_assigns_the_queue() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;

	suite::seed_allowlist(&ctx, org, "*@example.com").await;

	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;
	let queue = oss_storage::orgs::insert_queue(&ctx.service.db.pool, org, "frontline")
		.await
		.expect("Queue insert must succeed.");

	insert_rule(&ctx.service.db.pool, org, NewRoutingRule {
		name: "catch-all to frontline",
		priority: 200,
		action_assign_queue_id: Some(queue),
		..Default::default()
	})
	.await
	.expect("Rule insert must succeed.");
	insert_rule(&ctx.service.db.pool, org, NewRoutingRule {
		name: "support to frontline open",
		priority: 100,
		match_recipient_pattern: Some("support@example.com"),
		action_assign_queue_id: Some(queue),
		action_set_status: Some("open"),
		..Default::default()
	})
	.await
	.expect("Rule insert must succeed.");

	ctx.provider.add_message(
		"journal@example.com",
		"prov-1",
		suite::rfc822(&EmailSpec::default()).into_bytes(),
	);
	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	let ticket: (String, Option<uuid::Uuid>, Option<uuid::Uuid>) = sqlx::query_as(
		"SELECT status, assignee_queue_id, assignee_user_id FROM tickets WHERE organization_id = $1",
	)
	.bind(org)
	.fetch_one(&ctx.service.db.pool)
	.await
	.expect("Ticket query must succeed.");

	// The lower-priority (100) rule matched first and set both actions.
	assert_eq!(ticket.0, "open");
	assert_eq!(ticket.1, Some(queue));
	assert_eq!(ticket.2, None);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

/// A rule pointing at another organization's queue fails closed: no
/// mutation, `route_error` recorded, occurrence still leaves the pipeline.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn rule_with_foreign_queue_fails_closed() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;
	let other_org = suite::seed_org(&ctx, "Rival", &["rival.net"]).await;

	suite::seed_allowlist(&ctx, org, "*@example.com").await;

	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;
	let foreign_queue = oss_storage::orgs::insert_queue(&ctx.service.db.pool, other_org, "theirs")
		.await
		.expect("Queue insert must succeed.");

	insert_rule(&ctx.service.db.pool, org, NewRoutingRule {
		name: "misconfigured",
		priority: 10,
		action_assign_queue_id: Some(foreign_queue),
		..Default::default()
	})
	.await
	.expect("Rule insert must succeed.");

	ctx.provider.add_message(
		"journal@example.com",
		"prov-1",
		suite::rfc822(&EmailSpec::default()).into_bytes(),
	);
	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	let occurrence: (String, Option<String>) = sqlx::query_as(
		"SELECT state, route_error FROM message_occurrences WHERE provider_message_id = 'prov-1'",
	)
	.fetch_one(&ctx.service.db.pool)
	.await
	.expect("Occurrence query must succeed.");

	assert_eq!(occurrence.0, "routed");
	assert!(occurrence.1.expect("route_error must be set.").contains("missing queue"));

	let ticket: (String, Option<uuid::Uuid>) = sqlx::query_as(
		"SELECT status, assignee_queue_id FROM tickets WHERE organization_id = $1",
	)
	.bind(org)
	.fetch_one(&ctx.service.db.pool)
	.await
	.expect("Ticket query must succeed.");

	assert_eq!(ticket.0, "new");
	assert_eq!(ticket.1, None);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

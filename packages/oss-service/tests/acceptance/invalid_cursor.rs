use oss_service::JobOutcome;

use super::suite::{self, EmailSpec};

/// An expired history cursor queues exactly one recovery backfill and does
/// not trip the breaker by itself.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn invalid_cursor_triggers_backfill_recovery() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;
	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;

	ctx.provider.add_message(
		"journal@example.com",
		"prov-1",
		suite::rfc822(&EmailSpec::default()).into_bytes(),
	);

	// Backfill establishes the cursor, then the provider expires it.
	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;
	ctx.provider.invalidate_cursor("journal@example.com");

	let outcome = ctx
		.service
		.mailbox_history_sync(suite::sync_payload(org, mailbox, "test"))
		.await
		.expect("History sync must complete with a recovery.");

	assert_eq!(outcome, JobOutcome::Completed);

	let recovery: Vec<(String,)> = sqlx::query_as(
		"\
SELECT status
FROM jobs
WHERE organization_id = $1
	AND job_type = 'mailbox_backfill'
	AND idempotency_key = 'recovery'",
	)
	.bind(org)
	.fetch_all(&ctx.service.db.pool)
	.await
	.expect("Recovery job query must succeed.");

	assert_eq!(recovery.len(), 1);
	assert_eq!(recovery[0].0, "queued");

	let row = oss_storage::mailboxes::fetch(&ctx.service.db.pool, org, mailbox)
		.await
		.expect("Mailbox fetch must succeed.")
		.expect("Mailbox must exist.");

	assert!(row.last_sync_error.is_some());
	assert!(row.paused_until.is_none());

	let events =
		oss_storage::sync_events::count_events(&ctx.service.db.pool, org, mailbox, "backfill_recovery")
			.await
			.expect("Sync event count must succeed.");

	assert_eq!(events, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

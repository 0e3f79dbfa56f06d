use oss_domain::enums::JobType;
use oss_service::JobOutcome;

use super::suite::{self, EmailSpec};

/// Five consecutive sync failures trip the breaker; the sixth attempt
/// observes the pause without touching the provider; resume restarts the
/// cadence with exactly one queued sync job.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn repeated_sync_failures_trip_the_breaker() {
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
	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	ctx.provider.fail_history("journal@example.com", 5);

	for attempt in 1..=4 {
		let result = ctx
			.service
			.mailbox_history_sync(suite::sync_payload(org, mailbox, "test"))
			.await;

		assert!(result.is_err(), "Attempt {attempt} must surface a transient error.");
	}

	let fifth = ctx
		.service
		.mailbox_history_sync(suite::sync_payload(org, mailbox, "test"))
		.await
		.expect("The tripping attempt itself is not an error.");

	assert!(matches!(fifth, JobOutcome::CircuitBroken { .. }));

	let calls_when_tripped = ctx.provider.history_call_count("journal@example.com");
	let sixth = ctx
		.service
		.mailbox_history_sync(suite::sync_payload(org, mailbox, "test"))
		.await
		.expect("A paused mailbox returns early.");

	assert_eq!(sixth, JobOutcome::Paused);
	assert_eq!(
		ctx.provider.history_call_count("journal@example.com"),
		calls_when_tripped,
		"The paused attempt must not invoke the provider."
	);

	let summary = ctx
		.service
		.mailbox_sync_summary(org)
		.await
		.expect("Sync summary must succeed.");
	let view = summary.iter().find(|view| view.mailbox_id == mailbox).expect("View must exist.");

	assert!(view.paused_until.is_some());
	assert_eq!(view.pause_reason.as_deref(), Some("auto: repeated sync failures"));
	assert!(view.consecutive_sync_failures >= 5);

	// Clear the queue of the old cadence job before counting.
	sqlx::query("DELETE FROM jobs WHERE job_type = 'mailbox_history_sync' AND status = 'queued'")
		.execute(&ctx.service.db.pool)
		.await
		.expect("Queue cleanup must succeed.");

	ctx.service.resume_mailbox(org, mailbox).await.expect("Resume must succeed.");

	let row = oss_storage::mailboxes::fetch(&ctx.service.db.pool, org, mailbox)
		.await
		.expect("Mailbox fetch must succeed.")
		.expect("Mailbox must exist.");

	assert!(row.paused_until.is_none());
	assert!(row.pause_reason.is_none());
	assert_eq!(row.consecutive_sync_failures, 0);
	assert_eq!(suite::count_jobs(&ctx, JobType::MailboxHistorySync, "queued").await, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

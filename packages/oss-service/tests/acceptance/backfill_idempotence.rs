use super::suite::{self, EmailSpec};

/// Running a full backfill twice discovers nothing new the second time.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn backfill_twice_creates_no_new_occurrences() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;

	suite::seed_allowlist(&ctx, org, "*@example.com").await;

	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;

	for id in ["prov-1", "prov-2", "prov-3"] {
		ctx.provider.add_message(
			"journal@example.com",
			id,
			suite::rfc822(&EmailSpec {
				message_id: Some(id),
				body: format!("Body of {id}."),
				..Default::default()
			})
			.into_bytes(),
		);
	}

	ctx.service
		.mailbox_backfill(suite::sync_payload(org, mailbox, "first"))
		.await
		.expect("First backfill must succeed.");

	let count_occurrences = || async {
		let (count,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM message_occurrences WHERE mailbox_id = $1")
				.bind(mailbox)
				.fetch_one(&ctx.service.db.pool)
				.await
				.expect("Occurrence count must succeed.");

		count
	};

	assert_eq!(count_occurrences().await, 3);

	ctx.service
		.mailbox_backfill(suite::sync_payload(org, mailbox, "second"))
		.await
		.expect("Second backfill must succeed.");

	assert_eq!(count_occurrences().await, 3);

	// The occurrence unique key also held: one fetch job per occurrence.
	let (fetch_jobs,): (i64,) = sqlx::query_as(
		"SELECT COUNT(*) FROM jobs WHERE mailbox_id = $1 AND job_type = 'occurrence_fetch_raw'",
	)
	.bind(mailbox)
	.fetch_one(&ctx.service.db.pool)
	.await
	.expect("Job count must succeed.");

	assert_eq!(fetch_jobs, 3);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

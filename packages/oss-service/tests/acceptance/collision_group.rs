use super::suite::{self, EmailSpec};

const PREFIX_BYTES: usize = 64 * 1024;

/// Bodies that agree on the 64 KiB fingerprint prefix but diverge later:
/// both canonical rows survive and share one collision group.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn diverging_bodies_share_a_collision_group() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;

	suite::seed_allowlist(&ctx, org, "*@example.com").await;

	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;
	let shared = "x".repeat(PREFIX_BYTES);

	ctx.provider.add_message(
		"journal@example.com",
		"prov-1",
		suite::rfc822(&EmailSpec {
			message_id: Some("copy-1@customer.org"),
			body: format!("{shared}tail-one"),
			..Default::default()
		})
		.into_bytes(),
	);
	ctx.provider.add_message(
		"journal@example.com",
		"prov-2",
		suite::rfc822(&EmailSpec {
			message_id: Some("copy-2@customer.org"),
			body: format!("{shared}tail-two"),
			..Default::default()
		})
		.into_bytes(),
	);
	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	let rows: Vec<(Vec<u8>, Option<uuid::Uuid>)> = sqlx::query_as(
		"SELECT fingerprint_v1, collision_group_id FROM canonical_messages WHERE organization_id = $1",
	)
	.bind(org)
	.fetch_all(&ctx.service.db.pool)
	.await
	.expect("Canonical query must succeed.");

	assert_eq!(rows.len(), 2);
	assert_eq!(rows[0].0, rows[1].0);
	assert!(rows[0].1.is_some());
	assert_eq!(rows[0].1, rows[1].1);

	let groups = ctx
		.service
		.list_collision_groups(org, 10)
		.await
		.expect("Collision listing must succeed.");

	assert_eq!(groups.len(), 1);
	assert_eq!(groups[0].message_count, 2);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

/// The admin backfill repairs rows that predate collision tracking, and is
/// idempotent.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn collision_backfill_assigns_missing_groups() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;

	suite::seed_allowlist(&ctx, org, "*@example.com").await;

	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;
	let shared = "y".repeat(PREFIX_BYTES);

	for (id, tail) in [("prov-1", "one"), ("prov-2", "two")] {
		ctx.provider.add_message(
			"journal@example.com",
			id,
			suite::rfc822(&EmailSpec {
				body: format!("{shared}{tail}"),
				..Default::default()
			})
			.into_bytes(),
		);
	}

	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	// Simulate historical rows without collision assignment.
	sqlx::query("UPDATE canonical_messages SET collision_group_id = NULL WHERE organization_id = $1")
		.bind(org)
		.execute(&ctx.service.db.pool)
		.await
		.expect("Reset must succeed.");

	let first = ctx.service.collision_backfill(org).await.expect("Backfill must succeed.");

	assert_eq!(first.fingerprints_scanned, 1);
	assert_eq!(first.messages_updated, 2);

	let second = ctx.service.collision_backfill(org).await.expect("Backfill must succeed.");

	assert_eq!(second.messages_updated, 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

use oss_domain::{enums::StitchReason, ticket_code};
use oss_storage::tickets::{self, NewTicket};

use super::suite::{self, EmailSpec};

/// The outbound marker outranks threading headers: a reply pointing at T1 by
/// In-Reply-To but carrying `X-OSS-Ticket-ID: T2` lands on T2.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn marker_stitch_beats_threading() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let org = suite::seed_org(&ctx, "Acme", &["example.com"]).await;

	suite::seed_allowlist(&ctx, org, "*@example.com").await;

	let mailbox = suite::seed_mailbox(&ctx, org, "journal", "journal@example.com").await;

	// T1 comes from an initial inbound email whose Message-ID is known.
	ctx.provider.add_message(
		"journal@example.com",
		"prov-1",
		suite::rfc822(&EmailSpec {
			message_id: Some("foo@customer.org"),
			..Default::default()
		})
		.into_bytes(),
	);
	ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger must succeed.");
	suite::drain_queue(&ctx).await;

	let (t1,): (uuid::Uuid,) = sqlx::query_as(
		"SELECT ticket_id FROM tickets WHERE organization_id = $1",
	)
	.bind(org)
	.fetch_one(&ctx.service.db.pool)
	.await
	.expect("T1 must exist.");

	// T2 exists independently (e.g. created by an operator reply path).
	let code = ticket_code::new_ticket_code();
	let t2 = tickets::insert_ticket(&ctx.service.db.pool, NewTicket {
		organization_id: org,
		ticket_code: &code,
		subject: Some("Other thread"),
		subject_norm: Some("Other thread"),
		requester_email: Some("jane@customer.org"),
		requester_name: None,
		first_message_at: None,
		stitch_reason: StitchReason::NewTicket.as_str(),
		stitch_confidence: "low",
	})
	.await
	.expect("T2 insert must succeed.");

	ctx.provider.add_message(
		"journal@example.com",
		"prov-2",
		suite::rfc822(&EmailSpec {
			subject: "Re: Printer broken",
			message_id: Some("reply-1@customer.org"),
			in_reply_to: Some("foo@customer.org"),
			x_oss_ticket_id: Some(t2),
			body: "Following up.".to_string(),
			..Default::default()
		})
		.into_bytes(),
	);
	ctx.service.trigger_history_sync(org, mailbox).await.expect("History trigger must succeed.");
	suite::drain_queue(&ctx).await;

	let (ticket_id,): (Option<uuid::Uuid>,) = sqlx::query_as(
		"SELECT ticket_id FROM message_occurrences WHERE provider_message_id = 'prov-2'",
	)
	.fetch_one(&ctx.service.db.pool)
	.await
	.expect("Occurrence query must succeed.");

	assert_eq!(ticket_id, Some(t2));
	assert_ne!(Some(t1), ticket_id);

	let events = tickets::list_events(&ctx.service.db.pool, org, t2)
		.await
		.expect("Event listing must succeed.");
	let stitched = events
		.iter()
		.find(|event| event.event_type == "message_stitched")
		.expect("A stitch event must exist on T2.");

	assert_eq!(stitched.event_data["stitch_reason"], StitchReason::XOssMarker.as_str());
	assert_eq!(stitched.event_data["stitch_confidence"], "high");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

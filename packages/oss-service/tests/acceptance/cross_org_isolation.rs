use oss_service::simulate::RoutingSimulationRequest;

use super::suite::{self, EmailSpec};

/// Cross-org isolation as a property over several randomized organizations:
/// every org-scoped read returns zero rows for an organization that does not
/// own the data.
#[tokio::test]
#[ignore = "Requires external Postgres. Set OSS_PG_DSN to run."]
async fn org_scoped_reads_never_leak_across_organizations() {
	let Some(test_db) = suite::test_db().await else {
		eprintln!("Skipping; set OSS_PG_DSN to run this test.");
		return;
	};
	let ctx = suite::build_service(test_db.dsn()).await;
	let mut orgs = Vec::new();

	for index in 0..4 {
		let domain = format!("org{index}.example");
		let org = suite::seed_org(&ctx, &format!("Org {index}"), &[&domain]).await;

		suite::seed_allowlist(&ctx, org, &format!("*@{domain}")).await;

		let journal = format!("journal@{domain}");
		let mailbox = suite::seed_mailbox(&ctx, org, "journal", &journal).await;

		ctx.provider.add_message(
			&journal,
			"prov-1",
			suite::rfc822(&EmailSpec {
				to: &format!("support@{domain}"),
				x_gm_original_to: Some(&format!("support@{domain}")),
				from: "Customer <customer@elsewhere.net>",
				body: format!("Ticket for org {index}."),
				..Default::default()
			})
			.into_bytes(),
		);
		ctx.service.trigger_backfill(org, mailbox).await.expect("Backfill trigger.");

		orgs.push((org, mailbox, domain));
	}

	suite::drain_queue(&ctx).await;

	for (org, _, _) in &orgs {
		let (ticket_count,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE organization_id = $1")
				.bind(org)
				.fetch_one(&ctx.service.db.pool)
				.await
				.expect("Ticket count must succeed.");

		assert_eq!(ticket_count, 1, "Each org owns exactly its own ticket.");
	}

	// Pairwise: org A's scoped surfaces see nothing of org B.
	for (org_a, _, domain_a) in &orgs {
		for (org_b, mailbox_b, domain_b) in &orgs {
			if org_a == org_b {
				continue;
			}

			let summary =
				ctx.service.mailbox_sync_summary(*org_a).await.expect("Summary must succeed.");

			assert!(
				summary.iter().all(|view| view.mailbox_id != *mailbox_b),
				"Org {org_a} must not see org {org_b}'s mailboxes."
			);

			let dead = ctx.service.list_dead_jobs(*org_a, 100).await.expect("DLQ listing.");

			assert!(dead.iter().all(|job| job.mailbox_id != Some(*mailbox_b)));

			let groups =
				ctx.service.list_collision_groups(*org_a, 100).await.expect("Collision listing.");

			assert!(groups.is_empty());

			// The simulator evaluates org A's tables only: org A allowlists
			// its own domain, so org B's recipients are spam here.
			let foreign = ctx
				.service
				.simulate_routing(*org_a, RoutingSimulationRequest {
					recipient: format!("support@{domain_b}"),
					sender_email: "customer@elsewhere.net".to_string(),
					direction: "inbound".to_string(),
				})
				.await
				.expect("Simulation must succeed.");

			assert!(foreign.would_mark_spam);

			let own = ctx
				.service
				.simulate_routing(*org_a, RoutingSimulationRequest {
					recipient: format!("support@{domain_a}"),
					sender_email: "customer@elsewhere.net".to_string(),
					direction: "inbound".to_string(),
				})
				.await
				.expect("Simulation must succeed.");

			assert!(own.allowlisted);
		}
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

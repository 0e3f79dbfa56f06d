#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

use oss_blob::memory::MemoryBlobStore;
use oss_config::{
	Backoff, Blob, Config, Ingest, JobTypeValues, Postgres, Provider, Security, Service, Storage,
	Sync, Worker,
};
use oss_domain::enums::JobType;
use oss_provider::fake::FakeMailProvider;
use oss_service::{JobOutcome, MailboxSyncPayload, OssService, mailboxes::CreateMailboxRequest};
use oss_storage::{db::Db, jobs};
use oss_testkit::TestDatabase;

pub const ALL_JOB_TYPES: [JobType; 6] = [
	JobType::MailboxBackfill,
	JobType::MailboxHistorySync,
	JobType::OccurrenceFetchRaw,
	JobType::OccurrenceParse,
	JobType::OccurrenceStitch,
	JobType::TicketApplyRouting,
];

/// base64 of 32 ASCII bytes; only the shape matters for tests.
const TEST_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

pub struct TestContext {
	pub service: OssService,
	pub provider: Arc<FakeMailProvider>,
	pub blobs: Arc<MemoryBlobStore>,
}

pub async fn test_db() -> Option<TestDatabase> {
	let base_dsn = oss_testkit::env_dsn()?;
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");

	Some(db)
}

pub fn test_config(dsn: String) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			postgres: Postgres { dsn, pool_max_conns: 4 },
			blob: Blob {
				backend: "fs".to_string(),
				root_dir: Some("/tmp/oss-test-blobs".to_string()),
				endpoint: None,
				region: None,
				bucket: None,
				access_key_id: None,
				secret_access_key: None,
				allow_http: false,
			},
		},
		provider: Provider {
			api_base: "http://127.0.0.1:1".to_string(),
			token_endpoint: "http://127.0.0.1:1/token".to_string(),
			client_id: "test-client".to_string(),
			client_secret: "test-secret".to_string(),
			timeout_ms: 1_000,
		},
		security: Security { encryption_key_base64: TEST_KEY.to_string() },
		worker: Worker {
			poll_interval_ms: 50,
			reaper_interval_seconds: 30,
			shutdown_grace_seconds: 5,
			concurrency: JobTypeValues { sync: 2, fetch: 8, parse: 8, stitch: 4, route: 4 },
			visibility_seconds: JobTypeValues {
				sync: 120,
				fetch: 60,
				parse: 60,
				stitch: 30,
				route: 30,
			},
			backoff: Backoff { base_seconds: 1, cap_seconds: 2 },
		},
		sync: Sync { cadence_seconds: 60, circuit_breaker_threshold: 5, pause_minutes: 30 },
		ingest: Ingest {
			parser_version: 1,
			sanitizer_revision: "allowlist-v1".to_string(),
			snippet_max_chars: 280,
			subject_match_window_days: 14,
		},
	}
}

pub async fn build_service(dsn: &str) -> TestContext {
	let cfg = test_config(dsn.to_string());
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let provider = Arc::new(FakeMailProvider::new());
	let blobs = Arc::new(MemoryBlobStore::new());
	let service = OssService::new(cfg, db, blobs.clone(), provider.clone())
		.expect("Failed to build service.");

	TestContext { service, provider, blobs }
}

pub async fn seed_org(ctx: &TestContext, name: &str, domains: &[&str]) -> Uuid {
	let domains = domains.iter().map(|domain| domain.to_string()).collect::<Vec<_>>();

	oss_storage::orgs::insert_organization(&ctx.service.db.pool, name, &domains)
		.await
		.expect("Failed to insert organization.")
}

pub async fn seed_mailbox(ctx: &TestContext, org: Uuid, purpose: &str, email: &str) -> Uuid {
	ctx.service
		.create_mailbox(CreateMailboxRequest {
			organization_id: org,
			purpose,
			provider: "gmail",
			email_address: email,
			display_name: None,
			credential_subject: email,
			refresh_token: "test-refresh-token",
			access_token: Some(("test-access-token", OffsetDateTime::now_utc() + time::Duration::hours(1))),
		})
		.await
		.expect("Failed to create mailbox.")
}

pub async fn seed_allowlist(ctx: &TestContext, org: Uuid, pattern: &str) {
	oss_storage::routing::insert_allowlist_entry(&ctx.service.db.pool, org, pattern)
		.await
		.expect("Failed to insert allowlist entry.");
}

pub fn sync_payload(org: Uuid, mailbox: Uuid, reason: &str) -> MailboxSyncPayload {
	MailboxSyncPayload { organization_id: org, mailbox_id: mailbox, reason: reason.to_string() }
}

/// Inline worker: lease-handle-complete until nothing is runnable. Follow-up
/// sync jobs land in the future, so the drain terminates.
pub async fn drain_queue(ctx: &TestContext) -> u32 {
	let mut processed = 0;

	loop {
		let job = jobs::lease(
			&ctx.service.db.pool,
			&ALL_JOB_TYPES,
			"test-worker",
			Duration::from_secs(60),
		)
		.await
		.expect("Lease must succeed.");
		let Some(job) = job else {
			break;
		};

		match ctx.service.handle_job(&job).await {
			Ok(JobOutcome::CircuitBroken { error }) => {
				jobs::park(&ctx.service.db.pool, job.job_id, &error)
					.await
					.expect("Park must succeed.");
			},
			Ok(outcome) => {
				jobs::complete(&ctx.service.db.pool, job.job_id)
					.await
					.expect("Complete must succeed.");
				ctx.service
					.schedule_follow_ups(&job, &outcome)
					.await
					.expect("Follow-up scheduling must succeed.");
			},
			Err(err) if err.is_permanent() => {
				jobs::kill(&ctx.service.db.pool, job.job_id, &err.to_string())
					.await
					.expect("Kill must succeed.");
			},
			Err(err) => {
				let mut tx = ctx.service.db.pool.begin().await.expect("Begin must succeed.");

				jobs::fail(
					&mut tx,
					job.job_id,
					&err.to_string(),
					Duration::from_secs(1),
					Duration::from_secs(2),
				)
				.await
				.expect("Fail must succeed.");
				tx.commit().await.expect("Commit must succeed.");
			},
		}

		processed += 1;

		if processed > 500 {
			panic!("Queue did not drain; something keeps re-enqueueing runnable jobs.");
		}
	}

	processed
}

#[derive(Clone, Debug)]
pub struct EmailSpec<'a> {
	pub subject: &'a str,
	pub from: &'a str,
	pub to: &'a str,
	pub cc: Option<&'a str>,
	pub delivered_to: Option<&'a str>,
	pub x_gm_original_to: Option<&'a str>,
	pub reply_to: Option<&'a str>,
	pub message_id: Option<&'a str>,
	pub in_reply_to: Option<&'a str>,
	pub references: Option<&'a str>,
	pub x_oss_ticket_id: Option<Uuid>,
	pub x_oss_message_id: Option<Uuid>,
	pub date: &'a str,
	pub body: String,
}
impl Default for EmailSpec<'_> {
	fn default() -> Self {
		Self {
			subject: "Printer broken",
			from: "Jane Doe <jane@customer.org>",
			to: "support@example.com",
			cc: None,
			delivered_to: None,
			x_gm_original_to: Some("support@example.com"),
			reply_to: None,
			message_id: None,
			in_reply_to: None,
			references: None,
			x_oss_ticket_id: None,
			x_oss_message_id: None,
			date: "Tue, 14 Nov 2023 12:00:00 +0000",
			body: "The printer on floor 3 is broken.".to_string(),
		}
	}
}

pub fn rfc822(spec: &EmailSpec<'_>) -> String {
	let mut out = String::new();

	out.push_str(&format!("From: {}\r\n", spec.from));
	out.push_str(&format!("To: {}\r\n", spec.to));

	if let Some(cc) = spec.cc {
		out.push_str(&format!("Cc: {cc}\r\n"));
	}

	out.push_str(&format!("Subject: {}\r\n", spec.subject));
	out.push_str(&format!("Date: {}\r\n", spec.date));

	if let Some(message_id) = spec.message_id {
		out.push_str(&format!("Message-ID: <{message_id}>\r\n"));
	}
	if let Some(in_reply_to) = spec.in_reply_to {
		out.push_str(&format!("In-Reply-To: <{in_reply_to}>\r\n"));
	}
	if let Some(references) = spec.references {
		out.push_str(&format!("References: {references}\r\n"));
	}
	if let Some(delivered_to) = spec.delivered_to {
		out.push_str(&format!("Delivered-To: {delivered_to}\r\n"));
	}
	if let Some(x_gm) = spec.x_gm_original_to {
		out.push_str(&format!("X-Gm-Original-To: {x_gm}\r\n"));
	}
	if let Some(reply_to) = spec.reply_to {
		out.push_str(&format!("Reply-To: {reply_to}\r\n"));
	}
	if let Some(ticket_id) = spec.x_oss_ticket_id {
		out.push_str(&format!("X-OSS-Ticket-ID: {ticket_id}\r\n"));
	}
	if let Some(message_id) = spec.x_oss_message_id {
		out.push_str(&format!("X-OSS-Message-ID: {message_id}\r\n"));
	}

	out.push_str("MIME-Version: 1.0\r\n");
	out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
	out.push_str("\r\n");
	out.push_str(&spec.body);
	out.push_str("\r\n");

	out
}

pub async fn count_jobs(ctx: &TestContext, job_type: JobType, status: &str) -> i64 {
	let (count,): (i64,) =
		sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE job_type = $1 AND status = $2")
			.bind(job_type.as_str())
			.bind(status)
			.fetch_one(&ctx.service.db.pool)
			.await
			.expect("Job count query must succeed.");

	count
}

use std::{sync::Arc, time::Duration};

use tokio::{
	sync::watch,
	task::JoinSet,
	time,
};
use tracing::{Instrument, error, info, warn};

use oss_domain::enums::JobType;
use oss_service::{JobOutcome, OssService, correlation_id};
use oss_storage::{jobs, models::Job};

const REAP_BATCH: i64 = 100;

/// One slot family per pipeline stage; sync covers both sync job types.
struct JobFamily {
	name: &'static str,
	types: &'static [JobType],
	concurrency: u32,
	visibility: Duration,
}

pub async fn run_worker(service: Arc<OssService>) -> color_eyre::Result<()> {
	let cfg = &service.cfg.worker;
	let families = [
		JobFamily {
			name: "sync",
			types: &[JobType::MailboxBackfill, JobType::MailboxHistorySync],
			concurrency: cfg.concurrency.sync,
			visibility: Duration::from_secs(cfg.visibility_seconds.sync as u64),
		},
		JobFamily {
			name: "fetch",
			types: &[JobType::OccurrenceFetchRaw],
			concurrency: cfg.concurrency.fetch,
			visibility: Duration::from_secs(cfg.visibility_seconds.fetch as u64),
		},
		JobFamily {
			name: "parse",
			types: &[JobType::OccurrenceParse],
			concurrency: cfg.concurrency.parse,
			visibility: Duration::from_secs(cfg.visibility_seconds.parse as u64),
		},
		JobFamily {
			name: "stitch",
			types: &[JobType::OccurrenceStitch],
			concurrency: cfg.concurrency.stitch,
			visibility: Duration::from_secs(cfg.visibility_seconds.stitch as u64),
		},
		JobFamily {
			name: "route",
			types: &[JobType::TicketApplyRouting],
			concurrency: cfg.concurrency.route,
			visibility: Duration::from_secs(cfg.visibility_seconds.route as u64),
		},
	];
	let poll_interval = Duration::from_millis(cfg.poll_interval_ms);
	let reaper_interval = Duration::from_secs(cfg.reaper_interval_seconds);
	let grace = Duration::from_secs(cfg.shutdown_grace_seconds);
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let mut tasks = JoinSet::new();

	for family in &families {
		for slot in 0..family.concurrency {
			tasks.spawn(slot_loop(
				service.clone(),
				family.types,
				slot_worker_id(family.name, slot),
				family.visibility,
				poll_interval,
				shutdown_rx.clone(),
			));
		}
	}

	tasks.spawn(reaper_loop(service.clone(), reaper_interval, shutdown_rx.clone()));
	info!("Worker host started.");

	tokio::signal::ctrl_c().await?;
	info!("Shutdown signal received; draining in-flight jobs.");
	shutdown_tx.send(true)?;

	let drained = time::timeout(grace, async {
		while tasks.join_next().await.is_some() {}
	})
	.await;

	if drained.is_err() {
		// Leftover leases expire and the reaper of the next process picks
		// them up.
		warn!("Grace period elapsed; aborting remaining slots.");
		tasks.shutdown().await;
	}

	info!("Worker host stopped.");

	Ok(())
}

fn slot_worker_id(family: &str, slot: u32) -> String {
	let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "oss-worker".to_string());

	format!("{host}/{family}-{slot}")
}

async fn slot_loop(
	service: Arc<OssService>,
	types: &'static [JobType],
	worker_id: String,
	visibility: Duration,
	poll_interval: Duration,
	mut shutdown: watch::Receiver<bool>,
) {
	loop {
		if *shutdown.borrow() {
			return;
		}

		let leased =
			match jobs::lease(&service.db.pool, types, &worker_id, visibility).await {
				Ok(leased) => leased,
				Err(err) => {
					error!(error = %err, worker_id, "Job lease failed.");

					time::sleep(poll_interval).await;

					continue;
				},
			};

		match leased {
			Some(job) => run_job(&service, job).await,
			None => {
				tokio::select! {
					_ = time::sleep(poll_interval) => {},
					_ = shutdown.changed() => {},
				}
			},
		}
	}
}

async fn run_job(service: &OssService, job: Job) {
	let cid = correlation_id(job.organization_id, job.job_id, job.attempts + 1);
	let span = tracing::info_span!(
		"job",
		correlation_id = %cid,
		job_type = %job.job_type,
		job_id = %job.job_id,
	);

	async {
		match service.handle_job(&job).await {
			Ok(JobOutcome::CircuitBroken { error }) => {
				if let Err(err) = jobs::park(&service.db.pool, job.job_id, &error).await {
					error!(error = %err, "Failed to park a circuit-broken job.");
				}
			},
			Ok(outcome) => {
				if let Err(err) = jobs::complete(&service.db.pool, job.job_id).await {
					error!(error = %err, "Failed to complete a job.");

					return;
				}
				if let Err(err) = service.schedule_follow_ups(&job, &outcome).await {
					error!(error = %err, "Failed to schedule follow-up jobs.");
				}
			},
			Err(err) if err.is_permanent() => {
				error!(error = %err, "Job failed permanently.");

				if let Err(err) = jobs::kill(&service.db.pool, job.job_id, &err.to_string()).await
				{
					error!(error = %err, "Failed to move a job to the DLQ.");
				}
			},
			Err(err) => {
				warn!(error = %err, "Job failed; scheduling a retry.");

				if let Err(err) = fail_with_backoff(service, job.job_id, &err.to_string()).await {
					error!(error = %err, "Failed to record a job failure.");
				}
			},
		}
	}
	.instrument(span)
	.await
}

async fn fail_with_backoff(
	service: &OssService,
	job_id: uuid::Uuid,
	error: &str,
) -> Result<(), oss_storage::Error> {
	let base = Duration::from_secs(service.cfg.worker.backoff.base_seconds);
	let cap = Duration::from_secs(service.cfg.worker.backoff.cap_seconds);
	let mut tx = service.db.pool.begin().await?;

	jobs::fail(&mut tx, job_id, error, base, cap).await?;
	tx.commit().await?;

	Ok(())
}

async fn reaper_loop(
	service: Arc<OssService>,
	interval: Duration,
	mut shutdown: watch::Receiver<bool>,
) {
	loop {
		if *shutdown.borrow() {
			return;
		}

		if let Err(err) = reap_once(&service).await {
			error!(error = %err, "Reaper sweep failed.");
		}

		tokio::select! {
			_ = time::sleep(interval) => {},
			_ = shutdown.changed() => {},
		}
	}
}

/// Expired leases fail as "lease expired" so crashed workers never leak
/// running jobs past one reaper interval.
async fn reap_once(service: &OssService) -> Result<(), oss_storage::Error> {
	let base = Duration::from_secs(service.cfg.worker.backoff.base_seconds);
	let cap = Duration::from_secs(service.cfg.worker.backoff.cap_seconds);

	loop {
		let mut tx = service.db.pool.begin().await?;
		let reaped = jobs::reap_expired(&mut tx, REAP_BATCH, base, cap).await?;

		tx.commit().await?;

		if reaped.is_empty() {
			return Ok(());
		}

		info!(count = reaped.len(), "Reaped expired job leases.");

		if (reaped.len() as i64) < REAP_BATCH {
			return Ok(());
		}
	}
}

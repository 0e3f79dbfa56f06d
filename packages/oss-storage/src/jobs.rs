use std::time::Duration;

use serde_json::Value;
use sqlx::{PgExecutor, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use oss_domain::{
	backoff,
	enums::{JobStatus, JobType},
};

use crate::{Error, Result, models::Job};

const JOB_COLUMNS: &str = "\
job_id, organization_id, mailbox_id, job_type, status, payload, idempotency_key, attempts, \
max_attempts, run_at, lock_owner, lock_expires_at, last_error, created_at, updated_at";

pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

#[derive(Debug)]
pub struct EnqueueJob<'a> {
	pub job_type: JobType,
	pub organization_id: Option<Uuid>,
	pub mailbox_id: Option<Uuid>,
	pub payload: Value,
	pub idempotency_key: Option<&'a str>,
	pub run_at: Option<OffsetDateTime>,
	pub max_attempts: Option<i32>,
}

/// Duplicate-safe enqueue: with an idempotency key, an existing non-terminal
/// job with the same `(organization, type, key)` wins and its id is returned
/// without inserting.
pub async fn enqueue(tx: &mut Transaction<'_, Postgres>, job: EnqueueJob<'_>) -> Result<Uuid> {
	if let Some(key) = job.idempotency_key
		&& let Some(existing) = find_non_terminal(&mut **tx, job.organization_id, job.job_type, key).await?
	{
		return Ok(existing);
	}

	let inserted: Option<(Uuid,)> = sqlx::query_as(
		"\
INSERT INTO jobs (
	organization_id,
	mailbox_id,
	job_type,
	status,
	payload,
	idempotency_key,
	attempts,
	max_attempts,
	run_at
)
VALUES ($1, $2, $3, 'queued', $4, $5, 0, $6, COALESCE($7, now()))
ON CONFLICT DO NOTHING
RETURNING job_id",
	)
	.bind(job.organization_id)
	.bind(job.mailbox_id)
	.bind(job.job_type.as_str())
	.bind(&job.payload)
	.bind(job.idempotency_key)
	.bind(job.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
	.bind(job.run_at)
	.fetch_optional(&mut **tx)
	.await?;

	if let Some((job_id,)) = inserted {
		return Ok(job_id);
	}

	// Insert raced another enqueue with the same key; take theirs.
	if let Some(key) = job.idempotency_key
		&& let Some(existing) = find_non_terminal(&mut **tx, job.organization_id, job.job_type, key).await?
	{
		return Ok(existing);
	}

	Err(Error::Conflict("Concurrent enqueue with the same idempotency key.".to_string()))
}

/// Claims the oldest runnable job of the given types for `worker_id`, making
/// it invisible to other workers until the visibility timeout lapses.
/// `FOR UPDATE SKIP LOCKED` keeps concurrent workers from blocking on or
/// double-leasing the same row.
pub async fn lease<'e, E>(
	executor: E,
	types: &[JobType],
	worker_id: &str,
	visibility: Duration,
) -> Result<Option<Job>>
where
	E: PgExecutor<'e>,
{
	let types = types.iter().map(|ty| ty.as_str().to_string()).collect::<Vec<_>>();
	let job = sqlx::query_as::<_, Job>(&format!(
		"\
WITH next_job AS (
	SELECT job_id
	FROM jobs
	WHERE status = 'queued'
		AND run_at <= now()
		AND job_type = ANY($1)
	ORDER BY run_at ASC
	FOR UPDATE SKIP LOCKED
	LIMIT 1
)
UPDATE jobs
SET status = 'running',
	lock_owner = $2,
	lock_expires_at = now() + make_interval(secs => $3),
	updated_at = now()
WHERE job_id IN (SELECT job_id FROM next_job)
RETURNING {JOB_COLUMNS}"
	))
	.bind(&types)
	.bind(worker_id)
	.bind(visibility.as_secs_f64())
	.fetch_optional(executor)
	.await?;

	Ok(job)
}

pub async fn complete<'e, E>(executor: E, job_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE jobs
SET status = 'done',
	lock_owner = NULL,
	lock_expires_at = NULL,
	updated_at = now()
WHERE job_id = $1",
	)
	.bind(job_id)
	.execute(executor)
	.await?;

	Ok(())
}

/// Retry with exponential full-jitter backoff, or park in the DLQ once the
/// attempt budget is spent.
pub async fn fail(
	tx: &mut Transaction<'_, Postgres>,
	job_id: Uuid,
	error: &str,
	backoff_base: Duration,
	backoff_cap: Duration,
) -> Result<JobStatus> {
	let row: Option<(i32, i32)> =
		sqlx::query_as("SELECT attempts, max_attempts FROM jobs WHERE job_id = $1 FOR UPDATE")
			.bind(job_id)
			.fetch_optional(&mut **tx)
			.await?;
	let Some((attempts, max_attempts)) = row else {
		return Err(Error::NotFound(format!("Job {job_id} does not exist.")));
	};
	let attempts = attempts + 1;

	if attempts >= max_attempts {
		sqlx::query(
			"\
UPDATE jobs
SET status = 'dead',
	attempts = $2,
	last_error = $3,
	lock_owner = NULL,
	lock_expires_at = NULL,
	updated_at = now()
WHERE job_id = $1",
		)
		.bind(job_id)
		.bind(attempts)
		.bind(error)
		.execute(&mut **tx)
		.await?;

		return Ok(JobStatus::Dead);
	}

	let delay = backoff::backoff_with_jitter(attempts, backoff_base, backoff_cap);

	sqlx::query(
		"\
UPDATE jobs
SET status = 'queued',
	attempts = $2,
	last_error = $3,
	run_at = now() + make_interval(secs => $4),
	lock_owner = NULL,
	lock_expires_at = NULL,
	updated_at = now()
WHERE job_id = $1",
	)
	.bind(job_id)
	.bind(attempts)
	.bind(error)
	.bind(delay.as_secs_f64())
	.execute(&mut **tx)
	.await?;

	Ok(JobStatus::Queued)
}

/// Straight to the DLQ, no retries; for payloads that can never succeed.
/// Attempts jump to the budget so the `dead => attempts >= max_attempts`
/// invariant holds.
pub async fn kill<'e, E>(executor: E, job_id: Uuid, error: &str) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE jobs
SET status = 'dead',
	attempts = GREATEST(attempts + 1, max_attempts),
	last_error = $2,
	lock_owner = NULL,
	lock_expires_at = NULL,
	updated_at = now()
WHERE job_id = $1",
	)
	.bind(job_id)
	.bind(error)
	.execute(executor)
	.await?;

	Ok(())
}

/// Parks a job as `failed` without scheduling a retry; the circuit breaker
/// uses this so the pause window, not the backoff ladder, governs resumption.
pub async fn park<'e, E>(executor: E, job_id: Uuid, error: &str) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE jobs
SET status = 'failed',
	attempts = attempts + 1,
	last_error = $2,
	lock_owner = NULL,
	lock_expires_at = NULL,
	updated_at = now()
WHERE job_id = $1",
	)
	.bind(job_id)
	.bind(error)
	.execute(executor)
	.await?;

	Ok(())
}

/// Relocks expired leases as failures so crashed workers do not leak jobs.
pub async fn reap_expired(
	tx: &mut Transaction<'_, Postgres>,
	limit: i64,
	backoff_base: Duration,
	backoff_cap: Duration,
) -> Result<Vec<Uuid>> {
	let expired: Vec<(Uuid,)> = sqlx::query_as(
		"\
SELECT job_id
FROM jobs
WHERE status = 'running'
	AND lock_expires_at < now()
ORDER BY lock_expires_at ASC
FOR UPDATE SKIP LOCKED
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&mut **tx)
	.await?;
	let mut reaped = Vec::with_capacity(expired.len());

	for (job_id,) in expired {
		fail(tx, job_id, "lease expired", backoff_base, backoff_cap).await?;

		reaped.push(job_id);
	}

	Ok(reaped)
}

/// Admin-only; permitted only from the DLQ. Payload survives, attempts reset.
pub async fn replay<'e, E>(executor: E, job_id: Uuid) -> Result<Job>
where
	E: PgExecutor<'e>,
{
	let job = sqlx::query_as::<_, Job>(&format!(
		"\
UPDATE jobs
SET status = 'queued',
	attempts = 0,
	run_at = now(),
	lock_owner = NULL,
	lock_expires_at = NULL,
	updated_at = now()
WHERE job_id = $1
	AND status = 'dead'
RETURNING {JOB_COLUMNS}"
	))
	.bind(job_id)
	.fetch_optional(executor)
	.await?;

	job.ok_or_else(|| Error::Conflict(format!("Job {job_id} is not dead; replay refused.")))
}

pub async fn list_dead<'e, E>(executor: E, organization_id: Uuid, limit: i64) -> Result<Vec<Job>>
where
	E: PgExecutor<'e>,
{
	let jobs = sqlx::query_as::<_, Job>(&format!(
		"\
SELECT {JOB_COLUMNS}
FROM jobs
WHERE organization_id = $1
	AND status = 'dead'
ORDER BY updated_at DESC
LIMIT $2"
	))
	.bind(organization_id)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(jobs)
}

pub async fn fetch<'e, E>(executor: E, job_id: Uuid) -> Result<Option<Job>>
where
	E: PgExecutor<'e>,
{
	let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"))
		.bind(job_id)
		.fetch_optional(executor)
		.await?;

	Ok(job)
}

/// `(mailbox_id, job_type, status, count)` for queued/running jobs; feeds the
/// per-mailbox sync summary.
pub async fn active_counts_by_mailbox<'e, E>(
	executor: E,
	organization_id: Uuid,
) -> Result<Vec<(Option<Uuid>, String, String, i64)>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT mailbox_id, job_type, status, COUNT(*)
FROM jobs
WHERE organization_id = $1
	AND status IN ('queued', 'running')
GROUP BY mailbox_id, job_type, status",
	)
	.bind(organization_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn counts_by_status<'e, E>(
	executor: E,
	organization_id: Uuid,
) -> Result<Vec<(String, i64)>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"SELECT status, COUNT(*) FROM jobs WHERE organization_id = $1 GROUP BY status",
	)
	.bind(organization_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn failed_last_24h_by_mailbox<'e, E>(
	executor: E,
	organization_id: Uuid,
) -> Result<Vec<(Uuid, i64)>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT mailbox_id, COUNT(*)
FROM jobs
WHERE organization_id = $1
	AND mailbox_id IS NOT NULL
	AND status IN ('failed', 'dead')
	AND updated_at >= now() - interval '24 hours'
GROUP BY mailbox_id",
	)
	.bind(organization_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

async fn find_non_terminal<'e, E>(
	executor: E,
	organization_id: Option<Uuid>,
	job_type: JobType,
	idempotency_key: &str,
) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	// Parked (`failed`) jobs do not count: they will not run again without
	// operator action, so they must not absorb fresh enqueues.
	let row: Option<(Uuid,)> = sqlx::query_as(
		"\
SELECT job_id
FROM jobs
WHERE organization_id IS NOT DISTINCT FROM $1
	AND job_type = $2
	AND idempotency_key = $3
	AND status IN ('queued', 'running')
LIMIT 1",
	)
	.bind(organization_id)
	.bind(job_type.as_str())
	.bind(idempotency_key)
	.fetch_optional(executor)
	.await?;

	Ok(row.map(|(job_id,)| job_id))
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use oss_domain::enums::JobType;
use oss_storage::models::Job;

use crate::{Error, OssService, Result};

/// What a handler reports back to the worker host. `CircuitBroken` parks the
/// job instead of walking the retry ladder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
	Completed,
	/// The mailbox is inside its pause window; nothing was attempted.
	Paused,
	/// The target row is gone or already past this stage.
	Skipped,
	CircuitBroken { error: String },
}

/// Payloads are schemaless JSON at rest; each job type revalidates its own
/// shape here at the boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailboxSyncPayload {
	pub organization_id: Uuid,
	pub mailbox_id: Uuid,
	pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OccurrencePayload {
	pub organization_id: Uuid,
	pub occurrence_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingPayload {
	pub organization_id: Uuid,
	pub occurrence_id: Uuid,
	/// Routing rules only run for the occurrence that created its ticket.
	#[serde(default)]
	pub ticket_created: bool,
}

pub fn decode_payload<T>(job_type: JobType, payload: &Value) -> Result<T>
where
	T: serde::de::DeserializeOwned,
{
	serde_json::from_value(payload.clone()).map_err(|err| Error::InvalidPayload {
		message: format!("{} payload is invalid: {err}.", job_type.as_str()),
	})
}

impl OssService {
	pub async fn handle_job(&self, job: &Job) -> Result<JobOutcome> {
		let job_type: JobType = job
			.job_type
			.parse()
			.map_err(|_| Error::InvalidPayload {
				message: format!("Unknown job type {:?}.", job.job_type),
			})?;

		match job_type {
			JobType::MailboxBackfill =>
				self.mailbox_backfill(decode_payload(job_type, &job.payload)?).await,
			JobType::MailboxHistorySync =>
				self.mailbox_history_sync(decode_payload(job_type, &job.payload)?).await,
			JobType::OccurrenceFetchRaw =>
				self.occurrence_fetch_raw(decode_payload(job_type, &job.payload)?).await,
			JobType::OccurrenceParse =>
				self.occurrence_parse(decode_payload(job_type, &job.payload)?).await,
			JobType::OccurrenceStitch =>
				self.occurrence_stitch(decode_payload(job_type, &job.payload)?).await,
			JobType::TicketApplyRouting =>
				self.ticket_apply_routing(decode_payload(job_type, &job.payload)?).await,
		}
	}

	/// Runs after `complete`: the history cadence re-enqueues itself once the
	/// finished job is terminal, so the per-mailbox idempotency key cannot
	/// collide with the job that just ran.
	pub async fn schedule_follow_ups(&self, job: &Job, outcome: &JobOutcome) -> Result<()> {
		if job.job_type != JobType::MailboxHistorySync.as_str() {
			return Ok(());
		}
		// The cadence survives the pause window: a paused sync still books
		// the next tick, which resumes work once `paused_until` lapses.
		if !matches!(outcome, JobOutcome::Completed | JobOutcome::Paused) {
			return Ok(());
		}

		let payload: MailboxSyncPayload =
			decode_payload(JobType::MailboxHistorySync, &job.payload)?;
		let run_at = time::OffsetDateTime::now_utc()
			+ time::Duration::seconds(self.cfg.sync.cadence_seconds as i64);
		let mut tx = self.db.pool.begin().await?;

		self.enqueue_history_sync(
			&mut tx,
			payload.organization_id,
			payload.mailbox_id,
			"poll_loop",
			Some(run_at),
		)
		.await?;

		tx.commit().await?;

		Ok(())
	}
}

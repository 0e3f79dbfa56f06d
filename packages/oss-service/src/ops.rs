use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use oss_storage::{jobs, mailboxes, messages};

use crate::{Error, OssService, Result};

#[derive(Clone, Debug, Serialize)]
pub struct MailboxSyncView {
	pub mailbox_id: Uuid,
	pub email_address: String,
	pub provider: String,
	pub purpose: String,
	pub is_enabled: bool,
	pub auth_degraded: bool,
	pub paused_until: Option<i64>,
	pub pause_reason: Option<String>,
	pub history_cursor: Option<String>,
	pub last_full_sync_at: Option<i64>,
	pub last_incremental_sync_at: Option<i64>,
	pub last_sync_error: Option<String>,
	pub consecutive_sync_failures: i32,
	pub sync_lag_seconds: Option<i64>,
	pub queued_jobs_by_type: HashMap<String, i64>,
	pub running_jobs_by_type: HashMap<String, i64>,
	pub failed_jobs_last_24h: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsOverview {
	pub queued_jobs: i64,
	pub running_jobs: i64,
	pub failed_jobs: i64,
	pub dead_jobs: i64,
	pub mailbox_count: i64,
	pub paused_mailbox_count: i64,
	pub avg_sync_lag_seconds: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeadJobView {
	pub job_id: Uuid,
	pub job_type: String,
	pub mailbox_id: Option<Uuid>,
	pub attempts: i32,
	pub max_attempts: i32,
	pub last_error: Option<String>,
	pub payload: Value,
	pub updated_at: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CollisionGroupView {
	pub collision_group_id: Uuid,
	pub message_count: i64,
	pub first_seen_at: i64,
	pub last_seen_at: i64,
	pub sample_message_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CollisionBackfillReport {
	pub fingerprints_scanned: u64,
	pub groups_created: u64,
	pub messages_updated: u64,
}

impl OssService {
	/// Per-mailbox sync health for the ops dashboard: lag, job counts by
	/// type, failure tallies.
	pub async fn mailbox_sync_summary(&self, organization_id: Uuid) -> Result<Vec<MailboxSyncView>> {
		let mailbox_rows = mailboxes::list(&self.db.pool, organization_id).await?;
		let active = jobs::active_counts_by_mailbox(&self.db.pool, organization_id).await?;
		let failed = jobs::failed_last_24h_by_mailbox(&self.db.pool, organization_id).await?;
		let failed_by_mailbox: HashMap<Uuid, i64> = failed.into_iter().collect();
		let mut queued_by_mailbox: HashMap<Uuid, HashMap<String, i64>> = HashMap::new();
		let mut running_by_mailbox: HashMap<Uuid, HashMap<String, i64>> = HashMap::new();

		for (mailbox_id, job_type, status, count) in active {
			let Some(mailbox_id) = mailbox_id else {
				continue;
			};
			let target = match status.as_str() {
				"queued" => &mut queued_by_mailbox,
				"running" => &mut running_by_mailbox,
				_ => continue,
			};

			target.entry(mailbox_id).or_default().insert(job_type, count);
		}

		let now = OffsetDateTime::now_utc();
		let mut out = Vec::with_capacity(mailbox_rows.len());

		for mailbox in mailbox_rows {
			// Lag prefers the incremental clock and falls back to the last
			// full sync.
			let lag_reference =
				mailbox.last_incremental_sync_at.or(mailbox.last_full_sync_at);
			let sync_lag_seconds =
				lag_reference.map(|at| (now - at).whole_seconds().max(0));

			out.push(MailboxSyncView {
				mailbox_id: mailbox.mailbox_id,
				email_address: mailbox.email_address,
				provider: mailbox.provider,
				purpose: mailbox.purpose,
				is_enabled: mailbox.is_enabled,
				auth_degraded: mailbox.auth_degraded,
				paused_until: mailbox.paused_until.map(OffsetDateTime::unix_timestamp),
				pause_reason: mailbox.pause_reason,
				history_cursor: mailbox.history_cursor,
				last_full_sync_at: mailbox.last_full_sync_at.map(OffsetDateTime::unix_timestamp),
				last_incremental_sync_at: mailbox
					.last_incremental_sync_at
					.map(OffsetDateTime::unix_timestamp),
				last_sync_error: mailbox.last_sync_error,
				consecutive_sync_failures: mailbox.consecutive_sync_failures,
				sync_lag_seconds,
				queued_jobs_by_type: queued_by_mailbox
					.remove(&mailbox.mailbox_id)
					.unwrap_or_default(),
				running_jobs_by_type: running_by_mailbox
					.remove(&mailbox.mailbox_id)
					.unwrap_or_default(),
				failed_jobs_last_24h: failed_by_mailbox
					.get(&mailbox.mailbox_id)
					.copied()
					.unwrap_or(0),
			});
		}

		Ok(out)
	}

	pub async fn metrics_overview(&self, organization_id: Uuid) -> Result<MetricsOverview> {
		let counts: HashMap<String, i64> =
			jobs::counts_by_status(&self.db.pool, organization_id).await?.into_iter().collect();
		let mailbox_rows = mailboxes::list(&self.db.pool, organization_id).await?;
		let now = OffsetDateTime::now_utc();
		let paused_mailbox_count =
			mailbox_rows.iter().filter(|mailbox| mailbox.is_paused(now)).count() as i64;
		let lags = mailbox_rows
			.iter()
			.filter_map(|mailbox| mailbox.last_incremental_sync_at)
			.map(|at| (now - at).whole_seconds().max(0))
			.collect::<Vec<_>>();
		let avg_sync_lag_seconds = if lags.is_empty() {
			None
		} else {
			Some(lags.iter().sum::<i64>() / lags.len() as i64)
		};

		Ok(MetricsOverview {
			queued_jobs: counts.get("queued").copied().unwrap_or(0),
			running_jobs: counts.get("running").copied().unwrap_or(0),
			failed_jobs: counts.get("failed").copied().unwrap_or(0),
			dead_jobs: counts.get("dead").copied().unwrap_or(0),
			mailbox_count: mailbox_rows.len() as i64,
			paused_mailbox_count,
			avg_sync_lag_seconds,
		})
	}

	pub async fn list_dead_jobs(
		&self,
		organization_id: Uuid,
		limit: i64,
	) -> Result<Vec<DeadJobView>> {
		let rows = jobs::list_dead(&self.db.pool, organization_id, limit.clamp(1, 500)).await?;

		Ok(rows
			.into_iter()
			.map(|job| DeadJobView {
				job_id: job.job_id,
				job_type: job.job_type,
				mailbox_id: job.mailbox_id,
				attempts: job.attempts,
				max_attempts: job.max_attempts,
				last_error: job.last_error,
				payload: job.payload,
				updated_at: job.updated_at.unix_timestamp(),
			})
			.collect())
	}

	/// Admin replay of one DLQ job; refuses jobs of other organizations and
	/// jobs that are not dead.
	pub async fn replay_dead_job(&self, organization_id: Uuid, job_id: Uuid) -> Result<Uuid> {
		let Some(job) = jobs::fetch(&self.db.pool, job_id).await? else {
			return Err(Error::NotFound { message: format!("Job {job_id}.") });
		};

		if job.organization_id != Some(organization_id) {
			return Err(Error::NotFound { message: format!("Job {job_id}.") });
		}

		let replayed = jobs::replay(&self.db.pool, job_id).await?;

		tracing::info!(job_id = %job_id, job_type = %replayed.job_type, "Dead job replayed.");

		Ok(replayed.job_id)
	}

	pub async fn list_collision_groups(
		&self,
		organization_id: Uuid,
		limit: i64,
	) -> Result<Vec<CollisionGroupView>> {
		let groups =
			messages::list_collision_groups(&self.db.pool, organization_id, limit.clamp(1, 200))
				.await?;

		Ok(groups
			.into_iter()
			.map(|group| CollisionGroupView {
				collision_group_id: group.collision_group_id,
				message_count: group.message_count,
				first_seen_at: group.first_seen_at.unix_timestamp(),
				last_seen_at: group.last_seen_at.unix_timestamp(),
				sample_message_ids: group.sample_message_ids,
			})
			.collect())
	}

	/// Rescans colliding fingerprints and assigns a shared group where rows
	/// predate collision tracking (or raced each other). Idempotent.
	pub async fn collision_backfill(&self, organization_id: Uuid) -> Result<CollisionBackfillReport> {
		let fingerprints =
			messages::list_colliding_fingerprints(&self.db.pool, organization_id).await?;
		let mut report = CollisionBackfillReport {
			fingerprints_scanned: fingerprints.len() as u64,
			..Default::default()
		};

		for fingerprint in fingerprints {
			let mut tx = self.db.pool.begin().await?;
			let rows =
				messages::find_by_fingerprint(&mut *tx, organization_id, &fingerprint).await?;

			if rows.iter().all(|row| row.collision_group_id.is_some()) {
				tx.commit().await?;

				continue;
			}

			let collision_group_id = match rows.iter().find_map(|row| row.collision_group_id) {
				Some(collision_group_id) => collision_group_id,
				None => {
					report.groups_created += 1;

					messages::create_collision_group(&mut *tx, organization_id).await?
				},
			};
			let updated = messages::set_collision_group_where_absent(
				&mut *tx,
				organization_id,
				&fingerprint,
				collision_group_id,
			)
			.await?;

			report.messages_updated += updated;

			tx.commit().await?;
		}

		Ok(report)
	}
}

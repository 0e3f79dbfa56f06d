use oss_domain::enums::{JobType, OccurrenceState};
use oss_storage::{
	jobs::{self, EnqueueJob},
	mailboxes,
	occurrences::{self, StageErrorColumn},
};

use crate::{Error, JobOutcome, OccurrencePayload, OssService, Result};

/// Malformed MIME must not retry-storm, so parse jobs get a single attempt.
const PARSE_MAX_ATTEMPTS: i32 = 1;

impl OssService {
	/// Stage 1: pull the RFC822 bytes from the provider, store them
	/// content-addressed, and hand the occurrence to the parser. A second
	/// delivery of the same job sees the blob pointer and skips the fetch.
	pub async fn occurrence_fetch_raw(&self, payload: OccurrencePayload) -> Result<JobOutcome> {
		let mut tx = self.db.pool.begin().await?;
		let Some(occurrence) =
			occurrences::fetch_for_update(&mut tx, payload.organization_id, payload.occurrence_id)
				.await?
		else {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		};

		if occurrence.raw_content_hash.is_some()
			&& occurrence.state != OccurrenceState::Discovered.as_str()
		{
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		}

		// Read without FOR UPDATE: eight fetch slots on one mailbox must not
		// serialize on its row.
		let Some(mailbox) = mailboxes::fetch(
			&mut *tx,
			occurrence.organization_id,
			occurrence.mailbox_id,
		)
		.await?
		else {
			occurrences::mark_stage_failed(
				&mut *tx,
				occurrence.occurrence_id,
				StageErrorColumn::Fetch,
				"mailbox is gone",
			)
			.await?;
			tx.commit().await?;

			return Ok(JobOutcome::Completed);
		};
		let mailbox_ref = match self.mailbox_access_token(&mut tx, &mailbox).await {
			Ok(token) => self.mailbox_ref(&mailbox, token),
			Err(err) => {
				drop(tx);

				return self
					.record_stage_failure(
						payload.occurrence_id,
						StageErrorColumn::Fetch,
						err,
					)
					.await;
			},
		};
		let raw = match self
			.provider
			.fetch_raw(&mailbox_ref, &occurrence.provider_message_id)
			.await
		{
			Ok(raw) => raw,
			Err(err) => {
				drop(tx);

				return self
					.record_stage_failure(
						payload.occurrence_id,
						StageErrorColumn::Fetch,
						err.into(),
					)
					.await;
			},
		};
		let size_bytes = raw.len() as i64;
		let content_hash = self.blobs.put(occurrence.organization_id, raw).await?;

		occurrences::mark_fetched(
			&mut *tx,
			occurrence.occurrence_id,
			content_hash.as_str(),
			size_bytes,
		)
		.await?;

		let key = format!("occurrence_parse:{}", occurrence.occurrence_id);

		jobs::enqueue(&mut tx, EnqueueJob {
			job_type: JobType::OccurrenceParse,
			organization_id: Some(occurrence.organization_id),
			mailbox_id: Some(occurrence.mailbox_id),
			payload: serde_json::to_value(OccurrencePayload {
				organization_id: occurrence.organization_id,
				occurrence_id: occurrence.occurrence_id,
			})
			.expect("Payload serialization is infallible."),
			idempotency_key: Some(&key),
			run_at: None,
			max_attempts: Some(PARSE_MAX_ATTEMPTS),
		})
		.await?;
		tx.commit().await?;

		Ok(JobOutcome::Completed)
	}

	/// Stage errors land on their own column before the job itself fails, in
	/// a fresh transaction since the stage's work has been rolled back.
	pub(crate) async fn record_stage_failure(
		&self,
		occurrence_id: uuid::Uuid,
		column: StageErrorColumn,
		err: Error,
	) -> Result<JobOutcome> {
		let message = err.to_string();
		let mut tx = self.db.pool.begin().await?;

		occurrences::mark_stage_failed(&mut *tx, occurrence_id, column, &message).await?;
		tx.commit().await?;

		Err(err)
	}
}

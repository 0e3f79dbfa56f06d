use std::collections::HashSet;

use serde_json::json;
use sqlx::{Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use oss_domain::enums::JobType;
use oss_provider::HistoryEventKind;
use oss_storage::{
	jobs::{self, EnqueueJob},
	mailboxes,
	models::Mailbox,
	occurrences, sync_events,
};

use crate::{Error, JobOutcome, MailboxSyncPayload, OccurrencePayload, OssService, Result};

/// Idempotency key of the invalid-cursor recovery backfill.
pub const RECOVERY_KEY: &str = "recovery";

const AUTO_PAUSE_REASON: &str = "auto: repeated sync failures";

impl OssService {
	/// Full backfill: paginate the provider's message list, upsert an
	/// occurrence per id, and enqueue a fetch per newly discovered one. The
	/// mailbox row lock is held for the duration so backfill and history
	/// sync for one mailbox never interleave.
	pub async fn mailbox_backfill(&self, payload: MailboxSyncPayload) -> Result<JobOutcome> {
		let mut tx = self.db.pool.begin().await?;
		let Some(gate) =
			self.sync_gate(&mut tx, payload.organization_id, payload.mailbox_id).await?
		else {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		};
		let (mailbox, paused) = gate;

		if paused {
			tx.commit().await?;

			return Ok(JobOutcome::Paused);
		}

		let mailbox_ref = match self.mailbox_access_token(&mut tx, &mailbox).await {
			Ok(token) => self.mailbox_ref(&mailbox, token),
			Err(err) => {
				drop(tx);

				return self.record_sync_failure(&mailbox, err).await;
			},
		};
		let mut page_token: Option<String> = None;
		let mut discovered = 0_u64;

		loop {
			let page =
				match self.provider.list_messages(&mailbox_ref, page_token.as_deref()).await {
					Ok(page) => page,
					Err(err) => {
						drop(tx);

						return self.record_sync_failure(&mailbox, err.into()).await;
					},
				};

			for provider_message_id in &page.ids {
				if self
					.discover_occurrence(&mut tx, &mailbox, provider_message_id)
					.await?
				{
					discovered += 1;
				}
			}

			match page.next_page_token {
				Some(token) => page_token = Some(token),
				None => break,
			}
		}

		let profile = match self.provider.profile(&mailbox_ref).await {
			Ok(profile) => profile,
			Err(err) => {
				drop(tx);

				return self.record_sync_failure(&mailbox, err.into()).await;
			},
		};
		let now = OffsetDateTime::now_utc();

		mailboxes::record_backfill_success(
			&mut *tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			profile.history_cursor.as_deref(),
			now,
		)
		.await?;
		sync_events::insert_sync_event(
			&mut *tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			"backfill_completed",
			&json!({ "discovered": discovered, "reason": payload.reason }),
		)
		.await?;
		self.enqueue_history_sync(
			&mut tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			"post_backfill",
			None,
		)
		.await?;
		tx.commit().await?;
		tracing::info!(
			mailbox_id = %mailbox.mailbox_id,
			discovered,
			"Mailbox backfill completed."
		);

		Ok(JobOutcome::Completed)
	}

	/// Incremental sync from the stored history cursor. An invalid cursor is
	/// not retried in place; it queues a recovery backfill.
	pub async fn mailbox_history_sync(&self, payload: MailboxSyncPayload) -> Result<JobOutcome> {
		let mut tx = self.db.pool.begin().await?;
		let Some(gate) =
			self.sync_gate(&mut tx, payload.organization_id, payload.mailbox_id).await?
		else {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		};
		let (mailbox, paused) = gate;

		if paused {
			tx.commit().await?;

			return Ok(JobOutcome::Paused);
		}

		let Some(cursor) = mailbox.history_cursor.clone() else {
			mailboxes::record_sync_error(
				&mut *tx,
				mailbox.organization_id,
				mailbox.mailbox_id,
				"No history cursor; queued full backfill.",
			)
			.await?;
			self.enqueue_backfill(
				&mut tx,
				mailbox.organization_id,
				mailbox.mailbox_id,
				"missing_cursor",
				None,
				None,
			)
			.await?;
			sync_events::insert_sync_event(
				&mut *tx,
				mailbox.organization_id,
				mailbox.mailbox_id,
				"backfill_enqueued",
				&json!({ "reason": "missing_cursor" }),
			)
			.await?;
			tx.commit().await?;

			return Ok(JobOutcome::Completed);
		};
		let mailbox_ref = match self.mailbox_access_token(&mut tx, &mailbox).await {
			Ok(token) => self.mailbox_ref(&mailbox, token),
			Err(err) => {
				drop(tx);

				return self.record_sync_failure(&mailbox, err).await;
			},
		};
		let delta = match self.provider.history_delta(&mailbox_ref, &cursor).await {
			Ok(delta) => delta,
			Err(oss_provider::Error::InvalidCursor) => {
				drop(tx);

				return self.recover_from_invalid_cursor(&mailbox).await;
			},
			Err(err) => {
				drop(tx);

				return self.record_sync_failure(&mailbox, err.into()).await;
			},
		};
		let mut seen: HashSet<&str> = HashSet::new();

		for event in &delta.events {
			// Deletions at the provider do not cascade; canonical data is
			// retained.
			if event.kind != HistoryEventKind::MessageAdded {
				continue;
			}
			if !seen.insert(event.provider_message_id.as_str()) {
				continue;
			}

			self.discover_occurrence(&mut tx, &mailbox, &event.provider_message_id).await?;
		}

		let now = OffsetDateTime::now_utc();

		mailboxes::record_history_success(
			&mut *tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			&delta.new_cursor,
			now,
		)
		.await?;
		tx.commit().await?;

		Ok(JobOutcome::Completed)
	}

	pub async fn pause_mailbox(
		&self,
		organization_id: Uuid,
		mailbox_id: Uuid,
		minutes: u64,
	) -> Result<()> {
		let mut tx = self.db.pool.begin().await?;

		if mailboxes::fetch_for_update(&mut tx, organization_id, mailbox_id).await?.is_none() {
			return Err(Error::NotFound { message: format!("Mailbox {mailbox_id}.") });
		}

		let until = OffsetDateTime::now_utc() + Duration::minutes(minutes.max(1) as i64);

		mailboxes::pause(&mut *tx, organization_id, mailbox_id, until, "manual pause").await?;
		tx.commit().await?;

		Ok(())
	}

	/// Clears the pause window and failure counter, and enqueues exactly one
	/// incremental sync to restart the cadence.
	pub async fn resume_mailbox(&self, organization_id: Uuid, mailbox_id: Uuid) -> Result<()> {
		let mut tx = self.db.pool.begin().await?;

		if mailboxes::fetch_for_update(&mut tx, organization_id, mailbox_id).await?.is_none() {
			return Err(Error::NotFound { message: format!("Mailbox {mailbox_id}.") });
		}

		mailboxes::resume(&mut *tx, organization_id, mailbox_id).await?;
		self.enqueue_history_sync(&mut tx, organization_id, mailbox_id, "manual_resume", None)
			.await?;
		tx.commit().await?;

		Ok(())
	}

	pub async fn trigger_backfill(&self, organization_id: Uuid, mailbox_id: Uuid) -> Result<Uuid> {
		let mut tx = self.db.pool.begin().await?;

		if mailboxes::fetch_for_update(&mut tx, organization_id, mailbox_id).await?.is_none() {
			return Err(Error::NotFound { message: format!("Mailbox {mailbox_id}.") });
		}

		let job_id = self
			.enqueue_backfill(&mut tx, organization_id, mailbox_id, "admin", None, None)
			.await?;

		tx.commit().await?;

		Ok(job_id)
	}

	pub async fn trigger_history_sync(
		&self,
		organization_id: Uuid,
		mailbox_id: Uuid,
	) -> Result<Uuid> {
		let mut tx = self.db.pool.begin().await?;

		if mailboxes::fetch_for_update(&mut tx, organization_id, mailbox_id).await?.is_none() {
			return Err(Error::NotFound { message: format!("Mailbox {mailbox_id}.") });
		}

		let job_id = self
			.enqueue_history_sync(&mut tx, organization_id, mailbox_id, "admin", None)
			.await?;

		tx.commit().await?;

		Ok(job_id)
	}

	pub(crate) async fn enqueue_backfill(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		organization_id: Uuid,
		mailbox_id: Uuid,
		reason: &str,
		idempotency_key: Option<&str>,
		run_at: Option<OffsetDateTime>,
	) -> Result<Uuid> {
		let key = idempotency_key
			.map(str::to_string)
			.unwrap_or_else(|| format!("mailbox_backfill:{mailbox_id}"));
		let payload = MailboxSyncPayload {
			organization_id,
			mailbox_id,
			reason: reason.to_string(),
		};
		let job_id = jobs::enqueue(tx, EnqueueJob {
			job_type: JobType::MailboxBackfill,
			organization_id: Some(organization_id),
			mailbox_id: Some(mailbox_id),
			payload: serde_json::to_value(&payload).expect("Payload serialization is infallible."),
			idempotency_key: Some(&key),
			run_at,
			max_attempts: None,
		})
		.await?;

		Ok(job_id)
	}

	pub(crate) async fn enqueue_history_sync(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		organization_id: Uuid,
		mailbox_id: Uuid,
		reason: &str,
		run_at: Option<OffsetDateTime>,
	) -> Result<Uuid> {
		let key = format!("mailbox_history_sync:{mailbox_id}");
		let payload = MailboxSyncPayload {
			organization_id,
			mailbox_id,
			reason: reason.to_string(),
		};
		let job_id = jobs::enqueue(tx, EnqueueJob {
			job_type: JobType::MailboxHistorySync,
			organization_id: Some(organization_id),
			mailbox_id: Some(mailbox_id),
			payload: serde_json::to_value(&payload).expect("Payload serialization is infallible."),
			idempotency_key: Some(&key),
			run_at,
			max_attempts: None,
		})
		.await?;

		Ok(job_id)
	}

	/// Loads and gates the mailbox: `None` means "nothing to do" (missing,
	/// disabled, or auth-degraded); the bool reports the pause window.
	async fn sync_gate(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		organization_id: Uuid,
		mailbox_id: Uuid,
	) -> Result<Option<(Mailbox, bool)>> {
		let Some(mailbox) = mailboxes::fetch_for_update(tx, organization_id, mailbox_id).await?
		else {
			return Ok(None);
		};

		if !mailbox.is_enabled || mailbox.auth_degraded {
			return Ok(None);
		}

		let paused = mailbox.is_paused(OffsetDateTime::now_utc());

		Ok(Some((mailbox, paused)))
	}

	/// Upserts the occurrence and, when newly discovered, enqueues its fetch.
	/// Returns whether the occurrence is new.
	async fn discover_occurrence(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		mailbox: &Mailbox,
		provider_message_id: &str,
	) -> Result<bool> {
		let (occurrence_id, created) = occurrences::upsert_discovered(
			tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			provider_message_id,
		)
		.await?;

		if !created {
			return Ok(false);
		}

		let key = format!("occurrence_fetch_raw:{occurrence_id}");

		jobs::enqueue(tx, EnqueueJob {
			job_type: JobType::OccurrenceFetchRaw,
			organization_id: Some(mailbox.organization_id),
			mailbox_id: Some(mailbox.mailbox_id),
			payload: serde_json::to_value(OccurrencePayload {
				organization_id: mailbox.organization_id,
				occurrence_id,
			})
			.expect("Payload serialization is infallible."),
			idempotency_key: Some(&key),
			run_at: None,
			max_attempts: None,
		})
		.await?;

		Ok(true)
	}

	/// Invalid cursor: one recorded failure, one recovery backfill. The
	/// breaker counter moves but a single invalid cursor never trips it.
	async fn recover_from_invalid_cursor(&self, mailbox: &Mailbox) -> Result<JobOutcome> {
		let mut tx = self.db.pool.begin().await?;

		mailboxes::increment_sync_failures(
			&mut *tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			"History cursor is invalid or expired; queued full backfill.",
		)
		.await?;
		self.enqueue_backfill(
			&mut tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			"history_invalid",
			Some(RECOVERY_KEY),
			None,
		)
		.await?;
		sync_events::insert_sync_event(
			&mut *tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			"backfill_recovery",
			&json!({ "reason": "history_invalid" }),
		)
		.await?;
		tx.commit().await?;
		tracing::warn!(
			mailbox_id = %mailbox.mailbox_id,
			"History cursor invalid; recovery backfill enqueued."
		);

		Ok(JobOutcome::Completed)
	}

	/// Failure bookkeeping outside the (rolled back) sync transaction. Auth
	/// failures degrade the mailbox; transient ones feed the breaker.
	async fn record_sync_failure(&self, mailbox: &Mailbox, err: Error) -> Result<JobOutcome> {
		if let Error::Provider(oss_provider::Error::Auth(message)) = &err {
			let mut tx = self.db.pool.begin().await?;

			mailboxes::set_auth_degraded(&mut *tx, mailbox.organization_id, mailbox.mailbox_id, true)
				.await?;
			mailboxes::record_sync_error(&mut *tx, mailbox.organization_id, mailbox.mailbox_id, message)
				.await?;
			sync_events::insert_sync_event(
				&mut *tx,
				mailbox.organization_id,
				mailbox.mailbox_id,
				"auth_degraded",
				&json!({ "error": message }),
			)
			.await?;
			tx.commit().await?;
			tracing::warn!(
				mailbox_id = %mailbox.mailbox_id,
				"Mailbox auth degraded; sync halted until credentials are refreshed."
			);

			return Ok(JobOutcome::Skipped);
		}

		let message = err.to_string();
		let mut tx = self.db.pool.begin().await?;
		let failures = mailboxes::increment_sync_failures(
			&mut *tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			&message,
		)
		.await?;

		if failures >= self.cfg.sync.circuit_breaker_threshold as i32 {
			let until = OffsetDateTime::now_utc()
				+ Duration::minutes(self.cfg.sync.pause_minutes as i64);

			mailboxes::pause(&mut *tx, mailbox.organization_id, mailbox.mailbox_id, until, AUTO_PAUSE_REASON)
				.await?;
			sync_events::insert_sync_event(
				&mut *tx,
				mailbox.organization_id,
				mailbox.mailbox_id,
				"circuit_breaker_tripped",
				&json!({ "failures": failures, "paused_until": until.unix_timestamp() }),
			)
			.await?;
			tx.commit().await?;
			tracing::warn!(
				mailbox_id = %mailbox.mailbox_id,
				failures,
				"Sync circuit breaker tripped; mailbox paused."
			);

			return Ok(JobOutcome::CircuitBroken { error: message });
		}

		tx.commit().await?;

		Err(err)
	}
}

use bytes::Bytes;

use oss_blob::ContentHash;
use oss_domain::{
	enums::{Direction, JobType, OccurrenceState},
	fingerprint::{self, FingerprintInput},
	recipient,
};
use oss_mail::ParsedEmail;
use oss_storage::{
	jobs::{self, EnqueueJob},
	messages::{self, NewAttachment, NewCanonicalMessage},
	occurrences::{self, ParsedUpdate, StageErrorColumn},
	orgs,
};

use crate::{JobOutcome, OccurrencePayload, OssService, Result};

impl OssService {
	/// Stage 2: decode MIME, normalize, compute the canonical identity, and
	/// link the occurrence to it. Re-running on the same bytes under the same
	/// parser version yields the same canonical row.
	pub async fn occurrence_parse(&self, payload: OccurrencePayload) -> Result<JobOutcome> {
		let mut tx = self.db.pool.begin().await?;
		let Some(occurrence) =
			occurrences::fetch_for_update(&mut tx, payload.organization_id, payload.occurrence_id)
				.await?
		else {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		};

		let past_parse = occurrence.state.parse::<OccurrenceState>().is_ok_and(|state| {
			matches!(
				state,
				OccurrenceState::Parsed | OccurrenceState::Stitched | OccurrenceState::Routed
			)
		});

		if occurrence.canonical_message_id.is_some() && past_parse {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		}

		let Some(raw_hash) = occurrence.raw_content_hash.as_deref() else {
			occurrences::mark_stage_failed(
				&mut *tx,
				occurrence.occurrence_id,
				StageErrorColumn::Parse,
				"missing raw blob pointer",
			)
			.await?;
			tx.commit().await?;

			return Ok(JobOutcome::Completed);
		};
		let content_hash = match ContentHash::from_hex(raw_hash) {
			Ok(content_hash) => content_hash,
			Err(err) => {
				drop(tx);

				return self
					.record_stage_failure(
						payload.occurrence_id,
						StageErrorColumn::Parse,
						err.into(),
					)
					.await;
			},
		};
		let raw = match self.blobs.get(occurrence.organization_id, &content_hash).await {
			Ok(raw) => raw,
			Err(err) => {
				drop(tx);

				return self
					.record_stage_failure(
						payload.occurrence_id,
						StageErrorColumn::Parse,
						err.into(),
					)
					.await;
			},
		};
		let parsed = match oss_mail::parse_raw_email(&raw) {
			Ok(parsed) => parsed,
			Err(err) => {
				drop(tx);

				// Terminal: malformed MIME never blocks sibling occurrences
				// and never retries.
				return self
					.record_stage_failure(
						payload.occurrence_id,
						StageErrorColumn::Parse,
						err.into(),
					)
					.await;
			},
		};

		let fingerprint = fingerprint::fingerprint_v1(&FingerprintInput {
			subject_norm: parsed.subject_norm.as_deref(),
			from_email: parsed.from_email.as_deref(),
			date: parsed.date,
			to_emails: &parsed.to_emails,
			cc_emails: &parsed.cc_emails,
			body_text: parsed.body_text.as_deref(),
		});
		let body_hash = fingerprint::body_hash(parsed.body_text.as_deref());
		let org_domains = orgs::fetch_domains(&mut *tx, occurrence.organization_id).await?;
		let resolved = recipient::resolve_original_recipient(
			&parsed.headers,
			&parsed.to_emails,
			&parsed.cc_emails,
			&org_domains,
		);
		let x_oss_ticket_id = oss_mail::header_uuid(&parsed.headers, "X-OSS-Ticket-ID");
		let x_oss_message_id = oss_mail::header_uuid(&parsed.headers, "X-OSS-Message-ID");
		// Only the send path injects the message marker; a journal copy that
		// carries it is our own outbound mail mirrored back.
		let direction =
			if x_oss_message_id.is_some() { Direction::Outbound } else { Direction::Inbound };
		let snippet = derive_snippet(&parsed, self.cfg.ingest.snippet_max_chars);
		let headers_json = serde_json::to_value(&parsed.headers)
			.expect("Header map serialization is infallible.");
		let (canonical_message_id, inserted) = messages::upsert_canonical(&mut tx, NewCanonicalMessage {
			organization_id: occurrence.organization_id,
			direction: direction.as_str(),
			fingerprint_v1: &fingerprint,
			body_hash: &body_hash,
			rfc_message_id: parsed.rfc_message_id.as_deref(),
			x_oss_ticket_id,
			x_oss_message_id,
			subject: parsed.subject.as_deref(),
			subject_norm: parsed.subject_norm.as_deref(),
			from_email: parsed.from_email.as_deref(),
			from_name: parsed.from_name.as_deref(),
			reply_to_emails: &parsed.reply_to_emails,
			to_emails: &parsed.to_emails,
			cc_emails: &parsed.cc_emails,
			date_header: parsed.date,
			in_reply_to: parsed.in_reply_to.as_deref(),
			references_ids: &parsed.references,
			headers: &headers_json,
			body_text: parsed.body_text.as_deref(),
			body_html_sanitized: parsed.body_html_sanitized.as_deref(),
			snippet: snippet.as_deref(),
			attachment_count: parsed.attachments.len() as i32,
			parser_version: self.cfg.ingest.parser_version,
			sanitizer_revision: &self.cfg.ingest.sanitizer_revision,
		})
		.await?;

		if inserted {
			self.link_collision_group(&mut tx, occurrence.organization_id, &fingerprint).await?;
		}

		for attachment in &parsed.attachments {
			let content_hash = self
				.blobs
				.put(occurrence.organization_id, Bytes::from(attachment.payload.clone()))
				.await?;

			messages::insert_attachment(&mut *tx, NewAttachment {
				organization_id: occurrence.organization_id,
				canonical_message_id,
				content_hash: content_hash.as_str(),
				filename: attachment.filename.as_deref(),
				content_type: attachment.content_type.as_deref(),
				size_bytes: attachment.payload.len() as i64,
				is_inline: attachment.is_inline,
				content_id: attachment.content_id.as_deref(),
			})
			.await?;
		}

		occurrences::mark_parsed(&mut *tx, occurrence.occurrence_id, ParsedUpdate {
			canonical_message_id,
			original_recipient: resolved.recipient.as_deref(),
			recipient_source: resolved.source.as_str(),
			recipient_confidence: resolved.confidence.as_str(),
			recipient_evidence: &resolved.evidence,
		})
		.await?;

		let key = format!("occurrence_stitch:{}", occurrence.occurrence_id);

		jobs::enqueue(&mut tx, EnqueueJob {
			job_type: JobType::OccurrenceStitch,
			organization_id: Some(occurrence.organization_id),
			mailbox_id: Some(occurrence.mailbox_id),
			payload: serde_json::to_value(OccurrencePayload {
				organization_id: occurrence.organization_id,
				occurrence_id: occurrence.occurrence_id,
			})
			.expect("Payload serialization is infallible."),
			idempotency_key: Some(&key),
			run_at: None,
			max_attempts: None,
		})
		.await?;
		tx.commit().await?;

		Ok(JobOutcome::Completed)
	}

	/// Fingerprint collisions with different full-body hashes coexist; both
	/// rows get one shared group for admin review.
	async fn link_collision_group(
		&self,
		tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
		organization_id: uuid::Uuid,
		fingerprint: &[u8],
	) -> Result<()> {
		let rows = messages::find_by_fingerprint(&mut **tx, organization_id, fingerprint).await?;

		if rows.len() < 2 {
			return Ok(());
		}

		let collision_group_id = match rows.iter().find_map(|row| row.collision_group_id) {
			Some(collision_group_id) => collision_group_id,
			None => messages::create_collision_group(&mut **tx, organization_id).await?,
		};

		messages::set_collision_group_where_absent(
			&mut **tx,
			organization_id,
			fingerprint,
			collision_group_id,
		)
		.await?;
		tracing::info!(
			organization_id = %organization_id,
			collision_group_id = %collision_group_id,
			"Fingerprint collision recorded."
		);

		Ok(())
	}
}

fn derive_snippet(parsed: &ParsedEmail, max_chars: usize) -> Option<String> {
	let source = parsed.body_text.as_deref().or(parsed.subject.as_deref())?;
	let snippet = source.chars().take(max_chars).collect::<String>();
	let trimmed = snippet.trim();

	if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

use serde_json::json;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use oss_domain::{
	enums::{Confidence, Direction, JobType, OccurrenceState, StitchReason},
	ticket_code,
};
use oss_storage::{
	jobs::{self, EnqueueJob},
	messages,
	models::{CanonicalMessage, MessageOccurrence},
	occurrences::{self, StageErrorColumn},
	tickets::{self, NewTicket},
};

use crate::{JobOutcome, OccurrencePayload, OssService, Result, RoutingPayload};

struct StitchDecision {
	ticket_id: Uuid,
	/// A `StitchReason` value, or `existing_canonical_link` when another
	/// occurrence of the same canonical message stitched first.
	reason: &'static str,
	confidence: Confidence,
	ticket_created: bool,
}

impl OssService {
	/// Stage 3: attach the occurrence's canonical message to a ticket.
	/// Markers beat reply tokens beat threading beats the subject heuristic;
	/// a fresh ticket is the fallback.
	pub async fn occurrence_stitch(&self, payload: OccurrencePayload) -> Result<JobOutcome> {
		let mut tx = self.db.pool.begin().await?;
		let Some(occurrence) =
			occurrences::fetch_for_update(&mut tx, payload.organization_id, payload.occurrence_id)
				.await?
		else {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		};

		let past_stitch = occurrence.state.parse::<OccurrenceState>().is_ok_and(|state| {
			matches!(state, OccurrenceState::Stitched | OccurrenceState::Routed)
		});

		if occurrence.ticket_id.is_some() && past_stitch {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		}

		let Some(canonical_message_id) = occurrence.canonical_message_id else {
			occurrences::mark_stage_failed(
				&mut *tx,
				occurrence.occurrence_id,
				StageErrorColumn::Stitch,
				"missing canonical message link",
			)
			.await?;
			tx.commit().await?;

			return Ok(JobOutcome::Completed);
		};
		let Some(canonical) =
			messages::fetch(&mut *tx, occurrence.organization_id, canonical_message_id).await?
		else {
			occurrences::mark_stage_failed(
				&mut *tx,
				occurrence.occurrence_id,
				StageErrorColumn::Stitch,
				"canonical message row missing",
			)
			.await?;
			tx.commit().await?;

			return Ok(JobOutcome::Completed);
		};

		let decision = self.stitch_decision(&mut tx, &canonical).await?;

		if canonical.ticket_id != Some(decision.ticket_id) {
			messages::set_ticket(
				&mut *tx,
				occurrence.organization_id,
				canonical_message_id,
				decision.ticket_id,
			)
			.await?;
		}
		if !decision.ticket_created {
			tickets::insert_ticket_event(
				&mut *tx,
				occurrence.organization_id,
				decision.ticket_id,
				"message_stitched",
				&json!({
					"canonical_message_id": canonical_message_id,
					"occurrence_id": occurrence.occurrence_id,
					"stitch_reason": decision.reason,
					"stitch_confidence": decision.confidence.as_str(),
				}),
			)
			.await?;
		}

		// Outbound mirrors do not bump activity; the send path already did.
		if canonical.direction == Direction::Inbound.as_str() {
			let message_at = canonical.date_header.unwrap_or_else(OffsetDateTime::now_utc);

			tickets::record_message_activity(
				&mut *tx,
				occurrence.organization_id,
				decision.ticket_id,
				message_at,
			)
			.await?;
		}

		occurrences::mark_stitched(&mut *tx, occurrence.occurrence_id, decision.ticket_id).await?;
		self.enqueue_routing(&mut tx, &occurrence, decision.ticket_created).await?;
		tx.commit().await?;

		Ok(JobOutcome::Completed)
	}

	async fn stitch_decision(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		canonical: &CanonicalMessage,
	) -> Result<StitchDecision> {
		let organization_id = canonical.organization_id;

		// Another occurrence of the same canonical message already stitched.
		if let Some(ticket_id) = canonical.ticket_id {
			return Ok(StitchDecision {
				ticket_id,
				reason: "existing_canonical_link",
				confidence: Confidence::High,
				ticket_created: false,
			});
		}

		// Rule 1: the outbound marker is authoritative when the ticket exists.
		if let Some(ticket_id) = canonical.x_oss_ticket_id
			&& tickets::exists(&mut **tx, organization_id, ticket_id).await?
		{
			return Ok(StitchDecision {
				ticket_id,
				reason: StitchReason::XOssMarker.as_str(),
				confidence: Confidence::High,
				ticket_created: false,
			});
		}

		// Rule 2: ticket+<code>@ reply alias.
		for email in &canonical.reply_to_emails {
			let Some(token) = ticket_code::parse_reply_token(email) else {
				continue;
			};

			if let Some(ticket_id) =
				tickets::find_by_code(&mut **tx, organization_id, token).await?
			{
				return Ok(StitchDecision {
					ticket_id,
					reason: StitchReason::ReplyToToken.as_str(),
					confidence: Confidence::High,
					ticket_created: false,
				});
			}
		}

		// Rule 3: In-Reply-To, then References, resolved through the
		// canonical-message index.
		for rfc_id in canonical
			.in_reply_to
			.iter()
			.chain(canonical.references_ids.iter())
		{
			if let Some(ticket_id) =
				messages::find_ticket_by_rfc_id(&mut **tx, organization_id, rfc_id).await?
			{
				return Ok(StitchDecision {
					ticket_id,
					reason: StitchReason::ReferencesGraph.as_str(),
					confidence: Confidence::Medium,
					ticket_created: false,
				});
			}
		}

		// Rule 4: subject fallback for clients without threading headers.
		if !canonical.has_threading_headers()
			&& let (Some(subject_norm), Some(requester)) =
				(canonical.subject_norm.as_deref(), canonical.from_email.as_deref())
			&& let Some(ticket_id) = tickets::find_subject_match(
				&mut **tx,
				organization_id,
				subject_norm,
				requester,
				self.cfg.ingest.subject_match_window_days,
			)
			.await?
		{
			return Ok(StitchDecision {
				ticket_id,
				reason: StitchReason::SubjectMatch.as_str(),
				confidence: Confidence::Low,
				ticket_created: false,
			});
		}

		// Rule 5: a new ticket.
		let code = ticket_code::new_ticket_code();
		let ticket_id = tickets::insert_ticket(&mut **tx, NewTicket {
			organization_id,
			ticket_code: &code,
			subject: canonical.subject.as_deref(),
			subject_norm: canonical.subject_norm.as_deref(),
			requester_email: canonical.from_email.as_deref(),
			requester_name: canonical.from_name.as_deref(),
			first_message_at: canonical.date_header,
			stitch_reason: StitchReason::NewTicket.as_str(),
			stitch_confidence: Confidence::Low.as_str(),
		})
		.await?;

		Ok(StitchDecision {
			ticket_id,
			reason: StitchReason::NewTicket.as_str(),
			confidence: Confidence::Low,
			ticket_created: true,
		})
	}

	async fn enqueue_routing(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		occurrence: &MessageOccurrence,
		ticket_created: bool,
	) -> Result<()> {
		let key = format!("ticket_apply_routing:{}", occurrence.occurrence_id);
		let payload = RoutingPayload {
			organization_id: occurrence.organization_id,
			occurrence_id: occurrence.occurrence_id,
			ticket_created,
		};

		jobs::enqueue(tx, EnqueueJob {
			job_type: JobType::TicketApplyRouting,
			organization_id: Some(occurrence.organization_id),
			mailbox_id: Some(occurrence.mailbox_id),
			payload: serde_json::to_value(&payload)
				.expect("Payload serialization is infallible."),
			idempotency_key: Some(&key),
			run_at: None,
			max_attempts: None,
		})
		.await?;

		Ok(())
	}
}

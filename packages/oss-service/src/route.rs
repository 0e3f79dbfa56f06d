use serde_json::json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use oss_domain::{
	enums::{Direction, OccurrenceState, RecipientSource, TicketStatus},
	normalize,
	routing::{RouteInput, RulePredicates, allowlist_matches, rule_matches},
};
use oss_storage::{
	messages,
	models::{MessageOccurrence, RoutingRule, Ticket},
	occurrences::{self, StageErrorColumn},
	orgs, routing, tickets,
};

use crate::{JobOutcome, OssService, Result, RoutingPayload};

impl OssService {
	/// Stage 4: allowlist gate, then the first matching rule's actions. Only
	/// the inbound occurrence that created its ticket evaluates rules;
	/// everything else just leaves the pipeline as `routed`.
	pub async fn ticket_apply_routing(&self, payload: RoutingPayload) -> Result<JobOutcome> {
		let mut tx = self.db.pool.begin().await?;
		let Some(occurrence) =
			occurrences::fetch_for_update(&mut tx, payload.organization_id, payload.occurrence_id)
				.await?
		else {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		};

		if occurrence.state == OccurrenceState::Routed.as_str() {
			tx.commit().await?;

			return Ok(JobOutcome::Skipped);
		}

		let Some(ticket_id) = occurrence.ticket_id else {
			occurrences::mark_stage_failed(
				&mut *tx,
				occurrence.occurrence_id,
				StageErrorColumn::Route,
				"missing ticket link",
			)
			.await?;
			tx.commit().await?;

			return Ok(JobOutcome::Completed);
		};
		let direction = self.occurrence_direction(&mut tx, &occurrence).await?;

		if !payload.ticket_created || direction != Direction::Inbound {
			occurrences::mark_routed(&mut *tx, occurrence.occurrence_id).await?;
			tx.commit().await?;

			return Ok(JobOutcome::Completed);
		}

		let recipient = occurrence
			.original_recipient
			.as_deref()
			.map(|recipient| recipient.trim().to_lowercase())
			.unwrap_or_default();
		let source_unknown = occurrence.recipient_source == RecipientSource::Unknown.as_str();
		let patterns = routing::list_enabled_allowlist_patterns(
			&mut *tx,
			occurrence.organization_id,
		)
		.await?;

		if source_unknown || !allowlist_matches(&patterns, &recipient) {
			self.mark_spam(&mut tx, &occurrence, ticket_id, &recipient).await?;
			occurrences::mark_routed(&mut *tx, occurrence.occurrence_id).await?;
			tx.commit().await?;

			return Ok(JobOutcome::Completed);
		}

		let sender_email = self
			.occurrence_sender(&mut tx, &occurrence)
			.await?
			.unwrap_or_default();
		let sender_domain =
			normalize::email_domain(&sender_email).unwrap_or_default().to_string();
		let rules = routing::list_enabled_rules(&mut *tx, occurrence.organization_id).await?;
		let input = RouteInput {
			recipient: &recipient,
			sender_email: &sender_email,
			sender_domain: &sender_domain,
			direction: Some(direction),
		};
		let matched = rules.iter().find(|rule| rule_matches(&predicates_of(rule), &input));

		match matched {
			Some(rule) =>
				self.apply_rule_actions(&mut tx, &occurrence, ticket_id, rule).await?,
			None => {
				occurrences::mark_routed(&mut *tx, occurrence.occurrence_id).await?;
			},
		}

		tx.commit().await?;

		Ok(JobOutcome::Completed)
	}

	async fn occurrence_direction(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		occurrence: &MessageOccurrence,
	) -> Result<Direction> {
		let Some(canonical_message_id) = occurrence.canonical_message_id else {
			return Ok(Direction::Inbound);
		};
		let canonical =
			messages::fetch(&mut **tx, occurrence.organization_id, canonical_message_id).await?;

		Ok(canonical
			.map(|canonical| {
				canonical.direction.parse().unwrap_or(Direction::Inbound)
			})
			.unwrap_or(Direction::Inbound))
	}

	async fn occurrence_sender(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		occurrence: &MessageOccurrence,
	) -> Result<Option<String>> {
		let Some(canonical_message_id) = occurrence.canonical_message_id else {
			return Ok(None);
		};
		let canonical =
			messages::fetch(&mut **tx, occurrence.organization_id, canonical_message_id).await?;

		Ok(canonical.and_then(|canonical| canonical.from_email))
	}

	async fn mark_spam(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		occurrence: &MessageOccurrence,
		ticket_id: Uuid,
		recipient: &str,
	) -> Result<()> {
		tickets::set_status(
			&mut **tx,
			occurrence.organization_id,
			ticket_id,
			TicketStatus::Spam.as_str(),
			false,
		)
		.await?;
		tickets::insert_ticket_event(
			&mut **tx,
			occurrence.organization_id,
			ticket_id,
			"auto_spam",
			&json!({
				"occurrence_id": occurrence.occurrence_id,
				"recipient": recipient,
				"recipient_source": occurrence.recipient_source,
			}),
		)
		.await?;
		tracing::info!(
			ticket_id = %ticket_id,
			recipient,
			"Recipient not allowlisted; ticket marked as spam."
		);

		Ok(())
	}

	/// First match wins; actions apply atomically inside the stage
	/// transaction. A rule naming a missing queue fails closed: no mutation,
	/// `route_error` recorded, ticket left `new` and unassigned.
	async fn apply_rule_actions(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		occurrence: &MessageOccurrence,
		ticket_id: Uuid,
		rule: &RoutingRule,
	) -> Result<()> {
		let organization_id = occurrence.organization_id;

		if rule.action_drop {
			tickets::delete_ticket(&mut **tx, organization_id, ticket_id).await?;
			occurrences::mark_routed(&mut **tx, occurrence.occurrence_id).await?;
			tracing::info!(
				ticket_id = %ticket_id,
				routing_rule_id = %rule.routing_rule_id,
				"Routing rule dropped the ticket."
			);

			return Ok(());
		}

		let Some(before) = tickets::fetch_for_update(tx, organization_id, ticket_id).await?
		else {
			occurrences::mark_routed_with_error(
				&mut **tx,
				occurrence.occurrence_id,
				"ticket disappeared before routing",
			)
			.await?;

			return Ok(());
		};

		if let Some(queue_id) = rule.action_assign_queue_id
			&& rule.action_assign_user_id.is_none()
			&& !orgs::queue_exists(&mut **tx, organization_id, queue_id).await?
		{
			occurrences::mark_routed_with_error(
				&mut **tx,
				occurrence.occurrence_id,
				&format!("routing rule {} references missing queue {queue_id}", rule.routing_rule_id),
			)
			.await?;
			tracing::warn!(
				routing_rule_id = %rule.routing_rule_id,
				queue_id = %queue_id,
				"Routing rule references a missing queue; failing closed."
			);

			return Ok(());
		}

		// Validate before mutating anything so a bad rule applies nothing.
		if let Some(status) = rule.action_set_status.as_deref()
			&& status.parse::<TicketStatus>().is_err()
		{
			occurrences::mark_routed_with_error(
				&mut **tx,
				occurrence.occurrence_id,
				&format!("routing rule {} sets unknown status {status:?}", rule.routing_rule_id),
			)
			.await?;

			return Ok(());
		}

		if let Some(user_id) = rule.action_assign_user_id
			&& !orgs::user_exists(&mut **tx, organization_id, user_id).await?
		{
			occurrences::mark_routed_with_error(
				&mut **tx,
				occurrence.occurrence_id,
				&format!("routing rule {} references missing user {user_id}", rule.routing_rule_id),
			)
			.await?;

			return Ok(());
		}

		if let Some(user_id) = rule.action_assign_user_id {
			tickets::assign_user(&mut **tx, organization_id, ticket_id, user_id).await?;
		} else if let Some(queue_id) = rule.action_assign_queue_id {
			tickets::assign_queue(&mut **tx, organization_id, ticket_id, queue_id).await?;
		}

		if let Some(status) = rule.action_set_status.as_deref() {
			tickets::set_status(&mut **tx, organization_id, ticket_id, status, false).await?;
		}
		if rule.action_auto_close {
			tickets::set_status(
				&mut **tx,
				organization_id,
				ticket_id,
				TicketStatus::Closed.as_str(),
				true,
			)
			.await?;
		}

		let after = tickets::fetch(&mut **tx, organization_id, ticket_id).await?;

		tickets::insert_ticket_event(
			&mut **tx,
			organization_id,
			ticket_id,
			"routing_applied",
			&json!({
				"occurrence_id": occurrence.occurrence_id,
				"routing_rule_id": rule.routing_rule_id,
				"before": ticket_state_snapshot(&before),
				"after": after.as_ref().map(ticket_state_snapshot),
			}),
		)
		.await?;
		occurrences::mark_routed(&mut **tx, occurrence.occurrence_id).await?;

		Ok(())
	}
}

pub(crate) fn predicates_of(rule: &RoutingRule) -> RulePredicates {
	RulePredicates {
		recipient_pattern: rule.match_recipient_pattern.clone(),
		sender_domain_pattern: rule.match_sender_domain_pattern.clone(),
		sender_email_pattern: rule.match_sender_email_pattern.clone(),
		direction: rule.match_direction.as_deref().and_then(|direction| direction.parse().ok()),
	}
}

fn ticket_state_snapshot(ticket: &Ticket) -> serde_json::Value {
	json!({
		"status": ticket.status,
		"assignee_user_id": ticket.assignee_user_id,
		"assignee_queue_id": ticket.assignee_queue_id,
	})
}

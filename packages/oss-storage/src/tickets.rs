use serde_json::Value;
use sqlx::{PgExecutor, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::Ticket};

const TICKET_COLUMNS: &str = "\
ticket_id, organization_id, ticket_code, status, priority, subject, subject_norm, \
requester_email, requester_name, assignee_user_id, assignee_queue_id, stitch_reason, \
stitch_confidence, created_at, updated_at, first_message_at, last_message_at, last_activity_at, \
closed_at";

#[derive(Debug)]
pub struct NewTicket<'a> {
	pub organization_id: Uuid,
	pub ticket_code: &'a str,
	pub subject: Option<&'a str>,
	pub subject_norm: Option<&'a str>,
	pub requester_email: Option<&'a str>,
	pub requester_name: Option<&'a str>,
	pub first_message_at: Option<OffsetDateTime>,
	pub stitch_reason: &'a str,
	pub stitch_confidence: &'a str,
}

pub async fn insert_ticket<'e, E>(executor: E, ticket: NewTicket<'_>) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let (ticket_id,): (Uuid,) = sqlx::query_as(
		"\
INSERT INTO tickets (
	organization_id,
	ticket_code,
	status,
	priority,
	subject,
	subject_norm,
	requester_email,
	requester_name,
	first_message_at,
	last_message_at,
	last_activity_at,
	stitch_reason,
	stitch_confidence
)
VALUES (
	$1,
	$2,
	'new',
	'normal',
	$3,
	$4,
	$5,
	$6,
	$7,
	$7,
	$7,
	$8,
	$9
)
RETURNING ticket_id",
	)
	.bind(ticket.organization_id)
	.bind(ticket.ticket_code)
	.bind(ticket.subject)
	.bind(ticket.subject_norm)
	.bind(ticket.requester_email)
	.bind(ticket.requester_name)
	.bind(ticket.first_message_at)
	.bind(ticket.stitch_reason)
	.bind(ticket.stitch_confidence)
	.fetch_one(executor)
	.await?;

	Ok(ticket_id)
}

pub async fn fetch<'e, E>(
	executor: E,
	organization_id: Uuid,
	ticket_id: Uuid,
) -> Result<Option<Ticket>>
where
	E: PgExecutor<'e>,
{
	let ticket = sqlx::query_as::<_, Ticket>(&format!(
		"SELECT {TICKET_COLUMNS} FROM tickets WHERE organization_id = $1 AND ticket_id = $2"
	))
	.bind(organization_id)
	.bind(ticket_id)
	.fetch_optional(executor)
	.await?;

	Ok(ticket)
}

pub async fn fetch_for_update(
	tx: &mut Transaction<'_, Postgres>,
	organization_id: Uuid,
	ticket_id: Uuid,
) -> Result<Option<Ticket>> {
	let ticket = sqlx::query_as::<_, Ticket>(&format!(
		"\
SELECT {TICKET_COLUMNS}
FROM tickets
WHERE organization_id = $1
	AND ticket_id = $2
FOR UPDATE"
	))
	.bind(organization_id)
	.bind(ticket_id)
	.fetch_optional(&mut **tx)
	.await?;

	Ok(ticket)
}

pub async fn exists<'e, E>(executor: E, organization_id: Uuid, ticket_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let row: Option<(Uuid,)> =
		sqlx::query_as("SELECT ticket_id FROM tickets WHERE organization_id = $1 AND ticket_id = $2")
			.bind(organization_id)
			.bind(ticket_id)
			.fetch_optional(executor)
			.await?;

	Ok(row.is_some())
}

pub async fn find_by_code<'e, E>(
	executor: E,
	organization_id: Uuid,
	ticket_code: &str,
) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	let row: Option<(Uuid,)> = sqlx::query_as(
		"SELECT ticket_id FROM tickets WHERE organization_id = $1 AND ticket_code = $2",
	)
	.bind(organization_id)
	.bind(ticket_code)
	.fetch_optional(executor)
	.await?;

	Ok(row.map(|(ticket_id,)| ticket_id))
}

/// The `subject_match` fallback: an open ticket with the same normalized
/// subject and requester, active inside the window.
pub async fn find_subject_match<'e, E>(
	executor: E,
	organization_id: Uuid,
	subject_norm: &str,
	requester_email: &str,
	window_days: i64,
) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	let row: Option<(Uuid,)> = sqlx::query_as(
		"\
SELECT ticket_id
FROM tickets
WHERE organization_id = $1
	AND requester_email = $2
	AND subject_norm = $3
	AND status IN ('new', 'open', 'pending')
	AND last_activity_at >= now() - make_interval(days => $4)
ORDER BY last_activity_at DESC
LIMIT 1",
	)
	.bind(organization_id)
	.bind(requester_email)
	.bind(subject_norm)
	.bind(window_days as i32)
	.fetch_optional(executor)
	.await?;

	Ok(row.map(|(ticket_id,)| ticket_id))
}

/// Bumps message/activity timestamps when an inbound occurrence stitches in.
pub async fn record_message_activity<'e, E>(
	executor: E,
	organization_id: Uuid,
	ticket_id: Uuid,
	message_at: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE tickets
SET last_message_at = GREATEST(COALESCE(last_message_at, $3), $3),
	last_activity_at = GREATEST(COALESCE(last_activity_at, $3), $3),
	first_message_at = LEAST(COALESCE(first_message_at, $3), $3),
	updated_at = now()
WHERE organization_id = $1
	AND ticket_id = $2",
	)
	.bind(organization_id)
	.bind(ticket_id)
	.bind(message_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn assign_user<'e, E>(
	executor: E,
	organization_id: Uuid,
	ticket_id: Uuid,
	user_id: Uuid,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE tickets
SET assignee_user_id = $3,
	assignee_queue_id = NULL,
	updated_at = now(),
	last_activity_at = now()
WHERE organization_id = $1
	AND ticket_id = $2",
	)
	.bind(organization_id)
	.bind(ticket_id)
	.bind(user_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn assign_queue<'e, E>(
	executor: E,
	organization_id: Uuid,
	ticket_id: Uuid,
	queue_id: Uuid,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE tickets
SET assignee_queue_id = $3,
	assignee_user_id = NULL,
	updated_at = now(),
	last_activity_at = now()
WHERE organization_id = $1
	AND ticket_id = $2",
	)
	.bind(organization_id)
	.bind(ticket_id)
	.bind(queue_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn set_status<'e, E>(
	executor: E,
	organization_id: Uuid,
	ticket_id: Uuid,
	status: &str,
	closed: bool,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE tickets
SET status = $3,
	closed_at = CASE WHEN $4 THEN now() ELSE closed_at END,
	updated_at = now(),
	last_activity_at = now()
WHERE organization_id = $1
	AND ticket_id = $2",
	)
	.bind(organization_id)
	.bind(ticket_id)
	.bind(status)
	.bind(closed)
	.execute(executor)
	.await?;

	Ok(())
}

/// The routing `drop` action; FKs null out occurrence and canonical links.
pub async fn delete_ticket<'e, E>(executor: E, organization_id: Uuid, ticket_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("DELETE FROM tickets WHERE organization_id = $1 AND ticket_id = $2")
		.bind(organization_id)
		.bind(ticket_id)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn insert_ticket_event<'e, E>(
	executor: E,
	organization_id: Uuid,
	ticket_id: Uuid,
	event_type: &str,
	event_data: &Value,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO ticket_events (organization_id, ticket_id, actor_user_id, event_type, event_data)
VALUES ($1, $2, NULL, $3, $4)",
	)
	.bind(organization_id)
	.bind(ticket_id)
	.bind(event_type)
	.bind(event_data)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn list_events<'e, E>(
	executor: E,
	organization_id: Uuid,
	ticket_id: Uuid,
) -> Result<Vec<crate::models::TicketEvent>>
where
	E: PgExecutor<'e>,
{
	let events = sqlx::query_as::<_, crate::models::TicketEvent>(
		"\
SELECT ticket_event_id, organization_id, ticket_id, actor_user_id, event_type, event_data, created_at
FROM ticket_events
WHERE organization_id = $1
	AND ticket_id = $2
ORDER BY created_at ASC, ticket_event_id ASC",
	)
	.bind(organization_id)
	.bind(ticket_id)
	.fetch_all(executor)
	.await?;

	Ok(events)
}

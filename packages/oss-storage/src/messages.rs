use serde_json::Value;
use sqlx::{PgExecutor, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::CanonicalMessage};

const MESSAGE_COLUMNS: &str = "\
canonical_message_id, organization_id, direction, fingerprint_v1, body_hash, collision_group_id, \
rfc_message_id, x_oss_ticket_id, x_oss_message_id, subject, subject_norm, from_email, from_name, \
reply_to_emails, to_emails, cc_emails, date_header, in_reply_to, references_ids, headers, \
body_text, body_html_sanitized, snippet, has_attachments, attachment_count, parser_version, \
sanitizer_revision, ticket_id, created_at, first_seen_at";

#[derive(Debug)]
pub struct NewCanonicalMessage<'a> {
	pub organization_id: Uuid,
	pub direction: &'a str,
	pub fingerprint_v1: &'a [u8],
	pub body_hash: &'a [u8],
	pub rfc_message_id: Option<&'a str>,
	pub x_oss_ticket_id: Option<Uuid>,
	pub x_oss_message_id: Option<Uuid>,
	pub subject: Option<&'a str>,
	pub subject_norm: Option<&'a str>,
	pub from_email: Option<&'a str>,
	pub from_name: Option<&'a str>,
	pub reply_to_emails: &'a [String],
	pub to_emails: &'a [String],
	pub cc_emails: &'a [String],
	pub date_header: Option<OffsetDateTime>,
	pub in_reply_to: Option<&'a str>,
	pub references_ids: &'a [String],
	pub headers: &'a Value,
	pub body_text: Option<&'a str>,
	pub body_html_sanitized: Option<&'a str>,
	pub snippet: Option<&'a str>,
	pub attachment_count: i32,
	pub parser_version: i32,
	pub sanitizer_revision: &'a str,
}

/// Insert-or-reuse on `(organization_id, fingerprint_v1, body_hash)`. Losing
/// the unique-insert race degrades to a read, which is the exactly-once
/// canonical identity guarantee.
pub async fn upsert_canonical(
	tx: &mut Transaction<'_, Postgres>,
	message: NewCanonicalMessage<'_>,
) -> Result<(Uuid, bool)> {
	let inserted: Option<(Uuid,)> = sqlx::query_as(
		"\
INSERT INTO canonical_messages (
	organization_id,
	direction,
	fingerprint_v1,
	body_hash,
	rfc_message_id,
	x_oss_ticket_id,
	x_oss_message_id,
	subject,
	subject_norm,
	from_email,
	from_name,
	reply_to_emails,
	to_emails,
	cc_emails,
	date_header,
	in_reply_to,
	references_ids,
	headers,
	body_text,
	body_html_sanitized,
	snippet,
	has_attachments,
	attachment_count,
	parser_version,
	sanitizer_revision
)
VALUES (
	$1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
	$21, $22, $23, $24, $25
)
ON CONFLICT (organization_id, fingerprint_v1, body_hash) DO NOTHING
RETURNING canonical_message_id",
	)
	.bind(message.organization_id)
	.bind(message.direction)
	.bind(message.fingerprint_v1)
	.bind(message.body_hash)
	.bind(message.rfc_message_id)
	.bind(message.x_oss_ticket_id)
	.bind(message.x_oss_message_id)
	.bind(message.subject)
	.bind(message.subject_norm)
	.bind(message.from_email)
	.bind(message.from_name)
	.bind(message.reply_to_emails)
	.bind(message.to_emails)
	.bind(message.cc_emails)
	.bind(message.date_header)
	.bind(message.in_reply_to)
	.bind(message.references_ids)
	.bind(message.headers)
	.bind(message.body_text)
	.bind(message.body_html_sanitized)
	.bind(message.snippet)
	.bind(message.attachment_count > 0)
	.bind(message.attachment_count)
	.bind(message.parser_version)
	.bind(message.sanitizer_revision)
	.fetch_optional(&mut **tx)
	.await?;

	if let Some((canonical_message_id,)) = inserted {
		return Ok((canonical_message_id, true));
	}

	let (canonical_message_id,): (Uuid,) = sqlx::query_as(
		"\
SELECT canonical_message_id
FROM canonical_messages
WHERE organization_id = $1
	AND fingerprint_v1 = $2
	AND body_hash = $3",
	)
	.bind(message.organization_id)
	.bind(message.fingerprint_v1)
	.bind(message.body_hash)
	.fetch_one(&mut **tx)
	.await?;

	Ok((canonical_message_id, false))
}

pub async fn fetch<'e, E>(
	executor: E,
	organization_id: Uuid,
	canonical_message_id: Uuid,
) -> Result<Option<CanonicalMessage>>
where
	E: PgExecutor<'e>,
{
	let message = sqlx::query_as::<_, CanonicalMessage>(&format!(
		"\
SELECT {MESSAGE_COLUMNS}
FROM canonical_messages
WHERE organization_id = $1
	AND canonical_message_id = $2"
	))
	.bind(organization_id)
	.bind(canonical_message_id)
	.fetch_optional(executor)
	.await?;

	Ok(message)
}

pub async fn find_by_fingerprint<'e, E>(
	executor: E,
	organization_id: Uuid,
	fingerprint_v1: &[u8],
) -> Result<Vec<CanonicalMessage>>
where
	E: PgExecutor<'e>,
{
	let messages = sqlx::query_as::<_, CanonicalMessage>(&format!(
		"\
SELECT {MESSAGE_COLUMNS}
FROM canonical_messages
WHERE organization_id = $1
	AND fingerprint_v1 = $2
ORDER BY first_seen_at ASC, canonical_message_id ASC"
	))
	.bind(organization_id)
	.bind(fingerprint_v1)
	.fetch_all(executor)
	.await?;

	Ok(messages)
}

/// Threading lookup: a canonical message carrying this RFC id that already
/// belongs to a ticket.
pub async fn find_ticket_by_rfc_id<'e, E>(
	executor: E,
	organization_id: Uuid,
	rfc_message_id: &str,
) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	let row: Option<(Option<Uuid>,)> = sqlx::query_as(
		"\
SELECT ticket_id
FROM canonical_messages
WHERE organization_id = $1
	AND rfc_message_id = $2
	AND ticket_id IS NOT NULL
ORDER BY first_seen_at ASC
LIMIT 1",
	)
	.bind(organization_id)
	.bind(rfc_message_id)
	.fetch_optional(executor)
	.await?;

	Ok(row.and_then(|(ticket_id,)| ticket_id))
}

pub async fn set_ticket<'e, E>(
	executor: E,
	organization_id: Uuid,
	canonical_message_id: Uuid,
	ticket_id: Uuid,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE canonical_messages
SET ticket_id = $3
WHERE organization_id = $1
	AND canonical_message_id = $2",
	)
	.bind(organization_id)
	.bind(canonical_message_id)
	.bind(ticket_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn create_collision_group<'e, E>(executor: E, organization_id: Uuid) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let (collision_group_id,): (Uuid,) = sqlx::query_as(
		"INSERT INTO collision_groups (organization_id) VALUES ($1) RETURNING collision_group_id",
	)
	.bind(organization_id)
	.fetch_one(executor)
	.await?;

	Ok(collision_group_id)
}

/// Attaches the group to every canonical row of the fingerprint that does not
/// carry one yet; returns how many rows changed.
pub async fn set_collision_group_where_absent<'e, E>(
	executor: E,
	organization_id: Uuid,
	fingerprint_v1: &[u8],
	collision_group_id: Uuid,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE canonical_messages
SET collision_group_id = $3
WHERE organization_id = $1
	AND fingerprint_v1 = $2
	AND collision_group_id IS NULL",
	)
	.bind(organization_id)
	.bind(fingerprint_v1)
	.bind(collision_group_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

/// Fingerprints with more than one canonical row; input to the collision
/// backfill.
pub async fn list_colliding_fingerprints<'e, E>(
	executor: E,
	organization_id: Uuid,
) -> Result<Vec<Vec<u8>>>
where
	E: PgExecutor<'e>,
{
	let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
		"\
SELECT fingerprint_v1
FROM canonical_messages
WHERE organization_id = $1
GROUP BY fingerprint_v1
HAVING COUNT(*) > 1",
	)
	.bind(organization_id)
	.fetch_all(executor)
	.await?;

	Ok(rows.into_iter().map(|(fingerprint,)| fingerprint).collect())
}

#[derive(Debug, sqlx::FromRow)]
pub struct CollisionGroupSummary {
	pub collision_group_id: Uuid,
	pub message_count: i64,
	pub first_seen_at: OffsetDateTime,
	pub last_seen_at: OffsetDateTime,
	pub sample_message_ids: Vec<Uuid>,
}

pub async fn list_collision_groups<'e, E>(
	executor: E,
	organization_id: Uuid,
	limit: i64,
) -> Result<Vec<CollisionGroupSummary>>
where
	E: PgExecutor<'e>,
{
	let groups = sqlx::query_as::<_, CollisionGroupSummary>(
		"\
SELECT
	collision_group_id,
	COUNT(*) AS message_count,
	MIN(first_seen_at) AS first_seen_at,
	MAX(first_seen_at) AS last_seen_at,
	COALESCE(
		(ARRAY_AGG(canonical_message_id ORDER BY first_seen_at ASC, canonical_message_id ASC))[1:3],
		ARRAY[]::uuid[]
	) AS sample_message_ids
FROM canonical_messages
WHERE organization_id = $1
	AND collision_group_id IS NOT NULL
GROUP BY collision_group_id
ORDER BY MAX(first_seen_at) DESC, collision_group_id ASC
LIMIT $2",
	)
	.bind(organization_id)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(groups)
}

#[derive(Debug)]
pub struct NewAttachment<'a> {
	pub organization_id: Uuid,
	pub canonical_message_id: Uuid,
	pub content_hash: &'a str,
	pub filename: Option<&'a str>,
	pub content_type: Option<&'a str>,
	pub size_bytes: i64,
	pub is_inline: bool,
	pub content_id: Option<&'a str>,
}

pub async fn insert_attachment<'e, E>(executor: E, attachment: NewAttachment<'_>) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO message_attachments (
	organization_id,
	canonical_message_id,
	content_hash,
	filename,
	content_type,
	size_bytes,
	is_inline,
	content_id
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (canonical_message_id, content_hash) DO NOTHING",
	)
	.bind(attachment.organization_id)
	.bind(attachment.canonical_message_id)
	.bind(attachment.content_hash)
	.bind(attachment.filename)
	.bind(attachment.content_type)
	.bind(attachment.size_bytes)
	.bind(attachment.is_inline)
	.bind(attachment.content_id)
	.execute(executor)
	.await?;

	Ok(())
}

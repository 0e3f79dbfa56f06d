use serde_json::Value;
use sqlx::{PgExecutor, Postgres, Transaction};
use uuid::Uuid;

use crate::{Result, models::MessageOccurrence};

const OCCURRENCE_COLUMNS: &str = "\
occurrence_id, organization_id, mailbox_id, provider_message_id, state, raw_content_hash, \
raw_size_bytes, fetched_at, fetch_error, canonical_message_id, parsed_at, parse_error, ticket_id, \
stitched_at, stitch_error, routed_at, route_error, original_recipient, recipient_source, \
recipient_confidence, recipient_evidence, created_at, updated_at";

/// Upserts on `(mailbox_id, provider_message_id)`; the bool reports whether a
/// new occurrence was discovered.
pub async fn upsert_discovered(
	tx: &mut Transaction<'_, Postgres>,
	organization_id: Uuid,
	mailbox_id: Uuid,
	provider_message_id: &str,
) -> Result<(Uuid, bool)> {
	let inserted: Option<(Uuid,)> = sqlx::query_as(
		"\
INSERT INTO message_occurrences (organization_id, mailbox_id, provider_message_id, state)
VALUES ($1, $2, $3, 'discovered')
ON CONFLICT (mailbox_id, provider_message_id) DO NOTHING
RETURNING occurrence_id",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(provider_message_id)
	.fetch_optional(&mut **tx)
	.await?;

	if let Some((occurrence_id,)) = inserted {
		return Ok((occurrence_id, true));
	}

	let (occurrence_id,): (Uuid,) = sqlx::query_as(
		"\
SELECT occurrence_id
FROM message_occurrences
WHERE mailbox_id = $1
	AND provider_message_id = $2",
	)
	.bind(mailbox_id)
	.bind(provider_message_id)
	.fetch_one(&mut **tx)
	.await?;

	Ok((occurrence_id, false))
}

pub async fn fetch_for_update(
	tx: &mut Transaction<'_, Postgres>,
	organization_id: Uuid,
	occurrence_id: Uuid,
) -> Result<Option<MessageOccurrence>> {
	let occurrence = sqlx::query_as::<_, MessageOccurrence>(&format!(
		"\
SELECT {OCCURRENCE_COLUMNS}
FROM message_occurrences
WHERE organization_id = $1
	AND occurrence_id = $2
FOR UPDATE"
	))
	.bind(organization_id)
	.bind(occurrence_id)
	.fetch_optional(&mut **tx)
	.await?;

	Ok(occurrence)
}

pub async fn mark_fetched<'e, E>(
	executor: E,
	occurrence_id: Uuid,
	raw_content_hash: &str,
	raw_size_bytes: i64,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE message_occurrences
SET raw_content_hash = $2,
	raw_size_bytes = $3,
	fetched_at = now(),
	fetch_error = NULL,
	state = 'fetched',
	updated_at = now()
WHERE occurrence_id = $1",
	)
	.bind(occurrence_id)
	.bind(raw_content_hash)
	.bind(raw_size_bytes)
	.execute(executor)
	.await?;

	Ok(())
}

#[derive(Debug)]
pub struct ParsedUpdate<'a> {
	pub canonical_message_id: Uuid,
	pub original_recipient: Option<&'a str>,
	pub recipient_source: &'a str,
	pub recipient_confidence: &'a str,
	pub recipient_evidence: &'a Value,
}

pub async fn mark_parsed<'e, E>(
	executor: E,
	occurrence_id: Uuid,
	update: ParsedUpdate<'_>,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE message_occurrences
SET canonical_message_id = $2,
	parsed_at = now(),
	parse_error = NULL,
	original_recipient = $3,
	recipient_source = $4,
	recipient_confidence = $5,
	recipient_evidence = $6,
	state = 'parsed',
	updated_at = now()
WHERE occurrence_id = $1",
	)
	.bind(occurrence_id)
	.bind(update.canonical_message_id)
	.bind(update.original_recipient)
	.bind(update.recipient_source)
	.bind(update.recipient_confidence)
	.bind(update.recipient_evidence)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn mark_stitched<'e, E>(executor: E, occurrence_id: Uuid, ticket_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE message_occurrences
SET ticket_id = $2,
	stitched_at = now(),
	stitch_error = NULL,
	state = 'stitched',
	updated_at = now()
WHERE occurrence_id = $1",
	)
	.bind(occurrence_id)
	.bind(ticket_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn mark_routed<'e, E>(executor: E, occurrence_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE message_occurrences
SET routed_at = now(),
	route_error = NULL,
	state = 'routed',
	updated_at = now()
WHERE occurrence_id = $1",
	)
	.bind(occurrence_id)
	.execute(executor)
	.await?;

	Ok(())
}

/// Routing failed closed (e.g. a rule pointing at a missing queue): the
/// occurrence still leaves the pipeline, with the cause on `route_error`.
pub async fn mark_routed_with_error<'e, E>(
	executor: E,
	occurrence_id: Uuid,
	error: &str,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE message_occurrences
SET routed_at = now(),
	route_error = $2,
	state = 'routed',
	updated_at = now()
WHERE occurrence_id = $1",
	)
	.bind(occurrence_id)
	.bind(error)
	.execute(executor)
	.await?;

	Ok(())
}

/// Each stage records its failure on its own column before the job fails.
pub async fn mark_stage_failed<'e, E>(
	executor: E,
	occurrence_id: Uuid,
	error_column: StageErrorColumn,
	error: &str,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(&format!(
		"\
UPDATE message_occurrences
SET state = 'failed',
	{} = $2,
	updated_at = now()
WHERE occurrence_id = $1",
		error_column.column()
	))
	.bind(occurrence_id)
	.bind(error)
	.execute(executor)
	.await?;

	Ok(())
}

#[derive(Clone, Copy, Debug)]
pub enum StageErrorColumn {
	Fetch,
	Parse,
	Stitch,
	Route,
}
impl StageErrorColumn {
	fn column(&self) -> &'static str {
		match self {
			Self::Fetch => "fetch_error",
			Self::Parse => "parse_error",
			Self::Stitch => "stitch_error",
			Self::Route => "route_error",
		}
	}
}

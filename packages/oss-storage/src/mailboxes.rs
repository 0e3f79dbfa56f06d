use sqlx::{PgExecutor, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::Mailbox};

const MAILBOX_COLUMNS: &str = "\
mailbox_id, organization_id, purpose, provider, email_address, display_name, is_enabled, \
auth_degraded, credential_subject, encrypted_refresh_token, encrypted_access_token, \
access_token_expires_at, history_cursor, last_full_sync_at, last_incremental_sync_at, \
last_sync_error, consecutive_sync_failures, paused_until, pause_reason, created_at, updated_at";

#[derive(Debug)]
pub struct NewMailbox<'a> {
	pub organization_id: Uuid,
	pub purpose: &'a str,
	pub provider: &'a str,
	pub email_address: &'a str,
	pub display_name: Option<&'a str>,
	pub credential_subject: &'a str,
	pub encrypted_refresh_token: &'a [u8],
}

pub async fn insert_mailbox<'e, E>(executor: E, mailbox: NewMailbox<'_>) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let (mailbox_id,): (Uuid,) = sqlx::query_as(
		"\
INSERT INTO mailboxes (
	organization_id,
	purpose,
	provider,
	email_address,
	display_name,
	credential_subject,
	encrypted_refresh_token
)
VALUES ($1, $2, $3, $4, $5, $6, $7)
RETURNING mailbox_id",
	)
	.bind(mailbox.organization_id)
	.bind(mailbox.purpose)
	.bind(mailbox.provider)
	.bind(mailbox.email_address)
	.bind(mailbox.display_name)
	.bind(mailbox.credential_subject)
	.bind(mailbox.encrypted_refresh_token)
	.fetch_one(executor)
	.await?;

	Ok(mailbox_id)
}

pub async fn fetch<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
) -> Result<Option<Mailbox>>
where
	E: PgExecutor<'e>,
{
	let mailbox = sqlx::query_as::<_, Mailbox>(&format!(
		"SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE organization_id = $1 AND mailbox_id = $2"
	))
	.bind(organization_id)
	.bind(mailbox_id)
	.fetch_optional(executor)
	.await?;

	Ok(mailbox)
}

pub async fn fetch_for_update(
	tx: &mut Transaction<'_, Postgres>,
	organization_id: Uuid,
	mailbox_id: Uuid,
) -> Result<Option<Mailbox>> {
	let mailbox = sqlx::query_as::<_, Mailbox>(&format!(
		"\
SELECT {MAILBOX_COLUMNS}
FROM mailboxes
WHERE organization_id = $1
	AND mailbox_id = $2
FOR UPDATE"
	))
	.bind(organization_id)
	.bind(mailbox_id)
	.fetch_optional(&mut **tx)
	.await?;

	Ok(mailbox)
}

pub async fn list<'e, E>(executor: E, organization_id: Uuid) -> Result<Vec<Mailbox>>
where
	E: PgExecutor<'e>,
{
	let mailboxes = sqlx::query_as::<_, Mailbox>(&format!(
		"\
SELECT {MAILBOX_COLUMNS}
FROM mailboxes
WHERE organization_id = $1
ORDER BY updated_at DESC, mailbox_id DESC"
	))
	.bind(organization_id)
	.fetch_all(executor)
	.await?;

	Ok(mailboxes)
}

pub async fn record_backfill_success<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	history_cursor: Option<&str>,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE mailboxes
SET last_full_sync_at = $3,
	history_cursor = COALESCE($4, history_cursor),
	last_sync_error = NULL,
	consecutive_sync_failures = 0,
	updated_at = now()
WHERE organization_id = $1
	AND mailbox_id = $2",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(now)
	.bind(history_cursor)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn record_history_success<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	history_cursor: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE mailboxes
SET last_incremental_sync_at = $3,
	history_cursor = $4,
	last_sync_error = NULL,
	consecutive_sync_failures = 0,
	updated_at = now()
WHERE organization_id = $1
	AND mailbox_id = $2",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(now)
	.bind(history_cursor)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn record_sync_error<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	error: &str,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE mailboxes
SET last_sync_error = $3,
	updated_at = now()
WHERE organization_id = $1
	AND mailbox_id = $2",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(error)
	.execute(executor)
	.await?;

	Ok(())
}

/// Bumps the consecutive-failure counter and returns the new value; the
/// caller decides whether the breaker trips.
pub async fn increment_sync_failures<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	error: &str,
) -> Result<i32>
where
	E: PgExecutor<'e>,
{
	let (failures,): (i32,) = sqlx::query_as(
		"\
UPDATE mailboxes
SET consecutive_sync_failures = consecutive_sync_failures + 1,
	last_sync_error = $3,
	updated_at = now()
WHERE organization_id = $1
	AND mailbox_id = $2
RETURNING consecutive_sync_failures",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(error)
	.fetch_one(executor)
	.await?;

	Ok(failures)
}

pub async fn pause<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	until: OffsetDateTime,
	reason: &str,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE mailboxes
SET paused_until = $3,
	pause_reason = $4,
	updated_at = now()
WHERE organization_id = $1
	AND mailbox_id = $2",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(until)
	.bind(reason)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn resume<'e, E>(executor: E, organization_id: Uuid, mailbox_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE mailboxes
SET paused_until = NULL,
	pause_reason = NULL,
	consecutive_sync_failures = 0,
	updated_at = now()
WHERE organization_id = $1
	AND mailbox_id = $2",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn set_auth_degraded<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	degraded: bool,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE mailboxes
SET auth_degraded = $3,
	updated_at = now()
WHERE organization_id = $1
	AND mailbox_id = $2",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(degraded)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn update_access_token<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	encrypted_access_token: &[u8],
	expires_at: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE mailboxes
SET encrypted_access_token = $3,
	access_token_expires_at = $4,
	auth_degraded = false,
	updated_at = now()
WHERE organization_id = $1
	AND mailbox_id = $2",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(encrypted_access_token)
	.bind(expires_at)
	.execute(executor)
	.await?;

	Ok(())
}

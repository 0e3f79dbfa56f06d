use serde_json::Value;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::Result;

pub async fn insert_sync_event<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	event_type: &str,
	detail: &Value,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO mailbox_sync_events (organization_id, mailbox_id, event_type, detail)
VALUES ($1, $2, $3, $4)",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(event_type)
	.bind(detail)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn count_events<'e, E>(
	executor: E,
	organization_id: Uuid,
	mailbox_id: Uuid,
	event_type: &str,
) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let (count,): (i64,) = sqlx::query_as(
		"\
SELECT COUNT(*)
FROM mailbox_sync_events
WHERE organization_id = $1
	AND mailbox_id = $2
	AND event_type = $3",
	)
	.bind(organization_id)
	.bind(mailbox_id)
	.bind(event_type)
	.fetch_one(executor)
	.await?;

	Ok(count)
}

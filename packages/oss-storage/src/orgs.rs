use sqlx::PgExecutor;
use uuid::Uuid;

use crate::Result;

pub async fn insert_organization<'e, E>(executor: E, name: &str, domains: &[String]) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let (organization_id,): (Uuid,) =
		sqlx::query_as("INSERT INTO organizations (name, domains) VALUES ($1, $2) RETURNING organization_id")
			.bind(name)
			.bind(domains)
			.fetch_one(executor)
			.await?;

	Ok(organization_id)
}

pub async fn fetch_domains<'e, E>(executor: E, organization_id: Uuid) -> Result<Vec<String>>
where
	E: PgExecutor<'e>,
{
	let row: Option<(Vec<String>,)> =
		sqlx::query_as("SELECT domains FROM organizations WHERE organization_id = $1")
			.bind(organization_id)
			.fetch_optional(executor)
			.await?;

	Ok(row.map(|(domains,)| domains).unwrap_or_default())
}

pub async fn insert_user<'e, E>(
	executor: E,
	organization_id: Uuid,
	email: &str,
	display_name: Option<&str>,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let (user_id,): (Uuid,) = sqlx::query_as(
		"\
INSERT INTO users (organization_id, email, display_name)
VALUES ($1, $2, $3)
RETURNING user_id",
	)
	.bind(organization_id)
	.bind(email)
	.bind(display_name)
	.fetch_one(executor)
	.await?;

	Ok(user_id)
}

pub async fn insert_queue<'e, E>(executor: E, organization_id: Uuid, name: &str) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let (queue_id,): (Uuid,) = sqlx::query_as(
		"INSERT INTO queues (organization_id, name) VALUES ($1, $2) RETURNING queue_id",
	)
	.bind(organization_id)
	.bind(name)
	.fetch_one(executor)
	.await?;

	Ok(queue_id)
}

pub async fn queue_exists<'e, E>(executor: E, organization_id: Uuid, queue_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let row: Option<(Uuid,)> =
		sqlx::query_as("SELECT queue_id FROM queues WHERE organization_id = $1 AND queue_id = $2")
			.bind(organization_id)
			.bind(queue_id)
			.fetch_optional(executor)
			.await?;

	Ok(row.is_some())
}

pub async fn user_exists<'e, E>(executor: E, organization_id: Uuid, user_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let row: Option<(Uuid,)> =
		sqlx::query_as("SELECT user_id FROM users WHERE organization_id = $1 AND user_id = $2")
			.bind(organization_id)
			.bind(user_id)
			.fetch_optional(executor)
			.await?;

	Ok(row.is_some())
}

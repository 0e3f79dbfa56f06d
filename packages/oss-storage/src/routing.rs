use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{Result, models::RoutingRule};

const RULE_COLUMNS: &str = "\
routing_rule_id, organization_id, name, is_enabled, priority, match_recipient_pattern, \
match_sender_domain_pattern, match_sender_email_pattern, match_direction, \
action_assign_queue_id, action_assign_user_id, action_set_status, action_drop, \
action_auto_close, created_at, updated_at";

pub async fn list_enabled_allowlist_patterns<'e, E>(
	executor: E,
	organization_id: Uuid,
) -> Result<Vec<String>>
where
	E: PgExecutor<'e>,
{
	let rows: Vec<(String,)> = sqlx::query_as(
		"\
SELECT pattern
FROM recipient_allowlist
WHERE organization_id = $1
	AND is_enabled = true
ORDER BY created_at ASC, allowlist_entry_id ASC",
	)
	.bind(organization_id)
	.fetch_all(executor)
	.await?;

	Ok(rows.into_iter().map(|(pattern,)| pattern).collect())
}

/// Enabled rules in evaluation order; ties on priority break by id so the
/// outcome is deterministic.
pub async fn list_enabled_rules<'e, E>(
	executor: E,
	organization_id: Uuid,
) -> Result<Vec<RoutingRule>>
where
	E: PgExecutor<'e>,
{
	let rules = sqlx::query_as::<_, RoutingRule>(&format!(
		"\
SELECT {RULE_COLUMNS}
FROM routing_rules
WHERE organization_id = $1
	AND is_enabled = true
ORDER BY priority ASC, routing_rule_id ASC"
	))
	.bind(organization_id)
	.fetch_all(executor)
	.await?;

	Ok(rules)
}

pub async fn insert_allowlist_entry<'e, E>(
	executor: E,
	organization_id: Uuid,
	pattern: &str,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let (allowlist_entry_id,): (Uuid,) = sqlx::query_as(
		"\
INSERT INTO recipient_allowlist (organization_id, pattern)
VALUES ($1, $2)
RETURNING allowlist_entry_id",
	)
	.bind(organization_id)
	.bind(pattern)
	.fetch_one(executor)
	.await?;

	Ok(allowlist_entry_id)
}

#[derive(Debug, Default)]
pub struct NewRoutingRule<'a> {
	pub name: &'a str,
	pub priority: i32,
	pub match_recipient_pattern: Option<&'a str>,
	pub match_sender_domain_pattern: Option<&'a str>,
	pub match_sender_email_pattern: Option<&'a str>,
	pub match_direction: Option<&'a str>,
	pub action_assign_queue_id: Option<Uuid>,
	pub action_assign_user_id: Option<Uuid>,
	pub action_set_status: Option<&'a str>,
	pub action_drop: bool,
	pub action_auto_close: bool,
}

pub async fn insert_rule<'e, E>(
	executor: E,
	organization_id: Uuid,
	rule: NewRoutingRule<'_>,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let (routing_rule_id,): (Uuid,) = sqlx::query_as(
		"\
INSERT INTO routing_rules (
	organization_id,
	name,
	priority,
	match_recipient_pattern,
	match_sender_domain_pattern,
	match_sender_email_pattern,
	match_direction,
	action_assign_queue_id,
	action_assign_user_id,
	action_set_status,
	action_drop,
	action_auto_close
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
RETURNING routing_rule_id",
	)
	.bind(organization_id)
	.bind(rule.name)
	.bind(rule.priority)
	.bind(rule.match_recipient_pattern)
	.bind(rule.match_sender_domain_pattern)
	.bind(rule.match_sender_email_pattern)
	.bind(rule.match_direction)
	.bind(rule.action_assign_queue_id)
	.bind(rule.action_assign_user_id)
	.bind(rule.action_set_status)
	.bind(rule.action_drop)
	.bind(rule.action_auto_close)
	.fetch_one(executor)
	.await?;

	Ok(routing_rule_id)
}

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct Mailbox {
	pub mailbox_id: Uuid,
	pub organization_id: Uuid,
	pub purpose: String,
	pub provider: String,
	pub email_address: String,
	pub display_name: Option<String>,
	pub is_enabled: bool,
	pub auth_degraded: bool,
	pub credential_subject: String,
	pub encrypted_refresh_token: Vec<u8>,
	pub encrypted_access_token: Option<Vec<u8>>,
	pub access_token_expires_at: Option<OffsetDateTime>,
	pub history_cursor: Option<String>,
	pub last_full_sync_at: Option<OffsetDateTime>,
	pub last_incremental_sync_at: Option<OffsetDateTime>,
	pub last_sync_error: Option<String>,
	pub consecutive_sync_failures: i32,
	pub paused_until: Option<OffsetDateTime>,
	pub pause_reason: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl Mailbox {
	pub fn is_paused(&self, now: OffsetDateTime) -> bool {
		self.paused_until.map(|until| until > now).unwrap_or(false)
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct MessageOccurrence {
	pub occurrence_id: Uuid,
	pub organization_id: Uuid,
	pub mailbox_id: Uuid,
	pub provider_message_id: String,
	pub state: String,
	pub raw_content_hash: Option<String>,
	pub raw_size_bytes: Option<i64>,
	pub fetched_at: Option<OffsetDateTime>,
	pub fetch_error: Option<String>,
	pub canonical_message_id: Option<Uuid>,
	pub parsed_at: Option<OffsetDateTime>,
	pub parse_error: Option<String>,
	pub ticket_id: Option<Uuid>,
	pub stitched_at: Option<OffsetDateTime>,
	pub stitch_error: Option<String>,
	pub routed_at: Option<OffsetDateTime>,
	pub route_error: Option<String>,
	pub original_recipient: Option<String>,
	pub recipient_source: String,
	pub recipient_confidence: String,
	pub recipient_evidence: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct CanonicalMessage {
	pub canonical_message_id: Uuid,
	pub organization_id: Uuid,
	pub direction: String,
	pub fingerprint_v1: Vec<u8>,
	pub body_hash: Vec<u8>,
	pub collision_group_id: Option<Uuid>,
	pub rfc_message_id: Option<String>,
	pub x_oss_ticket_id: Option<Uuid>,
	pub x_oss_message_id: Option<Uuid>,
	pub subject: Option<String>,
	pub subject_norm: Option<String>,
	pub from_email: Option<String>,
	pub from_name: Option<String>,
	pub reply_to_emails: Vec<String>,
	pub to_emails: Vec<String>,
	pub cc_emails: Vec<String>,
	pub date_header: Option<OffsetDateTime>,
	pub in_reply_to: Option<String>,
	pub references_ids: Vec<String>,
	pub headers: Value,
	pub body_text: Option<String>,
	pub body_html_sanitized: Option<String>,
	pub snippet: Option<String>,
	pub has_attachments: bool,
	pub attachment_count: i32,
	pub parser_version: i32,
	pub sanitizer_revision: String,
	pub ticket_id: Option<Uuid>,
	pub created_at: OffsetDateTime,
	pub first_seen_at: OffsetDateTime,
}
impl CanonicalMessage {
	pub fn has_threading_headers(&self) -> bool {
		self.in_reply_to.is_some() || !self.references_ids.is_empty()
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct Ticket {
	pub ticket_id: Uuid,
	pub organization_id: Uuid,
	pub ticket_code: String,
	pub status: String,
	pub priority: String,
	pub subject: Option<String>,
	pub subject_norm: Option<String>,
	pub requester_email: Option<String>,
	pub requester_name: Option<String>,
	pub assignee_user_id: Option<Uuid>,
	pub assignee_queue_id: Option<Uuid>,
	pub stitch_reason: Option<String>,
	pub stitch_confidence: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub first_message_at: Option<OffsetDateTime>,
	pub last_message_at: Option<OffsetDateTime>,
	pub last_activity_at: Option<OffsetDateTime>,
	pub closed_at: Option<OffsetDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TicketEvent {
	pub ticket_event_id: Uuid,
	pub organization_id: Uuid,
	pub ticket_id: Uuid,
	pub actor_user_id: Option<Uuid>,
	pub event_type: String,
	pub event_data: Value,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RoutingRule {
	pub routing_rule_id: Uuid,
	pub organization_id: Uuid,
	pub name: String,
	pub is_enabled: bool,
	pub priority: i32,
	pub match_recipient_pattern: Option<String>,
	pub match_sender_domain_pattern: Option<String>,
	pub match_sender_email_pattern: Option<String>,
	pub match_direction: Option<String>,
	pub action_assign_queue_id: Option<Uuid>,
	pub action_assign_user_id: Option<Uuid>,
	pub action_set_status: Option<String>,
	pub action_drop: bool,
	pub action_auto_close: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct Job {
	pub job_id: Uuid,
	pub organization_id: Option<Uuid>,
	pub mailbox_id: Option<Uuid>,
	pub job_type: String,
	pub status: String,
	pub payload: Value,
	pub idempotency_key: Option<String>,
	pub attempts: i32,
	pub max_attempts: i32,
	pub run_at: OffsetDateTime,
	pub lock_owner: Option<String>,
	pub lock_expires_at: Option<OffsetDateTime>,
	pub last_error: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

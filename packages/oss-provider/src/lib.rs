pub mod fake;
pub mod gmail;
pub mod oauth;

mod error;

pub use error::{Error, Result};

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

/// A mailbox the provider acts on. The access token is already resolved;
/// OAuth acquisition ceremonies live outside the pipeline.
#[derive(Clone, Debug)]
pub struct MailboxRef {
	pub mailbox_id: Uuid,
	pub email_address: String,
	pub access_token: String,
}

#[derive(Clone, Debug)]
pub struct MessagePage {
	pub ids: Vec<String>,
	pub next_page_token: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryEventKind {
	MessageAdded,
	MessageDeleted,
}

#[derive(Clone, Debug)]
pub struct HistoryEvent {
	pub kind: HistoryEventKind,
	pub provider_message_id: String,
}

#[derive(Clone, Debug)]
pub struct HistoryDelta {
	pub events: Vec<HistoryEvent>,
	pub new_cursor: String,
}

#[derive(Clone, Debug)]
pub struct ProviderProfile {
	pub email_address: String,
	pub scopes: Vec<String>,
	pub history_cursor: Option<String>,
}

/// The provider contract consumed by the sync controller and the fetch
/// stage. Everything is retryable except `Error::InvalidCursor`.
#[async_trait]
pub trait MailProvider
where
	Self: Send + Sync,
{
	async fn list_messages(
		&self,
		mailbox: &MailboxRef,
		page_token: Option<&str>,
	) -> Result<MessagePage>;

	async fn history_delta(&self, mailbox: &MailboxRef, cursor: &str) -> Result<HistoryDelta>;

	async fn fetch_raw(&self, mailbox: &MailboxRef, provider_message_id: &str) -> Result<Bytes>;

	async fn profile(&self, mailbox: &MailboxRef) -> Result<ProviderProfile>;
}

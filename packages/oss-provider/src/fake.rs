use std::{
	collections::HashMap,
	sync::Mutex,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
	Error, HistoryDelta, HistoryEvent, HistoryEventKind, MailProvider, MailboxRef, MessagePage,
	ProviderProfile, Result,
};

#[derive(Clone)]
struct FakeMessage {
	id: String,
	raw: Bytes,
	deleted: bool,
}

#[derive(Default)]
struct FakeMailbox {
	/// Position in this vec is the history sequence (1-based).
	messages: Vec<FakeMessage>,
	cursor_invalid: bool,
	pending_history_failures: u32,
	pending_auth_failures: u32,
	history_calls: u32,
	list_calls: u32,
	fetch_calls: u32,
}

/// Deterministic in-memory provider for tests. History cursors are the
/// 1-based sequence numbers of `add_message` calls, encoded as strings.
#[derive(Default)]
pub struct FakeMailProvider {
	state: Mutex<HashMap<String, FakeMailbox>>,
}
impl FakeMailProvider {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_message(&self, email_address: &str, provider_message_id: &str, raw: impl Into<Bytes>) {
		let mut state = self.lock();
		let mailbox = state.entry(email_address.to_string()).or_default();

		mailbox.messages.push(FakeMessage {
			id: provider_message_id.to_string(),
			raw: raw.into(),
			deleted: false,
		});
	}

	pub fn delete_message(&self, email_address: &str, provider_message_id: &str) {
		let mut state = self.lock();
		let mailbox = state.entry(email_address.to_string()).or_default();

		for message in &mut mailbox.messages {
			if message.id == provider_message_id {
				message.deleted = true;
			}
		}
	}

	/// The next `history_delta` observes an expired cursor; cleared when a
	/// backfill refreshes the cursor through `profile`.
	pub fn invalidate_cursor(&self, email_address: &str) {
		self.lock().entry(email_address.to_string()).or_default().cursor_invalid = true;
	}

	/// The next `n` history calls fail with a transient error.
	pub fn fail_history(&self, email_address: &str, n: u32) {
		self.lock().entry(email_address.to_string()).or_default().pending_history_failures = n;
	}

	/// The next `n` history calls fail with an auth error.
	pub fn fail_auth(&self, email_address: &str, n: u32) {
		self.lock().entry(email_address.to_string()).or_default().pending_auth_failures = n;
	}

	pub fn history_call_count(&self, email_address: &str) -> u32 {
		self.lock().get(email_address).map(|mailbox| mailbox.history_calls).unwrap_or(0)
	}

	pub fn list_call_count(&self, email_address: &str) -> u32 {
		self.lock().get(email_address).map(|mailbox| mailbox.list_calls).unwrap_or(0)
	}

	pub fn fetch_call_count(&self, email_address: &str) -> u32 {
		self.lock().get(email_address).map(|mailbox| mailbox.fetch_calls).unwrap_or(0)
	}

	pub fn latest_cursor(&self, email_address: &str) -> String {
		self.lock().get(email_address).map(|mailbox| mailbox.messages.len()).unwrap_or(0).to_string()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FakeMailbox>> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[async_trait]
impl MailProvider for FakeMailProvider {
	async fn list_messages(
		&self,
		mailbox: &MailboxRef,
		page_token: Option<&str>,
	) -> Result<MessagePage> {
		let mut state = self.lock();
		let fake = state.entry(mailbox.email_address.clone()).or_default();

		fake.list_calls += 1;

		let _ = page_token;

		Ok(MessagePage {
			ids: fake
				.messages
				.iter()
				.filter(|message| !message.deleted)
				.map(|message| message.id.clone())
				.collect(),
			next_page_token: None,
		})
	}

	async fn history_delta(&self, mailbox: &MailboxRef, cursor: &str) -> Result<HistoryDelta> {
		let mut state = self.lock();
		let fake = state.entry(mailbox.email_address.clone()).or_default();

		fake.history_calls += 1;

		if fake.pending_auth_failures > 0 {
			fake.pending_auth_failures -= 1;

			return Err(Error::Auth("Fake provider rejected the credentials.".to_string()));
		}
		if fake.pending_history_failures > 0 {
			fake.pending_history_failures -= 1;

			return Err(Error::Transient("Fake provider is unavailable.".to_string()));
		}
		if fake.cursor_invalid {
			return Err(Error::InvalidCursor);
		}

		let since: usize = cursor.parse().map_err(|_| Error::InvalidCursor)?;

		if since > fake.messages.len() {
			return Err(Error::InvalidCursor);
		}

		let events = fake.messages[since..]
			.iter()
			.map(|message| HistoryEvent {
				kind: if message.deleted {
					HistoryEventKind::MessageDeleted
				} else {
					HistoryEventKind::MessageAdded
				},
				provider_message_id: message.id.clone(),
			})
			.collect();

		Ok(HistoryDelta { events, new_cursor: fake.messages.len().to_string() })
	}

	async fn fetch_raw(&self, mailbox: &MailboxRef, provider_message_id: &str) -> Result<Bytes> {
		let mut state = self.lock();
		let fake = state.entry(mailbox.email_address.clone()).or_default();

		fake.fetch_calls += 1;

		fake.messages
			.iter()
			.find(|message| message.id == provider_message_id)
			.map(|message| message.raw.clone())
			.ok_or_else(|| {
				Error::Transient(format!("Unknown provider message id {provider_message_id:?}."))
			})
	}

	async fn profile(&self, mailbox: &MailboxRef) -> Result<ProviderProfile> {
		let mut state = self.lock();
		let fake = state.entry(mailbox.email_address.clone()).or_default();

		fake.cursor_invalid = false;

		Ok(ProviderProfile {
			email_address: mailbox.email_address.clone(),
			scopes: vec!["https://mail.google.com/".to_string()],
			history_cursor: Some(fake.messages.len().to_string()),
		})
	}
}

#[cfg(test)]
mod tests {
	use uuid::Uuid;

	use super::*;

	fn mailbox() -> MailboxRef {
		MailboxRef {
			mailbox_id: Uuid::new_v4(),
			email_address: "journal@example.com".to_string(),
			access_token: "fake".to_string(),
		}
	}

	#[tokio::test]
	async fn history_replays_messages_after_the_cursor() {
		let provider = FakeMailProvider::new();
		let mailbox = mailbox();

		provider.add_message(&mailbox.email_address, "m1", Bytes::from_static(b"one"));
		provider.add_message(&mailbox.email_address, "m2", Bytes::from_static(b"two"));

		let delta = provider.history_delta(&mailbox, "1").await.expect("History must succeed.");

		assert_eq!(delta.events.len(), 1);
		assert_eq!(delta.events[0].provider_message_id, "m2");
		assert_eq!(delta.new_cursor, "2");
	}

	#[tokio::test]
	async fn invalidated_cursor_errors_until_profile_refresh() {
		let provider = FakeMailProvider::new();
		let mailbox = mailbox();

		provider.invalidate_cursor(&mailbox.email_address);

		assert!(matches!(
			provider.history_delta(&mailbox, "0").await,
			Err(Error::InvalidCursor)
		));

		provider.profile(&mailbox).await.expect("Profile must succeed.");

		assert!(provider.history_delta(&mailbox, "0").await.is_ok());
	}

	#[tokio::test]
	async fn transient_failures_drain() {
		let provider = FakeMailProvider::new();
		let mailbox = mailbox();

		provider.fail_history(&mailbox.email_address, 2);

		assert!(provider.history_delta(&mailbox, "0").await.is_err());
		assert!(provider.history_delta(&mailbox, "0").await.is_err());
		assert!(provider.history_delta(&mailbox, "0").await.is_ok());
		assert_eq!(provider.history_call_count(&mailbox.email_address), 3);
	}
}

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;

use crate::{
	Error, HistoryDelta, HistoryEvent, HistoryEventKind, MailboxRef, MessagePage, ProviderProfile,
	Result,
};

const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
	#[serde(default)]
	messages: Vec<ListedMessage>,
	next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedMessage {
	id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
	#[serde(default)]
	history: Vec<HistoryRecord>,
	history_id: Option<String>,
	next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
	#[serde(default)]
	messages_added: Vec<HistoryMessageRef>,
	#[serde(default)]
	messages_deleted: Vec<HistoryMessageRef>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessageRef {
	message: HistoryMessage,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
	id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessageResponse {
	raw: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
	email_address: String,
	history_id: Option<String>,
}

/// Gmail REST client. `api_base` is configurable so tests can point it at a
/// stub server.
pub struct GmailProvider {
	http: reqwest::Client,
	api_base: String,
}
impl GmailProvider {
	pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|err| Error::Transient(err.to_string()))?;

		Ok(Self { http, api_base: api_base.trim_end_matches('/').to_string() })
	}

	async fn get_json<T>(&self, mailbox: &MailboxRef, url: &str) -> Result<T>
	where
		T: serde::de::DeserializeOwned,
	{
		let response = self.http.get(url).bearer_auth(&mailbox.access_token).send().await?;
		let status = response.status();

		match status.as_u16() {
			200 => response.json::<T>().await.map_err(|err| Error::Decode(err.to_string())),
			401 | 403 => Err(Error::Auth(format!("Gmail returned {status} for {url}."))),
			404 if url.contains("/history") => Err(Error::InvalidCursor),
			_ => Err(Error::Transient(format!("Gmail returned {status} for {url}."))),
		}
	}
}

#[async_trait]
impl crate::MailProvider for GmailProvider {
	async fn list_messages(
		&self,
		mailbox: &MailboxRef,
		page_token: Option<&str>,
	) -> Result<MessagePage> {
		let mut url =
			format!("{}/gmail/v1/users/me/messages?maxResults={PAGE_SIZE}", self.api_base);

		if let Some(token) = page_token {
			url.push_str(&format!("&pageToken={token}"));
		}

		let response: ListResponse = self.get_json(mailbox, &url).await?;

		Ok(MessagePage {
			ids: response.messages.into_iter().map(|message| message.id).collect(),
			next_page_token: response.next_page_token,
		})
	}

	async fn history_delta(&self, mailbox: &MailboxRef, cursor: &str) -> Result<HistoryDelta> {
		let mut events = Vec::new();
		let mut new_cursor = cursor.to_string();
		let mut page_token: Option<String> = None;

		loop {
			let mut url = format!(
				"{}/gmail/v1/users/me/history?startHistoryId={cursor}&maxResults={PAGE_SIZE}",
				self.api_base
			);

			if let Some(token) = page_token.as_deref() {
				url.push_str(&format!("&pageToken={token}"));
			}

			let response: HistoryResponse = self.get_json(mailbox, &url).await?;

			if let Some(history_id) = response.history_id {
				new_cursor = history_id;
			}

			for record in response.history {
				for added in record.messages_added {
					events.push(HistoryEvent {
						kind: HistoryEventKind::MessageAdded,
						provider_message_id: added.message.id,
					});
				}
				for deleted in record.messages_deleted {
					events.push(HistoryEvent {
						kind: HistoryEventKind::MessageDeleted,
						provider_message_id: deleted.message.id,
					});
				}
			}

			match response.next_page_token {
				Some(token) => page_token = Some(token),
				None => break,
			}
		}

		Ok(HistoryDelta { events, new_cursor })
	}

	async fn fetch_raw(&self, mailbox: &MailboxRef, provider_message_id: &str) -> Result<Bytes> {
		let url = format!(
			"{}/gmail/v1/users/me/messages/{provider_message_id}?format=raw",
			self.api_base
		);
		let response: RawMessageResponse = self.get_json(mailbox, &url).await?;
		let raw = response
			.raw
			.ok_or_else(|| Error::Decode("Gmail raw message payload is missing.".to_string()))?;
		let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
			.decode(raw.trim_end_matches('='))
			.map_err(|err| Error::Decode(format!("Gmail raw payload is not base64url: {err}.")))?;

		Ok(Bytes::from(decoded))
	}

	async fn profile(&self, mailbox: &MailboxRef) -> Result<ProviderProfile> {
		let url = format!("{}/gmail/v1/users/me/profile", self.api_base);
		let response: ProfileResponse = self.get_json(mailbox, &url).await?;

		Ok(ProviderProfile {
			email_address: response.email_address,
			scopes: Vec::new(),
			history_cursor: response.history_id,
		})
	}
}

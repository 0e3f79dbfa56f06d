use sqlx::{Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use oss_provider::{MailboxRef, oauth};
use oss_storage::{
	crypto,
	mailboxes::{self, NewMailbox},
	models::Mailbox,
};

use crate::{Error, OssService, Result};

/// Cached access tokens are reused while they have this much life left.
const ACCESS_TOKEN_MARGIN: Duration = Duration::seconds(30);

#[derive(Debug)]
pub struct CreateMailboxRequest<'a> {
	pub organization_id: Uuid,
	pub purpose: &'a str,
	pub provider: &'a str,
	pub email_address: &'a str,
	pub display_name: Option<&'a str>,
	pub credential_subject: &'a str,
	pub refresh_token: &'a str,
	/// Optional pre-acquired access token, e.g. right after the OAuth dance.
	pub access_token: Option<(&'a str, OffsetDateTime)>,
}

impl OssService {
	pub async fn create_mailbox(&self, req: CreateMailboxRequest<'_>) -> Result<Uuid> {
		if !matches!(req.purpose, "journal" | "user") {
			return Err(Error::InvalidRequest {
				message: format!("Unknown mailbox purpose {:?}.", req.purpose),
			});
		}

		let aad = crypto::credential_aad(req.organization_id, req.credential_subject);
		let encrypted_refresh_token =
			self.cipher.encrypt(req.refresh_token.as_bytes(), &aad)?;
		let mut tx = self.db.pool.begin().await?;
		let mailbox_id = mailboxes::insert_mailbox(&mut *tx, NewMailbox {
			organization_id: req.organization_id,
			purpose: req.purpose,
			provider: req.provider,
			email_address: req.email_address,
			display_name: req.display_name,
			credential_subject: req.credential_subject,
			encrypted_refresh_token: &encrypted_refresh_token,
		})
		.await?;

		if let Some((access_token, expires_at)) = req.access_token {
			let encrypted = self.cipher.encrypt(access_token.as_bytes(), &aad)?;

			mailboxes::update_access_token(
				&mut *tx,
				req.organization_id,
				mailbox_id,
				&encrypted,
				expires_at,
			)
			.await?;
		}

		tx.commit().await?;

		Ok(mailbox_id)
	}

	/// Fresh credentials from the (out-of-scope) OAuth surface clear the
	/// degraded flag so sync resumes.
	pub async fn update_mailbox_credentials(
		&self,
		organization_id: Uuid,
		mailbox_id: Uuid,
		refresh_token: &str,
	) -> Result<()> {
		let mut tx = self.db.pool.begin().await?;
		let Some(mailbox) =
			mailboxes::fetch_for_update(&mut tx, organization_id, mailbox_id).await?
		else {
			return Err(Error::NotFound { message: format!("Mailbox {mailbox_id}.") });
		};
		let aad = crypto::credential_aad(organization_id, &mailbox.credential_subject);
		let encrypted = self.cipher.encrypt(refresh_token.as_bytes(), &aad)?;

		sqlx::query(
			"\
UPDATE mailboxes
SET encrypted_refresh_token = $2,
	encrypted_access_token = NULL,
	access_token_expires_at = NULL,
	auth_degraded = false,
	updated_at = now()
WHERE mailbox_id = $1",
		)
		.bind(mailbox_id)
		.bind(&encrypted)
		.execute(&mut *tx)
		.await
		.map_err(oss_storage::Error::from)?;

		// A degraded mailbox stopped rescheduling itself; restart the
		// cadence now that credentials work again.
		self.enqueue_history_sync(&mut tx, organization_id, mailbox_id, "credentials_refreshed", None)
			.await?;
		tx.commit().await?;

		Ok(())
	}

	/// Resolves a usable access token: the encrypted cache while it is fresh,
	/// otherwise a refresh against the token endpoint, re-encrypted in place.
	pub(crate) async fn mailbox_access_token(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		mailbox: &Mailbox,
	) -> Result<String> {
		let aad = crypto::credential_aad(mailbox.organization_id, &mailbox.credential_subject);
		let now = OffsetDateTime::now_utc();

		if let (Some(blob), Some(expires_at)) =
			(mailbox.encrypted_access_token.as_deref(), mailbox.access_token_expires_at)
			&& expires_at > now + ACCESS_TOKEN_MARGIN
			&& let Ok(plain) = self.cipher.decrypt(blob, &aad)
			&& let Ok(token) = String::from_utf8(plain)
		{
			return Ok(token);
		}

		let refresh_plain = self.cipher.decrypt(&mailbox.encrypted_refresh_token, &aad)?;
		let refresh_token = String::from_utf8(refresh_plain).map_err(|_| Error::Storage {
			message: "Decrypted refresh token is not UTF-8.".to_string(),
		})?;
		let token = oauth::refresh_access_token(
			&self.http,
			&self.cfg.provider.token_endpoint,
			&self.cfg.provider.client_id,
			&self.cfg.provider.client_secret,
			&refresh_token,
		)
		.await?;
		let encrypted = self.cipher.encrypt(token.access_token.as_bytes(), &aad)?;
		let expires_at = now + Duration::seconds(token.expires_in.max(1));

		mailboxes::update_access_token(
			&mut **tx,
			mailbox.organization_id,
			mailbox.mailbox_id,
			&encrypted,
			expires_at,
		)
		.await?;

		Ok(token.access_token)
	}

	pub(crate) fn mailbox_ref(&self, mailbox: &Mailbox, access_token: String) -> MailboxRef {
		MailboxRef {
			mailbox_id: mailbox.mailbox_id,
			email_address: mailbox.email_address.clone(),
			access_token,
		}
	}
}

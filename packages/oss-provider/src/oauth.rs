use serde::Deserialize;

use crate::{Error, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct OAuthToken {
	pub access_token: String,
	/// Seconds until expiry, as reported by the token endpoint.
	pub expires_in: i64,
}

/// Exchanges a long-lived refresh token for a short-lived access token.
pub async fn refresh_access_token(
	http: &reqwest::Client,
	token_endpoint: &str,
	client_id: &str,
	client_secret: &str,
	refresh_token: &str,
) -> Result<OAuthToken> {
	let response = http
		.post(token_endpoint)
		.form(&[
			("grant_type", "refresh_token"),
			("client_id", client_id),
			("client_secret", client_secret),
			("refresh_token", refresh_token),
		])
		.send()
		.await?;
	let status = response.status();

	if status.as_u16() == 400 || status.as_u16() == 401 {
		return Err(Error::Auth(format!("Token refresh was rejected ({status}).")));
	}
	if !status.is_success() {
		return Err(Error::Transient(format!("Token endpoint returned {status}.")));
	}

	response.json::<OAuthToken>().await.map_err(|err| Error::Decode(err.to_string()))
}

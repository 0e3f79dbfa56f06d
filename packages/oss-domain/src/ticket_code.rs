use uuid::Uuid;

/// Opaque per-ticket code; doubles as the token in `ticket+<code>@` reply
/// aliases, so the charset stays within `[a-z0-9-]`.
pub fn new_ticket_code() -> String {
	format!("tkt-{}", Uuid::new_v4().simple())
}

/// Extracts the token from a `ticket+<token>@domain` alias.
pub fn parse_reply_token(email: &str) -> Option<&str> {
	let email = email.trim();
	let local = email.split_once('@').map(|(local, _)| local)?;
	let token = local.strip_prefix("ticket+")?;

	if token.is_empty() {
		return None;
	}
	if !token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
		return None;
	}

	Some(token)
}

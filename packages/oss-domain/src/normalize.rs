/// Strips reply/forward prefixes, trims, and collapses internal whitespace
/// runs so that mailer-rewritten subjects normalize to the same value.
pub fn normalize_subject(subject: Option<&str>) -> Option<String> {
	let mut s = subject?.trim().to_string();

	loop {
		let stripped = strip_one_prefix(&s);

		if stripped == s {
			break;
		}

		s = stripped.trim().to_string();
	}

	let collapsed = collapse_whitespace(&s);

	if collapsed.is_empty() { None } else { Some(collapsed) }
}

pub fn normalize_email(raw: &str) -> Option<String> {
	let email = extract_addr_spec(raw).trim().to_lowercase();

	if email.is_empty() || !email.contains('@') { None } else { Some(email) }
}

/// Splits an address-list header value ("A <a@x>, b@y") into lowercased
/// addr-specs, preserving order and dropping duplicates.
pub fn parse_address_list(raw: &str) -> Vec<String> {
	let mut out = Vec::new();

	for part in split_addresses(raw) {
		if let Some(email) = normalize_email(&part)
			&& !out.contains(&email)
		{
			out.push(email);
		}
	}

	out
}

pub fn email_domain(email: &str) -> Option<&str> {
	email.rsplit_once('@').map(|(_, domain)| domain).filter(|domain| !domain.is_empty())
}

fn strip_one_prefix(s: &str) -> String {
	for prefix in ["re", "fw", "fwd"] {
		let lower = s.to_lowercase();

		if let Some(rest) = lower.strip_prefix(prefix) {
			let rest = rest.trim_start();

			if let Some(after) = rest.strip_prefix(':') {
				// The consumed prefix is ASCII, so byte offsets in the
				// lowercased copy line up with the original.
				let consumed = lower.len() - after.len();

				return s[consumed..].to_string();
			}
		}
	}

	s.to_string()
}

fn collapse_whitespace(s: &str) -> String {
	s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_addr_spec(raw: &str) -> &str {
	if let Some(start) = raw.rfind('<')
		&& let Some(end) = raw[start..].find('>')
	{
		return &raw[start + 1..start + end];
	}

	raw
}

/// Comma-split that respects quoted display names ("Doe, Jane" <j@x>).
fn split_addresses(raw: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut current = String::new();
	let mut in_quotes = false;

	for ch in raw.chars() {
		match ch {
			'"' => {
				in_quotes = !in_quotes;

				current.push(ch);
			},
			',' if !in_quotes => {
				out.push(std::mem::take(&mut current));
			},
			_ => current.push(ch),
		}
	}

	if !current.trim().is_empty() {
		out.push(current);
	}

	out
}

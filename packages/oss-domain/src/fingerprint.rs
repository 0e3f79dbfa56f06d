use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Only the first 64 KiB of body text feed the fingerprint; the full-body
/// hash disambiguates messages that agree on the prefix.
pub const BODY_PREFIX_BYTES: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FingerprintInput<'a> {
	pub subject_norm: Option<&'a str>,
	pub from_email: Option<&'a str>,
	/// Header date truncated to second precision.
	pub date: Option<OffsetDateTime>,
	pub to_emails: &'a [String],
	pub cc_emails: &'a [String],
	pub body_text: Option<&'a str>,
}

/// Field order is the canonical serialization; changing it is a fingerprint
/// version bump.
#[derive(Serialize)]
struct FingerprintPayload<'a> {
	subject_norm: Option<&'a str>,
	from: Option<String>,
	date_unix: Option<i64>,
	recipients: Vec<String>,
	body_prefix_sha256: String,
}

/// The `Message-ID` header is deliberately absent from the input: Workspace
/// rewrites it between delivery paths.
pub fn fingerprint_v1(input: &FingerprintInput<'_>) -> Vec<u8> {
	let body = input.body_text.unwrap_or("").trim();
	let prefix_end = floor_char_boundary(body, BODY_PREFIX_BYTES);
	let payload = FingerprintPayload {
		subject_norm: input.subject_norm,
		from: input.from_email.map(|from| from.trim().to_lowercase()),
		date_unix: input.date.map(OffsetDateTime::unix_timestamp),
		recipients: sorted_recipients(input.to_emails, input.cc_emails),
		body_prefix_sha256: hex(&sha256(body[..prefix_end].as_bytes())),
	};
	let encoded =
		serde_json::to_vec(&payload).expect("Fingerprint payload serialization is infallible.");

	sha256(&encoded)
}

/// SHA-256 of the full trimmed body text; stored next to the fingerprint to
/// detect collisions past the 64 KiB prefix.
pub fn body_hash(body_text: Option<&str>) -> Vec<u8> {
	sha256(body_text.unwrap_or("").trim().as_bytes())
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
	Sha256::digest(data).to_vec()
}

pub fn hex(data: &[u8]) -> String {
	let mut out = String::with_capacity(data.len() * 2);

	for byte in data {
		out.push_str(&format!("{byte:02x}"));
	}

	out
}

fn sorted_recipients(to: &[String], cc: &[String]) -> Vec<String> {
	let mut recipients =
		to.iter().chain(cc.iter()).map(|email| email.trim().to_lowercase()).collect::<Vec<_>>();

	recipients.sort();
	recipients.dedup();

	recipients
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
	if index >= s.len() {
		return s.len();
	}

	let mut index = index;

	while !s.is_char_boundary(index) {
		index -= 1;
	}

	index
}

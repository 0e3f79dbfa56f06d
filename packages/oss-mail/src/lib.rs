pub mod sanitize;

mod error;

pub use error::{Error, Result};

use std::collections::BTreeMap;

use mail_parser::{Address, HeaderValue, MessageParser, MimeHeaders};
use time::OffsetDateTime;
use uuid::Uuid;

use oss_domain::normalize;

/// Parser output. `headers` is a name -> values multimap preserving repeated
/// headers; all addresses are lowercased addr-specs.
#[derive(Clone, Debug)]
pub struct ParsedEmail {
	pub rfc_message_id: Option<String>,
	pub date: Option<OffsetDateTime>,
	pub subject: Option<String>,
	pub subject_norm: Option<String>,
	pub from_email: Option<String>,
	pub from_name: Option<String>,
	pub reply_to_emails: Vec<String>,
	pub to_emails: Vec<String>,
	pub cc_emails: Vec<String>,
	pub headers: BTreeMap<String, Vec<String>>,
	pub body_text: Option<String>,
	pub body_html_sanitized: Option<String>,
	pub in_reply_to: Option<String>,
	pub references: Vec<String>,
	pub attachments: Vec<ParsedAttachment>,
}

#[derive(Clone, Debug)]
pub struct ParsedAttachment {
	pub filename: Option<String>,
	pub content_type: Option<String>,
	pub payload: Vec<u8>,
	pub is_inline: bool,
	pub content_id: Option<String>,
}

pub fn parse_raw_email(raw: &[u8]) -> Result<ParsedEmail> {
	let message = MessageParser::default()
		.parse(raw)
		.filter(|message| !message.headers().is_empty())
		.ok_or_else(|| Error::Malformed("No parseable RFC822 headers.".to_string()))?;

	let subject = message.subject().map(str::to_string);
	let subject_norm = normalize::normalize_subject(subject.as_deref());
	let (from_email, from_name) = extract_from(message.from());
	let reply_to_emails = extract_addresses(message.reply_to());
	let to_emails = extract_addresses(message.to());
	let cc_emails = extract_addresses(message.cc());
	let rfc_message_id =
		message.message_id().map(strip_msg_id).filter(|id| !id.is_empty());
	let date = message
		.date()
		.and_then(|date| OffsetDateTime::from_unix_timestamp(date.to_timestamp()).ok());
	let in_reply_to = extract_in_reply_to(message.in_reply_to());
	let references = extract_references(&message);
	let headers = collect_headers(&message);
	let (body_text, body_html) = collect_bodies(&message);
	let body_html_sanitized = sanitize::sanitize_html(body_html.as_deref());
	let attachments = collect_attachments(&message);

	Ok(ParsedEmail {
		rfc_message_id,
		date,
		subject,
		subject_norm,
		from_email,
		from_name,
		reply_to_emails,
		to_emails,
		cc_emails,
		headers,
		body_text,
		body_html_sanitized,
		in_reply_to,
		references,
		attachments,
	})
}

/// First value of a UUID-bearing header, e.g. `X-OSS-Ticket-ID`.
pub fn header_uuid(headers: &BTreeMap<String, Vec<String>>, header_name: &str) -> Option<Uuid> {
	for (name, values) in headers {
		if !name.eq_ignore_ascii_case(header_name) {
			continue;
		}

		for value in values {
			if let Ok(id) = Uuid::parse_str(value.trim()) {
				return Some(id);
			}
		}
	}

	None
}

/// Message-ID values are compared without their angle brackets.
pub fn strip_msg_id(raw: &str) -> String {
	raw.trim().trim_start_matches('<').trim_end_matches('>').trim().to_string()
}

fn extract_from(address: Option<&Address<'_>>) -> (Option<String>, Option<String>) {
	let Some(addr) = address.and_then(|address| address.first()) else {
		return (None, None);
	};
	let email = addr.address.as_deref().and_then(normalize::normalize_email);
	let name =
		addr.name.as_deref().map(str::trim).filter(|name| !name.is_empty()).map(str::to_string);

	(email, name)
}

fn extract_addresses(address: Option<&Address<'_>>) -> Vec<String> {
	let mut out = Vec::new();

	let Some(address) = address else {
		return out;
	};

	for addr in address.iter() {
		if let Some(email) = addr.address.as_deref().and_then(normalize::normalize_email)
			&& !out.contains(&email)
		{
			out.push(email);
		}
	}

	out
}

fn extract_in_reply_to(value: &HeaderValue<'_>) -> Option<String> {
	match value {
		HeaderValue::Text(text) => Some(strip_msg_id(text)).filter(|id| !id.is_empty()),
		HeaderValue::TextList(list) =>
			list.iter().map(|text| strip_msg_id(text)).find(|id| !id.is_empty()),
		_ => None,
	}
}

fn extract_references(message: &mail_parser::Message<'_>) -> Vec<String> {
	let mut out = Vec::new();

	for value in message.header_values("References") {
		match value {
			HeaderValue::Text(text) => collect_reference_ids(text, &mut out),
			HeaderValue::TextList(list) =>
				for text in list {
					collect_reference_ids(text, &mut out);
				},
			_ => {},
		}
	}

	out
}

fn collect_reference_ids(raw: &str, out: &mut Vec<String>) {
	for token in raw.split_whitespace() {
		let id = strip_msg_id(token);

		if !id.is_empty() && !out.contains(&id) {
			out.push(id);
		}
	}
}

fn collect_headers(message: &mail_parser::Message<'_>) -> BTreeMap<String, Vec<String>> {
	let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();

	for header in message.headers() {
		if let Some(text) = header_value_text(&header.value) {
			headers.entry(header.name.as_str().to_string()).or_default().push(text);
		}
	}

	headers
}

fn header_value_text(value: &HeaderValue<'_>) -> Option<String> {
	match value {
		HeaderValue::Text(text) => Some(text.to_string()),
		HeaderValue::TextList(list) => Some(list.join(", ")),
		HeaderValue::Address(address) => Some(format_address(address)),
		HeaderValue::DateTime(date) => Some(date.to_rfc3339()),
		_ => None,
	}
}

fn format_address(address: &Address<'_>) -> String {
	let mut parts = Vec::new();

	for addr in address.iter() {
		match (addr.name.as_deref(), addr.address.as_deref()) {
			(Some(name), Some(email)) => parts.push(format!("{name} <{email}>")),
			(None, Some(email)) => parts.push(email.to_string()),
			(Some(name), None) => parts.push(name.to_string()),
			(None, None) => {},
		}
	}

	parts.join(", ")
}

fn collect_bodies(message: &mail_parser::Message<'_>) -> (Option<String>, Option<String>) {
	let mut text_parts = Vec::new();
	let mut html_parts = Vec::new();

	for part in message.text_bodies() {
		if let Some(text) = part.text_contents()
			&& !text.trim().is_empty()
		{
			text_parts.push(text.trim().to_string());
		}
	}
	for part in message.html_bodies() {
		if let Some(html) = part.text_contents()
			&& !html.trim().is_empty()
		{
			html_parts.push(html.trim().to_string());
		}
	}

	let body_text = if text_parts.is_empty() { None } else { Some(text_parts.join("\n\n")) };
	let body_html = if html_parts.is_empty() { None } else { Some(html_parts.join("\n\n")) };

	(body_text, body_html)
}

fn collect_attachments(message: &mail_parser::Message<'_>) -> Vec<ParsedAttachment> {
	let mut out = Vec::new();

	for part in message.attachments() {
		let content_type = part.content_type().map(|ct| match ct.subtype() {
			Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_lowercase(),
			None => ct.ctype().to_lowercase(),
		});
		let is_inline = part
			.content_disposition()
			.map(|disposition| disposition.ctype().eq_ignore_ascii_case("inline"))
			.unwrap_or(false);
		let content_id =
			part.content_id().map(strip_msg_id).filter(|content_id| !content_id.is_empty());

		out.push(ParsedAttachment {
			filename: part.attachment_name().map(str::to_string),
			content_type,
			payload: part.contents().to_vec(),
			is_inline,
			content_id,
		});
	}

	out
}

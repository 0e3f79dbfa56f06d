use oss_mail::{header_uuid, parse_raw_email};

const SAMPLE: &str = "From: Jane Doe <Jane@Customer.ORG>\r\n\
To: Support <support@example.com>\r\n\
Cc: ops@example.com\r\n\
Subject: Re:  Printer   broken\r\n\
Message-ID: <abc-123@mail.example>\r\n\
In-Reply-To: <parent-1@mail.example>\r\n\
References: <root-1@mail.example> <parent-1@mail.example>\r\n\
Date: Tue, 14 Nov 2023 12:00:00 +0000\r\n\
Delivered-To: journal@example.com\r\n\
X-Gm-Original-To: support@example.com\r\n\
X-OSS-Ticket-ID: 3f2b8c1a-8f1e-4b62-9a60-0a4dbb6f21c3\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
The printer is broken.\r\n\
--outer\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>The printer is <script>alert(1)</script>broken.</p>\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer--\r\n";

#[test]
fn parses_a_multipart_journal_copy() {
	let parsed = parse_raw_email(SAMPLE.as_bytes()).expect("Expected the sample to parse.");

	assert_eq!(parsed.subject.as_deref(), Some("Re:  Printer   broken"));
	assert_eq!(parsed.subject_norm.as_deref(), Some("Printer broken"));
	assert_eq!(parsed.from_email.as_deref(), Some("jane@customer.org"));
	assert_eq!(parsed.from_name.as_deref(), Some("Jane Doe"));
	assert_eq!(parsed.to_emails, vec!["support@example.com".to_string()]);
	assert_eq!(parsed.cc_emails, vec!["ops@example.com".to_string()]);
	assert_eq!(parsed.rfc_message_id.as_deref(), Some("abc-123@mail.example"));
	assert_eq!(parsed.in_reply_to.as_deref(), Some("parent-1@mail.example"));
	assert_eq!(parsed.references, vec![
		"root-1@mail.example".to_string(),
		"parent-1@mail.example".to_string()
	]);

	let date = parsed.date.expect("Expected the Date header to parse.");

	assert_eq!(date.year(), 2023);
}

#[test]
fn bodies_are_extracted_and_sanitized() {
	let parsed = parse_raw_email(SAMPLE.as_bytes()).expect("Expected the sample to parse.");

	assert_eq!(parsed.body_text.as_deref(), Some("The printer is broken."));

	let html = parsed.body_html_sanitized.expect("Expected sanitized HTML.");

	assert!(html.contains("broken"));
	assert!(!html.contains("script"));
}

#[test]
fn attachments_carry_metadata_and_decoded_payloads() {
	let parsed = parse_raw_email(SAMPLE.as_bytes()).expect("Expected the sample to parse.");

	assert_eq!(parsed.attachments.len(), 1);

	let attachment = &parsed.attachments[0];

	assert_eq!(attachment.filename.as_deref(), Some("report.pdf"));
	assert_eq!(attachment.content_type.as_deref(), Some("application/pdf"));
	assert!(attachment.payload.starts_with(b"%PDF-1.4"));
	assert!(!attachment.is_inline);
}

#[test]
fn workspace_headers_survive_in_the_header_map() {
	let parsed = parse_raw_email(SAMPLE.as_bytes()).expect("Expected the sample to parse.");

	assert_eq!(
		parsed.headers.get("Delivered-To").map(Vec::as_slice),
		Some(&["journal@example.com".to_string()][..])
	);
	assert_eq!(
		header_uuid(&parsed.headers, "x-oss-ticket-id").map(|id| id.to_string()),
		Some("3f2b8c1a-8f1e-4b62-9a60-0a4dbb6f21c3".to_string())
	);
}

#[test]
fn garbage_without_headers_is_malformed() {
	assert!(parse_raw_email(b"").is_err());
	assert!(parse_raw_email(b"\xff\xfe\x00\x01 no headers here").is_err());
}

#[test]
fn parsing_is_pure() {
	let first = parse_raw_email(SAMPLE.as_bytes()).expect("Expected the sample to parse.");
	let second = parse_raw_email(SAMPLE.as_bytes()).expect("Expected the sample to parse.");

	assert_eq!(first.subject_norm, second.subject_norm);
	assert_eq!(first.body_text, second.body_text);
	assert_eq!(first.body_html_sanitized, second.body_html_sanitized);
	assert_eq!(first.references, second.references);
}

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::{
	enums::{Confidence, RecipientSource},
	normalize,
};

#[derive(Clone, Debug)]
pub struct RecipientResolution {
	pub recipient: Option<String>,
	pub source: RecipientSource,
	pub confidence: Confidence,
	/// Candidate lists per header, kept for admin review of routing calls.
	pub evidence: Value,
}

/// Strict precedence: Workspace's own header, then the delivery headers,
/// then a To/Cc scan restricted to the organization's domains.
pub fn resolve_original_recipient(
	headers: &BTreeMap<String, Vec<String>>,
	to_emails: &[String],
	cc_emails: &[String],
	org_domains: &[String],
) -> RecipientResolution {
	let x_gm_values = header_candidates(headers, "x-gm-original-to");
	let delivered_values = header_candidates(headers, "delivered-to");
	let x_original_values = header_candidates(headers, "x-original-to");
	let to_candidates = domain_scan(to_emails, org_domains);
	let cc_candidates = domain_scan(cc_emails, org_domains);

	let (recipient, selected_from, source, confidence) = if let Some(first) = x_gm_values.first() {
		(Some(first.clone()), Some("X-Gm-Original-To"), RecipientSource::WorkspaceHeader, Confidence::High)
	} else if let Some(first) = delivered_values.first() {
		(Some(first.clone()), Some("Delivered-To"), RecipientSource::DeliveredTo, Confidence::Medium)
	} else if let Some(first) = x_original_values.first() {
		(Some(first.clone()), Some("X-Original-To"), RecipientSource::XOriginalTo, Confidence::Medium)
	} else if let Some(first) = to_candidates.first() {
		(Some(first.clone()), Some("to"), RecipientSource::ToCcScan, Confidence::Low)
	} else if let Some(first) = cc_candidates.first() {
		(Some(first.clone()), Some("cc"), RecipientSource::ToCcScan, Confidence::Low)
	} else {
		(None, None, RecipientSource::Unknown, Confidence::Low)
	};

	let evidence = json!({
		"selected_from": selected_from,
		"selected_value": recipient.clone(),
		"x_gm_original_to_candidates": x_gm_values,
		"delivered_to_candidates": delivered_values,
		"x_original_to_candidates": x_original_values,
		"to_candidates": to_candidates,
		"cc_candidates": cc_candidates,
	});

	RecipientResolution { recipient, source, confidence, evidence }
}

fn header_candidates(headers: &BTreeMap<String, Vec<String>>, header_name_lc: &str) -> Vec<String> {
	let mut emails = Vec::new();

	for (name, values) in headers {
		if !name.eq_ignore_ascii_case(header_name_lc) {
			continue;
		}

		for value in values {
			for email in normalize::parse_address_list(value) {
				if !emails.contains(&email) {
					emails.push(email);
				}
			}
		}
	}

	emails
}

fn domain_scan(emails: &[String], org_domains: &[String]) -> Vec<String> {
	let mut out = Vec::new();

	for email in emails {
		let Some(email) = normalize::normalize_email(email) else {
			continue;
		};
		let Some(domain) = normalize::email_domain(&email) else {
			continue;
		};

		if org_domains.iter().any(|org| org.eq_ignore_ascii_case(domain)) && !out.contains(&email) {
			out.push(email);
		}
	}

	out
}

use proptest::prelude::*;
use time::OffsetDateTime;

use oss_domain::{
	backoff::{backoff_ceiling, backoff_with_jitter},
	fingerprint::{FingerprintInput, body_hash, fingerprint_v1},
	normalize::normalize_subject,
	routing::glob_match,
};

fn input<'a>(
	subject: Option<&'a str>,
	from: Option<&'a str>,
	to: &'a [String],
	cc: &'a [String],
	body: Option<&'a str>,
) -> FingerprintInput<'a> {
	FingerprintInput {
		subject_norm: subject,
		from_email: from,
		date: Some(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()),
		to_emails: to,
		cc_emails: cc,
		body_text: body,
	}
}

#[test]
fn fingerprint_ignores_message_id_rewrites() {
	// The input simply has no Message-ID slot; this pins the contract.
	let to = vec!["a@x.com".to_string()];
	let cc = vec![];
	let a = fingerprint_v1(&input(Some("Hi"), Some("j@x.com"), &to, &cc, Some("body")));
	let b = fingerprint_v1(&input(Some("Hi"), Some("j@x.com"), &to, &cc, Some("body")));

	assert_eq!(a, b);
}

proptest! {
	#[test]
	fn fingerprint_is_deterministic(
		subject in proptest::option::of("[a-zA-Z0-9 ]{0,40}"),
		from in proptest::option::of("[a-z]{1,12}@[a-z]{1,12}\\.com"),
		to in proptest::collection::vec("[a-z]{1,8}@[a-z]{1,8}\\.com", 0..4),
		body in proptest::option::of("[ -~]{0,200}"),
	) {
		let cc = vec![];
		let a = fingerprint_v1(&input(subject.as_deref(), from.as_deref(), &to, &cc, body.as_deref()));
		let b = fingerprint_v1(&input(subject.as_deref(), from.as_deref(), &to, &cc, body.as_deref()));

		prop_assert_eq!(a, b);
	}

	#[test]
	fn fingerprint_is_stable_across_from_case_and_padding(
		local in "[a-z]{1,12}",
		domain in "[a-z]{1,12}\\.com",
		body in "[ -~]{0,120}",
	) {
		let to = vec!["a@x.com".to_string()];
		let cc = vec![];
		let plain = format!("{local}@{domain}");
		let shouty = format!("  {}@{}  ", local.to_uppercase(), domain.to_uppercase());
		let a = fingerprint_v1(&input(Some("S"), Some(&plain), &to, &cc, Some(&body)));
		let b = fingerprint_v1(&input(Some("S"), Some(&shouty), &to, &cc, Some(&body)));

		prop_assert_eq!(a, b);
	}

	#[test]
	fn subject_whitespace_runs_normalize_identically(
		words in proptest::collection::vec("[a-zA-Z]{1,8}", 1..6),
	) {
		let single = words.join(" ");
		let sloppy = words.join("  \t ");

		prop_assert_eq!(
			normalize_subject(Some(&single)),
			normalize_subject(Some(&sloppy))
		);
	}

	#[test]
	fn body_hash_is_order_sensitive(a in "[a-z]{1,40}", b in "[a-z]{1,40}") {
		if a != b {
			prop_assert_ne!(body_hash(Some(&a)), body_hash(Some(&b)));
		}
	}

	#[test]
	fn backoff_jitter_never_exceeds_ceiling(attempts in 1i32..16) {
		let base = std::time::Duration::from_secs(30);
		let cap = std::time::Duration::from_secs(900);
		let ceiling = backoff_ceiling(attempts, base, cap).max(std::time::Duration::from_secs(1));

		for _ in 0..8 {
			prop_assert!(backoff_with_jitter(attempts, base, cap) <= ceiling);
		}
	}

	#[test]
	fn exact_patterns_only_match_themselves(
		email in "[a-z]{1,10}@[a-z]{1,10}\\.com",
		other in "[a-z]{1,10}@[a-z]{1,10}\\.com",
	) {
		prop_assert!(glob_match(&email, &email));

		if email != other {
			prop_assert!(!glob_match(&email, &other));
		}
	}
}

use glob::Pattern;

use crate::enums::Direction;

/// Predicates of one routing rule; `None`/empty patterns match everything.
#[derive(Clone, Debug, Default)]
pub struct RulePredicates {
	pub recipient_pattern: Option<String>,
	pub sender_domain_pattern: Option<String>,
	pub sender_email_pattern: Option<String>,
	pub direction: Option<Direction>,
}

#[derive(Clone, Debug)]
pub struct RouteInput<'a> {
	pub recipient: &'a str,
	pub sender_email: &'a str,
	pub sender_domain: &'a str,
	pub direction: Option<Direction>,
}

pub fn rule_matches(predicates: &RulePredicates, input: &RouteInput<'_>) -> bool {
	if let Some(pattern) = non_empty(predicates.recipient_pattern.as_deref())
		&& !glob_match(pattern, input.recipient)
	{
		return false;
	}
	if let Some(pattern) = non_empty(predicates.sender_domain_pattern.as_deref())
		&& !glob_match(pattern, input.sender_domain)
	{
		return false;
	}
	if let Some(pattern) = non_empty(predicates.sender_email_pattern.as_deref())
		&& !glob_match(pattern, input.sender_email)
	{
		return false;
	}
	if let Some(direction) = predicates.direction
		&& input.direction.map(|d| d != direction).unwrap_or(false)
	{
		return false;
	}

	true
}

/// Case-insensitive glob; an unparseable pattern matches nothing.
pub fn glob_match(pattern: &str, value: &str) -> bool {
	Pattern::new(&pattern.trim().to_lowercase())
		.map(|pattern| pattern.matches(&value.trim().to_lowercase()))
		.unwrap_or(false)
}

pub fn allowlist_matches(patterns: &[String], recipient: &str) -> bool {
	if recipient.trim().is_empty() {
		return false;
	}

	patterns
		.iter()
		.filter_map(|pattern| non_empty(Some(pattern.as_str())))
		.any(|pattern| glob_match(pattern, recipient))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
	value.map(str::trim).filter(|v| !v.is_empty())
}

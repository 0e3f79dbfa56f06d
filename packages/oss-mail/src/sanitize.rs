use std::{
	borrow::Cow,
	collections::{HashMap, HashSet},
};

use ammonia::{Builder, UrlRelative};

const ALLOWED_TAGS: &[&str] = &[
	"a", "p", "br", "div", "span", "strong", "em", "b", "i", "ul", "ol", "li", "blockquote",
	"code", "pre", "h1", "h2", "h3", "h4", "h5", "h6", "table", "thead", "tbody", "tr", "td",
	"th", "hr", "img",
];

/// Allowlist sanitizer: no scripts, no event handlers, no remote resource
/// loads. Links keep http/https/mailto targets; images keep `cid:`
/// references to inline attachments only.
pub fn sanitize_html(html: Option<&str>) -> Option<String> {
	let html = html?;

	if html.trim().is_empty() {
		return None;
	}

	let mut tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::new();

	tag_attributes.insert("a", HashSet::from(["href", "target", "title"]));
	tag_attributes.insert("img", HashSet::from(["src", "alt", "title"]));

	let cleaned = Builder::default()
		.tags(HashSet::from_iter(ALLOWED_TAGS.iter().copied()))
		.tag_attributes(tag_attributes)
		.generic_attributes(HashSet::from(["title"]))
		.url_schemes(HashSet::from(["http", "https", "mailto", "cid"]))
		.url_relative(UrlRelative::Deny)
		.attribute_filter(filter_attribute)
		.clean(html)
		.to_string();

	if cleaned.trim().is_empty() { None } else { Some(cleaned) }
}

fn filter_attribute<'u>(element: &str, attribute: &str, value: &'u str) -> Option<Cow<'u, str>> {
	match (element, attribute) {
		("a", "href") => {
			let v = value.trim();

			(v.starts_with("http://") || v.starts_with("https://") || v.starts_with("mailto:"))
				.then(|| value.into())
		},
		("img", "src") => value.trim().starts_with("cid:").then(|| value.into()),
		_ => Some(value.into()),
	}
}

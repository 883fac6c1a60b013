use std::sync::OnceLock;

use regex::Regex;

/// Display name and optional email extracted from a raw commit author
/// string such as `"Jared Forsyth <jared@example.com>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: Option<String>,
}

fn author_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("([^<]+)<([^>]+)>").expect("author pattern is valid"))
}

/// Splits a free-text author string into name and email. Total: input that
/// does not carry a `<...>` email section becomes a name-only author.
#[must_use]
pub fn parse(raw: &str) -> Author {
    if let Some(captures) = author_pattern().captures(raw) {
        if let (Some(name), Some(email)) = (captures.get(1), captures.get(2)) {
            return Author {
                name: name.as_str().trim().to_string(),
                email: Some(email.as_str().trim().to_string()),
            };
        }
    }

    Author {
        name: raw.trim().to_string(),
        email: None,
    }
}

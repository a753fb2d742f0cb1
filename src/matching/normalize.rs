// src/matching/normalize.rs - Name and website canonicalization used for blocking and comparison
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

const CORPORATE_SUFFIXES: [&str; 7] = [
    " inc",
    " corp",
    " llc",
    " ltd",
    " company",
    " co",
    " corporation",
];
const PREFIXES: [&str; 1] = ["the "];

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,]").expect("valid punctuation pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Canonical form of an organization name: lower-cased, periods and commas
/// removed, whitespace collapsed, and corporate suffixes / a leading "the "
/// stripped until none remain. Idempotent; blank input yields "".
pub fn normalize_name(name: &str) -> String {
    if name.trim().is_empty() {
        return String::new();
    }

    let lowered = name.to_lowercase();
    let without_punct = PUNCTUATION.replace_all(&lowered, "");
    let mut normalized = WHITESPACE.replace_all(without_punct.trim(), " ").into_owned();

    // Stripping one affix can expose another ("acme co inc"), so run to a fixed point.
    loop {
        let before = normalized.len();
        for suffix in CORPORATE_SUFFIXES {
            if let Some(stripped) = normalized.strip_suffix(suffix) {
                normalized = stripped.trim_end().to_string();
            }
        }
        for prefix in PREFIXES {
            if let Some(stripped) = normalized.strip_prefix(prefix) {
                normalized = stripped.trim_start().to_string();
            }
        }
        if normalized.len() == before {
            break;
        }
    }
    normalized
}

/// Canonical website used for the website similarity check: scheme and
/// leading "www." dropped, host lower-cased, trailing slash removed. Values
/// that do not parse as URLs fall back to their trimmed lower-case form.
pub fn canonical_website(website: &str) -> String {
    let trimmed = website.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    match Url::parse(&with_scheme) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => {
                let host = host.to_lowercase();
                let host = host.strip_prefix("www.").unwrap_or(&host);
                let path = parsed.path().trim_end_matches('/');
                format!("{}{}", host, path)
            }
            None => trimmed.to_lowercase(),
        },
        Err(_) => trimmed.to_lowercase().trim_end_matches('/').to_string(),
    }
}

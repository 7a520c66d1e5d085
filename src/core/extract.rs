//! Scraping of values that wrangler prints into free-form output.
//!
//! Wrangler has no stable machine-readable output for these commands, so the matchers
//! live behind [`OutputExtractor`] and carry a version that changes with the rules.

use regex::Regex;
use std::sync::LazyLock;

static AUTH_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https://dash\.cloudflare\.com/oauth2/auth\?[^\s"']+"#).unwrap()
});

// JSON block with an "id" field, e.g. `{ "binding": "kv", "id": "0f2a..." }`.
static JSON_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{\s*.*"id":\s*"([^"]+)".*\s*\}"#).unwrap());

static PLAIN_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"id:\s*([a-fA-F0-9]+)").unwrap());

// TOML snippet: binding = "..." followed by id = "..."
static BINDING_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"binding\s*=\s*".*"\s*id\s*=\s*"([^"]+)""#).unwrap());

static DEPLOYED_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(https://(?:[a-zA-Z0-9-]+\.)+(?:workers\.dev|pages\.dev))(?:[/\s"'<>)]|$)"#)
        .unwrap()
});

/// First Cloudflare OAuth authorization URL in `text`.
pub fn find_authorization_url(text: &str) -> Option<String> {
    AUTH_URL_PATTERN.find(text).map(|m| m.as_str().to_string())
}

/// Resource identifier from `kv namespace create` output.
///
/// Tries a JSON block, then an `id: <hex>` line, then a TOML binding snippet.
pub fn find_identifier(text: &str) -> Option<String> {
    [&*JSON_ID_PATTERN, &*PLAIN_ID_PATTERN, &*BINDING_ID_PATTERN]
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Last `*.workers.dev` / `*.pages.dev` URL in `text`.
pub fn find_deployed_url(text: &str) -> Option<String> {
    DEPLOYED_URL_PATTERN
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub trait OutputExtractor {
    /// Bumped whenever a matching rule changes.
    fn version(&self) -> u32;
    fn authorization_url(&self, text: &str) -> Option<String>;
    fn identifier(&self, text: &str) -> Option<String>;
    fn deployed_url(&self, text: &str) -> Option<String>;
}

/// Matching rules for wrangler 4.x output.
#[derive(Debug, Clone, Copy, Default)]
pub struct WranglerExtractor;

impl OutputExtractor for WranglerExtractor {
    fn version(&self) -> u32 {
        2
    }

    fn authorization_url(&self, text: &str) -> Option<String> {
        find_authorization_url(text)
    }

    fn identifier(&self, text: &str) -> Option<String> {
        find_identifier(text)
    }

    fn deployed_url(&self, text: &str) -> Option<String> {
        find_deployed_url(text)
    }
}

//! Content filters applied to a message before it is relayed.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::messaging::types::IncomingMessage;

/// Pure message transformation.
///
/// Implementations must be total: content a filter cannot handle is returned
/// unchanged rather than reported as an error.
pub trait ContentFilter: Send + Sync {
    fn process(&self, message: IncomingMessage) -> IncomingMessage;
}

/// Identity filter.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyMessageFilter;

impl ContentFilter for EmptyMessageFilter {
    fn process(&self, message: IncomingMessage) -> IncomingMessage {
        message
    }
}

/// Masks links (and optionally `@mentions`) in message text and captions.
#[derive(Clone, Debug)]
pub struct UrlMessageFilter {
    placeholder: String,
    filter_mentions: bool,
    /// Lowercased domains to mask. Empty means every link is masked.
    blacklist: Vec<String>,
}

impl UrlMessageFilter {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            filter_mentions: false,
            blacklist: Vec::new(),
        }
    }

    pub fn with_mentions(mut self, filter_mentions: bool) -> Self {
        self.filter_mentions = filter_mentions;
        self
    }

    pub fn with_blacklist(mut self, domains: impl IntoIterator<Item = String>) -> Self {
        self.blacklist = domains
            .into_iter()
            .map(|d| d.trim().trim_start_matches("www.").to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    fn should_mask(&self, url: &str) -> bool {
        if self.blacklist.is_empty() {
            return true;
        }
        let host = url_host(url);
        self.blacklist
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }

    fn mask(&self, text: &str) -> String {
        let out = url_regex().replace_all(text, |caps: &regex::Captures<'_>| {
            let url = &caps[0];
            if self.should_mask(url) {
                self.placeholder.clone()
            } else {
                url.to_string()
            }
        });

        if !self.filter_mentions {
            return out.into_owned();
        }

        mention_regex()
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                format!("{}{}", &caps[1], self.placeholder)
            })
            .into_owned()
    }
}

impl ContentFilter for UrlMessageFilter {
    fn process(&self, mut message: IncomingMessage) -> IncomingMessage {
        if message.text.is_empty() {
            return message;
        }
        message.text = self.mask(&message.text);
        message
    }
}

/// Applies filters in order; each one sees the previous one's output.
#[derive(Clone, Default)]
pub struct CompositeMessageFilter {
    filters: Vec<Arc<dyn ContentFilter>>,
}

impl CompositeMessageFilter {
    pub fn new(filters: Vec<Arc<dyn ContentFilter>>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: Arc<dyn ContentFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl ContentFilter for CompositeMessageFilter {
    fn process(&self, message: IncomingMessage) -> IncomingMessage {
        self.filters
            .iter()
            .fold(message, |msg, filter| filter.process(msg))
    }
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:https?://|www\.|t\.me/)[^\s<>]+").expect("valid regex")
    })
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^|[^\w@])@[A-Za-z][A-Za-z0-9_]{3,31}\b").expect("valid regex")
    })
}

fn url_host(url: &str) -> String {
    let lower = url.to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host = rest.split(['/', '?', '#', ':']).next().unwrap_or(rest);
    host.trim_start_matches("www.").to_string()
}

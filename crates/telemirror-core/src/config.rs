use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    domain::ChatId,
    errors::Error,
    filter::{CompositeMessageFilter, ContentFilter, EmptyMessageFilter, UrlMessageFilter},
    messaging::{throttled::ThrottleConfig, types::Subscriptions},
    router::MirrorMapping,
    Result,
};

/// Which content filter to build at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Empty,
    Url,
}

/// Typed configuration, loaded from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub mirror_mapping: MirrorMapping,

    // Behavior flags
    pub disable_edit: bool,
    /// Skips the delete subscription. The Bot API never reports deletions, so
    /// with the Telegram source this only affects the startup log.
    pub disable_delete: bool,

    // Filters
    pub filters: Vec<FilterKind>,
    pub url_placeholder: String,
    pub filter_mentions: bool,
    pub url_blacklist: Vec<String>,

    // Identity store
    pub use_memory_db: bool,
    pub database_path: PathBuf,

    // Albums
    pub album_timeout: Duration,

    // Relay rate limiting
    pub relay_global_interval: Duration,
    pub relay_per_chat_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let mirror_mapping = parse_chat_mapping(&env_str("CHAT_MAPPING").unwrap_or_default())?;
        if mirror_mapping.is_empty() {
            return Err(Error::Config(
                "CHAT_MAPPING environment variable is required".to_string(),
            ));
        }

        let disable_edit = env_bool("DISABLE_EDIT").unwrap_or(false);
        let disable_delete = env_bool("DISABLE_DELETE").unwrap_or(false);

        let filters = parse_filters(&env_str("MESSAGE_FILTER").unwrap_or_default())?;
        let url_placeholder = env_str("URL_PLACEHOLDER")
            .and_then(non_empty)
            .unwrap_or_else(|| "***".to_string());
        let filter_mentions = env_bool("FILTER_MENTIONS").unwrap_or(false);
        let url_blacklist = parse_csv_lower(env_str("URL_BLACKLIST"));

        let use_memory_db = env_bool("USE_MEMORY_DB").unwrap_or(false);
        let database_path = env_path("DATABASE_PATH")
            .unwrap_or_else(|| PathBuf::from("./telemirror-db.json"));

        let album_timeout = Duration::from_millis(env_u64("ALBUM_TIMEOUT_MS").unwrap_or(1000));

        let throttle = ThrottleConfig::default();
        let relay_global_interval = env_u64("RELAY_GLOBAL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(throttle.global_min_interval);
        let relay_per_chat_interval = env_u64("RELAY_PER_CHAT_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(throttle.per_chat_min_interval);

        Ok(Self {
            telegram_bot_token,
            mirror_mapping,
            disable_edit,
            disable_delete,
            filters,
            url_placeholder,
            filter_mentions,
            url_blacklist,
            use_memory_db,
            database_path,
            album_timeout,
            relay_global_interval,
            relay_per_chat_interval,
        })
    }

    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions::new(self.disable_edit, self.disable_delete)
    }

    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            global_min_interval: self.relay_global_interval,
            per_chat_min_interval: self.relay_per_chat_interval,
        }
    }

    /// Build the configured filter chain. A single filter is returned as-is.
    pub fn build_filter(&self) -> Arc<dyn ContentFilter> {
        let mut chain: Vec<Arc<dyn ContentFilter>> = Vec::new();
        for kind in &self.filters {
            match kind {
                FilterKind::Empty => {}
                FilterKind::Url => chain.push(Arc::new(
                    UrlMessageFilter::new(self.url_placeholder.clone())
                        .with_mentions(self.filter_mentions)
                        .with_blacklist(self.url_blacklist.clone()),
                )),
            }
        }

        match chain.len() {
            1 => chain.remove(0),
            0 => Arc::new(EmptyMessageFilter),
            _ => Arc::new(CompositeMessageFilter::new(chain)),
        }
    }
}

/// Parse `source:target1,target2;source2:target3` into a mapping.
///
/// Targets repeated across entries for the same source are appended in order.
pub fn parse_chat_mapping(raw: &str) -> Result<MirrorMapping> {
    let mut mapping = MirrorMapping::new();
    for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((source, targets)) = entry.split_once(':') else {
            return Err(Error::Config(format!(
                "invalid CHAT_MAPPING entry `{entry}`: expected `source:target1,target2`"
            )));
        };

        let source = parse_chat_id(source, entry)?;
        let targets = targets
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|t| parse_chat_id(t, entry))
            .collect::<Result<Vec<_>>>()?;
        if targets.is_empty() {
            return Err(Error::Config(format!(
                "invalid CHAT_MAPPING entry `{entry}`: no target chats"
            )));
        }

        mapping.entry(source).or_default().extend(targets);
    }
    Ok(mapping)
}

fn parse_chat_id(s: &str, entry: &str) -> Result<ChatId> {
    s.trim().parse::<i64>().map(ChatId).map_err(|_| {
        Error::Config(format!(
            "invalid chat id `{}` in CHAT_MAPPING entry `{entry}`",
            s.trim()
        ))
    })
}

fn parse_filters(raw: &str) -> Result<Vec<FilterKind>> {
    let mut out = Vec::new();
    for name in parse_csv_lower(Some(raw.to_string())) {
        let kind = match name.as_str() {
            "empty" | "none" => FilterKind::Empty,
            "url" => FilterKind::Url,
            other => {
                return Err(Error::Config(format!(
                    "unknown MESSAGE_FILTER `{other}` (expected `empty` or `url`)"
                )))
            }
        };
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    if out.is_empty() {
        out.push(FilterKind::Empty);
    }
    Ok(out)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use crate::messaging::types::{EventKind, IncomingMessage};

    fn cfg(filters: Vec<FilterKind>) -> Config {
        // Avoid Config::load() env dependency: hand-roll config.
        Config {
            telegram_bot_token: "x".to_string(),
            mirror_mapping: parse_chat_mapping("100:200,300").unwrap(),
            disable_edit: false,
            disable_delete: true,
            filters,
            url_placeholder: "[x]".to_string(),
            filter_mentions: false,
            url_blacklist: vec![],
            use_memory_db: true,
            database_path: "/tmp/telemirror-test.json".into(),
            album_timeout: Duration::from_millis(1000),
            relay_global_interval: Duration::from_millis(40),
            relay_per_chat_interval: Duration::from_millis(1050),
        }
    }

    #[test]
    fn parses_mapping_with_negative_ids_and_spaces() {
        let m = parse_chat_mapping(" -1001:-1002, -1003 ; 5:6 ;").unwrap();
        assert_eq!(m.get(&ChatId(-1001)), Some(&vec![ChatId(-1002), ChatId(-1003)]));
        assert_eq!(m.get(&ChatId(5)), Some(&vec![ChatId(6)]));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn repeated_source_entries_merge_in_order() {
        let m = parse_chat_mapping("1:2;1:3").unwrap();
        assert_eq!(m.get(&ChatId(1)), Some(&vec![ChatId(2), ChatId(3)]));
    }

    #[test]
    fn rejects_malformed_mapping() {
        assert!(parse_chat_mapping("100").is_err());
        assert!(parse_chat_mapping("abc:1").is_err());
        assert!(parse_chat_mapping("1:x").is_err());
        assert!(parse_chat_mapping("1:").is_err());
        assert!(parse_chat_mapping("").unwrap().is_empty());
    }

    #[test]
    fn parses_filter_list() {
        assert_eq!(parse_filters("").unwrap(), vec![FilterKind::Empty]);
        assert_eq!(parse_filters("URL").unwrap(), vec![FilterKind::Url]);
        assert_eq!(
            parse_filters("none, url, url").unwrap(),
            vec![FilterKind::Empty, FilterKind::Url]
        );
        assert!(parse_filters("profanity").is_err());
    }

    #[test]
    fn parses_bool_flags() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_bool(v));
        }
        for v in ["0", "false", "", "nope"] {
            assert!(!parse_bool(v));
        }
    }

    #[test]
    fn builds_selected_filter() {
        let msg = IncomingMessage::text(MessageId(1), "https://a.b");
        let empty = cfg(vec![FilterKind::Empty]).build_filter();
        assert_eq!(empty.process(msg.clone()).text, "https://a.b");

        let url = cfg(vec![FilterKind::Empty, FilterKind::Url]).build_filter();
        assert_eq!(url.process(msg).text, "[x]");
    }

    #[test]
    fn subscriptions_follow_flags() {
        let c = cfg(vec![FilterKind::Empty]);
        let subs = c.subscriptions();
        assert!(subs.enabled(EventKind::MessageEdited));
        assert!(!subs.enabled(EventKind::MessageDeleted));
        assert_eq!(c.throttle().per_chat_min_interval, Duration::from_millis(1050));
    }
}

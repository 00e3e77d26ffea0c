//! Engine configuration
//!
//! Defaults reproduce the behaviour of the hosted feed: 8 in-flight fetches,
//! 30 second detail caches, a 2 minute create-branch window and timestamps
//! rendered at UTC+08:00.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::error::{FeedError, FeedResult};

const DEFAULT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_CREATE_BRANCH_WINDOW_SECS: u64 = 2 * 60;
const DEFAULT_DISPLAY_OFFSET_SECS: i32 = 8 * 3600;
const DEFAULT_MERGE_STATUS_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MERGE_STATUS_POLL_MS: u64 = 1500;
const DEFAULT_PER_PAGE: u32 = 20;
const DEFAULT_MAX_PER_PAGE: u32 = 100;

/// How long recorded hints are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HintRetention {
    /// Keep every hint for the process lifetime.
    #[default]
    Unbounded,
    /// Keep at most `n` hints, dropping the oldest first.
    Bounded(usize),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum in-flight detail fetches per page
    pub max_concurrency: usize,
    /// Lifetime of cached pipeline and commit detail
    pub cache_ttl: Duration,
    /// How far before a create-branch hint a pipeline may start and still match
    pub create_branch_window: Duration,
    /// Zone used to render `created_at`
    pub display_offset: FixedOffset,
    /// Give up waiting for the service's mergeability check after this long
    pub merge_status_timeout: Duration,
    /// Delay between mergeability polls
    pub merge_status_poll: Duration,
    /// Page size used when the caller passes 0
    pub default_per_page: u32,
    /// Upper clamp for requested page sizes
    pub max_per_page: u32,
    pub hint_retention: HintRetention,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            create_branch_window: Duration::from_secs(DEFAULT_CREATE_BRANCH_WINDOW_SECS),
            display_offset: FixedOffset::east_opt(DEFAULT_DISPLAY_OFFSET_SECS)
                .unwrap_or_else(|| Utc.fix()),
            merge_status_timeout: Duration::from_secs(DEFAULT_MERGE_STATUS_TIMEOUT_SECS),
            merge_status_poll: Duration::from_millis(DEFAULT_MERGE_STATUS_POLL_MS),
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: DEFAULT_MAX_PER_PAGE,
            hint_retention: HintRetention::Unbounded,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `PIPEFEED_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse::<usize>("PIPEFEED_MAX_CONCURRENCY") {
            config.max_concurrency = n;
        }
        if let Some(secs) = env_parse::<u64>("PIPEFEED_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<i32>("PIPEFEED_DISPLAY_OFFSET_SECS") {
            if let Some(offset) = FixedOffset::east_opt(secs) {
                config.display_offset = offset;
            }
        }
        if let Some(n) = env_parse::<usize>("PIPEFEED_HINT_RETENTION") {
            config.hint_retention = HintRetention::Bounded(n);
        }
        config
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn with_hint_retention(mut self, retention: HintRetention) -> Self {
        self.hint_retention = retention;
        self
    }

    pub fn with_merge_status_timing(mut self, timeout: Duration, poll: Duration) -> Self {
        self.merge_status_timeout = timeout;
        self.merge_status_poll = poll;
        self
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.max_concurrency == 0 {
            return Err(FeedError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.default_per_page == 0 || self.max_per_page == 0 {
            return Err(FeedError::Config("page sizes must be positive".to_string()));
        }
        if self.default_per_page > self.max_per_page {
            return Err(FeedError::Config(format!(
                "default_per_page {} exceeds max_per_page {}",
                self.default_per_page, self.max_per_page
            )));
        }
        if self.hint_retention == HintRetention::Bounded(0) {
            return Err(FeedError::Config(
                "bounded hint retention needs room for at least one hint".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

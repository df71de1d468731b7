use std::time::Duration;

/// Failed attempts allowed per send before the error annotation is written.
pub const MAX_ATTEMPTS: u32 = 3;
/// Backoff grows linearly: `RETRY_BACKOFF_BASE × attempt_number`.
pub const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(1000);
/// Delta flush throttle in the primary chat context.
pub const PRIMARY_FLUSH_INTERVAL: Duration = Duration::from_millis(50);
/// Delta flush throttle in the ephemeral (temporary) chat context.
pub const EPHEMERAL_FLUSH_INTERVAL: Duration = Duration::from_millis(25);
/// Extra server content length required before a same-length-class server
/// echo may replace a local message list.
pub const RECONCILE_SLACK_MARGIN: usize = 10;
/// How long a local-only conversation survives reconciliation before it is
/// assumed server-confirmed-deleted.
pub const LOCAL_FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// Which chat surface this client drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatContext {
    #[default]
    Primary,
    /// Temporary chat: never persisted until explicitly saved.
    Ephemeral,
}

impl ChatContext {
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        match self {
            Self::Primary => PRIMARY_FLUSH_INTERVAL,
            Self::Ephemeral => EPHEMERAL_FLUSH_INTERVAL,
        }
    }
}

/// Runtime configuration for the session core.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub context: ChatContext,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub slack_margin: usize,
    pub freshness_window: Duration,
    /// Optional per-attempt stall watchdog. A stream delivering no chunk
    /// within the window counts as a transport error against the retry
    /// budget. Disabled by default: the transport's own timeouts apply.
    pub stall_timeout: Option<Duration>,
    /// Ask the gateway to include supplementary web-search context.
    pub web_search: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context: ChatContext::Primary,
            max_attempts: MAX_ATTEMPTS,
            backoff_base: RETRY_BACKOFF_BASE,
            slack_margin: RECONCILE_SLACK_MARGIN,
            freshness_window: LOCAL_FRESHNESS_WINDOW,
            stall_timeout: None,
            web_search: false,
        }
    }
}

impl ChatConfig {
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            context: ChatContext::Ephemeral,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: ChatContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = Some(stall_timeout);
        self
    }

    #[must_use]
    pub fn with_web_search(mut self, web_search: bool) -> Self {
        self.web_search = web_search;
        self
    }
}

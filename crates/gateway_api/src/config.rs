use std::time::Duration;

use crate::url::DEFAULT_GATEWAY_BASE_URL;

/// Transport configuration for gateway requests.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bearer token passed to `Authorization`.
    pub access_token: String,
    /// Base URL for gateway endpoints.
    pub base_url: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Optional request timeout.
    pub timeout: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            user_agent: None,
            timeout: None,
        }
    }
}

impl GatewayConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

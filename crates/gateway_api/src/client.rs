use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use chat_backend::{ByteStream, StreamRequest, StreamTransport, TransportError};

use crate::config::GatewayConfig;
use crate::error::{parse_error_message, GatewayError};
use crate::payload::GatewayRequest;
use crate::url::normalize_gateway_url;

/// HTTP transport for the gateway chat-stream endpoint.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(GatewayError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_gateway_url(&self.config.base_url)
    }

    fn build_headers(&self) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", self.config.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|_| GatewayError::InvalidBaseUrl("invalid access token bytes".to_string()))?,
        );
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            headers.insert(
                USER_AGENT,
                HeaderValue::from_str(user_agent).map_err(|_| {
                    GatewayError::InvalidBaseUrl(format!("invalid user agent: {user_agent}"))
                })?,
            );
        }
        Ok(headers)
    }

    async fn open_stream(self, request: StreamRequest) -> Result<ByteStream, GatewayError> {
        if self.config.access_token.trim().is_empty() {
            return Err(GatewayError::MissingAccessToken);
        }

        let headers = self.build_headers()?;
        let payload = GatewayRequest::from_stream_request(&request);
        let response = self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(GatewayError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status(status, parse_error_message(status, &body)));
        }

        let bytes = response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(|error| TransportError::Interrupted(error.to_string()))
            .boxed();
        Ok(bytes)
    }
}

impl StreamTransport for GatewayClient {
    fn open(&self, request: StreamRequest) -> BoxFuture<'static, Result<ByteStream, TransportError>> {
        let client = self.clone();
        async move {
            client
                .open_stream(request)
                .await
                .map_err(TransportError::from)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use chat_backend::{StreamRequest, StreamTransport, TransportError};

    use super::{GatewayClient, GatewayConfig};

    #[tokio::test]
    async fn open_without_token_is_rejected_before_any_request() {
        let client = GatewayClient::new(GatewayConfig::default())
            .expect("client should build from defaults");
        let request = StreamRequest {
            messages: Vec::new(),
            model_id: "fast-1".to_string(),
            web_search: false,
        };

        let error = client
            .open(request)
            .await
            .err()
            .expect("missing token must reject synchronously");
        assert!(matches!(error, TransportError::Unauthorized(_)));
    }

    #[test]
    fn endpoint_is_normalized_from_config_base() {
        let config = GatewayConfig::new("token").with_base_url("https://gw.example.com/v1/chat");
        let client = GatewayClient::new(config).expect("client should build");
        assert_eq!(
            client.normalized_endpoint(),
            "https://gw.example.com/v1/chat/stream"
        );
    }
}

use std::fmt;

use chat_backend::TransportError;
use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug)]
pub enum GatewayError {
    MissingAccessToken,
    InvalidBaseUrl(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Chunk(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAccessToken => write!(f, "access token is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Chunk(message) => write!(f, "stream chunk failure: {message}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<GatewayError> for TransportError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::MissingAccessToken => {
                Self::Unauthorized("access token is required".to_string())
            }
            GatewayError::Status(status, message)
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                Self::Unauthorized(message)
            }
            GatewayError::Status(status, message) => Self::Status {
                code: status.as_u16(),
                message,
            },
            GatewayError::Request(error) => Self::Connect(error.to_string()),
            GatewayError::InvalidBaseUrl(value) => Self::Connect(format!("invalid base URL: {value}")),
            GatewayError::Chunk(message) => Self::Interrupted(message),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub message: Option<String>,
}

/// Extract a human-readable message from a non-success response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload
            .value
            .and_then(|fields| fields.message)
            .filter(|message| !message.is_empty())
        {
            return message;
        }
    }

    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chat_backend::TransportError;
    use reqwest::StatusCode;

    use super::{parse_error_message, GatewayError};

    #[test]
    fn parse_error_message_prefers_structured_payload() {
        let body = r#"{"error":{"message":"model overloaded"}}"#;
        assert_eq!(
            parse_error_message(StatusCode::SERVICE_UNAVAILABLE, body),
            "model overloaded"
        );
    }

    #[test]
    fn parse_error_message_falls_back_to_body_then_reason() {
        assert_eq!(
            parse_error_message(StatusCode::BAD_GATEWAY, "upstream connect error"),
            "upstream connect error"
        );
        assert_eq!(
            parse_error_message(StatusCode::BAD_GATEWAY, ""),
            "Bad Gateway"
        );
    }

    #[test]
    fn auth_statuses_map_to_unauthorized_transport_error() {
        let error: TransportError =
            GatewayError::Status(StatusCode::UNAUTHORIZED, "bad token".to_string()).into();
        assert!(error.is_unauthorized());

        let error: TransportError =
            GatewayError::Status(StatusCode::INTERNAL_SERVER_ERROR, "oops".to_string()).into();
        assert_eq!(
            error,
            TransportError::Status {
                code: 500,
                message: "oops".to_string(),
            }
        );
    }
}

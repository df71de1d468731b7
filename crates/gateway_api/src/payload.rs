use chat_backend::{MessagePart, Role, StreamRequest};
use serde::{Deserialize, Serialize};

/// Canonical request payload shape for the gateway chat-stream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub model: String,
    pub messages: Vec<GatewayMessage>,
    /// Default: true.
    #[serde(default = "default_true")]
    pub stream: bool,
    /// Include supplementary web-search context in the generation.
    #[serde(default)]
    pub web_search: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub role: Role,
    pub content: GatewayContent,
}

/// Plain text for simple messages, typed parts for attachment-bearing ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GatewayContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

impl GatewayRequest {
    /// Builds the wire payload from a transport-neutral stream request.
    #[must_use]
    pub fn from_stream_request(request: &StreamRequest) -> Self {
        let messages = request
            .messages
            .iter()
            .map(|message| GatewayMessage {
                role: message.role,
                content: collapse_parts(&message.parts),
            })
            .collect();

        Self {
            model: request.model_id.clone(),
            messages,
            stream: true,
            web_search: request.web_search,
        }
    }
}

/// A lone text part serializes as a plain string for wire compatibility.
fn collapse_parts(parts: &[MessagePart]) -> GatewayContent {
    match parts {
        [MessagePart::Text { text }] => GatewayContent::Text(text.clone()),
        _ => GatewayContent::Parts(parts.to_vec()),
    }
}

/// Default base URL for gateway transport requests.
pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.streamchat.dev";

/// Expands a configured base URL into the chat-stream endpoint.
///
/// Deployments configure anything from a bare host to the full endpoint,
/// so bases already ending in `/chat/stream` pass through, a `/chat` base
/// gains only the `/stream` segment, and everything else gets the full
/// `/v1/chat/stream` path. Blank input and non-http(s) schemes fall back
/// to [`DEFAULT_GATEWAY_BASE_URL`] rather than producing an endpoint the
/// transport could never dial.
pub fn normalize_gateway_url(input: &str) -> String {
    let trimmed = input.trim();
    let base = if is_http_base(trimmed) {
        trimmed
    } else {
        DEFAULT_GATEWAY_BASE_URL
    };

    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/stream") {
        return base.to_string();
    }
    if base.ends_with("/chat") {
        return format!("{base}/stream");
    }
    format!("{base}/v1/chat/stream")
}

fn is_http_base(input: &str) -> bool {
    input
        .strip_prefix("http://")
        .or_else(|| input.strip_prefix("https://"))
        .is_some_and(|rest| !rest.is_empty())
}

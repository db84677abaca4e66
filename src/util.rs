use axum::http::HeaderMap;

/// Bearer token from the `Authorization` header, if present and non-empty.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// First characters of an id, for receipts and log lines.
pub fn short_id(id: &str, len: usize) -> String {
    id.chars().filter(|c| c.is_ascii_alphanumeric()).take(len).collect()
}

use axum::http::HeaderMap;

// HTTP helpers
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

// 日志里只保留令牌的首尾片段
pub fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        return "****".to_string();
    }
    let (start, end) = (&token[..4], &token[token.len() - 4..]);
    format!("{}****{}", start, end)
}

use chrono::{DateTime, Utc};

/// One audit row per HTTP operation; append-only.
#[derive(Debug, Clone)]
pub struct RequestLog {
    #[allow(dead_code)]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub operation: String,
    pub user_id: Option<String>,
    pub status_code: u16,
    pub response_time_ms: i64,
    pub error: Option<String>,
}

use crate::logging::RequestLog;
use crate::server::AppState;
use chrono::{DateTime, Utc};

// 每个 HTTP 操作落一条审计日志；写失败只告警，不影响响应
#[allow(clippy::too_many_arguments)]
pub async fn log_simple_request(
    app_state: &AppState,
    start_time: DateTime<Utc>,
    method: &str,
    path: &str,
    operation: &str,
    user_id: Option<&str>,
    status_code: u16,
    error: Option<String>,
) {
    let end_time = Utc::now();
    let response_time_ms = (end_time - start_time).num_milliseconds();

    let log = RequestLog {
        id: None,
        timestamp: start_time,
        method: method.to_string(),
        path: path.to_string(),
        operation: operation.to_string(),
        user_id: user_id.map(|s| s.to_string()),
        status_code,
        response_time_ms,
        error,
    };

    if let Err(e) = app_state.log_store.log_request(log).await {
        tracing::error!("Failed to log request: {}", e);
    }
}

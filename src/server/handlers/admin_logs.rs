use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;

use super::auth::require_superadmin;
use crate::error::LawdeskError;
use crate::logging::time::to_iso8601_utc_string;
use crate::server::AppState;
use crate::server::request_logging::log_simple_request;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

pub async fn list_request_logs(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_superadmin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                "/admin/logs/requests",
                "admin_logs_requests",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let logs = app_state.log_store.list_recent_logs(limit).await?;
    let items: Vec<serde_json::Value> = logs
        .iter()
        .map(|l| {
            serde_json::json!({
                "timestamp": to_iso8601_utc_string(&l.timestamp),
                "method": l.method,
                "path": l.path,
                "operation": l.operation,
                "userId": l.user_id,
                "statusCode": l.status_code,
                "responseTimeMs": l.response_time_ms,
                "error": l.error,
            })
        })
        .collect();

    log_simple_request(
        &app_state,
        start_time,
        "GET",
        "/admin/logs/requests",
        "admin_logs_requests",
        Some(&claims.sub),
        200,
        None,
    )
    .await;
    Ok(Json(serde_json::json!({ "logs": items })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::DatabaseLogger;
    use crate::server::handlers::auth::{issue_access_token, test_claims};
    use crate::users::UserRole;
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;
    use tempfile::tempdir;

    #[tokio::test]
    async fn log_listing_is_superadmin_only_and_records_itself() {
        unsafe {
            std::env::set_var("LD_JWT_SECRET", "testsecret");
        }
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let logger = Arc::new(
            DatabaseLogger::new(db_path.to_str().unwrap()).await.unwrap(),
        );
        let state = Arc::new(AppState {
            config: crate::config::Settings::default(),
            log_store: logger.clone(),
            user_store: logger.clone(),
            payment_store: logger.clone(),
            settings_store: logger,
        });

        let err = list_request_logs(
            State(state.clone()),
            HeaderMap::new(),
            Query(LogsQuery { limit: None }),
        )
        .await;
        assert!(matches!(err, Err(LawdeskError::Unauthorized(_))));

        let token = issue_access_token(&test_claims("root", UserRole::Superadmin)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let Json(out) = list_request_logs(
            State(state.clone()),
            headers.clone(),
            Query(LogsQuery { limit: Some(10) }),
        )
        .await
        .unwrap();
        // 上面失败的那次也已入审计日志
        assert!(!out["logs"].as_array().unwrap().is_empty());
    }
}

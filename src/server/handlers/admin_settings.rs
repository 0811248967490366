use axum::{Json, extract::State, http::HeaderMap};
use chrono::Utc;
use std::sync::Arc;

use super::auth::require_superadmin;
use crate::error::LawdeskError;
use crate::logging::time::to_iso8601_utc_string;
use crate::payments::{PricingSettings, PricingSettingsRecord};
use crate::server::AppState;
use crate::server::request_logging::log_simple_request;

fn record_json(rec: &PricingSettingsRecord) -> serde_json::Value {
    serde_json::json!({
        "settings": rec.settings,
        "updatedAt": to_iso8601_utc_string(&rec.updated_at),
        "updatedBy": rec.updated_by,
    })
}

pub async fn get_settings(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
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
                "/payments/admin/settings",
                "admin_settings_get",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let rec = app_state.settings_store.get_pricing_settings().await?;
    log_simple_request(
        &app_state,
        start_time,
        "GET",
        "/payments/admin/settings",
        "admin_settings_get",
        Some(&claims.sub),
        200,
        None,
    )
    .await;
    Ok(Json(record_json(&rec)))
}

pub async fn put_settings(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(settings): Json<PricingSettings>,
) -> Result<Json<serde_json::Value>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_superadmin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "PUT",
                "/payments/admin/settings",
                "admin_settings_put",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    match app_state
        .settings_store
        .put_pricing_settings(settings, Some(claims.sub.clone()))
        .await
    {
        Ok(rec) => {
            log_simple_request(
                &app_state,
                start_time,
                "PUT",
                "/payments/admin/settings",
                "admin_settings_put",
                Some(&claims.sub),
                200,
                None,
            )
            .await;
            Ok(Json(record_json(&rec)))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "PUT",
                "/payments/admin/settings",
                "admin_settings_put",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

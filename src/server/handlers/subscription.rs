use axum::{Json, extract::State, http::HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::{AccessTokenClaims, require_user};
use crate::entitlement;
use crate::error::LawdeskError;
use crate::logging::time::to_iso8601_utc_string;
use crate::server::AppState;
use crate::server::request_logging::log_simple_request;
use crate::subscription::Subscription;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOut {
    pub is_active: bool,
    pub is_trial: bool,
    pub started_at: Option<String>,
    pub expires_at: Option<String>,
}

impl From<&Subscription> for SubscriptionOut {
    fn from(sub: &Subscription) -> Self {
        Self {
            is_active: sub.is_active,
            is_trial: sub.is_trial,
            started_at: sub.started_at.as_ref().map(to_iso8601_utc_string),
            expires_at: sub.expires_at.as_ref().map(to_iso8601_utc_string),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetUserBody {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_trial: bool,
    #[serde(default)]
    pub duration_days: Option<i64>,
}

// self 或 admin 代办：跨用户操作要求后台角色
fn resolve_target(
    claims: &AccessTokenClaims,
    user_id: Option<String>,
) -> Result<String, LawdeskError> {
    match user_id {
        Some(target) if target != claims.sub => match claims.parsed_role() {
            Some(role) if role.is_privileged() => Ok(target),
            _ => Err(LawdeskError::Forbidden(
                "acting on another user requires an admin role".into(),
            )),
        },
        Some(target) => Ok(target),
        None => Ok(claims.sub.clone()),
    }
}

pub async fn status(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_user(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                "/subscription/status",
                "subscription_status",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let user = app_state
        .user_store
        .get_user(&claims.sub)
        .await?
        .ok_or_else(|| LawdeskError::Unauthorized("invalid credentials".into()))?;

    // 每次请求都重新判定；过期只取决于 now，无需任何状态迁移
    let decision = entitlement::resolve(user.role, &user.subscription, Utc::now());

    log_simple_request(
        &app_state,
        start_time,
        "GET",
        "/subscription/status",
        "subscription_status",
        Some(&claims.sub),
        200,
        None,
    )
    .await;

    Ok(Json(serde_json::json!({
        "usable": decision.usable,
        "reason": decision.reason.as_str(),
        "daysRemaining": decision.days_remaining,
        "subscription": SubscriptionOut::from(&user.subscription),
    })))
}

pub async fn start(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<StartBody>,
) -> Result<Json<serde_json::Value>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_user(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/start",
                "subscription_start",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let outcome: Result<(String, Subscription), LawdeskError> = async {
        let target = resolve_target(&claims, body.user_id)?;
        let duration_days = body
            .duration_days
            .unwrap_or(if body.is_trial { 7 } else { 30 });
        let sub = app_state
            .user_store
            .activate_subscription(&target, duration_days, body.is_trial)
            .await?
            .ok_or_else(|| LawdeskError::NotFound("user not found".into()))?;
        Ok((target, sub))
    }
    .await;

    match outcome {
        Ok((target, sub)) => {
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/start",
                "subscription_start",
                Some(&claims.sub),
                200,
                None,
            )
            .await;
            Ok(Json(serde_json::json!({
                "userId": target,
                "subscription": SubscriptionOut::from(&sub),
            })))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/start",
                "subscription_start",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

pub async fn renew(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TargetUserBody>,
) -> Result<Json<serde_json::Value>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_user(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/renew",
                "subscription_renew",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let outcome: Result<(String, Subscription), LawdeskError> = async {
        let target = resolve_target(&claims, body.user_id)?;
        // 续期时长：沿用最近一次已批准请求的套餐，否则默认 30 天
        let duration_days = app_state
            .payment_store
            .latest_approved_plan(&target)
            .await?
            .map(|plan| plan.days())
            .unwrap_or(30);
        let sub = app_state
            .user_store
            .activate_subscription(&target, duration_days, false)
            .await?
            .ok_or_else(|| LawdeskError::NotFound("user not found".into()))?;
        Ok((target, sub))
    }
    .await;

    match outcome {
        Ok((target, sub)) => {
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/renew",
                "subscription_renew",
                Some(&claims.sub),
                200,
                None,
            )
            .await;
            Ok(Json(serde_json::json!({
                "userId": target,
                "subscription": SubscriptionOut::from(&sub),
            })))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/renew",
                "subscription_renew",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

pub async fn cancel(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TargetUserBody>,
) -> Result<Json<serde_json::Value>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_user(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/cancel",
                "subscription_cancel",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let outcome: Result<(String, Subscription), LawdeskError> = async {
        let target = resolve_target(&claims, body.user_id)?;
        let sub = app_state
            .user_store
            .cancel_subscription(&target)
            .await?
            .ok_or_else(|| LawdeskError::NotFound("user not found".into()))?;
        Ok((target, sub))
    }
    .await;

    match outcome {
        Ok((target, sub)) => {
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/cancel",
                "subscription_cancel",
                Some(&claims.sub),
                200,
                None,
            )
            .await;
            Ok(Json(serde_json::json!({
                "userId": target,
                "subscription": SubscriptionOut::from(&sub),
            })))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/subscription/cancel",
                "subscription_cancel",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

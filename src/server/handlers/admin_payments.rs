use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use super::auth::{require_admin, require_superadmin};
use super::payments::PaymentRequestOut;
use super::subscription::SubscriptionOut;
use crate::error::LawdeskError;
use crate::payments::PaymentStatus;
use crate::server::AppState;
use crate::server::request_logging::log_simple_request;

pub async fn list_pending(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PaymentRequestOut>>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_admin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                "/payments/admin/pending",
                "admin_payments_pending",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let requests = app_state
        .payment_store
        .list_payment_requests(Some(PaymentStatus::Pending))
        .await?
        .into_iter()
        .map(PaymentRequestOut::from)
        .collect();

    log_simple_request(
        &app_state,
        start_time,
        "GET",
        "/payments/admin/pending",
        "admin_payments_pending",
        Some(&claims.sub),
        200,
        None,
    )
    .await;
    Ok(Json(requests))
}

#[derive(Debug, Deserialize)]
pub struct ListAllQuery {
    #[serde(default)]
    pub status: Option<String>,
}

pub async fn list_all(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListAllQuery>,
) -> Result<Json<Vec<PaymentRequestOut>>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_admin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                "/payments/admin/all",
                "admin_payments_all",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let outcome: Result<Vec<PaymentRequestOut>, LawdeskError> = async {
        let status = query
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                PaymentStatus::parse(s).ok_or_else(|| {
                    LawdeskError::InvalidArgument(format!("unknown status filter `{}`", s))
                })
            })
            .transpose()?;
        Ok(app_state
            .payment_store
            .list_payment_requests(status)
            .await?
            .into_iter()
            .map(PaymentRequestOut::from)
            .collect())
    }
    .await;

    match outcome {
        Ok(requests) => {
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                "/payments/admin/all",
                "admin_payments_all",
                Some(&claims.sub),
                200,
                None,
            )
            .await;
            Ok(Json(requests))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                "/payments/admin/all",
                "admin_payments_all",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBody {
    #[serde(default)]
    pub admin_note: Option<String>,
}

pub async fn approve(
    Path(id): Path<String>,
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ReviewBody>,
) -> Result<Json<serde_json::Value>, LawdeskError> {
    let start_time = Utc::now();
    let path = format!("/payments/admin/{}/approve", id);
    let claims = match require_superadmin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                &path,
                "admin_payments_approve",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let note = body
        .admin_note
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    match app_state
        .payment_store
        .approve_payment_request(&id, &claims.sub, note)
        .await
    {
        Ok((request, subscription)) => {
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                &path,
                "admin_payments_approve",
                Some(&claims.sub),
                200,
                None,
            )
            .await;
            Ok(Json(serde_json::json!({
                "request": PaymentRequestOut::from(request),
                "subscription": SubscriptionOut::from(&subscription),
            })))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                &path,
                "admin_payments_approve",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

pub async fn reject(
    Path(id): Path<String>,
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ReviewBody>,
) -> Result<Json<PaymentRequestOut>, LawdeskError> {
    let start_time = Utc::now();
    let path = format!("/payments/admin/{}/reject", id);
    let claims = match require_superadmin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                &path,
                "admin_payments_reject",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let note = body.admin_note.unwrap_or_default();
    match app_state
        .payment_store
        .reject_payment_request(&id, &claims.sub, &note)
        .await
    {
        Ok(request) => {
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                &path,
                "admin_payments_reject",
                Some(&claims.sub),
                200,
                None,
            )
            .await;
            Ok(Json(PaymentRequestOut::from(request)))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                &path,
                "admin_payments_reject",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

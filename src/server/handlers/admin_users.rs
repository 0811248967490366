use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::auth::require_superadmin;
use super::subscription::SubscriptionOut;
use crate::error::LawdeskError;
use crate::logging::time::to_iso8601_utc_string;
use crate::server::AppState;
use crate::server::request_logging::log_simple_request;
use crate::users::{CreateUserPayload, User};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOut {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub role: crate::users::UserRole,
    pub subscription: SubscriptionOut,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserOut {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            phone_number: u.phone_number,
            role: u.role,
            subscription: SubscriptionOut::from(&u.subscription),
            created_at: to_iso8601_utc_string(&u.created_at),
            updated_at: to_iso8601_utc_string(&u.updated_at),
        }
    }
}

pub async fn list_users(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserOut>>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_superadmin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                "/admin/users",
                "admin_users_list",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let users = app_state
        .user_store
        .list_users()
        .await?
        .into_iter()
        .map(UserOut::from)
        .collect();
    log_simple_request(
        &app_state,
        start_time,
        "GET",
        "/admin/users",
        "admin_users_list",
        Some(&claims.sub),
        200,
        None,
    )
    .await;
    Ok(Json(users))
}

pub async fn get_user(
    Path(id): Path<String>,
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserOut>, LawdeskError> {
    let start_time = Utc::now();
    let path = format!("/admin/users/{}", id);
    let claims = match require_superadmin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                &path,
                "admin_users_get",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    match app_state.user_store.get_user(&id).await? {
        Some(u) => {
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                &path,
                "admin_users_get",
                Some(&claims.sub),
                200,
                None,
            )
            .await;
            Ok(Json(UserOut::from(u)))
        }
        None => {
            let ge = LawdeskError::NotFound("user not found".into());
            let code = ge.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                &path,
                "admin_users_get",
                Some(&claims.sub),
                code,
                Some(ge.to_string()),
            )
            .await;
            Err(ge)
        }
    }
}

pub async fn create_user(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserPayload>,
) -> Result<(axum::http::StatusCode, Json<UserOut>), LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_superadmin(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/admin/users",
                "admin_users_create",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    match app_state.user_store.create_user(payload).await {
        Ok(user) => {
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/admin/users",
                "admin_users_create",
                Some(&claims.sub),
                201,
                None,
            )
            .await;
            Ok((axum::http::StatusCode::CREATED, Json(UserOut::from(user))))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/admin/users",
                "admin_users_create",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

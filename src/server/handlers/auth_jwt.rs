use axum::{Json, extract::State, http::HeaderMap};
use chrono::{Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::{AccessTokenClaims, ensure_access_token, issue_access_token, jwt_ttl_secs};
use crate::error::{LawdeskError, Result as AppResult};
use crate::server::AppState;
use crate::users::{CreateUserPayload, UserRole, verify_password};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_at: String,
    pub user: AuthUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub expires_at: String,
    pub user: AuthUser,
}

fn claims_to_user(claims: &AccessTokenClaims) -> AuthUser {
    AuthUser {
        id: claims.sub.clone(),
        email: claims.email.clone(),
        role: claims.role.clone(),
    }
}

fn issue_for(id: String, email: String, role: UserRole) -> AppResult<(String, String, AuthUser)> {
    let now = Utc::now();
    let exp = now + Duration::seconds(jwt_ttl_secs() as i64);
    let claims = AccessTokenClaims {
        sub: id,
        email,
        role: role.as_str().to_string(),
        exp: exp.timestamp(),
        iat: Some(now.timestamp()),
    };
    let token = issue_access_token(&claims)?;
    Ok((token, exp.to_rfc3339(), claims_to_user(&claims)))
}

pub async fn register(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<LoginResponse>> {
    if payload.password.trim().is_empty() {
        return Err(LawdeskError::InvalidArgument("password is required".into()));
    }

    let user = app_state
        .user_store
        .create_user(CreateUserPayload {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            phone_number: payload.phone_number,
            password: Some(payload.password),
            role: UserRole::Viewer,
        })
        .await?;

    let (access_token, expires_at, auth_user) = issue_for(user.id, user.email, user.role)?;
    Ok(Json(LoginResponse {
        access_token,
        expires_at,
        user: auth_user,
    }))
}

pub async fn login(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let auth = app_state
        .user_store
        .get_auth_by_email(&payload.email)
        .await?
        .ok_or_else(|| LawdeskError::Unauthorized("invalid credentials".into()))?;

    let ok = auth
        .password_hash
        .as_deref()
        .map(|hash| verify_password(&payload.password, hash))
        .unwrap_or(false);
    if !ok {
        return Err(LawdeskError::Unauthorized("invalid credentials".into()));
    }

    let (access_token, expires_at, auth_user) = issue_for(auth.id, auth.email, auth.role)?;
    Ok(Json(LoginResponse {
        access_token,
        expires_at,
        user: auth_user,
    }))
}

pub async fn me(headers: HeaderMap) -> AppResult<Json<MeResponse>> {
    let claims = ensure_access_token(&headers)?;
    let exp = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Ok(Json(MeResponse {
        expires_at: exp.to_rfc3339(),
        user: claims_to_user(&claims),
    }))
}

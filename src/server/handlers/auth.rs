use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::LawdeskError;
use crate::server::util::{bearer_token, mask_token};
use crate::users::UserRole;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl AccessTokenClaims {
    pub fn parsed_role(&self) -> Option<UserRole> {
        UserRole::parse(&self.role)
    }
}

fn jwt_secret() -> Result<String, LawdeskError> {
    std::env::var("LD_JWT_SECRET")
        .map_err(|_| LawdeskError::Config("missing env `LD_JWT_SECRET`".into()))
}

pub fn jwt_ttl_secs() -> u64 {
    std::env::var("LD_JWT_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600)
}

fn hmac_for(secret: &str) -> Result<HmacSha256, LawdeskError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| LawdeskError::Config("invalid JWT secret".into()))
}

// 紧凑 JWS（HS256）：header.payload.signature，base64url 无填充
pub fn issue_access_token(claims: &AccessTokenClaims) -> Result<String, LawdeskError> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let message = format!("{}.{}", header, payload);
    let mut mac = hmac_for(&jwt_secret()?)?;
    mac.update(message.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", message, signature))
}

pub fn decode_access_token(token: &str) -> Result<AccessTokenClaims, LawdeskError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(LawdeskError::Unauthorized("malformed access token".into()));
    };

    let message = format!("{}.{}", header, payload);
    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| LawdeskError::Unauthorized("malformed access token".into()))?;
    let mut mac = hmac_for(&jwt_secret()?)?;
    mac.update(message.as_bytes());
    mac.verify_slice(&signature_bytes)
        .map_err(|_| LawdeskError::Unauthorized("invalid token signature".into()))?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| LawdeskError::Unauthorized("malformed access token".into()))?;
    let claims: AccessTokenClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| LawdeskError::Unauthorized("invalid token payload".into()))?;

    if Utc::now().timestamp() >= claims.exp {
        return Err(LawdeskError::Unauthorized("token expired".into()));
    }
    Ok(claims)
}

pub fn ensure_access_token(headers: &HeaderMap) -> Result<AccessTokenClaims, LawdeskError> {
    let Some(token) = bearer_token(headers) else {
        return Err(LawdeskError::Unauthorized("missing bearer token".into()));
    };
    decode_access_token(&token).inspect_err(|e| {
        tracing::debug!("rejected access token {}: {}", mask_token(&token), e);
    })
}

/// Any authenticated identity.
pub fn require_user(headers: &HeaderMap) -> Result<AccessTokenClaims, LawdeskError> {
    ensure_access_token(headers)
}

/// Back-office identity: admin or superadmin.
pub fn require_admin(headers: &HeaderMap) -> Result<AccessTokenClaims, LawdeskError> {
    let claims = ensure_access_token(headers)?;
    match claims.parsed_role() {
        Some(role) if role.is_privileged() => Ok(claims),
        _ => Err(LawdeskError::Forbidden("admin role required".into())),
    }
}

pub fn require_superadmin(headers: &HeaderMap) -> Result<AccessTokenClaims, LawdeskError> {
    let claims = ensure_access_token(headers)?;
    match claims.parsed_role() {
        Some(UserRole::Superadmin) => Ok(claims),
        _ => Err(LawdeskError::Forbidden("superadmin role required".into())),
    }
}

#[cfg(test)]
pub(crate) fn test_claims(sub: &str, role: UserRole) -> AccessTokenClaims {
    let now = Utc::now();
    AccessTokenClaims {
        sub: sub.to_string(),
        email: format!("{}@example.com", sub),
        role: role.as_str().to_string(),
        exp: (now + chrono::Duration::minutes(30)).timestamp(),
        iat: Some(now.timestamp()),
    }
}

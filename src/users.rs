use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::password_hash::rand_core::OsRng;
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LawdeskError;
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Viewer,
    Assistant,
    Lawyer,
    Admin,
    Superadmin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Viewer => "viewer",
            UserRole::Assistant => "assistant",
            UserRole::Lawyer => "lawyer",
            UserRole::Admin => "admin",
            UserRole::Superadmin => "superadmin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(UserRole::Viewer),
            "assistant" => Some(UserRole::Assistant),
            "lawyer" => Some(UserRole::Lawyer),
            "admin" => Some(UserRole::Admin),
            "superadmin" => Some(UserRole::Superadmin),
            _ => None,
        }
    }

    /// Back-office roles: exempt from subscription checks and barred from
    /// the payment queue.
    pub fn is_privileged(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Superadmin)
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub role: UserRole,
    pub subscription: Subscription,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserPayload {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_role_viewer")]
    pub role: UserRole,
}

fn default_role_viewer() -> UserRole {
    UserRole::Viewer
}

/// Minimal projection used by the login flow.
#[derive(Debug, Clone)]
pub struct UserAuthRecord {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub password_hash: Option<String>,
}

pub fn hash_password(plain: &str) -> Result<String, LawdeskError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| LawdeskError::PasswordHash(e.to_string()))
}

pub fn verify_password(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, payload: CreateUserPayload) -> Result<User, LawdeskError>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, LawdeskError>;
    async fn get_auth_by_email(&self, email: &str)
    -> Result<Option<UserAuthRecord>, LawdeskError>;
    async fn list_users(&self) -> Result<Vec<User>, LawdeskError>;

    /// Activation/renewal engine write: recomputes the embedded
    /// subscription and replaces it. `None` when the user does not exist.
    async fn activate_subscription(
        &self,
        user_id: &str,
        duration_days: i64,
        is_trial: bool,
    ) -> Result<Option<Subscription>, LawdeskError>;

    async fn cancel_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, LawdeskError>;
}

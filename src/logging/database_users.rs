use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::error::LawdeskError;
use crate::logging::database::DatabaseLogger;
use crate::logging::time::{parse_cairo_string, to_cairo_string};
use crate::subscription::Subscription;
use crate::users::{CreateUserPayload, User, UserAuthRecord, UserRole, UserStore, hash_password};

const USER_COLUMNS: &str = "id, first_name, last_name, email, phone_number, role, \
     sub_is_active, sub_is_trial, sub_started_at, sub_expires_at, created_at, updated_at";

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<chrono::DateTime<Utc>> {
    parse_cairo_string(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

/// Rebuilds the embedded subscription from its four columns. Shared with the
/// payments store, which reads the same columns inside the approve
/// transaction.
pub(crate) fn subscription_from_parts(
    is_active: i64,
    is_trial: i64,
    started_at: Option<String>,
    expires_at: Option<String>,
    first_idx: usize,
) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        is_active: is_active != 0,
        is_trial: is_trial != 0,
        started_at: started_at
            .map(|s| parse_ts(first_idx + 2, &s))
            .transpose()?,
        expires_at: expires_at
            .map(|s| parse_ts(first_idx + 3, &s))
            .transpose()?,
    })
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role_s: String = row.get(5)?;
    let created_at_s: String = row.get(10)?;
    let updated_at_s: String = row.get(11)?;
    Ok(User {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone_number: row.get(4)?,
        role: UserRole::parse(&role_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(5, "role".into(), rusqlite::types::Type::Text)
        })?,
        subscription: subscription_from_parts(
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
            6,
        )?,
        created_at: parse_ts(10, &created_at_s)?,
        updated_at: parse_ts(11, &updated_at_s)?,
    })
}

#[async_trait]
impl UserStore for DatabaseLogger {
    async fn create_user(&self, payload: CreateUserPayload) -> Result<User, LawdeskError> {
        let email = payload.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(LawdeskError::InvalidArgument("email is required".into()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let first_name = payload.first_name.unwrap_or_default();
        let last_name = payload.last_name.unwrap_or_default();
        let phone_number = payload.phone_number.unwrap_or_default();
        let password_hash = payload
            .password
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(hash_password)
            .transpose()?;

        let conn = self.connection.lock().await;

        let email_taken: Option<String> = conn
            .query_row("SELECT id FROM users WHERE email = ?1", [&email], |row| {
                row.get(0)
            })
            .optional()?;
        if email_taken.is_some() {
            return Err(LawdeskError::Conflict("email already registered".into()));
        }

        // 第一个用户自动提升为 superadmin，完成初始引导
        let is_first_user = conn
            .query_row("SELECT 1 FROM users LIMIT 1", [], |_| Ok(()))
            .optional()?
            .is_none();
        let role = if is_first_user {
            UserRole::Superadmin
        } else if matches!(payload.role, UserRole::Superadmin) {
            // superadmin 只能由引导产生，不接受外部指定
            UserRole::Admin
        } else {
            payload.role
        };

        conn.execute(
            "INSERT INTO users (id, first_name, last_name, email, phone_number, password_hash, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                &id,
                &first_name,
                &last_name,
                &email,
                &phone_number,
                password_hash,
                role.as_str(),
                to_cairo_string(&now),
                to_cairo_string(&now),
            ],
        )?;

        Ok(User {
            id,
            first_name,
            last_name,
            email,
            phone_number,
            role,
            subscription: Subscription::default(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, LawdeskError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;
        let row = stmt.query_row([id], row_to_user).optional()?;
        Ok(row)
    }

    async fn get_auth_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserAuthRecord>, LawdeskError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                "SELECT id, email, role, password_hash FROM users WHERE email = ?1 LIMIT 1",
                [&email.trim().to_lowercase()],
                |row| {
                    let role_s: String = row.get(2)?;
                    Ok(UserAuthRecord {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        role: UserRole::parse(&role_s).ok_or_else(|| {
                            rusqlite::Error::InvalidColumnType(
                                2,
                                "role".into(),
                                rusqlite::types::Type::Text,
                            )
                        })?,
                        password_hash: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    async fn list_users(&self) -> Result<Vec<User>, LawdeskError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_user)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn activate_subscription(
        &self,
        user_id: &str,
        duration_days: i64,
        is_trial: bool,
    ) -> Result<Option<Subscription>, LawdeskError> {
        let now = Utc::now();
        let conn = self.connection.lock().await;

        let current: Option<Subscription> = conn
            .query_row(
                "SELECT sub_is_active, sub_is_trial, sub_started_at, sub_expires_at FROM users WHERE id = ?1",
                [user_id],
                |row| subscription_from_parts(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, 0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(None);
        };

        let next = current.activated(now, duration_days, is_trial)?;
        conn.execute(
            "UPDATE users SET sub_is_active = ?2, sub_is_trial = ?3, sub_started_at = ?4, sub_expires_at = ?5, updated_at = ?6 WHERE id = ?1",
            rusqlite::params![
                user_id,
                next.is_active as i64,
                next.is_trial as i64,
                next.started_at.map(|t| to_cairo_string(&t)),
                next.expires_at.map(|t| to_cairo_string(&t)),
                to_cairo_string(&now),
            ],
        )?;
        Ok(Some(next))
    }

    async fn cancel_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, LawdeskError> {
        let now = Utc::now();
        let conn = self.connection.lock().await;

        let current: Option<Subscription> = conn
            .query_row(
                "SELECT sub_is_active, sub_is_trial, sub_started_at, sub_expires_at FROM users WHERE id = ?1",
                [user_id],
                |row| subscription_from_parts(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, 0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(None);
        };

        let next = current.cancelled();
        conn.execute(
            "UPDATE users SET sub_is_active = 0, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![user_id, to_cairo_string(&now)],
        )?;
        Ok(Some(next))
    }
}

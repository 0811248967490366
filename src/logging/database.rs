use rusqlite::{Connection, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

/// SQLite-backed store for every persistent concern: users (with embedded
/// subscriptions), payment requests, pricing settings and the request audit
/// log. One connection behind a mutex; writers are serialized, which is also
/// what makes the review compare-and-set race-free.
#[derive(Clone)]
pub struct DatabaseLogger {
    pub(crate) connection: Arc<Mutex<Connection>>,
}

impl DatabaseLogger {
    pub async fn new(database_path: &str) -> Result<Self> {
        // 确保数据库文件的目录存在
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return Err(rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                        Some(format!("Failed to create directory: {}", e)),
                    ));
                }
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        let conn = Connection::open(database_path)?;
        tracing::info!("Database initialized at: {}", database_path);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                phone_number TEXT NOT NULL,
                password_hash TEXT,
                role TEXT NOT NULL,
                sub_is_active INTEGER NOT NULL DEFAULT 0,
                sub_is_trial INTEGER NOT NULL DEFAULT 0,
                sub_started_at TEXT,
                sub_expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS payment_requests (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                amount REAL NOT NULL,
                plan_duration TEXT NOT NULL,
                reference_number TEXT NOT NULL,
                screenshot_ref TEXT NOT NULL,
                status TEXT NOT NULL,
                admin_note TEXT,
                reviewed_by TEXT,
                reviewed_at TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pricing_settings (
                scope TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS request_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                operation TEXT NOT NULL,
                user_id TEXT,
                status_code INTEGER NOT NULL,
                response_time_ms INTEGER NOT NULL,
                error TEXT
            )",
            [],
        )?;

        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }
}

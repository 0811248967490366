use async_trait::async_trait;

use crate::error::LawdeskError;
use crate::logging::database::DatabaseLogger;
use crate::logging::time::{parse_cairo_string, to_cairo_string};
use crate::logging::types::RequestLog;
use crate::server::storage_traits::RequestLogStore;

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestLog> {
    let timestamp_s: String = row.get(1)?;
    Ok(RequestLog {
        id: row.get(0)?,
        timestamp: parse_cairo_string(&timestamp_s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?,
        method: row.get(2)?,
        path: row.get(3)?,
        operation: row.get(4)?,
        user_id: row.get(5)?,
        status_code: row.get::<_, i64>(6)? as u16,
        response_time_ms: row.get(7)?,
        error: row.get(8)?,
    })
}

#[async_trait]
impl RequestLogStore for DatabaseLogger {
    async fn log_request(&self, log: RequestLog) -> Result<i64, LawdeskError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO request_logs (timestamp, method, path, operation, user_id, status_code, response_time_ms, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                to_cairo_string(&log.timestamp),
                &log.method,
                &log.path,
                &log.operation,
                &log.user_id,
                log.status_code as i64,
                log.response_time_ms,
                &log.error,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn list_recent_logs(&self, limit: i64) -> Result<Vec<RequestLog>, LawdeskError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, method, path, operation, user_id, status_code, response_time_ms, error
             FROM request_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit.max(0)], row_to_log)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

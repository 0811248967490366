use async_trait::async_trait;

use crate::error::LawdeskError;
use crate::logging::types::RequestLog;

#[async_trait]
pub trait RequestLogStore: Send + Sync {
    async fn log_request(&self, log: RequestLog) -> Result<i64, LawdeskError>;
    async fn list_recent_logs(&self, limit: i64) -> Result<Vec<RequestLog>, LawdeskError>;
}

pub mod database;
pub mod time;
pub mod types;
pub mod database_logs;
pub mod database_payments;
pub mod database_settings;
pub mod database_users;

#[allow(unused_imports)]
pub use database::DatabaseLogger;
#[allow(unused_imports)]
pub use types::RequestLog;

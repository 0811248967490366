pub mod handlers;
pub(crate) mod request_logging;
pub(crate) mod storage_traits;
pub(crate) mod util;

use crate::config::Settings;
use crate::error::Result as AppResult;
use crate::logging::DatabaseLogger;
use crate::payments::{PaymentRequestStore, PricingSettingsStore};
use crate::server::storage_traits::RequestLogStore;
use crate::users::UserStore;
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Settings,
    pub log_store: Arc<dyn RequestLogStore + Send + Sync>,
    pub user_store: Arc<dyn UserStore + Send + Sync>,
    pub payment_store: Arc<dyn PaymentRequestStore + Send + Sync>,
    pub settings_store: Arc<dyn PricingSettingsStore + Send + Sync>,
}

pub async fn create_app(config: Settings) -> AppResult<Router> {
    let db_logger = Arc::new(DatabaseLogger::new(&config.logging.database_path).await?);

    let app_state = AppState {
        config,
        log_store: db_logger.clone(),
        user_store: db_logger.clone(),
        payment_store: db_logger.clone(),
        settings_store: db_logger.clone(),
    };

    let mut app = handlers::routes().with_state(Arc::new(app_state));

    // CORS（开发环境便于前端联调；生产应收敛来源并仅 HTTPS）
    use axum::http::{Method, header};
    use tower_http::cors::{AllowOrigin, CorsLayer};
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        // 反射请求来源（便于 dev server 代理转发携带 Cookie）
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true);
    app = app.layer(cors);

    Ok(app)
}

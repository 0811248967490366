use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;

use crate::payments::MAX_SCREENSHOT_BYTES;
use crate::server::AppState;

mod admin_logs;
mod admin_payments;
mod admin_settings;
mod admin_users;
mod auth;
mod auth_jwt;
mod payments;
mod subscription;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // Auth
        .route("/auth/register", post(auth_jwt::register))
        .route("/auth/login", post(auth_jwt::login))
        .route("/auth/me", get(auth_jwt::me))
        // Entitlement + subscription lifecycle
        .route("/subscription/status", get(subscription::status))
        .route("/subscription/start", post(subscription::start))
        .route("/subscription/renew", post(subscription::renew))
        .route("/subscription/cancel", post(subscription::cancel))
        // InstaPay payment proofs
        .route(
            "/payments/instapay/request",
            post(payments::submit_instapay_request)
                // 5 MiB 截图 + multipart 包装余量
                .layer(DefaultBodyLimit::max(MAX_SCREENSHOT_BYTES + 64 * 1024)),
        )
        .route("/payments/mine", get(payments::list_my_requests))
        // Review back office
        .route("/payments/admin/pending", get(admin_payments::list_pending))
        .route("/payments/admin/all", get(admin_payments::list_all))
        .route(
            "/payments/admin/{id}/approve",
            post(admin_payments::approve),
        )
        .route("/payments/admin/{id}/reject", post(admin_payments::reject))
        .route(
            "/payments/admin/settings",
            get(admin_settings::get_settings).put(admin_settings::put_settings),
        )
        // User management
        .route(
            "/admin/users",
            get(admin_users::list_users).post(admin_users::create_user),
        )
        .route("/admin/users/{id}", get(admin_users::get_user))
        .route("/admin/logs/requests", get(admin_logs::list_request_logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::DatabaseLogger;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn subscription_routes_exist_for_root_and_api_prefix() {
        unsafe {
            std::env::set_var("LD_JWT_SECRET", "testsecret");
        }

        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let logger = Arc::new(
            DatabaseLogger::new(db_path.to_str().unwrap()).await.unwrap(),
        );
        let app_state = Arc::new(AppState {
            config: crate::config::Settings::default(),
            log_store: logger.clone(),
            user_store: logger.clone(),
            payment_store: logger.clone(),
            settings_store: logger,
        });

        let routes = routes();
        let app = Router::new()
            .merge(routes.clone())
            .nest("/api", routes)
            .with_state(app_state);

        // 未带令牌：路由存在且被鉴权拦截，而不是 404
        for uri in ["/subscription/status", "/api/subscription/status"] {
            let res = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("GET")
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/payments/admin/pending")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}

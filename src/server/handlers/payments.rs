use axum::{
    Json,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::require_user;
use crate::error::LawdeskError;
use crate::logging::time::to_iso8601_utc_string;
use crate::payments::{
    ALLOWED_SCREENSHOT_TYPES, CreatePaymentRequest, MAX_SCREENSHOT_BYTES, PaymentRequest,
};
use crate::server::AppState;
use crate::server::request_logging::log_simple_request;
use crate::subscription::PlanDuration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequestOut {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub plan_duration: String,
    pub reference_number: String,
    pub screenshot_ref: String,
    pub status: String,
    pub admin_note: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

impl From<PaymentRequest> for PaymentRequestOut {
    fn from(r: PaymentRequest) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            amount: r.amount,
            plan_duration: r.plan_duration.as_str().to_string(),
            reference_number: r.reference_number,
            screenshot_ref: r.screenshot_ref,
            status: r.status.as_str().to_string(),
            admin_note: r.admin_note,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at.as_ref().map(to_iso8601_utc_string),
            created_at: to_iso8601_utc_string(&r.created_at),
        }
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

struct Submission {
    plan_duration: PlanDuration,
    reference_number: String,
    screenshot: Vec<u8>,
    content_type: String,
}

async fn read_submission(mut multipart: Multipart) -> Result<Submission, LawdeskError> {
    let mut plan_duration: Option<PlanDuration> = None;
    let mut reference_number: Option<String> = None;
    let mut screenshot: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| LawdeskError::InvalidArgument(format!("malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("planDuration") => {
                let text = field.text().await.map_err(|e| {
                    LawdeskError::InvalidArgument(format!("unreadable planDuration: {}", e))
                })?;
                plan_duration = Some(PlanDuration::parse(text.trim()).ok_or_else(|| {
                    LawdeskError::InvalidArgument(format!(
                        "planDuration must be monthly or yearly, got `{}`",
                        text.trim()
                    ))
                })?);
            }
            Some("referenceNumber") => {
                let text = field.text().await.map_err(|e| {
                    LawdeskError::InvalidArgument(format!("unreadable referenceNumber: {}", e))
                })?;
                reference_number = Some(text.trim().to_string());
            }
            Some("screenshot") => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    LawdeskError::InvalidArgument(format!("unreadable screenshot: {}", e))
                })?;
                screenshot = Some((bytes.to_vec(), content_type));
            }
            _ => {}
        }
    }

    let plan_duration = plan_duration
        .ok_or_else(|| LawdeskError::InvalidArgument("planDuration is required".into()))?;
    let reference_number = reference_number
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LawdeskError::InvalidArgument("referenceNumber is required".into()))?;
    let (screenshot, content_type) = screenshot
        .ok_or_else(|| LawdeskError::InvalidArgument("screenshot file is required".into()))?;

    if screenshot.is_empty() {
        return Err(LawdeskError::InvalidArgument("screenshot is empty".into()));
    }
    if screenshot.len() > MAX_SCREENSHOT_BYTES {
        return Err(LawdeskError::InvalidArgument(format!(
            "screenshot exceeds {} bytes",
            MAX_SCREENSHOT_BYTES
        )));
    }
    if !ALLOWED_SCREENSHOT_TYPES.contains(&content_type.as_str()) {
        return Err(LawdeskError::InvalidArgument(format!(
            "unsupported screenshot type `{}`",
            content_type
        )));
    }

    Ok(Submission {
        plan_duration,
        reference_number,
        screenshot,
        content_type,
    })
}

pub async fn submit_instapay_request(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PaymentRequestOut>), LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_user(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/payments/instapay/request",
                "payments_instapay_submit",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let outcome: Result<PaymentRequest, LawdeskError> = async {
        // 后台角色本就豁免订阅，不允许进入付款队列
        if claims.parsed_role().is_some_and(|r| r.is_privileged()) {
            return Err(LawdeskError::Forbidden(
                "privileged roles cannot submit payment requests".into(),
            ));
        }

        let submission = read_submission(multipart).await?;

        // 金额取提交时刻的定价快照，之后改价不回溯
        let pricing = app_state.settings_store.get_pricing_settings().await?;
        let amount = pricing.settings.price_for(submission.plan_duration);

        let dir = Path::new(&app_state.config.storage.screenshots_dir);
        std::fs::create_dir_all(dir)?;
        let filename = format!(
            "{}.{}",
            Uuid::new_v4(),
            extension_for(&submission.content_type)
        );
        let file_path = dir.join(&filename);
        std::fs::write(&file_path, &submission.screenshot)?;

        app_state
            .payment_store
            .create_payment_request(CreatePaymentRequest {
                user_id: claims.sub.clone(),
                amount,
                plan_duration: submission.plan_duration,
                reference_number: submission.reference_number,
                screenshot_ref: file_path.to_string_lossy().into_owned(),
            })
            .await
    }
    .await;

    match outcome {
        Ok(request) => {
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/payments/instapay/request",
                "payments_instapay_submit",
                Some(&claims.sub),
                201,
                None,
            )
            .await;
            Ok((StatusCode::CREATED, Json(PaymentRequestOut::from(request))))
        }
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "POST",
                "/payments/instapay/request",
                "payments_instapay_submit",
                Some(&claims.sub),
                code,
                Some(e.to_string()),
            )
            .await;
            Err(e)
        }
    }
}

pub async fn list_my_requests(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PaymentRequestOut>>, LawdeskError> {
    let start_time = Utc::now();
    let claims = match require_user(&headers) {
        Ok(v) => v,
        Err(e) => {
            let code = e.status_code().as_u16();
            log_simple_request(
                &app_state,
                start_time,
                "GET",
                "/payments/mine",
                "payments_mine",
                None,
                code,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let requests = app_state
        .payment_store
        .list_payment_requests_for_user(&claims.sub)
        .await?
        .into_iter()
        .map(PaymentRequestOut::from)
        .collect();

    log_simple_request(
        &app_state,
        start_time,
        "GET",
        "/payments/mine",
        "payments_mine",
        Some(&claims.sub),
        200,
        None,
    )
    .await;
    Ok(Json(requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::DatabaseLogger;
    use crate::server::handlers::auth::{issue_access_token, test_claims};
    use crate::users::{CreateUserPayload, UserRole, UserStore};
    use axum::Router;
    use axum::body::Body;
    use axum::extract::DefaultBodyLimit;
    use axum::http::Request;
    use axum::routing::post;
    use tempfile::tempdir;
    use tower::ServiceExt;

    struct Harness {
        _dir: tempfile::TempDir,
        state: Arc<AppState>,
        user_id: String,
    }

    async fn harness() -> Harness {
        unsafe {
            std::env::set_var("LD_JWT_SECRET", "testsecret");
        }
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let logger = Arc::new(
            DatabaseLogger::new(db_path.to_str().unwrap()).await.unwrap(),
        );

        let mut config = crate::config::Settings::default();
        config.storage.screenshots_dir = dir
            .path()
            .join("screenshots")
            .to_string_lossy()
            .into_owned();

        let state = Arc::new(AppState {
            config,
            log_store: logger.clone(),
            user_store: logger.clone(),
            payment_store: logger.clone(),
            settings_store: logger.clone(),
        });

        // 第一个用户是引导 superadmin，再建一个普通成员
        logger
            .create_user(CreateUserPayload {
                first_name: None,
                last_name: None,
                email: "root@example.com".into(),
                phone_number: None,
                password: None,
                role: UserRole::Viewer,
            })
            .await
            .unwrap();
        let user = logger
            .create_user(CreateUserPayload {
                first_name: None,
                last_name: None,
                email: "member@example.com".into(),
                phone_number: None,
                password: None,
                role: UserRole::Lawyer,
            })
            .await
            .unwrap();

        Harness {
            _dir: dir,
            state,
            user_id: user.id,
        }
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route(
                "/payments/instapay/request",
                post(submit_instapay_request)
                    .layer(DefaultBodyLimit::max(MAX_SCREENSHOT_BYTES + 64 * 1024)),
            )
            .with_state(state)
    }

    const BOUNDARY: &str = "lawdesk-test-boundary";

    fn multipart_body(
        plan: Option<&str>,
        reference: Option<&str>,
        screenshot: Option<(&[u8], &str)>,
    ) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(plan) = plan {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"planDuration\"\r\n\r\n{}\r\n",
                    BOUNDARY, plan
                )
                .as_bytes(),
            );
        }
        if let Some(reference) = reference {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"referenceNumber\"\r\n\r\n{}\r\n",
                    BOUNDARY, reference
                )
                .as_bytes(),
            );
        }
        if let Some((bytes, content_type)) = screenshot {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"screenshot\"; filename=\"proof\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn submit_request(token: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/payments/instapay/request")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header("authorization", format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn submission_creates_pending_request_with_price_snapshot() {
        let h = harness().await;
        let token = issue_access_token(&test_claims(&h.user_id, UserRole::Lawyer)).unwrap();

        let res = app(h.state.clone())
            .oneshot(submit_request(
                &token,
                multipart_body(
                    Some("monthly"),
                    Some("INS123"),
                    Some((b"fake-jpeg-bytes", "image/jpeg")),
                ),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let out: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(out["status"], "pending");
        assert_eq!(out["amount"], 199.0);
        assert_eq!(out["referenceNumber"], "INS123");

        // 截图已落盘，记录里只有 opaque 引用
        let screenshot_ref = out["screenshotRef"].as_str().unwrap();
        assert!(std::fs::metadata(screenshot_ref).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn missing_fields_are_invalid_arguments() {
        let h = harness().await;
        let token = issue_access_token(&test_claims(&h.user_id, UserRole::Lawyer)).unwrap();

        for body in [
            multipart_body(None, Some("INS123"), Some((b"x", "image/jpeg"))),
            multipart_body(Some("monthly"), Some("  "), Some((b"x", "image/jpeg"))),
            multipart_body(Some("monthly"), Some("INS123"), None),
            multipart_body(Some("weekly"), Some("INS123"), Some((b"x", "image/jpeg"))),
        ] {
            let res = app(h.state.clone())
                .oneshot(submit_request(&token, body))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn unsupported_and_oversized_screenshots_are_rejected() {
        let h = harness().await;
        let token = issue_access_token(&test_claims(&h.user_id, UserRole::Lawyer)).unwrap();

        let res = app(h.state.clone())
            .oneshot(submit_request(
                &token,
                multipart_body(Some("monthly"), Some("INS123"), Some((b"x", "application/pdf"))),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let oversized = vec![0u8; MAX_SCREENSHOT_BYTES + 1];
        let res = app(h.state.clone())
            .oneshot(submit_request(
                &token,
                multipart_body(Some("monthly"), Some("INS123"), Some((&oversized, "image/png"))),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn privileged_roles_cannot_submit() {
        let h = harness().await;
        let token = issue_access_token(&test_claims("admin-1", UserRole::Admin)).unwrap();
        let res = app(h.state.clone())
            .oneshot(submit_request(
                &token,
                multipart_body(
                    Some("monthly"),
                    Some("INS123"),
                    Some((b"x", "image/jpeg")),
                ),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn my_requests_lists_own_history_only() {
        let h = harness().await;
        let token = issue_access_token(&test_claims(&h.user_id, UserRole::Lawyer)).unwrap();

        let res = app(h.state.clone())
            .oneshot(submit_request(
                &token,
                multipart_body(
                    Some("yearly"),
                    Some("INS999"),
                    Some((b"proof", "image/png")),
                ),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        let Json(mine) = list_my_requests(State(h.state.clone()), headers)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].plan_duration, "yearly");
        assert_eq!(mine[0].amount, 1990.0);

        let other = issue_access_token(&test_claims("someone-else", UserRole::Viewer)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_str(&format!("Bearer {}", other)).unwrap(),
        );
        let Json(none) = list_my_requests(State(h.state), headers).await.unwrap();
        assert!(none.is_empty());
    }
}

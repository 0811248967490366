use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::error::LawdeskError;
use crate::logging::database::DatabaseLogger;
use crate::logging::database_users::subscription_from_parts;
use crate::logging::time::{parse_cairo_string, to_cairo_string};
use crate::payments::{
    CreatePaymentRequest, PaymentRequest, PaymentRequestStore, PaymentStatus,
};
use crate::subscription::{PlanDuration, Subscription};

const PAYMENT_COLUMNS: &str = "id, user_id, amount, plan_duration, reference_number, \
     screenshot_ref, status, admin_note, reviewed_by, reviewed_at, created_at";

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<chrono::DateTime<Utc>> {
    parse_cairo_string(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

fn row_to_payment_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentRequest> {
    let plan_s: String = row.get(3)?;
    let status_s: String = row.get(6)?;
    let reviewed_at_s: Option<String> = row.get(9)?;
    let created_at_s: String = row.get(10)?;
    Ok(PaymentRequest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        plan_duration: PlanDuration::parse(&plan_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(
                3,
                "plan_duration".into(),
                rusqlite::types::Type::Text,
            )
        })?,
        reference_number: row.get(4)?,
        screenshot_ref: row.get(5)?,
        status: PaymentStatus::parse(&status_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(6, "status".into(), rusqlite::types::Type::Text)
        })?,
        admin_note: row.get(7)?,
        reviewed_by: row.get(8)?,
        reviewed_at: reviewed_at_s.map(|s| parse_ts(9, &s)).transpose()?,
        created_at: parse_ts(10, &created_at_s)?,
    })
}

#[async_trait]
impl PaymentRequestStore for DatabaseLogger {
    async fn create_payment_request(
        &self,
        payload: CreatePaymentRequest,
    ) -> Result<PaymentRequest, LawdeskError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO payment_requests (id, user_id, amount, plan_duration, reference_number, screenshot_ref, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                &id,
                &payload.user_id,
                payload.amount,
                payload.plan_duration.as_str(),
                &payload.reference_number,
                &payload.screenshot_ref,
                PaymentStatus::Pending.as_str(),
                to_cairo_string(&now),
            ],
        )?;

        Ok(PaymentRequest {
            id,
            user_id: payload.user_id,
            amount: payload.amount,
            plan_duration: payload.plan_duration,
            reference_number: payload.reference_number,
            screenshot_ref: payload.screenshot_ref,
            status: PaymentStatus::Pending,
            admin_note: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
        })
    }

    async fn get_payment_request(
        &self,
        id: &str,
    ) -> Result<Option<PaymentRequest>, LawdeskError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payment_requests WHERE id = ?1",
            PAYMENT_COLUMNS
        ))?;
        let row = stmt.query_row([id], row_to_payment_request).optional()?;
        Ok(row)
    }

    async fn list_payment_requests(
        &self,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<PaymentRequest>, LawdeskError> {
        let conn = self.connection.lock().await;
        let mut out = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM payment_requests WHERE status = ?1 ORDER BY created_at DESC",
                    PAYMENT_COLUMNS
                ))?;
                let rows = stmt.query_map([status.as_str()], row_to_payment_request)?;
                for r in rows {
                    out.push(r?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM payment_requests ORDER BY created_at DESC",
                    PAYMENT_COLUMNS
                ))?;
                let rows = stmt.query_map([], row_to_payment_request)?;
                for r in rows {
                    out.push(r?);
                }
            }
        }
        Ok(out)
    }

    async fn list_payment_requests_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PaymentRequest>, LawdeskError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payment_requests WHERE user_id = ?1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([user_id], row_to_payment_request)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn approve_payment_request(
        &self,
        id: &str,
        reviewer_id: &str,
        note: Option<String>,
    ) -> Result<(PaymentRequest, Subscription), LawdeskError> {
        let now = Utc::now();
        let mut conn = self.connection.lock().await;
        // 状态流转与订阅激活必须在同一事务内；出错即回滚，请求保持 pending
        let tx = conn.transaction()?;

        let request = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM payment_requests WHERE id = ?1",
                PAYMENT_COLUMNS
            ))?;
            stmt.query_row([id], row_to_payment_request).optional()?
        };
        let Some(request) = request else {
            return Err(LawdeskError::NotFound("payment request not found".into()));
        };

        // compare-and-set：只有仍处于 pending 的行才会被改写
        let transitioned = tx.execute(
            "UPDATE payment_requests SET status = ?2, reviewed_by = ?3, reviewed_at = ?4, admin_note = ?5
             WHERE id = ?1 AND status = ?6",
            rusqlite::params![
                id,
                PaymentStatus::Approved.as_str(),
                reviewer_id,
                to_cairo_string(&now),
                note.as_deref(),
                PaymentStatus::Pending.as_str(),
            ],
        )?;
        if transitioned == 0 {
            return Err(LawdeskError::Conflict(
                "payment request was already reviewed".into(),
            ));
        }

        let current: Option<Subscription> = tx
            .query_row(
                "SELECT sub_is_active, sub_is_trial, sub_started_at, sub_expires_at FROM users WHERE id = ?1",
                [&request.user_id],
                |row| subscription_from_parts(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, 0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(LawdeskError::NotFound(
                "payment request owner no longer exists".into(),
            ));
        };

        let next = current.activated(now, request.plan_duration.days(), false)?;
        tx.execute(
            "UPDATE users SET sub_is_active = ?2, sub_is_trial = ?3, sub_started_at = ?4, sub_expires_at = ?5, updated_at = ?6 WHERE id = ?1",
            rusqlite::params![
                &request.user_id,
                next.is_active as i64,
                next.is_trial as i64,
                next.started_at.map(|t| to_cairo_string(&t)),
                next.expires_at.map(|t| to_cairo_string(&t)),
                to_cairo_string(&now),
            ],
        )?;

        tx.commit()?;

        Ok((
            PaymentRequest {
                status: PaymentStatus::Approved,
                admin_note: note,
                reviewed_by: Some(reviewer_id.to_string()),
                reviewed_at: Some(now),
                ..request
            },
            next,
        ))
    }

    async fn reject_payment_request(
        &self,
        id: &str,
        reviewer_id: &str,
        note: &str,
    ) -> Result<PaymentRequest, LawdeskError> {
        if note.trim().is_empty() {
            return Err(LawdeskError::InvalidArgument(
                "rejection requires a non-empty adminNote".into(),
            ));
        }

        let now = Utc::now();
        let conn = self.connection.lock().await;

        let request = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM payment_requests WHERE id = ?1",
                PAYMENT_COLUMNS
            ))?;
            stmt.query_row([id], row_to_payment_request).optional()?
        };
        let Some(request) = request else {
            return Err(LawdeskError::NotFound("payment request not found".into()));
        };

        let transitioned = conn.execute(
            "UPDATE payment_requests SET status = ?2, reviewed_by = ?3, reviewed_at = ?4, admin_note = ?5
             WHERE id = ?1 AND status = ?6",
            rusqlite::params![
                id,
                PaymentStatus::Rejected.as_str(),
                reviewer_id,
                to_cairo_string(&now),
                note,
                PaymentStatus::Pending.as_str(),
            ],
        )?;
        if transitioned == 0 {
            return Err(LawdeskError::Conflict(
                "payment request was already reviewed".into(),
            ));
        }

        Ok(PaymentRequest {
            status: PaymentStatus::Rejected,
            admin_note: Some(note.to_string()),
            reviewed_by: Some(reviewer_id.to_string()),
            reviewed_at: Some(now),
            ..request
        })
    }

    async fn latest_approved_plan(
        &self,
        user_id: &str,
    ) -> Result<Option<PlanDuration>, LawdeskError> {
        let conn = self.connection.lock().await;
        let plan_s: Option<String> = conn
            .query_row(
                "SELECT plan_duration FROM payment_requests
                 WHERE user_id = ?1 AND status = 'approved'
                 ORDER BY created_at DESC, reviewed_at DESC LIMIT 1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(plan_s.as_deref().and_then(PlanDuration::parse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{CreateUserPayload, UserRole, UserStore};
    use tempfile::tempdir;

    async fn test_db() -> (tempfile::TempDir, DatabaseLogger) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = DatabaseLogger::new(db_path.to_str().unwrap()).await.unwrap();
        (dir, db)
    }

    async fn member(db: &DatabaseLogger, email: &str) -> String {
        db.create_user(CreateUserPayload {
            first_name: None,
            last_name: None,
            email: email.into(),
            phone_number: None,
            password: None,
            role: UserRole::Lawyer,
        })
        .await
        .unwrap()
        .id
    }

    fn submission(user_id: &str, plan: PlanDuration, amount: f64) -> CreatePaymentRequest {
        CreatePaymentRequest {
            user_id: user_id.into(),
            amount,
            plan_duration: plan,
            reference_number: "INS123".into(),
            screenshot_ref: "screenshots/proof.jpg".into(),
        }
    }

    #[tokio::test]
    async fn approval_activates_owner_subscription() {
        let (_dir, db) = test_db().await;
        let reviewer = member(&db, "root@example.com").await; // bootstrap superadmin
        let user = member(&db, "client@example.com").await;

        let req = db
            .create_payment_request(submission(&user, PlanDuration::Yearly, 1990.0))
            .await
            .unwrap();
        assert_eq!(req.status, PaymentStatus::Pending);

        let (approved, sub) = db
            .approve_payment_request(&req.id, &reviewer, None)
            .await
            .unwrap();
        assert_eq!(approved.status, PaymentStatus::Approved);
        assert_eq!(approved.reviewed_by.as_deref(), Some(reviewer.as_str()));
        assert!(approved.reviewed_at.is_some());
        assert!(sub.is_active);
        assert!(!sub.is_trial);
        let days = (sub.expires_at.unwrap() - Utc::now()).num_days();
        assert!((364..=365).contains(&days), "expires in {} days", days);

        let stored = db.get_payment_request(&req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Approved);
        // 金额为提交时快照
        assert_eq!(stored.amount, 1990.0);
    }

    #[tokio::test]
    async fn second_review_is_a_conflict() {
        let (_dir, db) = test_db().await;
        let reviewer = member(&db, "root@example.com").await;
        let user = member(&db, "client@example.com").await;
        let req = db
            .create_payment_request(submission(&user, PlanDuration::Monthly, 199.0))
            .await
            .unwrap();

        db.approve_payment_request(&req.id, &reviewer, None)
            .await
            .unwrap();

        let again = db.approve_payment_request(&req.id, &reviewer, None).await;
        assert!(matches!(again, Err(LawdeskError::Conflict(_))));
        let reject = db
            .reject_payment_request(&req.id, &reviewer, "late review")
            .await;
        assert!(matches!(reject, Err(LawdeskError::Conflict(_))));
    }

    #[tokio::test]
    async fn concurrent_reviews_yield_one_winner() {
        let (_dir, db) = test_db().await;
        let reviewer = member(&db, "root@example.com").await;
        let user = member(&db, "client@example.com").await;
        let req = db
            .create_payment_request(submission(&user, PlanDuration::Monthly, 199.0))
            .await
            .unwrap();

        let approve = db.approve_payment_request(&req.id, &reviewer, None);
        let reject = db.reject_payment_request(&req.id, &reviewer, "bad proof");
        let (a, r) = tokio::join!(approve, reject);

        let conflicts = [a.is_err(), r.is_err()];
        assert_eq!(conflicts.iter().filter(|c| **c).count(), 1);
        let stored = db.get_payment_request(&req.id).await.unwrap().unwrap();
        assert_ne!(stored.status, PaymentStatus::Pending);

        // 订阅只在 approve 赢时被激活
        let sub = db.get_user(&user).await.unwrap().unwrap().subscription;
        assert_eq!(sub.is_active, a.is_ok());
    }

    #[tokio::test]
    async fn rejection_requires_note_and_leaves_subscription_alone() {
        let (_dir, db) = test_db().await;
        let reviewer = member(&db, "root@example.com").await;
        let user = member(&db, "client@example.com").await;
        let req = db
            .create_payment_request(submission(&user, PlanDuration::Monthly, 199.0))
            .await
            .unwrap();

        let empty = db.reject_payment_request(&req.id, &reviewer, "  ").await;
        assert!(matches!(empty, Err(LawdeskError::InvalidArgument(_))));
        // 空备注失败后仍是 pending
        let stored = db.get_payment_request(&req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);

        let rejected = db
            .reject_payment_request(&req.id, &reviewer, "bad screenshot")
            .await
            .unwrap();
        assert_eq!(rejected.status, PaymentStatus::Rejected);
        assert_eq!(rejected.admin_note.as_deref(), Some("bad screenshot"));

        let sub = db.get_user(&user).await.unwrap().unwrap().subscription;
        assert!(!sub.is_active);
    }

    #[tokio::test]
    async fn approving_request_of_deleted_owner_rolls_back() {
        let (_dir, db) = test_db().await;
        let reviewer = member(&db, "root@example.com").await;
        let user = member(&db, "client@example.com").await;
        let req = db
            .create_payment_request(submission(&user, PlanDuration::Monthly, 199.0))
            .await
            .unwrap();

        {
            let conn = db.connection.lock().await;
            conn.execute("DELETE FROM users WHERE id = ?1", [&user]).unwrap();
        }

        let err = db.approve_payment_request(&req.id, &reviewer, None).await;
        assert!(matches!(err, Err(LawdeskError::NotFound(_))));
        // 激活失败时状态流转必须回滚
        let stored = db.get_payment_request(&req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let (_dir, db) = test_db().await;
        let reviewer = member(&db, "root@example.com").await;
        let err = db
            .approve_payment_request("missing", &reviewer, None)
            .await;
        assert!(matches!(err, Err(LawdeskError::NotFound(_))));
        let err = db
            .reject_payment_request("missing", &reviewer, "why")
            .await;
        assert!(matches!(err, Err(LawdeskError::NotFound(_))));
    }

    #[tokio::test]
    async fn listing_filters_by_status_and_user() {
        let (_dir, db) = test_db().await;
        let reviewer = member(&db, "root@example.com").await;
        let a = member(&db, "a@example.com").await;
        let b = member(&db, "b@example.com").await;

        let first = db
            .create_payment_request(submission(&a, PlanDuration::Monthly, 199.0))
            .await
            .unwrap();
        db.create_payment_request(submission(&a, PlanDuration::Yearly, 1990.0))
            .await
            .unwrap();
        db.create_payment_request(submission(&b, PlanDuration::Monthly, 199.0))
            .await
            .unwrap();

        db.approve_payment_request(&first.id, &reviewer, None)
            .await
            .unwrap();

        let pending = db
            .list_payment_requests(Some(PaymentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        let all = db.list_payment_requests(None).await.unwrap();
        assert_eq!(all.len(), 3);
        let mine = db.list_payment_requests_for_user(&a).await.unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn latest_approved_plan_feeds_renewal_default() {
        let (_dir, db) = test_db().await;
        let reviewer = member(&db, "root@example.com").await;
        let user = member(&db, "client@example.com").await;

        assert!(db.latest_approved_plan(&user).await.unwrap().is_none());

        let req = db
            .create_payment_request(submission(&user, PlanDuration::Yearly, 1990.0))
            .await
            .unwrap();
        // pending 不参与默认时长
        assert!(db.latest_approved_plan(&user).await.unwrap().is_none());

        db.approve_payment_request(&req.id, &reviewer, None)
            .await
            .unwrap();
        assert_eq!(
            db.latest_approved_plan(&user).await.unwrap(),
            Some(PlanDuration::Yearly)
        );
    }
}

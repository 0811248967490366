use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LawdeskError;
use crate::subscription::{PlanDuration, Subscription};

/// Fixed ceiling for uploaded payment proofs.
pub const MAX_SCREENSHOT_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_SCREENSHOT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "approved" => Some(PaymentStatus::Approved),
            "rejected" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }
}

/// Manually submitted bank-transfer proof. Immutable after creation except
/// for the single pending -> approved|rejected transition; rows are never
/// deleted (audit trail).
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub id: String,
    pub user_id: String,
    /// Price snapshot taken from PricingSettings at submission time.
    pub amount: f64,
    pub plan_duration: PlanDuration,
    pub reference_number: String,
    pub screenshot_ref: String,
    pub status: PaymentStatus,
    pub admin_note: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub user_id: String,
    pub amount: f64,
    pub plan_duration: PlanDuration,
    pub reference_number: String,
    pub screenshot_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPricing {
    pub price: f64,
    #[serde(default)]
    pub savings_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSettings {
    pub insta_pay_identifier: String,
    pub monthly: PlanPricing,
    pub yearly: PlanPricing,
}

impl PricingSettings {
    pub fn price_for(&self, plan: PlanDuration) -> f64 {
        match plan {
            PlanDuration::Monthly => self.monthly.price,
            PlanDuration::Yearly => self.yearly.price,
        }
    }
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            insta_pay_identifier: String::new(),
            monthly: PlanPricing {
                price: 199.0,
                savings_label: None,
            },
            yearly: PlanPricing {
                price: 1990.0,
                savings_label: Some("2 months free".into()),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingSettingsRecord {
    pub settings: PricingSettings,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

#[async_trait]
pub trait PaymentRequestStore: Send + Sync {
    async fn create_payment_request(
        &self,
        payload: CreatePaymentRequest,
    ) -> Result<PaymentRequest, LawdeskError>;

    async fn get_payment_request(&self, id: &str)
    -> Result<Option<PaymentRequest>, LawdeskError>;

    async fn list_payment_requests(
        &self,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<PaymentRequest>, LawdeskError>;

    async fn list_payment_requests_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PaymentRequest>, LawdeskError>;

    /// pending -> approved, and the owner's subscription activation, as one
    /// unit of work. `Conflict` when the request was already reviewed,
    /// `NotFound` when the request or its owner is gone (the transition is
    /// rolled back in the latter case).
    async fn approve_payment_request(
        &self,
        id: &str,
        reviewer_id: &str,
        note: Option<String>,
    ) -> Result<(PaymentRequest, Subscription), LawdeskError>;

    /// pending -> rejected. The note is mandatory; no subscription side
    /// effect.
    async fn reject_payment_request(
        &self,
        id: &str,
        reviewer_id: &str,
        note: &str,
    ) -> Result<PaymentRequest, LawdeskError>;

    /// Plan of the most recent approved request, used as the renew default.
    async fn latest_approved_plan(
        &self,
        user_id: &str,
    ) -> Result<Option<PlanDuration>, LawdeskError>;
}

#[async_trait]
pub trait PricingSettingsStore: Send + Sync {
    async fn get_pricing_settings(&self) -> Result<PricingSettingsRecord, LawdeskError>;
    async fn put_pricing_settings(
        &self,
        settings: PricingSettings,
        updated_by: Option<String>,
    ) -> Result<PricingSettingsRecord, LawdeskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_roundtrip() {
        for (s, expected) in [
            ("pending", PaymentStatus::Pending),
            ("approved", PaymentStatus::Approved),
            ("rejected", PaymentStatus::Rejected),
        ] {
            assert_eq!(PaymentStatus::parse(s).unwrap(), expected);
            assert_eq!(expected.as_str(), s);
        }
        assert!(PaymentStatus::parse("reviewed").is_none());
    }

    #[test]
    fn default_pricing_matches_published_rates() {
        let settings = PricingSettings::default();
        assert_eq!(settings.price_for(PlanDuration::Monthly), 199.0);
        assert_eq!(settings.price_for(PlanDuration::Yearly), 1990.0);
    }
}

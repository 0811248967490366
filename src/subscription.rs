use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LawdeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanDuration {
    Monthly,
    Yearly,
}

impl PlanDuration {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanDuration::Monthly => "monthly",
            PlanDuration::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(PlanDuration::Monthly),
            "yearly" => Some(PlanDuration::Yearly),
            _ => None,
        }
    }

    pub fn days(self) -> i64 {
        match self {
            PlanDuration::Monthly => 30,
            PlanDuration::Yearly => 365,
        }
    }
}

/// Per-user subscription record, embedded in `User` and replaced wholesale
/// on every mutation. `expires_at` is always set while `is_active` is true.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subscription {
    pub is_active: bool,
    pub is_trial: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// New expiry after granting `duration_days` at `now`.
    ///
    /// Renewing before expiry extends the remaining time; renewing after
    /// expiry (or with no expiry) starts fresh from `now`.
    pub fn activated(
        &self,
        now: DateTime<Utc>,
        duration_days: i64,
        is_trial: bool,
    ) -> Result<Subscription, LawdeskError> {
        if duration_days <= 0 {
            return Err(LawdeskError::InvalidArgument(format!(
                "durationDays must be a positive integer, got {}",
                duration_days
            )));
        }
        let base = match self.expires_at {
            Some(current) if current > now => current,
            _ => now,
        };
        Ok(Subscription {
            is_active: true,
            is_trial,
            started_at: self.started_at.or(Some(now)),
            expires_at: Some(base + Duration::days(duration_days)),
        })
    }

    /// Deactivates without touching `expires_at`; the record is history,
    /// access denial falls out of the entitlement rules.
    pub fn cancelled(&self) -> Subscription {
        Subscription {
            is_active: false,
            ..self.clone()
        }
    }
}

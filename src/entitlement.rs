use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::subscription::Subscription;
use crate::users::UserRole;

/// Sentinel for roles whose access never expires (~100 years).
pub const UNBOUNDED_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementReason {
    Ok,
    Inactive,
    Expired,
}

impl EntitlementReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EntitlementReason::Ok => "ok",
            EntitlementReason::Inactive => "inactive",
            EntitlementReason::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementDecision {
    pub usable: bool,
    pub reason: EntitlementReason,
    pub days_remaining: i64,
}

/// Single source of truth for "may this user use the product right now".
///
/// Evaluated on every access check; expiry is a function of `now`, not an
/// event, so the answer flips the moment `expires_at` passes without any
/// state transition. Rule order matters: superadmin and admin are exempt
/// before the subscription record is consulted at all.
pub fn resolve(role: UserRole, subscription: &Subscription, now: DateTime<Utc>) -> EntitlementDecision {
    if role.is_privileged() {
        return EntitlementDecision {
            usable: true,
            reason: EntitlementReason::Ok,
            days_remaining: UNBOUNDED_DAYS,
        };
    }

    let expired = matches!(subscription.expires_at, Some(exp) if now >= exp);
    let usable = subscription.is_active && matches!(subscription.expires_at, Some(exp) if now < exp);
    let reason = if usable {
        EntitlementReason::Ok
    } else if expired {
        EntitlementReason::Expired
    } else {
        EntitlementReason::Inactive
    };
    EntitlementDecision {
        usable,
        reason,
        days_remaining: subscription
            .expires_at
            .map(|exp| days_remaining(exp, now))
            .unwrap_or(0),
    }
}

fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (expires_at - now).num_seconds();
    if secs <= 0 {
        return 0;
    }
    // 按整天向上取整
    (secs + 86_399) / 86_400
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn active_sub(now: DateTime<Utc>, days: i64) -> Subscription {
        Subscription {
            is_active: true,
            is_trial: false,
            started_at: Some(now - Duration::days(1)),
            expires_at: Some(now + Duration::days(days)),
        }
    }

    #[test]
    fn superadmin_is_always_usable() {
        let now = Utc::now();
        for sub in [
            Subscription::default(),
            active_sub(now, -10).cancelled(),
            Subscription {
                is_active: false,
                is_trial: true,
                started_at: None,
                expires_at: Some(now - Duration::days(400)),
            },
        ] {
            let d = resolve(UserRole::Superadmin, &sub, now);
            assert!(d.usable);
            assert_eq!(d.days_remaining, UNBOUNDED_DAYS);
        }
    }

    #[test]
    fn admin_bypasses_subscription_state_entirely() {
        let now = Utc::now();
        let inactive = Subscription::default();
        let d = resolve(UserRole::Admin, &inactive, now);
        assert!(d.usable);
        assert_eq!(d.reason, EntitlementReason::Ok);
        assert_eq!(d.days_remaining, UNBOUNDED_DAYS);
    }

    #[test]
    fn member_roles_follow_subscription_state() {
        let now = Utc::now();
        for role in [UserRole::Viewer, UserRole::Assistant, UserRole::Lawyer] {
            let d = resolve(role, &active_sub(now, 10), now);
            assert!(d.usable);
            assert_eq!(d.reason, EntitlementReason::Ok);
            assert_eq!(d.days_remaining, 10);
        }
    }

    #[test]
    fn expiry_takes_effect_without_a_transition() {
        let now = Utc::now();
        let sub = active_sub(now, 10);
        // 同一条记录，只有 now 在变
        assert!(resolve(UserRole::Lawyer, &sub, now).usable);
        let later = now + Duration::days(11);
        let d = resolve(UserRole::Lawyer, &sub, later);
        assert!(!d.usable);
        assert_eq!(d.reason, EntitlementReason::Expired);
        assert_eq!(d.days_remaining, 0);
    }

    #[test]
    fn inactive_record_reports_inactive() {
        let now = Utc::now();
        let d = resolve(UserRole::Viewer, &Subscription::default(), now);
        assert!(!d.usable);
        assert_eq!(d.reason, EntitlementReason::Inactive);
        assert_eq!(d.days_remaining, 0);
    }

    #[test]
    fn cancelled_but_unexpired_record_is_inactive_not_expired() {
        let now = Utc::now();
        let d = resolve(UserRole::Viewer, &active_sub(now, 10).cancelled(), now);
        assert!(!d.usable);
        assert_eq!(d.reason, EntitlementReason::Inactive);
    }

    #[test]
    fn days_remaining_rounds_partial_days_up() {
        let now = Utc::now();
        let sub = Subscription {
            is_active: true,
            is_trial: false,
            started_at: Some(now),
            expires_at: Some(now + Duration::hours(25)),
        };
        let d = resolve(UserRole::Assistant, &sub, now);
        assert_eq!(d.days_remaining, 2);
    }
}

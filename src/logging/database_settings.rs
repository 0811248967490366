use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::error::LawdeskError;
use crate::logging::database::DatabaseLogger;
use crate::logging::time::{parse_cairo_string, to_cairo_string};
use crate::payments::{PricingSettings, PricingSettingsRecord, PricingSettingsStore};

// 单行有版本的定价配置；提交时快照进 PaymentRequest.amount，
// 之后修改不回溯已存在的请求
const SETTINGS_SCOPE: &str = "current";

#[async_trait]
impl PricingSettingsStore for DatabaseLogger {
    async fn get_pricing_settings(&self) -> Result<PricingSettingsRecord, LawdeskError> {
        let now = Utc::now();
        let now_s = to_cairo_string(&now);
        let default_content = serde_json::to_string(&PricingSettings::default())?;

        let conn = self.connection.lock().await;
        let _ = conn.execute(
            "INSERT OR IGNORE INTO pricing_settings (scope, content, updated_at, updated_by) VALUES (?1, ?2, ?3, NULL)",
            rusqlite::params![SETTINGS_SCOPE, &default_content, &now_s],
        );

        let row: Option<(String, String, Option<String>)> = conn
            .query_row(
                "SELECT content, updated_at, updated_by FROM pricing_settings WHERE scope = ?1",
                [SETTINGS_SCOPE],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (content, updated_at_s, updated_by) =
            row.unwrap_or((default_content, now_s, None));
        Ok(PricingSettingsRecord {
            settings: serde_json::from_str(&content).unwrap_or_default(),
            updated_at: parse_cairo_string(&updated_at_s).unwrap_or(now),
            updated_by,
        })
    }

    async fn put_pricing_settings(
        &self,
        settings: PricingSettings,
        updated_by: Option<String>,
    ) -> Result<PricingSettingsRecord, LawdeskError> {
        if settings.price_for(crate::subscription::PlanDuration::Monthly) <= 0.0
            || settings.price_for(crate::subscription::PlanDuration::Yearly) <= 0.0
        {
            return Err(LawdeskError::InvalidArgument(
                "plan prices must be positive".into(),
            ));
        }

        let now = Utc::now();
        let content = serde_json::to_string(&settings)?;
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO pricing_settings (scope, content, updated_at, updated_by) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![SETTINGS_SCOPE, &content, to_cairo_string(&now), updated_by.clone()],
        )?;
        Ok(PricingSettingsRecord {
            settings,
            updated_at: now,
            updated_by,
        })
    }
}

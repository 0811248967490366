use crate::error::LawdeskError;
use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone, Utc};

// 开罗时区 (UTC+2)，与产品部署地一致
pub const CAIRO_OFFSET: FixedOffset = FixedOffset::east_opt(2 * 3600).unwrap();
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 将 UTC 时间转换为开罗时间的人类友好格式（数据库存储格式）
pub fn to_cairo_string(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&CAIRO_OFFSET)
        .format(DATETIME_FORMAT)
        .to_string()
}

/// 将 UTC 时间转换为 ISO-8601 / RFC3339（UTC, `Z`）
pub fn to_iso8601_utc_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 从开罗时间字符串解析为 UTC 时间
pub fn parse_cairo_string(s: &str) -> crate::error::Result<DateTime<Utc>> {
    use chrono::NaiveDateTime;
    let naive_dt = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| LawdeskError::TimeParse(e.to_string()))?;
    let cairo_dt = CAIRO_OFFSET
        .from_local_datetime(&naive_dt)
        .single()
        .ok_or_else(|| LawdeskError::TimeParse("Invalid local datetime".into()))?;
    Ok(cairo_dt.with_timezone(&Utc))
}

// tracing_subscriber 自定义时间格式：输出开罗时间，与数据库一致
pub struct CairoTimer;

impl tracing_subscriber::fmt::time::FormatTime for CairoTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Utc::now();
        let s = to_cairo_string(&now);
        write!(w, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cairo_string_roundtrips() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 20, 10, 20, 30).unwrap();
        let s = to_cairo_string(&dt);
        // 12:20:30 Cairo == 10:20:30 UTC
        assert_eq!(s, "2026-01-20 12:20:30");
        assert_eq!(parse_cairo_string(&s).unwrap(), dt);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_cairo_string("not a timestamp").is_err());
    }

    #[test]
    fn iso8601_is_utc_with_z() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 20, 10, 20, 30).unwrap();
        assert_eq!(to_iso8601_utc_string(&dt), "2026-01-20T10:20:30Z");
    }
}

//! Display formatting for feed rows: timestamps and durations.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::model::PipelineDetail;

/// Layout of `EnrichedRecord::created_at`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render `ts` in the display zone, or an empty string when absent.
pub fn format_created_at(ts: Option<DateTime<Utc>>, offset: &FixedOffset) -> String {
    match ts {
        Some(ts) => ts.with_timezone(offset).format(CREATED_AT_FORMAT).to_string(),
        None => String::new(),
    }
}

/// Inverse of [`format_created_at`].
///
/// Empty or unparseable input maps to the zero instant so it sorts first.
pub fn parse_created_at(s: &str, offset: &FixedOffset) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, CREATED_AT_FORMAT)
        .ok()
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Run time of a pipeline as `"<secs>s"`.
///
/// Prefers the service's reported duration, then the gap between the
/// created and updated timestamps. Empty when neither is usable, including
/// when `updated_at` precedes `created_at`.
pub fn format_duration(detail: &PipelineDetail) -> String {
    if let Some(secs) = detail.duration.filter(|d| *d > 0) {
        return format!("{secs}s");
    }
    match (detail.created_at, detail.updated_at) {
        (Some(created), Some(updated)) if updated >= created => {
            format!("{}s", (updated - created).num_seconds())
        }
        _ => String::new(),
    }
}

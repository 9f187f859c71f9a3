use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};

/// Format used in artifact file names, e.g. `20240131_235959`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub(crate) fn get_now() -> DateTime<FixedOffset> {
    let now = Local::now();
    now.with_timezone(now.offset())
}

pub(crate) fn timestamp_slug(at: &DateTime<FixedOffset>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp_slug(slug: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(slug, TIMESTAMP_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(dt.offset()))
}

use std::ops::Index;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

fn to_int<T: std::str::FromStr>(num_str: &str, date_str: &str) -> Result<T, String> {
    match num_str.parse::<T>() {
        Ok(x) => Ok(x),
        Err(_) => Err(format!("Error parsing {} from the date {}", num_str, date_str)),
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS[.mmm]`, the format hand-written headers tend to use.
pub fn parse_date_time(buf: &str) -> Result<NaiveDateTime, String> {
    lazy_static! {
        static ref DATE_TIME_REGEX: Regex = Regex::new(
            r#"^(\d{4})-(\d{1,2})-(\d{1,2})[ T](\d{1,2}):(\d{1,2}):(\d{1,2})(\.(\d{1,3}))?$"#
        ).unwrap();
    }

    let Some(caps) = DATE_TIME_REGEX.captures(buf.trim()) else {
        return Err(format!("Unable to parse date time {}", buf));
    };

    let to_i32 = |num_str: &str| to_int::<i32>(num_str, buf);
    let to_u32 = |num_str: &str| to_int::<u32>(num_str, buf);

    let y: i32 = to_i32(caps.index(1))?;
    let m: u32 = to_u32(caps.index(2))?;
    let d: u32 = to_u32(caps.index(3))?;
    let h: u32 = to_u32(caps.index(4))?;
    let mn: u32 = to_u32(caps.index(5))?;
    let s: u32 = to_u32(caps.index(6))?;
    let ms: u32 = match caps.get(8) {
        // ".5" means 500ms, not 5ms
        Some(frac) => to_u32(&format!("{:0<3}", frac.as_str()))?,
        None => 0,
    };

    let date = NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| format!("Invalid date in {}", buf))?;
    let time = NaiveTime::from_hms_milli_opt(h, mn, s, ms)
        .ok_or_else(|| format!("Invalid time in {}", buf))?;

    Ok(NaiveDateTime::new(date, time))
}

/// Milliseconds to the ISO-8601 form written to post headers, e.g. `2014-03-01T10:20:30.000Z`.
pub fn iso_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts the timestamp shapes found in headers and returns milliseconds.
pub fn parse_time_str(buf: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(buf.trim()) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = parse_date_time(buf) {
        return Some(dt.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(buf.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

pub fn parse_time(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => parse_time_str(s),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

pub fn format_date_time(millis: i64) -> (String, String) {
    let date_time = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default();
    let date = date_time.format("%Y-%m-%d").to_string();
    let time = date_time.format("%H:%M:%S").to_string();
    (date, time)
}

/// Turns a title into a post id: `"Héllo, World!"` becomes `"hello-world"`.
pub fn slugify(title: &str) -> String {
    lazy_static! {
        static ref SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    }

    let ascii = unidecode::unidecode(title).to_ascii_lowercase();
    let slug = SEPARATORS.replace_all(&ascii, "-");
    slug.trim_matches('-').to_string()
}

/// Start and end (exclusive) of a UTC calendar year, in milliseconds.
pub fn year_range(year: i32) -> Option<(i64, i64)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)?.and_hms_opt(0, 0, 0)?;
    Some((start.and_utc().timestamp_millis(), end.and_utc().timestamp_millis()))
}

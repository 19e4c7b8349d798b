//! Date and time helpers exposed to the agent.
//!
//! Stored dates are the UTC instant of local midnight in the tenant's
//! timezone, so both tools answer in those terms.

use async_trait::async_trait;
use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::{Tool, ToolError};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%A %B %d %Y",
    "%a %b %d %Y",
    "%Y %B %d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TimeToolError {
    #[error(
        "Unknown timezone: '{0}'. Please provide a valid IANA timezone name \
         (e.g., 'America/New_York', 'Asia/Kolkata')."
    )]
    UnknownTimezone(String),
    #[error("Could not parse date '{0}'. Provide a calendar date such as '2025-06-02' or 'June 2, 2025'.")]
    UnparseableDate(String),
    #[error("Local midnight of {date} is ambiguous or does not exist in {timezone}.")]
    AmbiguousLocalTime { date: NaiveDate, timezone: String },
}

/// Snapshot of "now" for one timezone, with the UTC day boundaries queries need.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeContext {
    pub local_timezone: String,
    pub local_datetime: String,
    pub utc_datetime: String,
    pub start_of_day_utc: String,
    pub end_of_day_utc: String,
    pub start_of_yesterday_utc: String,
    pub start_of_tomorrow_utc: String,
    pub current_month: String,
    pub current_year: i32,
}

pub fn parse_timezone(name: &str) -> Result<Tz, TimeToolError> {
    name.trim().parse::<Tz>().map_err(|_| TimeToolError::UnknownTimezone(name.to_string()))
}

pub fn time_context(timezone: Tz, now: DateTime<Utc>) -> TimeContext {
    let local = now.with_timezone(&timezone);
    let today = local.date_naive();

    let start_of_day = first_instant_of_day(timezone, today);
    let start_of_yesterday = first_instant_of_day(timezone, today - Duration::days(1));
    let start_of_tomorrow = first_instant_of_day(timezone, today + Duration::days(1));
    let end_of_day = start_of_tomorrow - Duration::microseconds(1);

    TimeContext {
        local_timezone: timezone.name().to_string(),
        local_datetime: local.to_rfc3339_opts(SecondsFormat::Micros, false),
        utc_datetime: now.to_rfc3339_opts(SecondsFormat::Micros, false),
        start_of_day_utc: boundary(start_of_day),
        end_of_day_utc: boundary(end_of_day),
        start_of_yesterday_utc: boundary(start_of_yesterday),
        start_of_tomorrow_utc: boundary(start_of_tomorrow),
        current_month: local.format("%B").to_string(),
        current_year: local.year(),
    }
}

/// UTC instant of local midnight of the date named by `date_input`.
pub fn date_to_utc_start_of_day(date_input: &str, timezone_name: &str) -> Result<String, TimeToolError> {
    let timezone = parse_timezone(timezone_name)?;
    let date = parse_date(date_input).ok_or_else(|| TimeToolError::UnparseableDate(date_input.to_string()))?;
    local_midnight_utc(timezone, date).map(boundary)
}

/// Best-effort parse of a free-form calendar date. Any time of day is ignored.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.date_naive());
    }

    let normalized = normalize_date_text(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&normalized, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
                .map(|datetime| datetime.date())
        })
}

/// Drops commas and ordinal suffixes: "June 2nd, 2025" -> "June 2 2025".
fn normalize_date_text(input: &str) -> String {
    input
        .replace(',', " ")
        .split_whitespace()
        .map(|token| {
            let lower = token.to_ascii_lowercase();
            let is_ordinal = ["st", "nd", "rd", "th"].iter().any(|suffix| {
                lower
                    .strip_suffix(suffix)
                    .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
            });
            if is_ordinal {
                &token[..token.len() - 2]
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn local_midnight_utc(timezone: Tz, date: NaiveDate) -> Result<DateTime<Utc>, TimeToolError> {
    timezone
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| TimeToolError::AmbiguousLocalTime { date, timezone: timezone.name().to_string() })
}

/// Earliest instant of `date` in `timezone`. Where clocks skip midnight the day
/// starts at the first local time that exists.
fn first_instant_of_day(timezone: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    let mut candidate = midnight;
    while candidate - midnight < Duration::days(1) {
        match timezone.from_local_datetime(&candidate) {
            LocalResult::Single(local) | LocalResult::Ambiguous(local, _) => return local.with_timezone(&Utc),
            LocalResult::None => candidate += Duration::minutes(15),
        }
    }
    Utc.from_utc_datetime(&midnight)
}

fn boundary(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// `get_current_date_time`, bound to the request timezone. The name is only
/// resolved when the tool runs, so a bad one comes back as a tool error.
#[derive(Clone, Debug)]
pub struct CurrentDateTimeTool {
    timezone_name: String,
}

impl CurrentDateTimeTool {
    pub fn new(timezone_name: impl Into<String>) -> Self {
        Self { timezone_name: timezone_name.into() }
    }
}

#[async_trait]
impl Tool for CurrentDateTimeTool {
    fn name(&self) -> &'static str {
        "get_current_date_time"
    }

    fn description(&self) -> &'static str {
        "Current date and time in the user's timezone, with UTC boundaries of today, \
         yesterday and tomorrow. Use it for relative dates such as today, yesterday, \
         this month or last year."
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        match parse_timezone(&self.timezone_name) {
            Ok(timezone) => serde_json::to_value(time_context(timezone, Utc::now()))
                .map_err(|error| ToolError::Execution(error.to_string())),
            Err(error) => Ok(json!({ "error": format!("Could not generate time context: {error}") })),
        }
    }
}

/// `convert_date_to_utc`; falls back to the request timezone when the model
/// omits one.
#[derive(Clone, Debug)]
pub struct ConvertDateToUtcTool {
    default_timezone: String,
}

impl ConvertDateToUtcTool {
    pub fn new(default_timezone: impl Into<String>) -> Self {
        Self { default_timezone: default_timezone.into() }
    }
}

#[async_trait]
impl Tool for ConvertDateToUtcTool {
    fn name(&self) -> &'static str {
        "convert_date_to_utc"
    }

    fn description(&self) -> &'static str {
        "Converts a specific date mentioned by the user to the UTC instant of that day's \
         local midnight. Use the returned utc_start_of_day in query filters."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "date_input": {
                    "type": "string",
                    "description": "The date as written, e.g. '2025-06-02' or 'June 2nd, 2025'."
                },
                "local_timezone_name": {
                    "type": "string",
                    "description": "IANA timezone name of the user, e.g. 'Asia/Kolkata'."
                }
            },
            "required": ["date_input", "local_timezone_name"]
        }))
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let date_input = input
            .get("date_input")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("`date_input` must be a string".to_string()))?;
        let timezone_name = input
            .get("local_timezone_name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.default_timezone);

        Ok(match date_to_utc_start_of_day(date_input, timezone_name) {
            Ok(utc) => json!({ "utc_start_of_day": utc }),
            Err(error) => json!({
                "original_input": format!("Date: {date_input}, Timezone: {timezone_name}"),
                "error": error.to_string(),
            }),
        })
    }
}

use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::recorder::SessionOutcome;

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} contains out-of-range value {value}"))
}

pub fn to_usize(value: i64, field: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_outcome(value: &str) -> Result<SessionOutcome> {
    match value {
        "Completed" => Ok(SessionOutcome::Completed),
        "Cancelled" => Ok(SessionOutcome::Cancelled),
        "SuddenClosure" => Ok(SessionOutcome::SuddenClosure),
        other => Err(anyhow!("unknown session status {other}")),
    }
}

//! Column encoding and row decoding shared by the store modules.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt::Display;
use std::str::FromStr;

use tourdesk_core::Timestamp;

use crate::error::{StoreError, StoreResult};

/// Fixed-width RFC 3339 so text comparison orders by time
pub(crate) fn ts(value: &Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn opt_ts(value: Option<&Timestamp>) -> Option<String> {
    value.map(ts)
}

pub(crate) fn json<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|err| StoreError::Decode(format!("encode json: {err}")))
}

/// Any `FromStr` column: ids, decimals, currencies, enums
pub(crate) fn parse<T>(row: &SqliteRow, column: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|err| StoreError::Decode(format!("invalid {column} '{raw}': {err}")))
}

pub(crate) fn parse_opt<T>(row: &SqliteRow, column: &str) -> StoreResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    row.try_get::<Option<String>, _>(column)?
        .map(|raw| {
            raw.parse()
                .map_err(|err| StoreError::Decode(format!("invalid {column} '{raw}': {err}")))
        })
        .transpose()
}

pub(crate) fn timestamp(row: &SqliteRow, column: &str) -> StoreResult<Timestamp> {
    parse_rfc3339(column, &row.try_get::<String, _>(column)?)
}

pub(crate) fn opt_timestamp(row: &SqliteRow, column: &str) -> StoreResult<Option<Timestamp>> {
    row.try_get::<Option<String>, _>(column)?
        .as_deref()
        .map(|value| parse_rfc3339(column, value))
        .transpose()
}

pub(crate) fn opt_date(row: &SqliteRow, column: &str) -> StoreResult<Option<NaiveDate>> {
    parse_opt(row, column)
}

pub(crate) fn from_json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> StoreResult<T> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw)
        .map_err(|err| StoreError::Decode(format!("invalid {column} json: {err}")))
}

pub(crate) fn unsigned(row: &SqliteRow, column: &str) -> StoreResult<u32> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| StoreError::Decode(format!("invalid {column}: {raw}")))
}

fn parse_rfc3339(field: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StoreError::Decode(format!("invalid {field} timestamp '{value}': {err}")))
}

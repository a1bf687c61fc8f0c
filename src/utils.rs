// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::str::FromStr;

use crate::models::Id;
use crate::schedule::{Frequency, Schedule};

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

pub fn fmt_money(d: &Decimal) -> String {
    format!("{:.2}", d.round_dp(2))
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(json_flag: bool, v: &T) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    Ok(false)
}

/// A required argument; clap enforces presence, this keeps the handlers free of unwraps.
pub fn arg<'a>(m: &'a clap::ArgMatches, name: &str) -> Result<&'a String> {
    m.get_one::<String>(name)
        .with_context(|| format!("Missing argument '{}'", name))
}

pub fn opt_arg<'a>(m: &'a clap::ArgMatches, name: &str) -> Option<&'a str> {
    m.get_one::<String>(name).map(String::as_str)
}

pub fn id_arg(m: &clap::ArgMatches, name: &str) -> Result<Id> {
    m.get_one::<Id>(name)
        .copied()
        .with_context(|| format!("Missing argument '{}'", name))
}

pub fn opt_parsed<T>(m: &clap::ArgMatches, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    opt_arg(m, name).map(|s| s.parse::<T>()).transpose().map_err(Into::into)
}

pub fn opt_date(m: &clap::ArgMatches, name: &str) -> Result<Option<NaiveDate>> {
    opt_arg(m, name).map(parse_date).transpose()
}

pub fn opt_decimal(m: &clap::ArgMatches, name: &str) -> Result<Option<Decimal>> {
    opt_arg(m, name).map(parse_decimal).transpose()
}

/// Reads `--every/--interval` into a schedule, `None` when `--every` is absent.
pub fn schedule_from(m: &clap::ArgMatches) -> Result<Option<Schedule>> {
    let Some(every) = opt_arg(m, "every") else {
        return Ok(None);
    };
    let frequency: Frequency = every.parse()?;
    let interval = m.get_one::<u32>("interval").copied().unwrap_or(1);
    Ok(Some(Schedule::new(frequency, interval)?))
}

pub fn id_for_account(conn: &Connection, owner: &str, name: &str) -> Result<Id> {
    let name = name.trim();
    if let Ok(id) = name.parse::<Id>() {
        return Ok(id);
    }
    let mut stmt = conn.prepare("SELECT id FROM accounts WHERE owner=?1 AND name=?2")?;
    let id: Id = stmt
        .query_row(params![owner, name], |r| r.get(0))
        .with_context(|| format!("Account '{}' not found", name))?;
    Ok(id)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Reads a TEXT column holding an exact decimal.
pub fn decimal_at(r: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = r.get(idx)?;
    raw.parse::<Decimal>().map_err(|e| conversion_error(idx, e))
}

pub fn opt_decimal_at(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = r.get(idx)?;
    raw.map(|s| s.parse::<Decimal>().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Reads a TEXT column through the type's `FromStr`.
pub fn parse_at<T>(r: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = r.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

pub fn opt_parse_at<T>(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = r.get(idx)?;
    raw.map(|s| s.parse::<T>().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub fn json_at<T: DeserializeOwned>(r: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = r.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub fn opt_json_at<T: DeserializeOwned>(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = r.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

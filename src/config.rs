// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Runtime settings kept in the `settings` table, with typed accessors and defaults.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{LedgerError, Result};

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub const RECURRING_LOOKAHEAD_DAYS: &str = "recurring_lookahead_days";
pub const SETTLEMENT_WARNING_DAYS: &str = "settlement_warning_days";
pub const DEFAULT_ALERT_THRESHOLD: &str = "default_alert_threshold";
pub const BUSY_TIMEOUT_MS: &str = "busy_timeout_ms";

/// Known keys and their defaults.
pub const DEFAULTS: &[(&str, &str)] = &[
    (RECURRING_LOOKAHEAD_DAYS, "3"),
    (SETTLEMENT_WARNING_DAYS, "5"),
    (DEFAULT_ALERT_THRESHOLD, "80"),
    (BUSY_TIMEOUT_MS, "5000"),
];

fn default_for(key: &str) -> Option<&'static str> {
    DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<String> {
    let default = default_for(key)
        .ok_or_else(|| LedgerError::invalid(format!("unknown setting '{}'", key)))?;
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key=?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(stored.unwrap_or_else(|| default.to_string()))
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    if default_for(key).is_none() {
        return Err(LedgerError::invalid(format!("unknown setting '{}'", key)));
    }
    let value = value.trim();
    let parsed: i64 = value
        .parse()
        .map_err(|_| LedgerError::invalid(format!("setting '{}' expects an integer", key)))?;
    if parsed < 0 || (key == DEFAULT_ALERT_THRESHOLD && parsed > 100) {
        return Err(LedgerError::invalid(format!(
            "value {} out of range for '{}'",
            parsed, key
        )));
    }
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_settings(conn: &Connection) -> Result<Vec<(String, String)>> {
    DEFAULTS
        .iter()
        .map(|(key, _)| Ok((key.to_string(), get_setting(conn, key)?)))
        .collect()
}

fn get_int(conn: &Connection, key: &str) -> Result<i64> {
    let raw = get_setting(conn, key)?;
    raw.parse().map_err(|_| {
        LedgerError::invalid(format!("setting '{}' has non-integer value '{}'", key, raw))
    })
}

pub fn recurring_lookahead_days(conn: &Connection) -> Result<i64> {
    get_int(conn, RECURRING_LOOKAHEAD_DAYS)
}

pub fn settlement_warning_days(conn: &Connection) -> Result<i64> {
    get_int(conn, SETTLEMENT_WARNING_DAYS)
}

pub fn default_alert_threshold(conn: &Connection) -> Result<u8> {
    let v = get_int(conn, DEFAULT_ALERT_THRESHOLD)?;
    u8::try_from(v.clamp(0, 100)).map_err(|_| LedgerError::invalid("alert threshold out of range"))
}

pub fn busy_timeout_ms(conn: &Connection) -> Result<u64> {
    let v = get_int(conn, BUSY_TIMEOUT_MS)?;
    Ok(u64::try_from(v).unwrap_or(DEFAULT_BUSY_TIMEOUT_MS))
}

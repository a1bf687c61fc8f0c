// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::config::{get_setting, list_settings, set_setting};
use crate::utils::{arg, pretty_table};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("get", sub)) => {
            let key = arg(sub, "key")?;
            println!("{} = {}", key, get_setting(conn, key)?);
        }
        Some(("set", sub)) => {
            let key = arg(sub, "key")?;
            let value = arg(sub, "value")?;
            set_setting(conn, key, value)?;
            println!("Set {} = {}", key, value.trim());
        }
        Some(("list", _)) => {
            let rows = list_settings(conn)?
                .into_iter()
                .map(|(k, v)| vec![k, v])
                .collect();
            println!("{}", pretty_table(&["Key", "Value"], rows));
        }
        _ => {}
    }
    Ok(())
}

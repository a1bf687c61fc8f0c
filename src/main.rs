// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use ledgerwise::engine::Engine;
use ledgerwise::{cli, commands, db};

fn main() -> Result<()> {
    ledgerwise::init_tracing();

    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let mut conn = db::open_or_init()?;
    let engine = Engine::default();
    let owner = cli::owner(&matches);

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("account", sub)) => commands::accounts::handle(&engine, &mut conn, &owner, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&engine, &mut conn, &owner, sub)?,
        Some(("liability", sub)) => commands::liabilities::handle(&engine, &mut conn, &owner, sub)?,
        Some(("bill", sub)) => commands::bills::handle(&engine, &mut conn, &owner, sub)?,
        Some(("budget", sub)) => commands::budgets::handle(&engine, &mut conn, &owner, sub)?,
        Some(("goal", sub)) => commands::goals::handle(&engine, &mut conn, &owner, sub)?,
        Some(("recurring", sub)) => commands::recurring::handle(&engine, &mut conn, &owner, sub)?,
        Some(("settle", sub)) => commands::settlements::handle(&engine, &mut conn, &owner, sub)?,
        Some(("report", sub)) => commands::reports::handle(&conn, &owner, sub)?,
        Some(("doctor", _)) => {
            commands::doctor::handle(&engine, &conn, &owner)?;
        }
        Some(("config", sub)) => commands::settings::handle(&conn, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}

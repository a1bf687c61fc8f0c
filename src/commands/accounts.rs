// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::engine::accounts::{list_accounts, NewAccount};
use crate::engine::Engine;
use crate::models::AccountType;
use crate::utils::{arg, fmt_money, id_for_account, maybe_print_json, parse_decimal, pretty_table};

pub fn handle(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = arg(sub, "name")?;
            let account_type: AccountType = arg(sub, "type")?.parse()?;
            let opening_balance = parse_decimal(arg(sub, "opening")?)?;
            let acct = engine.create_account(
                conn,
                owner,
                NewAccount {
                    name: name.clone(),
                    account_type,
                    opening_balance,
                },
            )?;
            println!(
                "Added account '{}' (#{}, {}, opening {})",
                acct.name,
                acct.id,
                acct.account_type,
                fmt_money(&acct.balance)
            );
        }
        Some(("list", sub)) => {
            let accounts = list_accounts(conn, owner, sub.get_flag("all"))?;
            if maybe_print_json(sub.get_flag("json"), &accounts)? {
                return Ok(());
            }
            let data = accounts
                .iter()
                .map(|a| {
                    vec![
                        a.id.to_string(),
                        a.name.clone(),
                        a.account_type.to_string(),
                        fmt_money(&a.balance),
                        fmt_money(&a.opening_balance),
                        if a.is_active { "yes" } else { "no" }.to_string(),
                        a.last_settled_at
                            .map(|t| t.date_naive().to_string())
                            .unwrap_or_default(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(
                    &["Id", "Name", "Type", "Balance", "Opening", "Active", "Settled"],
                    data
                )
            );
        }
        Some(("rename", sub)) => {
            let id = id_for_account(conn, owner, arg(sub, "account")?)?;
            let acct = engine.rename_account(conn, owner, id, arg(sub, "name")?)?;
            println!("Renamed account #{} to '{}'", acct.id, acct.name);
        }
        Some(("deactivate", sub)) => {
            let id = id_for_account(conn, owner, arg(sub, "account")?)?;
            let acct = engine.deactivate_account(conn, owner, id)?;
            println!("Deactivated account '{}'", acct.name);
        }
        Some(("reactivate", sub)) => {
            let id = id_for_account(conn, owner, arg(sub, "account")?)?;
            let acct = engine.reactivate_account(conn, owner, id)?;
            println!("Reactivated account '{}'", acct.name);
        }
        _ => {}
    }
    Ok(())
}

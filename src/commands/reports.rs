// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::accounts::list_accounts;
use crate::engine::liabilities::list_liabilities;
use crate::models::AccountType;
use crate::utils::{fmt_money, maybe_print_json, pretty_table};

pub fn handle(conn: &Connection, owner: &str, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("balances", sub)) => balances(conn, owner, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct BalanceReport {
    pub accounts: Vec<BalanceLine>,
    pub assets: Decimal,
    pub outstanding_liabilities: Decimal,
    pub net_worth: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BalanceLine {
    pub account: String,
    pub account_type: AccountType,
    pub balance: Decimal,
}

/// Active account balances with outstanding debt netted off.
pub fn balance_report(conn: &Connection, owner: &str) -> Result<BalanceReport> {
    let accounts: Vec<BalanceLine> = list_accounts(conn, owner, false)?
        .into_iter()
        .map(|a| BalanceLine {
            account: a.name,
            account_type: a.account_type,
            balance: a.balance,
        })
        .collect();
    let assets: Decimal = accounts.iter().map(|l| l.balance).sum();
    let outstanding_liabilities: Decimal = list_liabilities(conn, owner)?
        .iter()
        .map(|l| l.remaining_amount())
        .sum();
    Ok(BalanceReport {
        assets,
        outstanding_liabilities,
        net_worth: assets - outstanding_liabilities,
        accounts,
    })
}

fn balances(conn: &Connection, owner: &str, sub: &clap::ArgMatches) -> Result<()> {
    let report = balance_report(conn, owner)?;
    if maybe_print_json(sub.get_flag("json"), &report)? {
        return Ok(());
    }
    let mut data: Vec<Vec<String>> = report
        .accounts
        .iter()
        .map(|l| vec![l.account.clone(), l.account_type.to_string(), fmt_money(&l.balance)])
        .collect();
    data.push(vec!["Total assets".into(), String::new(), fmt_money(&report.assets)]);
    data.push(vec![
        "Outstanding liabilities".into(),
        String::new(),
        fmt_money(&report.outstanding_liabilities),
    ]);
    data.push(vec!["Net worth".into(), String::new(), fmt_money(&report.net_worth)]);
    println!("{}", pretty_table(&["Account", "Type", "Balance"], data));
    Ok(())
}

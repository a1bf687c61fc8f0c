// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{bail, Result};
use rusqlite::Connection;

use crate::engine::budgets::{list_budgets, NewBudget};
use crate::engine::Engine;
use crate::models::{Budget, Category};
use crate::period::Period;
use crate::utils::{
    arg, fmt_money, id_arg, maybe_print_json, opt_arg, opt_date, parse_decimal, pretty_table,
};

pub fn handle(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let window = (
                opt_arg(sub, "period"),
                opt_date(sub, "start")?,
                opt_date(sub, "end")?,
            );
            let (start_date, end_date) = match window {
                (Some(p), None, None) => {
                    let period = Period::parse(p)?;
                    (period.start(), period.end())
                }
                (None, Some(start), Some(end)) => (start, end),
                (None, None, None) => {
                    let period = Period::month_of(engine.today());
                    (period.start(), period.end())
                }
                _ => bail!("Use either --period or both --start and --end"),
            };
            let new = NewBudget {
                name: arg(sub, "name")?.clone(),
                category: arg(sub, "category")?.parse::<Category>()?,
                amount: parse_decimal(arg(sub, "amount")?)?,
                start_date,
                end_date,
                alert_threshold: sub.get_one::<u8>("threshold").copied(),
            };
            let b = engine.create_budget(conn, owner, new)?;
            println!(
                "Budget '{}' (#{}) set: {} for {} from {} to {} (spent {})",
                b.name,
                b.id,
                fmt_money(&b.amount),
                b.category,
                b.start_date,
                b.end_date,
                fmt_money(&b.spent)
            );
        }
        Some(("list", sub)) => {
            let data = list_budgets(conn, owner)?;
            if maybe_print_json(sub.get_flag("json"), &data)? {
                return Ok(());
            }
            let rows = data.iter().map(row).collect();
            println!(
                "{}",
                pretty_table(
                    &[
                        "Id",
                        "Name",
                        "Category",
                        "Window",
                        "Budget",
                        "Spent",
                        "Remaining",
                        "Used %",
                        "Alert",
                    ],
                    rows
                )
            );
        }
        Some(("refresh", sub)) => {
            let b = engine.refresh_budget(conn, owner, id_arg(sub, "id")?)?;
            println!(
                "Budget '{}' spent {} of {} ({}%)",
                b.name,
                fmt_money(&b.spent),
                fmt_money(&b.amount),
                b.usage_percent().round_dp(1)
            );
        }
        _ => {}
    }
    Ok(())
}

fn row(b: &Budget) -> Vec<String> {
    vec![
        b.id.to_string(),
        b.name.clone(),
        b.category.to_string(),
        format!("{}..{}", b.start_date, b.end_date),
        fmt_money(&b.amount),
        fmt_money(&b.spent),
        fmt_money(&b.remaining()),
        format!("{}", b.usage_percent().round_dp(1)),
        b.alert_level.to_string(),
    ]
}

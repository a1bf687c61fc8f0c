// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{bail, Result};
use rusqlite::Connection;

use crate::engine::settlement::{get_settlement, list_settlements};
use crate::engine::Engine;
use crate::models::Settlement;
use crate::period::Period;
use crate::utils::{arg, fmt_money, maybe_print_json, opt_arg, pretty_table};

pub fn handle(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("run", sub)) => {
            let period = Period::parse(arg(sub, "period")?)?;
            let s = engine.perform_settlement(conn, owner, &period)?;
            println!(
                "Settled {} ({} transactions); carry forward {}",
                s.period,
                s.summary.transaction_count,
                fmt_money(&s.carry_forward_balance)
            );
        }
        Some(("check", _)) => {
            let advice = engine.check_settlement_needed(conn, owner)?;
            if advice.is_settled {
                println!("{} is already settled", advice.period);
            } else if advice.needed {
                println!(
                    "{} should be settled: {} day(s) left",
                    advice.period, advice.days_remaining
                );
            } else {
                println!(
                    "{} is open: {} day(s) left",
                    advice.period, advice.days_remaining
                );
            }
            if let Some(prev) = advice.previous_unsettled {
                println!("Previous period {} was never settled", prev);
            }
        }
        Some(("show", sub)) => {
            let s = get_settlement(conn, owner, arg(sub, "period")?)?;
            if maybe_print_json(sub.get_flag("json"), &s)? {
                return Ok(());
            }
            print_settlement(&s);
        }
        Some(("list", sub)) => {
            let data = list_settlements(conn, owner)?;
            if maybe_print_json(sub.get_flag("json"), &data)? {
                return Ok(());
            }
            let rows = data
                .iter()
                .map(|s| {
                    vec![
                        s.period.clone(),
                        s.period_type.as_str().to_string(),
                        fmt_money(&s.summary.total_income),
                        fmt_money(&s.summary.total_expense),
                        fmt_money(&s.summary.net_savings),
                        fmt_money(&s.carry_forward_balance),
                        s.settled_at.format("%Y-%m-%d %H:%M").to_string(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(
                    &["Period", "Type", "Income", "Expense", "Net", "Carry forward", "Settled at"],
                    rows
                )
            );
        }
        Some(("notes", sub)) => {
            let period = arg(sub, "period")?;
            let notes = opt_arg(sub, "text").map(str::to_string);
            let s = engine.update_settlement_notes(conn, owner, period, notes)?;
            match &s.notes {
                Some(n) => println!("Notes for {} set: {}", s.period, n),
                None => println!("Notes for {} cleared", s.period),
            }
        }
        Some(("export", sub)) => export_settlement(conn, owner, sub)?,
        _ => {}
    }
    Ok(())
}

fn print_settlement(s: &Settlement) {
    println!(
        "Settlement {} ({} .. {})",
        s.period, s.period_start, s.period_end
    );
    let summary = &s.summary;
    println!(
        "{}",
        pretty_table(
            &["Income", "Expense", "Transfers", "Debt paid", "Loans", "Net", "Count"],
            vec![vec![
                fmt_money(&summary.total_income),
                fmt_money(&summary.total_expense),
                fmt_money(&summary.total_transfers),
                fmt_money(&summary.total_liability_payments),
                fmt_money(&summary.total_loan_proceeds),
                fmt_money(&summary.net_savings),
                summary.transaction_count.to_string(),
            ]]
        )
    );
    let rows = s
        .accounts
        .iter()
        .map(|a| {
            vec![
                a.name.clone(),
                a.account_type.to_string(),
                fmt_money(&a.opening_balance),
                fmt_money(&a.total_inflow),
                fmt_money(&a.total_outflow),
                fmt_money(&a.closing_balance),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Account", "Type", "Opening", "In", "Out", "Closing"], rows)
    );
    let l = &s.liabilities;
    println!(
        "Liabilities: opening {}, new {}, paid {}, carried forward {}",
        fmt_money(&l.total_opening),
        fmt_money(&l.total_new),
        fmt_money(&l.total_paid),
        fmt_money(&l.total_carry_forward)
    );
    if let Some(n) = &s.notes {
        println!("Notes: {}", n);
    }
}

fn export_settlement(conn: &Connection, owner: &str, sub: &clap::ArgMatches) -> Result<()> {
    let period = arg(sub, "period")?;
    let fmt = arg(sub, "format")?.to_lowercase();
    let out = arg(sub, "out")?;
    let s = get_settlement(conn, owner, period)?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "period",
                "account_id",
                "account",
                "type",
                "opening",
                "inflow",
                "outflow",
                "closing",
            ])?;
            for a in &s.accounts {
                wtr.write_record([
                    s.period.clone(),
                    a.account_id.to_string(),
                    a.name.clone(),
                    a.account_type.to_string(),
                    a.opening_balance.to_string(),
                    a.total_inflow.to_string(),
                    a.total_outflow.to_string(),
                    a.closing_balance.to_string(),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            std::fs::write(out, serde_json::to_string_pretty(&s)?)?;
        }
        other => bail!("Unknown format: {} (use csv|json)", other),
    }
    println!("Exported settlement {} to {}", s.period, out);
    Ok(())
}

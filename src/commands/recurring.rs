// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::engine::recurring::{list_templates, RecurringTemplate};
use crate::engine::Engine;
use crate::utils::{fmt_money, id_arg, maybe_print_json, opt_decimal, pretty_table};

pub fn handle(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => {
            let data = list_templates(conn, owner, engine.today())?;
            print_templates(sub, &data)?;
        }
        Some(("pending", sub)) => {
            let data = engine.pending_approvals(conn, owner)?;
            print_templates(sub, &data)?;
        }
        Some(("approve", sub)) => {
            let id = id_arg(sub, "id")?;
            let txn = engine.approve_recurring(conn, owner, id, opt_decimal(sub, "amount")?)?;
            println!(
                "Approved template #{}: posted #{} of {} on {}",
                id,
                txn.id,
                fmt_money(&txn.amount),
                txn.date
            );
        }
        Some(("skip", sub)) => {
            let id = id_arg(sub, "id")?;
            let cfg = engine.skip_recurring(conn, owner, id)?;
            println!("Skipped template #{}; next run {}", id, cfg.next_execution);
        }
        Some(("cancel", sub)) => {
            let id = id_arg(sub, "id")?;
            let cfg = engine.cancel_recurring(conn, owner, id)?;
            let end = cfg.end_date.map(|d| d.to_string()).unwrap_or_default();
            println!("Cancelled template #{} (ends {})", id, end);
        }
        Some(("process", _)) => {
            let posted = engine.process_due_recurring(conn, owner)?;
            for t in &posted {
                println!("Posted #{} {} {} on {}", t.id, t.tx_type, fmt_money(&t.amount), t.date);
            }
            println!("{} recurring transaction(s) posted", posted.len());
        }
        _ => {}
    }
    Ok(())
}

fn print_templates(sub: &clap::ArgMatches, data: &[RecurringTemplate]) -> Result<()> {
    if maybe_print_json(sub.get_flag("json"), &data)? {
        return Ok(());
    }
    let rows = data
        .iter()
        .map(|tpl| {
            let t = &tpl.transaction;
            let (schedule, next, until, approval) = match &t.recurring {
                Some(cfg) => (
                    cfg.schedule.label(),
                    cfg.next_execution.to_string(),
                    cfg.end_date.map(|d| d.to_string()).unwrap_or_default(),
                    if cfg.requires_approval { "yes" } else { "no" }.to_string(),
                ),
                None => Default::default(),
            };
            vec![
                t.id.to_string(),
                t.tx_type.to_string(),
                fmt_money(&t.amount),
                t.category.map(|c| c.to_string()).unwrap_or_default(),
                schedule,
                next,
                until,
                approval,
                tpl.state.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Id", "Type", "Amount", "Category", "Repeats", "Next", "Until", "Approval", "State"],
            rows
        )
    );
    Ok(())
}

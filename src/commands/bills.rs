// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::engine::bills::{list_bills, BillPaymentRequest, NewBill};
use crate::engine::Engine;
use crate::models::{Bill, Category, RecurringPattern};
use crate::utils::{
    arg, fmt_money, id_arg, id_for_account, maybe_print_json, opt_date, opt_decimal, parse_date,
    parse_decimal, pretty_table, schedule_from,
};

pub fn handle(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let recurring = schedule_from(sub)?
                .map(|schedule| -> Result<RecurringPattern> {
                    Ok(RecurringPattern {
                        schedule,
                        end_date: opt_date(sub, "until")?,
                    })
                })
                .transpose()?;
            let new = NewBill {
                name: arg(sub, "name")?.clone(),
                amount: parse_decimal(arg(sub, "amount")?)?,
                category: arg(sub, "category")?.parse::<Category>()?,
                due_date: parse_date(arg(sub, "due")?)?,
                recurring,
                reminder_days: sub
                    .get_many::<u32>("remind")
                    .map(|v| v.copied().collect())
                    .unwrap_or_default(),
            };
            let bill = engine.create_bill(conn, owner, new)?;
            println!(
                "Added bill '{}' (#{}) of {} due {}",
                bill.name,
                bill.id,
                fmt_money(&bill.amount),
                bill.due_date
            );
        }
        Some(("pay", sub)) => {
            let id = id_arg(sub, "id")?;
            let req = BillPaymentRequest {
                account_id: id_for_account(conn, owner, arg(sub, "from")?)?,
                amount: opt_decimal(sub, "amount")?,
                date: opt_date(sub, "date")?,
            };
            let out = engine.mark_bill_as_paid(conn, owner, id, req)?;
            println!(
                "Paid {} on '{}'; outstanding {}",
                fmt_money(&out.payment.amount),
                out.bill.name,
                fmt_money(&out.bill.outstanding())
            );
            if let Some(next) = out.successor {
                println!("Next '{}' (#{}) due {}", next.name, next.id, next.due_date);
            }
        }
        Some(("list", sub)) => {
            let data = list_bills(conn, owner)?;
            print_bills(engine, sub, &data)?;
        }
        Some(("upcoming", sub)) => {
            let days = sub.get_one::<u32>("days").copied().unwrap_or(7);
            let data = engine.upcoming_bills(conn, owner, days)?;
            print_bills(engine, sub, &data)?;
        }
        Some(("remind", _)) => {
            let sent = engine.dispatch_due_reminders(conn, owner)?;
            for r in &sent {
                println!("[{:?}] {}", r.notification.priority, r.notification.message);
            }
            println!("Sent {} reminder(s)", sent.len());
        }
        _ => {}
    }
    Ok(())
}

fn print_bills(engine: &Engine, sub: &clap::ArgMatches, data: &[Bill]) -> Result<()> {
    if maybe_print_json(sub.get_flag("json"), &data)? {
        return Ok(());
    }
    let today = engine.today();
    let rows = data
        .iter()
        .map(|b| {
            vec![
                b.id.to_string(),
                b.name.clone(),
                b.due_date.to_string(),
                fmt_money(&b.amount),
                fmt_money(&b.paid_amount),
                b.status(today).to_string(),
                b.recurring
                    .as_ref()
                    .map(|r| r.schedule.label())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Id", "Name", "Due", "Amount", "Paid", "Status", "Repeats"], rows)
    );
    Ok(())
}

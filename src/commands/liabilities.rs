// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::engine::liabilities::{
    liability_payments, list_liabilities, NewLiability, PaymentRequest,
};
use crate::engine::Engine;
use crate::models::LiabilityKind;
use crate::utils::{
    arg, fmt_money, id_arg, id_for_account, maybe_print_json, opt_arg, opt_date, opt_decimal,
    parse_decimal, pretty_table,
};

pub fn handle(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let kind: LiabilityKind = arg(sub, "kind")?.parse()?;
            let received_into = opt_arg(sub, "received-into")
                .map(|a| id_for_account(conn, owner, a))
                .transpose()?;
            let new = NewLiability {
                name: arg(sub, "name")?.clone(),
                kind,
                lender: opt_arg(sub, "lender").map(str::to_string),
                total_amount: parse_decimal(arg(sub, "total")?)?,
                interest_rate: opt_decimal(sub, "rate")?,
                due_date: opt_date(sub, "due")?,
                received_into,
            };
            let l = engine.create_liability(conn, owner, new)?;
            println!(
                "Added liability '{}' (#{}, {} of {})",
                l.name,
                l.id,
                l.kind,
                fmt_money(&l.total_amount)
            );
        }
        Some(("pay", sub)) => {
            let id = id_arg(sub, "id")?;
            let req = PaymentRequest {
                account_id: id_for_account(conn, owner, arg(sub, "from")?)?,
                amount: parse_decimal(arg(sub, "amount")?)?,
                date: opt_date(sub, "date")?,
                description: None,
            };
            let out = engine.make_payment(conn, owner, id, req)?;
            println!(
                "Paid {} towards '{}'; remaining {} ({})",
                fmt_money(&out.payment.amount),
                out.liability.name,
                fmt_money(&out.liability.remaining_amount()),
                out.liability.status()
            );
        }
        Some(("list", sub)) => {
            let data = list_liabilities(conn, owner)?;
            if maybe_print_json(sub.get_flag("json"), &data)? {
                return Ok(());
            }
            let rows = data
                .iter()
                .map(|l| {
                    vec![
                        l.id.to_string(),
                        l.name.clone(),
                        l.kind.to_string(),
                        l.lender.clone().unwrap_or_default(),
                        fmt_money(&l.total_amount),
                        fmt_money(&l.paid_amount),
                        fmt_money(&l.remaining_amount()),
                        l.status().to_string(),
                        l.settlement_period.clone(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(
                    &[
                        "Id",
                        "Name",
                        "Kind",
                        "Lender",
                        "Total",
                        "Paid",
                        "Remaining",
                        "Status",
                        "Period",
                    ],
                    rows
                )
            );
        }
        Some(("payments", sub)) => {
            let data = liability_payments(conn, owner, id_arg(sub, "id")?)?;
            if maybe_print_json(sub.get_flag("json"), &data)? {
                return Ok(());
            }
            let rows = data
                .iter()
                .map(|p| {
                    vec![
                        p.id.to_string(),
                        p.date.to_string(),
                        p.account_id.to_string(),
                        fmt_money(&p.amount),
                        p.transaction_id.to_string(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Id", "Date", "Account", "Amount", "Transaction"], rows)
            );
        }
        _ => {}
    }
    Ok(())
}

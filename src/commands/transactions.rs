// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::engine::transactions::{
    list_transactions, RecurringDraft, TransactionDraft, TransactionFilter, TransactionPatch,
};
use crate::engine::Engine;
use crate::models::{Category, Transaction, TransactionType};
use crate::period::Period;
use crate::utils::{
    arg, fmt_money, id_arg, id_for_account, maybe_print_json, opt_arg, opt_date, opt_decimal,
    opt_parsed, parse_decimal, pretty_table, schedule_from,
};

pub fn handle(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(engine, conn, owner, sub)?,
        Some(("update", sub)) => update(engine, conn, owner, sub)?,
        Some(("rm", sub)) => {
            let id = id_arg(sub, "id")?;
            engine.delete_transaction(conn, owner, id)?;
            println!("Deleted transaction #{}", id);
        }
        Some(("list", sub)) => list(conn, owner, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(engine: &Engine, conn: &mut Connection, owner: &str, sub: &clap::ArgMatches) -> Result<()> {
    let tx_type: TransactionType = arg(sub, "type")?.parse()?;
    let account_id = id_for_account(conn, owner, arg(sub, "account")?)?;
    let amount = parse_decimal(arg(sub, "amount")?)?;
    let date = opt_date(sub, "date")?.unwrap_or_else(|| engine.today());

    let mut draft = TransactionDraft::new(tx_type, account_id, amount, date);
    draft.category = opt_parsed::<Category>(sub, "category")?;
    if let Some(to) = opt_arg(sub, "to") {
        draft = draft.to_account(id_for_account(conn, owner, to)?);
    }
    if let Some(desc) = opt_arg(sub, "description") {
        draft = draft.description(desc);
    }
    if let Some(schedule) = schedule_from(sub)? {
        draft = draft.recurring(RecurringDraft {
            schedule,
            end_date: opt_date(sub, "until")?,
            requires_approval: sub.get_flag("approval"),
        });
    }

    let txn = engine.create_transaction(conn, owner, draft)?;
    if txn.is_template() {
        println!(
            "Scheduled recurring {} #{} of {} starting {}",
            txn.tx_type,
            txn.id,
            fmt_money(&txn.amount),
            txn.date
        );
    } else {
        println!(
            "Recorded {} #{} of {} on {}",
            txn.tx_type,
            txn.id,
            fmt_money(&txn.amount),
            txn.date
        );
    }
    Ok(())
}

fn update(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    sub: &clap::ArgMatches,
) -> Result<()> {
    let id = id_arg(sub, "id")?;
    let patch = TransactionPatch {
        tx_type: None,
        account_id: opt_arg(sub, "account")
            .map(|a| id_for_account(conn, owner, a))
            .transpose()?,
        to_account_id: opt_arg(sub, "to")
            .map(|a| id_for_account(conn, owner, a))
            .transpose()?,
        amount: opt_decimal(sub, "amount")?,
        category: opt_parsed::<Category>(sub, "category")?,
        description: opt_arg(sub, "description").map(str::to_string),
        date: opt_date(sub, "date")?,
    };
    let txn = engine.update_transaction(conn, owner, id, patch)?;
    println!(
        "Updated transaction #{}: {} {} on {}",
        txn.id,
        txn.tx_type,
        fmt_money(&txn.amount),
        txn.date
    );
    Ok(())
}

fn list(conn: &Connection, owner: &str, sub: &clap::ArgMatches) -> Result<()> {
    let filter = TransactionFilter {
        account_id: opt_arg(sub, "account")
            .map(|a| id_for_account(conn, owner, a))
            .transpose()?,
        category: opt_parsed::<Category>(sub, "category")?,
        period: opt_arg(sub, "period").map(Period::parse).transpose()?,
        tx_type: opt_parsed::<TransactionType>(sub, "type")?,
        include_templates: sub.get_flag("templates"),
        limit: sub.get_one::<usize>("limit").copied(),
    };
    let data = list_transactions(conn, owner, &filter)?;
    if maybe_print_json(sub.get_flag("json"), &data)? {
        return Ok(());
    }
    let rows = data.iter().map(row).collect();
    println!(
        "{}",
        pretty_table(
            &[
                "Id",
                "Date",
                "Type",
                "Account",
                "To",
                "Amount",
                "Category",
                "Description",
                "Settled",
            ],
            rows
        )
    );
    Ok(())
}

fn row(t: &Transaction) -> Vec<String> {
    vec![
        t.id.to_string(),
        t.date.to_string(),
        if t.is_template() {
            format!("{} (recurring)", t.tx_type)
        } else {
            t.tx_type.to_string()
        },
        t.account_id.to_string(),
        t.to_account_id.map(|id| id.to_string()).unwrap_or_default(),
        fmt_money(&t.amount),
        t.category.map(|c| c.to_string()).unwrap_or_default(),
        t.description.clone().unwrap_or_default(),
        t.settlement_period.clone().unwrap_or_default(),
    ]
}

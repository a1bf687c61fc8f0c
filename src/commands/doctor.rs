// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::engine::accounts::list_accounts;
use crate::engine::Engine;
use crate::utils::{fmt_money, pretty_table};

/// Returns the number of issues found so callers can act on it.
pub fn handle(engine: &Engine, conn: &Connection, owner: &str) -> Result<usize> {
    let mut rows = Vec::new();

    // 1) Stored balance must equal opening + unsettled ledger effects
    for account in list_accounts(conn, owner, true)? {
        let check = engine.verify_account_balance(conn, owner, account.id)?;
        if !check.consistent {
            rows.push(vec![
                "balance_mismatch".into(),
                format!(
                    "{} (#{}): stored {}, ledger {}",
                    account.name,
                    account.id,
                    fmt_money(&check.stored),
                    fmt_money(&check.expected)
                ),
            ]);
        }
    }

    // 2) Unsettled transactions dated inside a settled period
    let mut stmt = conn.prepare(
        "SELECT t.id, s.period FROM transactions t
         JOIN settlements s ON s.owner=t.owner AND t.date>=s.period_start AND t.date<=s.period_end
         WHERE t.owner=?1 AND t.is_settled=0 AND t.recurring IS NULL",
    )?;
    let mut cur = stmt.query([owner])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let period: String = r.get(1)?;
        rows.push(vec![
            "unsettled_in_closed_period".into(),
            format!("transaction #{} in {}", id, period),
        ]);
    }

    let issues = rows.len();
    if rows.is_empty() {
        println!("doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(issues)
}

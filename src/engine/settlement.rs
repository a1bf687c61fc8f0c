// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Period close. A settlement snapshots every account and liability of an owner for one
//! period, locks the period's transactions, rolls opening balances forward and moves
//! unresolved liabilities into the next period. It is written once per `(owner, period)`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::config;
use crate::db::{is_constraint_violation, UnitOfWork};
use crate::engine::accounts::{list_accounts, roll_forward};
use crate::engine::liabilities::{carry_forward, list_liabilities, paid_between};
use crate::engine::transactions::{effects_of, map_transaction, TX_COLUMNS};
use crate::error::{LedgerError, Result};
use crate::models::{
    AccountSnapshot, CategoryTotal, Liability, LiabilitySnapshot, LiabilityStatus,
    LiabilitySummary, Settlement, SettlementSummary, Transaction, TransactionType,
};
use crate::period::Period;
use crate::sinks::{
    AuditAction, EntityKind, EntityRef, Notification, NotificationKind, Priority,
};
use crate::utils::{decimal_at, json_at, parse_at};

const SETTLEMENT_COLUMNS: &str = "id, owner, period, period_type, period_start, period_end, summary, account_snapshots, liability_summary, carry_forward_balance, is_settled, settled_at, notes";

/// Answer of [`check_settlement_needed`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SettlementAdvice {
    pub period: String,
    pub is_settled: bool,
    pub days_remaining: i64,
    pub needed: bool,
    /// The previous month, when it was never settled.
    pub previous_unsettled: Option<String>,
}

fn map_settlement(r: &Row<'_>) -> rusqlite::Result<Settlement> {
    Ok(Settlement {
        id: r.get(0)?,
        owner: r.get(1)?,
        period: r.get(2)?,
        period_type: parse_at(r, 3)?,
        period_start: r.get(4)?,
        period_end: r.get(5)?,
        summary: json_at(r, 6)?,
        accounts: json_at(r, 7)?,
        liabilities: json_at(r, 8)?,
        carry_forward_balance: decimal_at(r, 9)?,
        is_settled: r.get(10)?,
        settled_at: r.get(11)?,
        notes: r.get(12)?,
    })
}

/// Label of a settled period of `owner` that contains `date`, if any.
pub fn settled_period_containing(
    conn: &Connection,
    owner: &str,
    date: NaiveDate,
) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT period FROM settlements
             WHERE owner=?1 AND period_start<=?2 AND period_end>=?2 AND is_settled=1
             ORDER BY period_start LIMIT 1",
            params![owner, date],
            |r| r.get(0),
        )
        .optional()?)
}

fn exists(conn: &Connection, owner: &str, period: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM settlements WHERE owner=?1 AND period=?2)",
        params![owner, period],
        |r| r.get(0),
    )?)
}

/// First settled period of `owner` sharing at least one day with `period`.
fn overlapping(conn: &Connection, owner: &str, period: &Period) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT period FROM settlements
             WHERE owner=?1 AND period_start<=?3 AND period_end>=?2
             ORDER BY period_start LIMIT 1",
            params![owner, period.start(), period.end()],
            |r| r.get(0),
        )
        .optional()?)
}

/// Latest settled period of `owner` that starts after `period`.
fn settled_after(conn: &Connection, owner: &str, period: &Period) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT period FROM settlements
             WHERE owner=?1 AND period_start>?2
             ORDER BY period_start DESC LIMIT 1",
            params![owner, period.start()],
            |r| r.get(0),
        )
        .optional()?)
}

fn period_transactions(
    conn: &Connection,
    owner: &str,
    period: &Period,
) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE owner=?1 AND date>=?2 AND date<=?3 AND recurring IS NULL
         ORDER BY date, id",
        TX_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner, period.start(), period.end()], map_transaction)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

/// Totals and per-category breakdown. Liability payments are debt service and stay out
/// of the expense total; they still show in the breakdown.
pub fn summarize(transactions: &[Transaction]) -> SettlementSummary {
    let mut summary = SettlementSummary::default();
    let mut by_category: BTreeMap<(Option<_>, TransactionType), CategoryTotal> = BTreeMap::new();
    for t in transactions {
        summary.transaction_count += 1;
        match t.tx_type {
            TransactionType::Income => summary.total_income += t.amount,
            TransactionType::Expense if t.is_liability_payment => {
                summary.total_liability_payments += t.amount
            }
            TransactionType::Expense => summary.total_expense += t.amount,
            TransactionType::Transfer => summary.total_transfers += t.amount,
            TransactionType::Liability => summary.total_loan_proceeds += t.amount,
        }
        let entry = by_category
            .entry((t.category, t.tx_type))
            .or_insert_with(|| CategoryTotal {
                category: t.category,
                tx_type: Some(t.tx_type),
                ..CategoryTotal::default()
            });
        entry.amount += t.amount;
        entry.count += 1;
    }
    summary.net_savings = summary.total_income - summary.total_expense;
    summary.categories = by_category.into_values().collect();
    summary
}

/// Unsettled transactions dated outside the period. They stay pending after the close, so
/// their effect is kept out of the rolled-forward balance.
fn pending_outside(conn: &Connection, owner: &str, period: &Period) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE owner=?1 AND (date<?2 OR date>?3) AND is_settled=0 AND recurring IS NULL",
        TX_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner, period.start(), period.end()], map_transaction)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

/// One snapshot per account. Inflow and outflow re-scan the period's transactions for
/// each account.
fn account_snapshots(
    conn: &Connection,
    owner: &str,
    period: &Period,
    transactions: &[Transaction],
) -> Result<Vec<AccountSnapshot>> {
    let pending = pending_outside(conn, owner, period)?;
    let mut out = Vec::new();
    for account in list_accounts(conn, owner, true)? {
        let mut inflow = Decimal::ZERO;
        let mut outflow = Decimal::ZERO;
        for t in transactions {
            for effect in effects_of(t) {
                if effect.account_id != account.id {
                    continue;
                }
                if effect.delta > Decimal::ZERO {
                    inflow += effect.delta;
                } else {
                    outflow -= effect.delta;
                }
            }
        }
        let mut closing = account.balance;
        for t in &pending {
            for effect in effects_of(t) {
                if effect.account_id == account.id {
                    closing -= effect.delta;
                }
            }
        }
        out.push(AccountSnapshot {
            account_id: account.id,
            name: account.name,
            account_type: account.account_type,
            opening_balance: account.opening_balance,
            closing_balance: closing,
            total_inflow: inflow,
            total_outflow: outflow,
        });
    }
    Ok(out)
}

fn snapshot(l: &Liability) -> LiabilitySnapshot {
    LiabilitySnapshot {
        liability_id: l.id,
        name: l.name.clone(),
        total_amount: l.total_amount,
        paid_amount: l.paid_amount,
        remaining_amount: l.remaining_amount(),
        status: l.status(),
    }
}

/// Start of the period a liability is tagged with.
fn tag_start(l: &Liability) -> Option<NaiveDate> {
    Period::parse(&l.settlement_period).ok().map(|tag| tag.start())
}

/// Liabilities are due for `period` when their tag starts inside it or before it. A tag
/// left behind by a period that was never settled is still carried, and counts as
/// opening debt.
fn liability_summary(
    conn: &Connection,
    owner: &str,
    period: &Period,
) -> Result<(LiabilitySummary, Vec<Liability>)> {
    let mut summary = LiabilitySummary::default();
    let mut to_carry = Vec::new();
    for l in list_liabilities(conn, owner)? {
        let Some(tag) = tag_start(&l) else {
            tracing::warn!(
                liability_id = l.id,
                tag = %l.settlement_period,
                "liability has an unreadable period tag"
            );
            continue;
        };
        let status = l.status();
        let paid_here = status == LiabilityStatus::FullyPaid
            && paid_between(conn, l.id, period.start(), period.end())?;
        let carried_in = period.contains(tag) && l.carried_forward_from.is_some();
        let stale = tag < period.start() && (status != LiabilityStatus::FullyPaid || paid_here);
        if carried_in || stale {
            summary.total_opening += l.remaining_amount();
            summary.opening.push(snapshot(&l));
        }
        if period.contains(l.created_at.date_naive()) && l.carried_forward_from.is_none() {
            summary.total_new += l.total_amount;
            summary.new.push(snapshot(&l));
        }
        if paid_here {
            summary.total_paid += l.total_amount;
            summary.paid.push(snapshot(&l));
        }
        if tag <= period.end() && status != LiabilityStatus::FullyPaid {
            summary.total_carry_forward += l.remaining_amount();
            summary.carry_forward.push(snapshot(&l));
            to_carry.push(l);
        }
    }
    Ok((summary, to_carry))
}

pub fn perform_settlement(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    period: &Period,
) -> Result<Settlement> {
    if period.start() > uow.today() {
        return Err(LedgerError::invalid(format!(
            "period {} has not started yet",
            period
        )));
    }
    if exists(uow, owner, period.label())? {
        return Err(LedgerError::DuplicateSettlement {
            period: period.label().to_string(),
        });
    }
    if let Some(settled) = overlapping(uow, owner, period)? {
        return Err(LedgerError::DuplicateSettlement { period: settled });
    }
    if let Some(later) = settled_after(uow, owner, period)? {
        return Err(LedgerError::invalid(format!(
            "cannot settle {} after the later period {}",
            period, later
        )));
    }

    let transactions = period_transactions(uow, owner, period)?;
    let summary = summarize(&transactions);
    let accounts = account_snapshots(uow, owner, period, &transactions)?;
    let (liabilities, to_carry) = liability_summary(uow, owner, period)?;
    let carry_forward_balance: Decimal = accounts.iter().map(|a| a.closing_balance).sum();
    let settled_at = uow.now();

    let inserted = uow.execute(
        "INSERT INTO settlements(owner, period, period_type, period_start, period_end, summary,
             account_snapshots, liability_summary, carry_forward_balance, is_settled, settled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)",
        params![
            owner,
            period.label(),
            period.kind().as_str(),
            period.start(),
            period.end(),
            serde_json::to_string(&summary)?,
            serde_json::to_string(&accounts)?,
            serde_json::to_string(&liabilities)?,
            carry_forward_balance.to_string(),
            settled_at
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(LedgerError::DuplicateSettlement {
                period: period.label().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    }
    let id = uow.last_insert_rowid();

    let locked = uow.execute(
        "UPDATE transactions SET is_settled=1, settlement_period=?1
         WHERE owner=?2 AND date>=?3 AND date<=?4 AND is_settled=0 AND recurring IS NULL",
        params![period.label(), owner, period.start(), period.end()],
    )?;

    for snapshot in &accounts {
        roll_forward(uow, snapshot.account_id, snapshot.closing_balance, settled_at)?;
    }

    let next = period.next()?;
    for l in &to_carry {
        carry_forward(uow, l, next.label(), period.label())?;
    }

    uow.notify(Notification::new(
        owner,
        NotificationKind::SettlementCompleted,
        Priority::Low,
        format!(
            "Settled {}: income {}, expense {}, carry forward {}",
            period, summary.total_income, summary.total_expense, carry_forward_balance
        ),
        Some(EntityRef::new(EntityKind::Settlement, id)),
    ));
    uow.audit(
        owner,
        AuditAction::SettlementPerformed,
        EntityRef::new(EntityKind::Settlement, id),
        json!({
            "period": period.label(),
            "locked_transactions": locked,
            "accounts": accounts.len(),
            "carried_liabilities": to_carry.iter().map(|l| l.id).collect::<Vec<_>>(),
            "carry_forward_balance": carry_forward_balance,
        }),
    );
    tracing::info!(owner, period = %period, locked, carried = to_carry.len(), "period settled");
    get_settlement(uow, owner, period.label())
}

pub fn get_settlement(conn: &Connection, owner: &str, period: &str) -> Result<Settlement> {
    let sql = format!(
        "SELECT {} FROM settlements WHERE owner=?1 AND period=?2",
        SETTLEMENT_COLUMNS
    );
    conn.query_row(&sql, params![owner, period], map_settlement)
        .optional()?
        .ok_or_else(|| LedgerError::not_found("settlement", period))
}

pub fn list_settlements(conn: &Connection, owner: &str) -> Result<Vec<Settlement>> {
    let sql = format!(
        "SELECT {} FROM settlements WHERE owner=?1 ORDER BY period_start DESC, period",
        SETTLEMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], map_settlement)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

/// Notes are the one part of a settlement that stays editable.
pub fn update_settlement_notes(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    period: &str,
    notes: Option<String>,
) -> Result<Settlement> {
    let before = get_settlement(uow, owner, period)?;
    uow.execute(
        "UPDATE settlements SET notes=?1 WHERE id=?2",
        params![notes, before.id],
    )?;
    uow.audit(
        owner,
        AuditAction::SettlementNotesUpdated,
        EntityRef::new(EntityKind::Settlement, before.id),
        json!({ "before": before.notes, "after": notes }),
    );
    get_settlement(uow, owner, period)
}

/// Advisory only: flags the current month when it is unsettled and close to its end.
pub fn check_settlement_needed(
    conn: &Connection,
    owner: &str,
    today: NaiveDate,
) -> Result<SettlementAdvice> {
    let current = Period::month_of(today);
    let is_settled = exists(conn, owner, current.label())?;
    let days_remaining = current.days_remaining(today);
    let warning_days = config::settlement_warning_days(conn)?;
    let previous = current.previous()?;
    let previous_unsettled = if exists(conn, owner, previous.label())? {
        None
    } else {
        Some(previous.label().to_string())
    };
    Ok(SettlementAdvice {
        period: current.label().to_string(),
        is_settled,
        days_remaining,
        needed: !is_settled && days_remaining <= warning_days,
        previous_unsettled,
    })
}

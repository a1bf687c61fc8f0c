// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Bills, bill payments and reminder scheduling. Bill status is never stored; it is
//! projected from `(paid_amount, amount, due_date, today)` on read.

use chrono::{Days, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::db::UnitOfWork;
use crate::engine::accounts::get_account;
use crate::engine::liabilities::map_payment;
use crate::engine::transactions::{insert_transaction, Links, TransactionDraft};
use crate::error::{LedgerError, Result};
use crate::models::{
    Bill, BillStatus, Category, Id, PaymentRecord, RecurringPattern, Transaction, TransactionType,
};
use crate::sinks::{
    AuditAction, EntityKind, EntityRef, Notification, NotificationKind, Priority,
};
use crate::utils::{decimal_at, json_at, opt_json_at, parse_at};

const BILL_COLUMNS: &str = "id, owner, name, amount, category, due_date, recurring, reminder_days, paid_amount, previous_bill_id, is_active, version, created_at";

#[derive(Debug, Clone)]
pub struct NewBill {
    pub name: String,
    pub amount: Decimal,
    pub category: Category,
    pub due_date: NaiveDate,
    pub recurring: Option<RecurringPattern>,
    /// Days before the due date on which to remind.
    pub reminder_days: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct BillPaymentRequest {
    pub account_id: Id,
    /// Defaults to the outstanding balance.
    pub amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillPayment {
    pub bill: Bill,
    pub transaction: Transaction,
    pub payment: PaymentRecord,
    pub successor: Option<Bill>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentReminder {
    pub bill_id: Id,
    pub remind_on: NaiveDate,
    pub notification: Notification,
}

fn map_bill(r: &Row<'_>) -> rusqlite::Result<Bill> {
    Ok(Bill {
        id: r.get(0)?,
        owner: r.get(1)?,
        name: r.get(2)?,
        amount: decimal_at(r, 3)?,
        category: parse_at(r, 4)?,
        due_date: r.get(5)?,
        recurring: opt_json_at(r, 6)?,
        reminder_days: json_at(r, 7)?,
        paid_amount: decimal_at(r, 8)?,
        previous_bill_id: r.get(9)?,
        is_active: r.get(10)?,
        version: r.get(11)?,
        created_at: r.get(12)?,
    })
}

pub fn create_bill(uow: &mut UnitOfWork<'_>, owner: &str, new: NewBill) -> Result<Bill> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("bill name is required"));
    }
    if new.amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("bill amount must be greater than zero"));
    }
    if !new.category.is_expense() {
        return Err(LedgerError::invalid(format!(
            "'{}' is not an expense category",
            new.category
        )));
    }
    if let Some(pattern) = &new.recurring {
        if pattern.end_date.is_some_and(|end| end < new.due_date) {
            return Err(LedgerError::invalid("recurrence ends before the first due date"));
        }
    }
    let recurring = new.recurring.map(|pattern| RecurringPattern {
        schedule: pattern.schedule.anchored_at(new.due_date),
        ..pattern
    });
    insert_bill(
        uow,
        owner,
        name,
        new.amount,
        new.category,
        new.due_date,
        recurring.as_ref(),
        &new.reminder_days,
        None,
    )
}

#[allow(clippy::too_many_arguments)]
fn insert_bill(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    name: &str,
    amount: Decimal,
    category: Category,
    due_date: NaiveDate,
    recurring: Option<&RecurringPattern>,
    reminder_days: &[u32],
    previous_bill_id: Option<Id>,
) -> Result<Bill> {
    let mut days = reminder_days.to_vec();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();
    uow.execute(
        "INSERT INTO bills(owner, name, amount, category, due_date, recurring, reminder_days, paid_amount,
             previous_bill_id, is_active, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '0', ?8, 1, 0, ?9)",
        params![
            owner,
            name,
            amount.to_string(),
            category.as_str(),
            due_date,
            recurring.map(serde_json::to_string).transpose()?,
            serde_json::to_string(&days)?,
            previous_bill_id,
            uow.now()
        ],
    )?;
    let id = uow.last_insert_rowid();
    schedule_reminders(uow, id, due_date, &days)?;
    uow.audit(
        owner,
        AuditAction::BillCreated,
        EntityRef::new(EntityKind::Bill, id),
        json!({ "name": name, "amount": amount, "due_date": due_date, "previous_bill_id": previous_bill_id }),
    );
    tracing::info!(owner, bill_id = id, %due_date, "bill created");
    get_bill(uow, owner, id)
}

fn schedule_reminders(
    conn: &Connection,
    bill_id: Id,
    due_date: NaiveDate,
    days: &[u32],
) -> Result<()> {
    for d in days {
        let Some(remind_on) = due_date.checked_sub_days(Days::new(u64::from(*d))) else {
            continue;
        };
        conn.execute(
            "INSERT OR IGNORE INTO bill_reminders(bill_id, remind_on) VALUES (?1, ?2)",
            params![bill_id, remind_on],
        )?;
    }
    Ok(())
}

pub fn get_bill(conn: &Connection, owner: &str, id: Id) -> Result<Bill> {
    let sql = format!("SELECT {} FROM bills WHERE id=?1", BILL_COLUMNS);
    match conn.query_row(&sql, params![id], map_bill).optional()? {
        Some(b) if b.owner == owner => Ok(b),
        _ => Err(LedgerError::not_found("bill", id)),
    }
}

pub fn list_bills(conn: &Connection, owner: &str) -> Result<Vec<Bill>> {
    let sql = format!(
        "SELECT {} FROM bills WHERE owner=?1 ORDER BY due_date, id",
        BILL_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], map_bill)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

pub fn bill_payments(conn: &Connection, owner: &str, id: Id) -> Result<Vec<PaymentRecord>> {
    get_bill(conn, owner, id)?;
    let mut stmt = conn.prepare(
        "SELECT id, bill_id, transaction_id, account_id, amount, date, created_at
         FROM bill_payments WHERE bill_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![id], map_payment)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

/// Unpaid active bills due on or before `today + within_days`, overdue ones included.
pub fn upcoming_bills(
    conn: &Connection,
    owner: &str,
    today: NaiveDate,
    within_days: u32,
) -> Result<Vec<Bill>> {
    let horizon = today
        .checked_add_days(Days::new(u64::from(within_days)))
        .unwrap_or(NaiveDate::MAX);
    Ok(list_bills(conn, owner)?
        .into_iter()
        .filter(|b| b.is_active && b.due_date <= horizon && b.status(today) != BillStatus::Paid)
        .collect())
}

pub fn mark_bill_as_paid(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    bill_id: Id,
    req: BillPaymentRequest,
) -> Result<BillPayment> {
    let bill = get_bill(uow, owner, bill_id)?;
    if !bill.is_active {
        return Err(LedgerError::invalid(format!("bill '{}' is inactive", bill.name)));
    }
    let outstanding = bill.outstanding();
    let amount = req.amount.unwrap_or(outstanding);
    if outstanding.is_zero() || amount > outstanding {
        return Err(LedgerError::Overpayment {
            attempted: amount,
            remaining: outstanding,
        });
    }
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("payment amount must be greater than zero"));
    }
    let account = get_account(uow, owner, req.account_id)?;
    if account.balance < amount {
        return Err(LedgerError::InsufficientBalance {
            account_id: account.id,
            available: account.balance,
            required: amount,
        });
    }

    let date = req.date.unwrap_or_else(|| uow.today());
    let draft = TransactionDraft::new(TransactionType::Expense, req.account_id, amount, date)
        .category(bill.category)
        .description(format!("Bill: {}", bill.name));
    let transaction = insert_transaction(
        uow,
        owner,
        draft,
        Links {
            bill_id: Some(bill_id),
            ..Links::default()
        },
    )?;
    uow.execute(
        "INSERT INTO bill_payments(bill_id, transaction_id, account_id, amount, date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            bill_id,
            transaction.id,
            req.account_id,
            amount.to_string(),
            date,
            uow.now()
        ],
    )?;
    let payment_id = uow.last_insert_rowid();

    let paid = bill.paid_amount + amount;
    let changed = uow.execute(
        "UPDATE bills SET paid_amount=?1, version=version+1 WHERE id=?2 AND version=?3",
        params![paid.to_string(), bill_id, bill.version],
    )?;
    if changed != 1 {
        return Err(LedgerError::Conflict(format!("bill {}", bill_id)));
    }
    let updated = get_bill(uow, owner, bill_id)?;

    let mut successor = None;
    if updated.status(uow.today()) == BillStatus::Paid {
        uow.notify(Notification::new(
            owner,
            NotificationKind::BillPaid,
            Priority::Low,
            format!("Bill '{}' paid in full", updated.name),
            Some(EntityRef::new(EntityKind::Bill, bill_id)),
        ));
        if let Some(pattern) = &updated.recurring {
            let next_due = pattern.schedule.advance(updated.due_date)?;
            if pattern.end_date.is_some_and(|end| next_due > end) {
                tracing::debug!(bill_id, %next_due, "recurrence ended, no successor bill");
            } else {
                successor = Some(insert_bill(
                    uow,
                    owner,
                    &updated.name,
                    updated.amount,
                    updated.category,
                    next_due,
                    Some(pattern),
                    &updated.reminder_days,
                    Some(bill_id),
                )?);
            }
        }
    }

    uow.audit(
        owner,
        AuditAction::BillPayment,
        EntityRef::new(EntityKind::Bill, bill_id),
        json!({
            "amount": amount,
            "account_id": req.account_id,
            "transaction_id": transaction.id,
            "paid_amount": { "before": bill.paid_amount, "after": updated.paid_amount },
            "successor_id": successor.as_ref().map(|b| b.id),
        }),
    );
    tracing::info!(owner, bill_id, amount = %amount, "bill payment recorded");

    let payment = PaymentRecord {
        id: payment_id,
        parent_id: bill_id,
        transaction_id: transaction.id,
        account_id: req.account_id,
        amount,
        date,
        created_at: uow.now(),
    };
    Ok(BillPayment {
        bill: updated,
        transaction,
        payment,
        successor,
    })
}

/// Sends every reminder that has come due for an unpaid bill and marks it sent.
pub fn dispatch_due_reminders(uow: &mut UnitOfWork<'_>, owner: &str) -> Result<Vec<SentReminder>> {
    let today = uow.today();
    let due: Vec<(Id, Id, NaiveDate)> = {
        let mut stmt = uow.prepare(
            "SELECT r.id, r.bill_id, r.remind_on FROM bill_reminders r
             JOIN bills b ON b.id = r.bill_id
             WHERE b.owner=?1 AND b.is_active=1 AND r.sent_at IS NULL AND r.remind_on<=?2
             ORDER BY r.remind_on, r.id",
        )?;
        let rows = stmt.query_map(params![owner, today], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })?;
        let mut data = Vec::new();
        for row in rows {
            data.push(row?);
        }
        data
    };

    let mut sent = Vec::new();
    for (reminder_id, bill_id, remind_on) in due {
        let bill = get_bill(uow, owner, bill_id)?;
        let status = bill.status(today);
        if status == BillStatus::Paid {
            continue;
        }
        let priority = if status == BillStatus::Overdue {
            Priority::High
        } else {
            Priority::Medium
        };
        let notification = Notification::new(
            owner,
            NotificationKind::BillReminder,
            priority,
            format!(
                "Bill '{}' of {} is due on {} ({} outstanding)",
                bill.name,
                bill.amount,
                bill.due_date,
                bill.outstanding()
            ),
            Some(EntityRef::new(EntityKind::Bill, bill_id)),
        );
        uow.execute(
            "UPDATE bill_reminders SET sent_at=?1 WHERE id=?2",
            params![uow.now(), reminder_id],
        )?;
        uow.notify(notification.clone());
        sent.push(SentReminder {
            bill_id,
            remind_on,
            notification,
        });
    }
    Ok(sent)
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Liabilities and their payments. Each payment is realised as a ledger expense in the
//! same unit of work as the payment record and the `paid_amount` bump.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::db::UnitOfWork;
use crate::engine::accounts::get_account;
use crate::engine::transactions::{insert_transaction, Links, TransactionDraft};
use crate::error::{LedgerError, Result};
use crate::models::{
    Category, Id, Liability, LiabilityKind, LiabilityStatus, PaymentRecord, Transaction,
    TransactionType,
};
use crate::period::Period;
use crate::sinks::{
    AuditAction, DomainEvent, EntityKind, EntityRef, Notification, NotificationKind, Priority,
};
use crate::utils::{decimal_at, opt_decimal_at, parse_at};

const LIABILITY_COLUMNS: &str = "id, owner, name, kind, lender, total_amount, paid_amount, interest_rate, due_date, settlement_period, carried_forward_from, version, created_at";

#[derive(Debug, Clone)]
pub struct NewLiability {
    pub name: String,
    pub kind: LiabilityKind,
    pub lender: Option<String>,
    pub total_amount: Decimal,
    pub interest_rate: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    /// Account that received the borrowed money, credited in the same unit of work.
    pub received_into: Option<Id>,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub account_id: Id,
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiabilityPayment {
    pub liability: Liability,
    pub transaction: Transaction,
    pub payment: PaymentRecord,
}

fn map_liability(r: &Row<'_>) -> rusqlite::Result<Liability> {
    Ok(Liability {
        id: r.get(0)?,
        owner: r.get(1)?,
        name: r.get(2)?,
        kind: parse_at(r, 3)?,
        lender: r.get(4)?,
        total_amount: decimal_at(r, 5)?,
        paid_amount: decimal_at(r, 6)?,
        interest_rate: opt_decimal_at(r, 7)?,
        due_date: r.get(8)?,
        settlement_period: r.get(9)?,
        carried_forward_from: r.get(10)?,
        version: r.get(11)?,
        created_at: r.get(12)?,
    })
}

pub(crate) fn map_payment(r: &Row<'_>) -> rusqlite::Result<PaymentRecord> {
    Ok(PaymentRecord {
        id: r.get(0)?,
        parent_id: r.get(1)?,
        transaction_id: r.get(2)?,
        account_id: r.get(3)?,
        amount: decimal_at(r, 4)?,
        date: r.get(5)?,
        created_at: r.get(6)?,
    })
}

pub fn create_liability(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    new: NewLiability,
) -> Result<Liability> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("liability name is required"));
    }
    if new.total_amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("liability total must be greater than zero"));
    }
    if new.interest_rate.is_some_and(|r| r < Decimal::ZERO) {
        return Err(LedgerError::invalid("interest rate cannot be negative"));
    }
    let period = Period::month_of(uow.today());
    uow.execute(
        "INSERT INTO liabilities(owner, name, kind, lender, total_amount, paid_amount, interest_rate, due_date,
             settlement_period, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, '0', ?6, ?7, ?8, 0, ?9)",
        params![
            owner,
            name,
            new.kind.as_str(),
            new.lender,
            new.total_amount.to_string(),
            new.interest_rate.map(|r| r.to_string()),
            new.due_date,
            period.label(),
            uow.now()
        ],
    )?;
    let id = uow.last_insert_rowid();

    if let Some(account_id) = new.received_into {
        let draft = TransactionDraft::new(
            TransactionType::Liability,
            account_id,
            new.total_amount,
            uow.today(),
        )
        .category(Category::Loan)
        .description(format!("Proceeds: {}", name));
        insert_transaction(
            uow,
            owner,
            draft,
            Links {
                liability_id: Some(id),
                ..Links::default()
            },
        )?;
    }

    uow.audit(
        owner,
        AuditAction::LiabilityCreated,
        EntityRef::new(EntityKind::Liability, id),
        json!({ "name": name, "kind": new.kind, "total_amount": new.total_amount, "received_into": new.received_into }),
    );
    tracing::info!(owner, liability_id = id, total = %new.total_amount, "liability created");
    get_liability(uow, owner, id)
}

pub fn get_liability(conn: &Connection, owner: &str, id: Id) -> Result<Liability> {
    let sql = format!("SELECT {} FROM liabilities WHERE id=?1", LIABILITY_COLUMNS);
    match conn.query_row(&sql, params![id], map_liability).optional()? {
        Some(l) if l.owner == owner => Ok(l),
        _ => Err(LedgerError::not_found("liability", id)),
    }
}

pub fn list_liabilities(conn: &Connection, owner: &str) -> Result<Vec<Liability>> {
    let sql = format!(
        "SELECT {} FROM liabilities WHERE owner=?1 ORDER BY created_at, id",
        LIABILITY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], map_liability)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

/// Payment history in the order it was recorded.
pub fn liability_payments(conn: &Connection, owner: &str, id: Id) -> Result<Vec<PaymentRecord>> {
    get_liability(conn, owner, id)?;
    let mut stmt = conn.prepare(
        "SELECT id, liability_id, transaction_id, account_id, amount, date, created_at
         FROM liability_payments WHERE liability_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![id], map_payment)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

pub fn make_payment(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    liability_id: Id,
    req: PaymentRequest,
) -> Result<LiabilityPayment> {
    // Re-read inside the unit of work; writers are serialised so this value is current.
    let liability = get_liability(uow, owner, liability_id)?;
    if req.amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("payment amount must be greater than zero"));
    }
    let remaining = liability.remaining_amount();
    if liability.status() == LiabilityStatus::FullyPaid || req.amount > remaining {
        return Err(LedgerError::Overpayment {
            attempted: req.amount,
            remaining,
        });
    }
    let account = get_account(uow, owner, req.account_id)?;
    if account.balance < req.amount {
        return Err(LedgerError::InsufficientBalance {
            account_id: account.id,
            available: account.balance,
            required: req.amount,
        });
    }

    let date = req.date.unwrap_or_else(|| uow.today());
    let description = req
        .description
        .unwrap_or_else(|| format!("Payment: {}", liability.name));
    let draft = TransactionDraft::new(TransactionType::Expense, req.account_id, req.amount, date)
        .category(Category::DebtPayment)
        .description(description);
    let transaction = insert_transaction(
        uow,
        owner,
        draft,
        Links {
            liability_id: Some(liability_id),
            is_liability_payment: true,
            ..Links::default()
        },
    )?;

    uow.execute(
        "INSERT INTO liability_payments(liability_id, transaction_id, account_id, amount, date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            liability_id,
            transaction.id,
            req.account_id,
            req.amount.to_string(),
            date,
            uow.now()
        ],
    )?;
    let payment_id = uow.last_insert_rowid();

    let paid = liability.paid_amount + req.amount;
    let changed = uow.execute(
        "UPDATE liabilities SET paid_amount=?1, version=version+1 WHERE id=?2 AND version=?3",
        params![paid.to_string(), liability_id, liability.version],
    )?;
    if changed != 1 {
        return Err(LedgerError::Conflict(format!("liability {}", liability_id)));
    }
    let updated = get_liability(uow, owner, liability_id)?;

    if updated.status() == LiabilityStatus::FullyPaid {
        uow.notify(Notification::new(
            owner,
            NotificationKind::LiabilityPaidOff,
            Priority::High,
            format!("'{}' is fully paid ({} total)", updated.name, updated.total_amount),
            Some(EntityRef::new(EntityKind::Liability, liability_id)),
        ));
    }
    uow.audit(
        owner,
        AuditAction::LiabilityPayment,
        EntityRef::new(EntityKind::Liability, liability_id),
        json!({
            "amount": req.amount,
            "account_id": req.account_id,
            "transaction_id": transaction.id,
            "paid_amount": { "before": liability.paid_amount, "after": updated.paid_amount },
            "status": updated.status(),
        }),
    );
    uow.emit(DomainEvent::LiabilityPaid {
        owner: owner.to_string(),
        liability_id,
        amount: req.amount,
    });
    tracing::info!(owner, liability_id, amount = %req.amount, remaining = %updated.remaining_amount(), "liability payment recorded");

    let payment = PaymentRecord {
        id: payment_id,
        parent_id: liability_id,
        transaction_id: transaction.id,
        account_id: req.account_id,
        amount: req.amount,
        date,
        created_at: uow.now(),
    };
    Ok(LiabilityPayment {
        liability: updated,
        transaction,
        payment,
    })
}

/// Moves an unresolved liability into the next settlement period.
pub(crate) fn carry_forward(
    uow: &UnitOfWork<'_>,
    liability: &Liability,
    next_period: &str,
    from_period: &str,
) -> Result<()> {
    let changed = uow.execute(
        "UPDATE liabilities SET settlement_period=?1, carried_forward_from=?2, version=version+1
         WHERE id=?3 AND version=?4",
        params![next_period, from_period, liability.id, liability.version],
    )?;
    if changed != 1 {
        return Err(LedgerError::Conflict(format!("liability {}", liability.id)));
    }
    Ok(())
}

/// True when a payment against the liability is dated within `[start, end]`.
pub(crate) fn paid_between(
    conn: &Connection,
    liability_id: Id,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM liability_payments WHERE liability_id=?1 AND date>=?2 AND date<=?3)",
        params![liability_id, start, end],
        |r| r.get(0),
    )?)
}

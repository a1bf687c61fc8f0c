// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Account store. Balances change only through ledger effects and settlement roll-forward.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::db::{is_constraint_violation, UnitOfWork};
use crate::engine::transactions::{effects_of, map_transaction, TX_COLUMNS};
use crate::error::{LedgerError, Result};
use crate::models::{Account, AccountType, Id};
use crate::sinks::{AuditAction, EntityKind, EntityRef};
use crate::utils::{decimal_at, parse_at};

pub(crate) const ACCOUNT_COLUMNS: &str = "id, owner, name, type, balance, opening_balance, is_active, last_settled_at, version, created_at";

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub opening_balance: Decimal,
}

/// Result of re-deriving a balance from the ledger.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BalanceCheck {
    pub account_id: Id,
    pub stored: Decimal,
    pub expected: Decimal,
    pub consistent: bool,
}

pub(crate) fn map_account(r: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: r.get(0)?,
        owner: r.get(1)?,
        name: r.get(2)?,
        account_type: parse_at(r, 3)?,
        balance: decimal_at(r, 4)?,
        opening_balance: decimal_at(r, 5)?,
        is_active: r.get(6)?,
        last_settled_at: r.get::<_, Option<DateTime<Utc>>>(7)?,
        version: r.get(8)?,
        created_at: r.get(9)?,
    })
}

pub fn create_account(uow: &mut UnitOfWork<'_>, owner: &str, new: NewAccount) -> Result<Account> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("account name is required"));
    }
    if new.opening_balance < Decimal::ZERO && !new.account_type.allows_negative() {
        return Err(LedgerError::invalid(format!(
            "{} accounts cannot open with a negative balance",
            new.account_type
        )));
    }
    let now = uow.now();
    let inserted = uow.execute(
        "INSERT INTO accounts(owner, name, type, balance, opening_balance, is_active, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?4, 1, 0, ?5)",
        params![
            owner,
            name,
            new.account_type.as_str(),
            new.opening_balance.to_string(),
            now
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(LedgerError::invalid(format!(
                "account '{}' already exists",
                name
            )));
        }
        Err(e) => return Err(e.into()),
    }
    let id = uow.last_insert_rowid();
    uow.audit(
        owner,
        AuditAction::AccountCreated,
        EntityRef::new(EntityKind::Account, id),
        json!({ "name": name, "type": new.account_type, "opening_balance": new.opening_balance }),
    );
    tracing::info!(owner, account_id = id, "account created");
    get_account(uow, owner, id)
}

pub fn find_account(conn: &Connection, id: Id) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE id=?1", ACCOUNT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_account).optional()?)
}

/// Loads an account owned by `owner`; accounts of other owners read as missing.
pub fn get_account(conn: &Connection, owner: &str, id: Id) -> Result<Account> {
    match find_account(conn, id)? {
        Some(account) if account.owner == owner => Ok(account),
        _ => Err(LedgerError::not_found("account", id)),
    }
}

pub fn list_accounts(
    conn: &Connection,
    owner: &str,
    include_inactive: bool,
) -> Result<Vec<Account>> {
    let sql = format!(
        "SELECT {} FROM accounts WHERE owner=?1 AND (is_active=1 OR ?2) ORDER BY name",
        ACCOUNT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner, include_inactive], map_account)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

pub fn rename_account(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    id: Id,
    name: &str,
) -> Result<Account> {
    let account = get_account(uow, owner, id)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("account name is required"));
    }
    match uow.execute(
        "UPDATE accounts SET name=?1 WHERE id=?2",
        params![name, id],
    ) {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(LedgerError::invalid(format!(
                "account '{}' already exists",
                name
            )));
        }
        Err(e) => return Err(e.into()),
    }
    uow.audit(
        owner,
        AuditAction::AccountUpdated,
        EntityRef::new(EntityKind::Account, id),
        json!({ "name": { "before": account.name, "after": name } }),
    );
    get_account(uow, owner, id)
}

pub fn set_account_active(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    id: Id,
    active: bool,
) -> Result<Account> {
    let account = get_account(uow, owner, id)?;
    if account.is_active != active {
        uow.execute(
            "UPDATE accounts SET is_active=?1 WHERE id=?2",
            params![active, id],
        )?;
        uow.audit(
            owner,
            AuditAction::AccountUpdated,
            EntityRef::new(EntityKind::Account, id),
            json!({ "is_active": { "before": account.is_active, "after": active } }),
        );
    }
    get_account(uow, owner, id)
}

/// Applies a signed delta to an account inside the caller's unit of work. The row is
/// re-read here and written with a version compare-and-set.
pub(crate) fn apply_delta(uow: &UnitOfWork<'_>, account_id: Id, delta: Decimal) -> Result<Account> {
    let account = find_account(uow, account_id)?
        .ok_or_else(|| LedgerError::not_found("account", account_id))?;
    let next = account.balance + delta;
    if next < Decimal::ZERO && !account.account_type.allows_negative() {
        return Err(LedgerError::InsufficientBalance {
            account_id,
            available: account.balance,
            required: -delta,
        });
    }
    let changed = uow.execute(
        "UPDATE accounts SET balance=?1, version=version+1 WHERE id=?2 AND version=?3",
        params![next.to_string(), account_id, account.version],
    )?;
    if changed != 1 {
        return Err(LedgerError::Conflict(format!("account {}", account_id)));
    }
    Ok(Account {
        balance: next,
        version: account.version + 1,
        ..account
    })
}

/// Sets the opening balance after a settlement and stamps the settlement time.
pub(crate) fn roll_forward(
    uow: &UnitOfWork<'_>,
    account_id: Id,
    opening_balance: Decimal,
    settled_at: DateTime<Utc>,
) -> Result<()> {
    let changed = uow.execute(
        "UPDATE accounts SET opening_balance=?1, last_settled_at=?2, version=version+1 WHERE id=?3",
        params![opening_balance.to_string(), settled_at, account_id],
    )?;
    if changed != 1 {
        return Err(LedgerError::not_found("account", account_id));
    }
    Ok(())
}

/// Recomputes `opening_balance + effects of unsettled, non-template transactions` and
/// compares it with the stored balance.
pub fn verify_account_balance(conn: &Connection, owner: &str, id: Id) -> Result<BalanceCheck> {
    let account = get_account(conn, owner, id)?;
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE (account_id=?1 OR to_account_id=?1) AND is_settled=0 AND recurring IS NULL",
        TX_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![id], map_transaction)?;
    let mut expected = account.opening_balance;
    for row in rows {
        let txn = row?;
        for effect in effects_of(&txn) {
            if effect.account_id == id {
                expected += effect.delta;
            }
        }
    }
    Ok(BalanceCheck {
        account_id: id,
        stored: account.balance,
        expected,
        consistent: expected == account.balance,
    })
}

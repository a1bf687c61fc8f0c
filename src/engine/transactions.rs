// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Ledger engine: transaction writes and their balance effects.
//!
//! Every write validates first, then posts the signed account deltas and the transaction
//! row inside the caller's unit of work, so both land or neither does. Updates reverse the
//! stored effect and apply the new one; the net per account is posted once.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde_json::json;

use crate::db::UnitOfWork;
use crate::engine::accounts::{apply_delta, get_account};
use crate::engine::budgets;
use crate::engine::settlement::settled_period_containing;
use crate::error::{LedgerError, Result};
use crate::models::{Category, Id, RecurringConfig, Transaction, TransactionType};
use crate::period::Period;
use crate::schedule::Schedule;
use crate::sinks::{AuditAction, DomainEvent, EntityKind, EntityRef};
use crate::utils::{decimal_at, opt_json_at, opt_parse_at, parse_at};

pub(crate) const TX_COLUMNS: &str = "id, owner, type, account_id, to_account_id, amount, category, description, date, \
     is_liability_payment, liability_id, bill_id, recurring, recurring_parent_id, settlement_period, is_settled, \
     created_at, updated_at";

pub(crate) fn map_transaction(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: r.get(0)?,
        owner: r.get(1)?,
        tx_type: parse_at(r, 2)?,
        account_id: r.get(3)?,
        to_account_id: r.get(4)?,
        amount: decimal_at(r, 5)?,
        category: opt_parse_at(r, 6)?,
        description: r.get(7)?,
        date: r.get(8)?,
        is_liability_payment: r.get(9)?,
        liability_id: r.get(10)?,
        bill_id: r.get(11)?,
        recurring: opt_json_at(r, 12)?,
        recurring_parent_id: r.get(13)?,
        settlement_period: r.get(14)?,
        is_settled: r.get(15)?,
        created_at: r.get(16)?,
        updated_at: r.get(17)?,
    })
}

/// Schedule requested for a recurring template.
#[derive(Debug, Clone)]
pub struct RecurringDraft {
    pub schedule: Schedule,
    pub end_date: Option<NaiveDate>,
    pub requires_approval: bool,
}

#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub tx_type: TransactionType,
    pub account_id: Id,
    pub to_account_id: Option<Id>,
    pub amount: Decimal,
    pub category: Option<Category>,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub recurring: Option<RecurringDraft>,
}

impl TransactionDraft {
    pub fn new(tx_type: TransactionType, account_id: Id, amount: Decimal, date: NaiveDate) -> Self {
        TransactionDraft {
            tx_type,
            account_id,
            to_account_id: None,
            amount,
            category: None,
            description: None,
            date,
            recurring: None,
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn to_account(mut self, account_id: Id) -> Self {
        self.to_account_id = Some(account_id);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn recurring(mut self, recurring: RecurringDraft) -> Self {
        self.recurring = Some(recurring);
        self
    }
}

/// Fields that may change on an existing transaction. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub tx_type: Option<TransactionType>,
    pub account_id: Option<Id>,
    pub to_account_id: Option<Id>,
    pub amount: Option<Decimal>,
    pub category: Option<Category>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
}

impl TransactionPatch {
    fn is_empty(&self) -> bool {
        self.tx_type.is_none()
            && self.account_id.is_none()
            && self.to_account_id.is_none()
            && self.amount.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.date.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<Id>,
    pub category: Option<Category>,
    pub period: Option<Period>,
    pub tx_type: Option<TransactionType>,
    pub include_templates: bool,
    pub limit: Option<usize>,
}

/// Links written by other subsystems when they post through the ledger.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Links {
    pub liability_id: Option<Id>,
    pub is_liability_payment: bool,
    pub bill_id: Option<Id>,
    pub recurring_parent_id: Option<Id>,
}

/// A signed balance change on one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub account_id: Id,
    pub delta: Decimal,
}

fn effects(
    tx_type: TransactionType,
    account_id: Id,
    to_account_id: Option<Id>,
    amount: Decimal,
) -> Vec<Effect> {
    match tx_type {
        TransactionType::Income | TransactionType::Liability => vec![Effect {
            account_id,
            delta: amount,
        }],
        TransactionType::Expense => vec![Effect {
            account_id,
            delta: -amount,
        }],
        TransactionType::Transfer => {
            let mut out = vec![Effect {
                account_id,
                delta: -amount,
            }];
            if let Some(to) = to_account_id {
                out.push(Effect {
                    account_id: to,
                    delta: amount,
                });
            }
            out
        }
    }
}

/// Ledger effect of a stored transaction. Templates have none.
pub fn effects_of(txn: &Transaction) -> Vec<Effect> {
    if txn.is_template() {
        return Vec::new();
    }
    effects(txn.tx_type, txn.account_id, txn.to_account_id, txn.amount)
}

/// Posts the net delta per account, in account id order.
fn post(uow: &UnitOfWork<'_>, reverse: &[Effect], apply: &[Effect]) -> Result<()> {
    let mut net: BTreeMap<Id, Decimal> = BTreeMap::new();
    for e in reverse {
        *net.entry(e.account_id).or_default() -= e.delta;
    }
    for e in apply {
        *net.entry(e.account_id).or_default() += e.delta;
    }
    for (account_id, delta) in net {
        if !delta.is_zero() {
            apply_delta(uow, account_id, delta)?;
        }
    }
    Ok(())
}

fn validate_shape(
    tx_type: TransactionType,
    account_id: Id,
    to_account_id: Option<Id>,
    amount: Decimal,
    category: Option<Category>,
) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("amount must be greater than zero"));
    }
    match (tx_type, to_account_id) {
        (TransactionType::Transfer, None) => {
            return Err(LedgerError::invalid("transfer requires a destination account"));
        }
        (TransactionType::Transfer, Some(to)) if to == account_id => {
            return Err(LedgerError::invalid(
                "transfer source and destination must differ",
            ));
        }
        (TransactionType::Transfer, Some(_)) => {}
        (_, Some(_)) => {
            return Err(LedgerError::invalid(format!(
                "{} transactions take no destination account",
                tx_type
            )));
        }
        (_, None) => {}
    }
    match category {
        None if matches!(tx_type, TransactionType::Income | TransactionType::Expense) => Err(
            LedgerError::invalid(format!("{} transactions require a category", tx_type)),
        ),
        Some(c) if !c.valid_for(tx_type) => Err(LedgerError::invalid(format!(
            "category '{}' is not valid for {} transactions",
            c, tx_type
        ))),
        _ => Ok(()),
    }
}

fn require_active_account(conn: &Connection, owner: &str, id: Id) -> Result<()> {
    let account = get_account(conn, owner, id)?;
    if !account.is_active {
        return Err(LedgerError::invalid(format!(
            "account '{}' is inactive",
            account.name
        )));
    }
    Ok(())
}

fn reject_settled_date(conn: &Connection, owner: &str, date: NaiveDate) -> Result<()> {
    if let Some(period) = settled_period_containing(conn, owner, date)? {
        return Err(LedgerError::SettledImmutable(format!(
            "period {} (date {})",
            period, date
        )));
    }
    Ok(())
}

pub fn create_transaction(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    draft: TransactionDraft,
) -> Result<Transaction> {
    insert_transaction(uow, owner, draft, Links::default())
}

pub(crate) fn insert_transaction(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    draft: TransactionDraft,
    links: Links,
) -> Result<Transaction> {
    validate_shape(
        draft.tx_type,
        draft.account_id,
        draft.to_account_id,
        draft.amount,
        draft.category,
    )?;
    require_active_account(uow, owner, draft.account_id)?;
    if let Some(to) = draft.to_account_id {
        require_active_account(uow, owner, to)?;
    }
    let recurring = match draft.recurring {
        Some(r) => {
            if !matches!(
                draft.tx_type,
                TransactionType::Income | TransactionType::Expense
            ) {
                return Err(LedgerError::invalid(
                    "only income and expense transactions can recur",
                ));
            }
            if r.end_date.is_some_and(|end| end < draft.date) {
                return Err(LedgerError::invalid(
                    "recurring end date precedes the first execution",
                ));
            }
            Some(RecurringConfig {
                schedule: r.schedule.anchored_at(draft.date),
                end_date: r.end_date,
                last_executed: None,
                next_execution: draft.date,
                requires_approval: r.requires_approval,
                is_approved: false,
            })
        }
        None => None,
    };
    reject_settled_date(uow, owner, draft.date)?;

    let mut applied = Vec::new();
    if recurring.is_none() {
        applied = effects(
            draft.tx_type,
            draft.account_id,
            draft.to_account_id,
            draft.amount,
        );
        post(uow, &[], &applied)?;
    }

    let now = uow.now();
    let recurring_json = recurring.as_ref().map(serde_json::to_string).transpose()?;
    uow.execute(
        "INSERT INTO transactions(owner, type, account_id, to_account_id, amount, category, description, date,
             is_liability_payment, liability_id, bill_id, recurring, recurring_parent_id, is_settled, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14, ?14)",
        params![
            owner,
            draft.tx_type.as_str(),
            draft.account_id,
            draft.to_account_id,
            draft.amount.to_string(),
            draft.category.map(|c| c.as_str()),
            draft.description,
            draft.date,
            links.is_liability_payment,
            links.liability_id,
            links.bill_id,
            recurring_json,
            links.recurring_parent_id,
            now
        ],
    )?;
    let id = uow.last_insert_rowid();

    if let (TransactionType::Expense, Some(category), None) =
        (draft.tx_type, draft.category, recurring.as_ref())
    {
        budgets::update_budget_spending(uow, owner, category, draft.amount, draft.date)?;
    }

    uow.audit(
        owner,
        AuditAction::TransactionCreated,
        EntityRef::new(EntityKind::Transaction, id),
        json!({
            "type": draft.tx_type,
            "amount": { "before": null, "after": draft.amount },
            "accounts": applied.iter().map(|e| e.account_id).collect::<Vec<_>>(),
            "template": recurring.is_some(),
        }),
    );
    if !applied.is_empty() {
        uow.emit(DomainEvent::LedgerChanged {
            owner: owner.to_string(),
            account_ids: applied.iter().map(|e| e.account_id).collect(),
            categories: draft.category.into_iter().collect(),
        });
    }
    tracing::info!(owner, transaction_id = id, tx_type = %draft.tx_type, amount = %draft.amount, "transaction created");
    get_transaction(uow, owner, id)
}

pub fn find_transaction(conn: &Connection, id: Id) -> Result<Option<Transaction>> {
    let sql = format!("SELECT {} FROM transactions WHERE id=?1", TX_COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_transaction).optional()?)
}

pub fn get_transaction(conn: &Connection, owner: &str, id: Id) -> Result<Transaction> {
    match find_transaction(conn, id)? {
        Some(txn) if txn.owner == owner => Ok(txn),
        _ => Err(LedgerError::not_found("transaction", id)),
    }
}

pub fn list_transactions(
    conn: &Connection,
    owner: &str,
    filter: &TransactionFilter,
) -> Result<Vec<Transaction>> {
    let mut sql = format!("SELECT {} FROM transactions WHERE owner=?", TX_COLUMNS);
    let mut params_vec: Vec<String> = vec![owner.to_string()];

    if !filter.include_templates {
        sql.push_str(" AND recurring IS NULL");
    }
    if let Some(account_id) = filter.account_id {
        sql.push_str(" AND (account_id=? OR to_account_id=?)");
        params_vec.push(account_id.to_string());
        params_vec.push(account_id.to_string());
    }
    if let Some(category) = filter.category {
        sql.push_str(" AND category=?");
        params_vec.push(category.as_str().to_string());
    }
    if let Some(tx_type) = filter.tx_type {
        sql.push_str(" AND type=?");
        params_vec.push(tx_type.as_str().to_string());
    }
    if let Some(period) = &filter.period {
        sql.push_str(" AND date>=? AND date<=?");
        params_vec.push(period.start().to_string());
        params_vec.push(period.end().to_string());
    }
    sql.push_str(" ORDER BY date DESC, id DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        params_vec.push(limit.to_string());
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), map_transaction)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

pub fn update_transaction(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    id: Id,
    patch: TransactionPatch,
) -> Result<Transaction> {
    let before = get_transaction(uow, owner, id)?;
    if before.is_settled {
        return Err(LedgerError::SettledImmutable(format!("transaction {}", id)));
    }
    if patch.is_empty() {
        return Ok(before);
    }
    if patch.tx_type.is_some_and(|t| t != before.tx_type) {
        return Err(LedgerError::invalid(
            "transaction type cannot change; delete and re-create instead",
        ));
    }

    let amount = patch.amount.unwrap_or(before.amount);
    let account_id = patch.account_id.unwrap_or(before.account_id);
    let to_account_id = patch.to_account_id.or(before.to_account_id);
    let category = patch.category.or(before.category);
    let description = patch.description.clone().or(before.description.clone());
    let date = patch.date.unwrap_or(before.date);

    let moves_money = amount != before.amount
        || account_id != before.account_id
        || to_account_id != before.to_account_id;
    if moves_money && before.is_payment_link() {
        return Err(LedgerError::invalid(
            "amount and accounts of a payment transaction cannot change",
        ));
    }
    validate_shape(before.tx_type, account_id, to_account_id, amount, category)?;
    if account_id != before.account_id {
        require_active_account(uow, owner, account_id)?;
    }
    if let Some(to) = to_account_id.filter(|to| Some(*to) != before.to_account_id) {
        require_active_account(uow, owner, to)?;
    }
    if date != before.date {
        reject_settled_date(uow, owner, date)?;
    }

    let old_effects = effects_of(&before);
    let mut new_effects = Vec::new();
    let mut recurring = before.recurring.clone();
    match recurring.as_mut() {
        Some(cfg) => {
            if date != before.date && cfg.last_executed.is_none() {
                cfg.next_execution = date;
            }
        }
        None => {
            new_effects = effects(before.tx_type, account_id, to_account_id, amount);
            if moves_money {
                post(uow, &old_effects, &new_effects)?;
            }
        }
    }

    let recurring_json = recurring.as_ref().map(serde_json::to_string).transpose()?;
    uow.execute(
        "UPDATE transactions SET account_id=?1, to_account_id=?2, amount=?3, category=?4, description=?5,
             date=?6, recurring=?7, updated_at=?8 WHERE id=?9",
        params![
            account_id,
            to_account_id,
            amount.to_string(),
            category.map(|c| c.as_str()),
            description,
            date,
            recurring_json,
            uow.now(),
            id
        ],
    )?;

    let categories = touched_categories(before.category, category);
    if before.tx_type == TransactionType::Expense && !before.is_template() {
        budgets::recompute_for_categories(uow, owner, &categories)?;
    }

    let accounts = touched_accounts(&old_effects, &new_effects);
    uow.audit(
        owner,
        AuditAction::TransactionUpdated,
        EntityRef::new(EntityKind::Transaction, id),
        json!({
            "amount": { "before": before.amount, "after": amount },
            "accounts": accounts,
            "date": { "before": before.date, "after": date },
        }),
    );
    if !accounts.is_empty() {
        uow.emit(DomainEvent::LedgerChanged {
            owner: owner.to_string(),
            account_ids: accounts,
            categories,
        });
    }
    tracing::info!(owner, transaction_id = id, "transaction updated");
    get_transaction(uow, owner, id)
}

pub fn delete_transaction(uow: &mut UnitOfWork<'_>, owner: &str, id: Id) -> Result<()> {
    let txn = get_transaction(uow, owner, id)?;
    if txn.is_settled {
        return Err(LedgerError::SettledImmutable(format!("transaction {}", id)));
    }
    if txn.is_payment_link() {
        return Err(LedgerError::invalid(
            "payment transactions cannot be deleted",
        ));
    }
    let reversed = effects_of(&txn);
    post(uow, &reversed, &[])?;
    uow.execute("DELETE FROM transactions WHERE id=?1", params![id])?;

    let categories: Vec<Category> = txn.category.into_iter().collect();
    if txn.tx_type == TransactionType::Expense && !txn.is_template() {
        budgets::recompute_for_categories(uow, owner, &categories)?;
    }

    let accounts = touched_accounts(&reversed, &[]);
    uow.audit(
        owner,
        AuditAction::TransactionDeleted,
        EntityRef::new(EntityKind::Transaction, id),
        json!({
            "amount": { "before": txn.amount, "after": null },
            "accounts": accounts,
        }),
    );
    if !accounts.is_empty() {
        uow.emit(DomainEvent::LedgerChanged {
            owner: owner.to_string(),
            account_ids: accounts,
            categories,
        });
    }
    tracing::info!(owner, transaction_id = id, "transaction deleted");
    Ok(())
}

fn touched_accounts(a: &[Effect], b: &[Effect]) -> Vec<Id> {
    let mut ids: Vec<Id> = a.iter().chain(b).map(|e| e.account_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn touched_categories(a: Option<Category>, b: Option<Category>) -> Vec<Category> {
    let mut out: Vec<Category> = a.into_iter().chain(b).collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_moves_money_between_accounts() {
        let e = effects(TransactionType::Transfer, 1, Some(2), Decimal::new(250, 0));
        assert_eq!(
            e,
            vec![
                Effect {
                    account_id: 1,
                    delta: Decimal::new(-250, 0)
                },
                Effect {
                    account_id: 2,
                    delta: Decimal::new(250, 0)
                },
            ]
        );
    }

    #[test]
    fn loan_proceeds_credit_the_source() {
        let e = effects(TransactionType::Liability, 7, None, Decimal::new(5, 0));
        assert_eq!(e[0].delta, Decimal::new(5, 0));
    }

    #[test]
    fn shape_rules() {
        let ten = Decimal::new(10, 0);
        assert!(validate_shape(TransactionType::Expense, 1, None, ten, None).is_err());
        let expense = TransactionType::Expense;
        assert!(validate_shape(expense, 1, None, ten, Some(Category::Salary)).is_err());
        assert!(validate_shape(expense, 1, None, ten, Some(Category::Food)).is_ok());
        assert!(validate_shape(TransactionType::Transfer, 1, Some(1), ten, None).is_err());
        assert!(validate_shape(TransactionType::Transfer, 1, Some(2), ten, None).is_ok());
        let income = TransactionType::Income;
        let salary = Some(Category::Salary);
        assert!(validate_shape(income, 1, Some(2), ten, salary).is_err());
        assert!(validate_shape(income, 1, None, Decimal::ZERO, salary).is_err());
        let liability = TransactionType::Liability;
        assert!(validate_shape(liability, 1, None, ten, Some(Category::Food)).is_err());
    }
}

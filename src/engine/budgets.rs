// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Budget tracker. Informational only: overspend is reported, never prevented.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde_json::json;

use crate::config;
use crate::db::UnitOfWork;
use crate::error::{LedgerError, Result};
use crate::models::{AlertLevel, Budget, Category, Id};
use crate::sinks::{
    AuditAction, EntityKind, EntityRef, Notification, NotificationKind, Priority,
};
use crate::utils::{decimal_at, parse_at};

const BUDGET_COLUMNS: &str = "id, owner, name, category, amount, spent, start_date, end_date, alert_threshold, alert_level, is_active, created_at";

#[derive(Debug, Clone)]
pub struct NewBudget {
    pub name: String,
    pub category: Category,
    pub amount: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Falls back to the `default_alert_threshold` setting.
    pub alert_threshold: Option<u8>,
}

fn map_budget(r: &Row<'_>) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: r.get(0)?,
        owner: r.get(1)?,
        name: r.get(2)?,
        category: parse_at(r, 3)?,
        amount: decimal_at(r, 4)?,
        spent: decimal_at(r, 5)?,
        start_date: r.get(6)?,
        end_date: r.get(7)?,
        alert_threshold: r.get(8)?,
        alert_level: parse_at(r, 9)?,
        is_active: r.get(10)?,
        created_at: r.get(11)?,
    })
}

pub fn create_budget(uow: &mut UnitOfWork<'_>, owner: &str, new: NewBudget) -> Result<Budget> {
    if new.name.trim().is_empty() {
        return Err(LedgerError::invalid("budget name is required"));
    }
    if new.amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("budget amount must be greater than zero"));
    }
    if new.end_date < new.start_date {
        return Err(LedgerError::invalid("budget end date precedes its start date"));
    }
    if !new.category.is_expense() {
        return Err(LedgerError::invalid(format!(
            "budgets track expense categories, '{}' is not one",
            new.category
        )));
    }
    let threshold = match new.alert_threshold {
        Some(t) => t,
        None => config::default_alert_threshold(uow)?,
    };
    if threshold == 0 || threshold > 100 {
        return Err(LedgerError::invalid("alert threshold must be between 1 and 100"));
    }
    uow.execute(
        "INSERT INTO budgets(owner, name, category, amount, spent, start_date, end_date, alert_threshold, alert_level, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, '0', ?5, ?6, ?7, 'none', 1, ?8)",
        params![
            owner,
            new.name.trim(),
            new.category.as_str(),
            new.amount.to_string(),
            new.start_date,
            new.end_date,
            threshold,
            uow.now()
        ],
    )?;
    let id = uow.last_insert_rowid();
    uow.audit(
        owner,
        AuditAction::BudgetCreated,
        EntityRef::new(EntityKind::Budget, id),
        json!({ "category": new.category, "amount": new.amount }),
    );
    // Spending already on the books counts from the start.
    refresh_budget(uow, owner, id)
}

pub fn get_budget(conn: &Connection, owner: &str, id: Id) -> Result<Budget> {
    let sql = format!("SELECT {} FROM budgets WHERE id=?1", BUDGET_COLUMNS);
    match conn.query_row(&sql, params![id], map_budget).optional()? {
        Some(b) if b.owner == owner => Ok(b),
        _ => Err(LedgerError::not_found("budget", id)),
    }
}

pub fn list_budgets(conn: &Connection, owner: &str) -> Result<Vec<Budget>> {
    let sql = format!(
        "SELECT {} FROM budgets WHERE owner=?1 ORDER BY start_date DESC, name",
        BUDGET_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], map_budget)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

fn active_budgets_for(conn: &Connection, owner: &str, category: Category) -> Result<Vec<Budget>> {
    let sql = format!(
        "SELECT {} FROM budgets WHERE owner=?1 AND category=?2 AND is_active=1",
        BUDGET_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner, category.as_str()], map_budget)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

/// Adds `amount` to every active budget of `category` whose window contains `date`.
pub fn update_budget_spending(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    category: Category,
    amount: Decimal,
    date: NaiveDate,
) -> Result<Vec<Budget>> {
    let mut touched = Vec::new();
    for budget in active_budgets_for(uow, owner, category)? {
        if !budget.contains(date) {
            continue;
        }
        let spent = budget.spent + amount;
        touched.push(store_spent(uow, budget, spent)?);
    }
    Ok(touched)
}

/// Re-derives `spent` by summation for every active budget of the given categories.
pub fn recompute_for_categories(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    categories: &[Category],
) -> Result<()> {
    for category in categories {
        for budget in active_budgets_for(uow, owner, *category)? {
            let spent = spent_between(
                uow,
                owner,
                budget.category,
                budget.start_date,
                budget.end_date,
            )?;
            store_spent(uow, budget, spent)?;
        }
    }
    Ok(())
}

pub fn refresh_budget(uow: &mut UnitOfWork<'_>, owner: &str, id: Id) -> Result<Budget> {
    let budget = get_budget(uow, owner, id)?;
    let spent = spent_between(uow, owner, budget.category, budget.start_date, budget.end_date)?;
    store_spent(uow, budget, spent)
}

/// Sum of posted expenses of `category` dated in `[start, end]`.
pub fn spent_between(
    conn: &Connection,
    owner: &str,
    category: Category,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT amount FROM transactions
         WHERE owner=?1 AND type='expense' AND category=?2 AND recurring IS NULL
           AND date>=?3 AND date<=?4",
    )?;
    let rows = stmt.query_map(params![owner, category.as_str(), start, end], |r| {
        decimal_at(r, 0)
    })?;
    let mut total = Decimal::ZERO;
    for row in rows {
        total += row?;
    }
    Ok(total)
}

fn level_for(budget: &Budget) -> AlertLevel {
    let usage = budget.usage_percent();
    if usage >= Decimal::ONE_HUNDRED {
        AlertLevel::Exceeded
    } else if usage >= Decimal::from(budget.alert_threshold) {
        AlertLevel::Warned
    } else {
        AlertLevel::None
    }
}

/// Persists a new `spent` and fires an alert when the budget climbs into a higher band.
/// Dropping to a lower band re-arms the alerts above it.
fn store_spent(uow: &mut UnitOfWork<'_>, budget: Budget, spent: Decimal) -> Result<Budget> {
    let updated = Budget { spent, ..budget };
    let level = level_for(&updated);
    if level > updated.alert_level {
        let usage = updated.usage_percent().round_dp(1);
        let notification = match level {
            AlertLevel::Exceeded => Some(Notification::new(
                &updated.owner,
                NotificationKind::BudgetExceeded,
                Priority::High,
                format!(
                    "Budget '{}' exceeded: spent {} of {} ({}%)",
                    updated.name, updated.spent, updated.amount, usage
                ),
                Some(EntityRef::new(EntityKind::Budget, updated.id)),
            )),
            AlertLevel::Warned => Some(Notification::new(
                &updated.owner,
                NotificationKind::BudgetAlert,
                Priority::Medium,
                format!(
                    "Budget '{}' at {}% of {} ({} remaining)",
                    updated.name,
                    usage,
                    updated.amount,
                    updated.remaining()
                ),
                Some(EntityRef::new(EntityKind::Budget, updated.id)),
            )),
            AlertLevel::None => None,
        };
        if let Some(n) = notification {
            uow.notify(n);
        }
    }
    uow.execute(
        "UPDATE budgets SET spent=?1, alert_level=?2 WHERE id=?3",
        params![updated.spent.to_string(), level.as_str(), updated.id],
    )?;
    tracing::debug!(budget_id = updated.id, spent = %updated.spent, level = %level, "budget recomputed");
    Ok(Budget {
        alert_level: level,
        ..updated
    })
}

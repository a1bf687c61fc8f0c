// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Goal tracker and the [`GoalRecompute`] subscriber.

use chrono::{Datelike, Months, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;

use crate::db::UnitOfWork;
use crate::engine::accounts::get_account;
use crate::engine::budgets::spent_between;
use crate::engine::liabilities::get_liability;
use crate::engine::{Engine, EventHandler};
use crate::error::{LedgerError, Result};
use crate::models::{
    Category, Goal, GoalProgress, GoalStatus, GoalType, Id, Milestone, MILESTONE_PERCENTAGES,
};
use crate::period::Period;
use crate::sinks::{
    AuditAction, DomainEvent, EntityKind, EntityRef, Notification, NotificationKind, Priority,
};
use crate::utils::{decimal_at, json_at, opt_parse_at, parse_at};

const GOAL_COLUMNS: &str = "id, owner, name, type, target_amount, current_amount, start_date, target_date, linked_account_id, linked_liability_id, linked_category, status, progress, completed_at, created_at";

#[derive(Debug, Clone)]
pub struct NewGoal {
    pub name: String,
    pub goal_type: GoalType,
    pub target_amount: Decimal,
    /// Defaults to today.
    pub start_date: Option<NaiveDate>,
    pub target_date: NaiveDate,
    pub linked_account_id: Option<Id>,
    pub linked_liability_id: Option<Id>,
    pub linked_category: Option<Category>,
}

fn map_goal(r: &Row<'_>) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: r.get(0)?,
        owner: r.get(1)?,
        name: r.get(2)?,
        goal_type: parse_at(r, 3)?,
        target_amount: decimal_at(r, 4)?,
        current_amount: decimal_at(r, 5)?,
        start_date: r.get(6)?,
        target_date: r.get(7)?,
        linked_account_id: r.get(8)?,
        linked_liability_id: r.get(9)?,
        linked_category: opt_parse_at(r, 10)?,
        status: parse_at(r, 11)?,
        progress: json_at(r, 12)?,
        milestones: Vec::new(),
        completed_at: r.get(13)?,
        created_at: r.get(14)?,
    })
}

fn load_milestones(conn: &Connection, goal_id: Id) -> Result<Vec<Milestone>> {
    let mut stmt = conn.prepare(
        "SELECT percentage, amount, achieved, achieved_at FROM goal_milestones
         WHERE goal_id=?1 ORDER BY percentage",
    )?;
    let rows = stmt.query_map(params![goal_id], |r| {
        Ok(Milestone {
            percentage: r.get(0)?,
            amount: decimal_at(r, 1)?,
            achieved: r.get(2)?,
            achieved_at: r.get(3)?,
        })
    })?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

pub fn create_goal(uow: &mut UnitOfWork<'_>, owner: &str, new: NewGoal) -> Result<Goal> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("goal name is required"));
    }
    if new.target_amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("goal target must be greater than zero"));
    }
    let start_date = new.start_date.unwrap_or_else(|| uow.today());
    if new.target_date <= start_date {
        return Err(LedgerError::invalid("goal target date must follow its start date"));
    }
    match new.goal_type {
        GoalType::Savings | GoalType::Investment => {
            if let Some(account_id) = new.linked_account_id {
                get_account(uow, owner, account_id)?;
            }
        }
        GoalType::DebtPayoff => {
            let liability_id = new
                .linked_liability_id
                .ok_or_else(|| LedgerError::invalid("debt payoff goals need a linked liability"))?;
            get_liability(uow, owner, liability_id)?;
        }
        GoalType::ExpenseReduction => match new.linked_category {
            Some(c) if c.is_expense() => {}
            _ => {
                return Err(LedgerError::invalid(
                    "expense reduction goals need a linked expense category",
                ));
            }
        },
    }

    uow.execute(
        "INSERT INTO goals(owner, name, type, target_amount, current_amount, start_date, target_date,
             linked_account_id, linked_liability_id, linked_category, status, progress, created_at)
         VALUES (?1, ?2, ?3, ?4, '0', ?5, ?6, ?7, ?8, ?9, 'active', ?10, ?11)",
        params![
            owner,
            name,
            new.goal_type.as_str(),
            new.target_amount.to_string(),
            start_date,
            new.target_date,
            new.linked_account_id,
            new.linked_liability_id,
            new.linked_category.map(|c| c.as_str()),
            serde_json::to_string(&GoalProgress::default())?,
            uow.now()
        ],
    )?;
    let id = uow.last_insert_rowid();
    for pct in MILESTONE_PERCENTAGES {
        let amount = new.target_amount * Decimal::from(pct) / Decimal::ONE_HUNDRED;
        uow.execute(
            "INSERT INTO goal_milestones(goal_id, percentage, amount, achieved) VALUES (?1, ?2, ?3, 0)",
            params![id, pct, amount.to_string()],
        )?;
    }
    uow.audit(
        owner,
        AuditAction::GoalCreated,
        EntityRef::new(EntityKind::Goal, id),
        json!({ "name": name, "type": new.goal_type, "target_amount": new.target_amount }),
    );
    update_goal_progress(uow, owner, id)
}

pub fn get_goal(conn: &Connection, owner: &str, id: Id) -> Result<Goal> {
    let sql = format!("SELECT {} FROM goals WHERE id=?1", GOAL_COLUMNS);
    match conn.query_row(&sql, params![id], map_goal).optional()? {
        Some(mut g) if g.owner == owner => {
            g.milestones = load_milestones(conn, id)?;
            Ok(g)
        }
        _ => Err(LedgerError::not_found("goal", id)),
    }
}

pub fn list_goals(conn: &Connection, owner: &str) -> Result<Vec<Goal>> {
    let sql = format!(
        "SELECT {} FROM goals WHERE owner=?1 ORDER BY target_date, id",
        GOAL_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], map_goal)?;
    let mut data = Vec::new();
    for row in rows {
        let mut goal = row?;
        goal.milestones = load_milestones(conn, goal.id)?;
        data.push(goal);
    }
    Ok(data)
}

/// Manual contribution towards a savings or investment goal that tracks no account.
pub fn contribute_to_goal(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    id: Id,
    amount: Decimal,
) -> Result<Goal> {
    let goal = get_goal(uow, owner, id)?;
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("contribution must be greater than zero"));
    }
    if !matches!(goal.goal_type, GoalType::Savings | GoalType::Investment)
        || goal.linked_account_id.is_some()
    {
        return Err(LedgerError::invalid(
            "only savings or investment goals without a linked account take contributions",
        ));
    }
    if goal.status != GoalStatus::Active {
        return Err(LedgerError::invalid(format!("goal is {}", goal.status)));
    }
    let current = goal.current_amount + amount;
    uow.execute(
        "UPDATE goals SET current_amount=?1 WHERE id=?2",
        params![current.to_string(), id],
    )?;
    uow.audit(
        owner,
        AuditAction::GoalContribution,
        EntityRef::new(EntityKind::Goal, id),
        json!({ "amount": amount, "current_amount": { "before": goal.current_amount, "after": current } }),
    );
    update_goal_progress(uow, owner, id)
}

fn current_amount_for(conn: &Connection, goal: &Goal, today: NaiveDate) -> Result<Decimal> {
    match goal.goal_type {
        GoalType::Savings | GoalType::Investment => match goal.linked_account_id {
            Some(account_id) => Ok(get_account(conn, &goal.owner, account_id)?
                .balance
                .max(Decimal::ZERO)),
            None => Ok(goal.current_amount),
        },
        GoalType::DebtPayoff => match goal.linked_liability_id {
            Some(liability_id) => Ok(get_liability(conn, &goal.owner, liability_id)?.paid_amount),
            None => Ok(goal.current_amount),
        },
        GoalType::ExpenseReduction => {
            let Some(category) = goal.linked_category else {
                return Ok(goal.current_amount);
            };
            let this_month = Period::month_of(today);
            let last_month = this_month.previous()?;
            let before = spent_between(
                conn,
                &goal.owner,
                category,
                last_month.start(),
                last_month.end(),
            )?;
            let now = spent_between(
                conn,
                &goal.owner,
                category,
                this_month.start(),
                this_month.end(),
            )?;
            Ok((before - now).max(Decimal::ZERO))
        }
    }
}

/// Whole months from `from` to `to`, negative when `to` is earlier.
fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let mut months = i64::from(to.year() - from.year()) * 12 + i64::from(to.month())
        - i64::from(from.month());
    if months > 0 && to.day() < from.day() {
        months -= 1;
    } else if months < 0 && to.day() > from.day() {
        months += 1;
    }
    months
}

/// Progress metrics for `current` out of `target` on `today`.
pub fn compute_progress(
    target: Decimal,
    current: Decimal,
    start_date: NaiveDate,
    target_date: NaiveDate,
    today: NaiveDate,
) -> GoalProgress {
    if target <= Decimal::ZERO {
        return GoalProgress::default();
    }
    let percentage = (current * Decimal::ONE_HUNDRED / target)
        .min(Decimal::ONE_HUNDRED)
        .max(Decimal::ZERO)
        .round_dp(2);
    let outstanding = (target - current).max(Decimal::ZERO);

    let months_remaining = months_between(today, target_date).max(1);
    let monthly_target = (outstanding / Decimal::from(months_remaining)).round_dp(2);

    let months_elapsed = months_between(start_date, today).max(1);
    let rate = current / Decimal::from(months_elapsed);
    let projected_completion = if outstanding.is_zero() {
        Some(today)
    } else if rate <= Decimal::ZERO {
        Some(target_date)
    } else {
        let months_needed = (outstanding / rate)
            .round_dp_with_strategy(0, RoundingStrategy::AwayFromZero)
            .to_u32();
        months_needed
            .and_then(|m| today.checked_add_months(Months::new(m)))
            .or(Some(target_date))
    };

    let total_days = (target_date - start_date).num_days();
    let elapsed_days = (today - start_date).num_days().clamp(0, total_days.max(0));
    let expected = if total_days <= 0 {
        Decimal::ONE_HUNDRED
    } else {
        Decimal::from(elapsed_days) * Decimal::ONE_HUNDRED / Decimal::from(total_days)
    };

    GoalProgress {
        percentage,
        monthly_target,
        projected_completion,
        is_on_track: percentage >= expected.round_dp(2),
    }
}

/// Recomputes current amount, progress, milestones and completion of one goal.
pub fn update_goal_progress(uow: &mut UnitOfWork<'_>, owner: &str, id: Id) -> Result<Goal> {
    let goal = get_goal(uow, owner, id)?;
    let today = uow.today();
    let now = uow.now();
    let current = current_amount_for(uow, &goal, today)?;
    let progress = compute_progress(
        goal.target_amount,
        current,
        goal.start_date,
        goal.target_date,
        today,
    );

    for milestone in goal.milestones.iter().filter(|m| !m.achieved && m.amount <= current) {
        uow.execute(
            "UPDATE goal_milestones SET achieved=1, achieved_at=?1 WHERE goal_id=?2 AND percentage=?3",
            params![now, id, milestone.percentage],
        )?;
        uow.notify(Notification::new(
            owner,
            NotificationKind::GoalMilestone,
            Priority::Medium,
            format!("Goal '{}' reached {}%", goal.name, milestone.percentage),
            Some(EntityRef::new(EntityKind::Goal, id)),
        ));
    }

    let mut status = goal.status;
    let mut completed_at = goal.completed_at;
    if progress.percentage >= Decimal::ONE_HUNDRED && goal.status == GoalStatus::Active {
        status = GoalStatus::Completed;
        completed_at = Some(now);
        uow.notify(Notification::new(
            owner,
            NotificationKind::GoalCompleted,
            Priority::High,
            format!("Goal '{}' completed", goal.name),
            Some(EntityRef::new(EntityKind::Goal, id)),
        ));
        tracing::info!(owner, goal_id = id, "goal completed");
    }

    uow.execute(
        "UPDATE goals SET current_amount=?1, progress=?2, status=?3, completed_at=?4 WHERE id=?5",
        params![
            current.to_string(),
            serde_json::to_string(&progress)?,
            status.as_str(),
            completed_at,
            id
        ],
    )?;
    tracing::debug!(goal_id = id, current = %current, percentage = %progress.percentage, "goal progress recomputed");
    get_goal(uow, owner, id)
}

/// Goals whose inputs an event touched: `(owner, goal id)`.
fn goals_affected_by(conn: &Connection, event: &DomainEvent) -> Result<Vec<(String, Id)>> {
    let mut out = Vec::new();
    match event {
        DomainEvent::LiabilityPaid {
            owner, liability_id, ..
        } => {
            let mut stmt = conn.prepare(
                "SELECT id FROM goals WHERE owner=?1 AND type='debt_payoff' AND linked_liability_id=?2
                   AND status='active'",
            )?;
            let rows = stmt.query_map(params![owner, liability_id], |r| r.get::<_, Id>(0))?;
            for row in rows {
                out.push((owner.clone(), row?));
            }
        }
        DomainEvent::LedgerChanged {
            owner,
            account_ids,
            categories,
        } => {
            let mut stmt = conn.prepare(
                "SELECT id, type, linked_account_id, linked_category FROM goals
                 WHERE owner=?1 AND status='active'",
            )?;
            let rows = stmt.query_map(params![owner], |r| {
                Ok((
                    r.get::<_, Id>(0)?,
                    parse_at::<GoalType>(r, 1)?,
                    r.get::<_, Option<Id>>(2)?,
                    opt_parse_at::<Category>(r, 3)?,
                ))
            })?;
            for row in rows {
                let (id, goal_type, account, category) = row?;
                let hit = match goal_type {
                    GoalType::Savings | GoalType::Investment => {
                        account.is_some_and(|a| account_ids.contains(&a))
                    }
                    GoalType::ExpenseReduction => {
                        category.is_some_and(|c| categories.contains(&c))
                    }
                    GoalType::DebtPayoff => false,
                };
                if hit {
                    out.push((owner.clone(), id));
                }
            }
        }
    }
    Ok(out)
}

/// Keeps goal progress in step with ledger and liability changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoalRecompute;

impl EventHandler for GoalRecompute {
    fn name(&self) -> &'static str {
        "goal-recompute"
    }

    fn handle(&self, engine: &Engine, conn: &mut Connection, event: &DomainEvent) -> Result<()> {
        for (owner, goal_id) in goals_affected_by(conn, event)? {
            engine.run(conn, |uow| update_goal_progress(uow, &owner, goal_id))?;
        }
        Ok(())
    }
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Recurring transaction templates and their approval cycle.
//!
//! A template is `Scheduled` until its next execution date arrives. Templates that need
//! approval then sit in `PendingApproval` until approved (a concrete transaction is posted)
//! or skipped; both advance the schedule by one step. Once the next execution falls past
//! the end date the template is `Ended` and rejects every transition.

use chrono::{Days, NaiveDate};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config;
use crate::db::UnitOfWork;
use crate::engine::transactions::{
    get_transaction, insert_transaction, map_transaction, Links, TransactionDraft, TX_COLUMNS,
};
use crate::error::{LedgerError, Result};
use crate::models::{string_enum, Id, RecurringConfig, Transaction};
use crate::sinks::{
    AuditAction, EntityKind, EntityRef, Notification, NotificationKind, Priority,
};

string_enum! {
    RecurringState {
        Scheduled => "scheduled",
        PendingApproval => "pending_approval",
        Ended => "ended",
    }
}

pub fn recurring_state(config: &RecurringConfig, today: NaiveDate) -> RecurringState {
    if config.is_ended() {
        RecurringState::Ended
    } else if config.requires_approval && !config.is_approved && config.next_execution <= today {
        RecurringState::PendingApproval
    } else {
        RecurringState::Scheduled
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecurringTemplate {
    pub transaction: Transaction,
    pub state: RecurringState,
}

impl RecurringTemplate {
    fn config(&self) -> Result<&RecurringConfig> {
        self.transaction.recurring.as_ref().ok_or_else(|| {
            LedgerError::invalid(format!(
                "transaction {} is not a recurring template",
                self.transaction.id
            ))
        })
    }
}

fn templates(conn: &Connection, owner: &str, today: NaiveDate) -> Result<Vec<RecurringTemplate>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE owner=?1 AND recurring IS NOT NULL ORDER BY id",
        TX_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], map_transaction)?;
    let mut data = Vec::new();
    for row in rows {
        let transaction = row?;
        if let Some(cfg) = &transaction.recurring {
            let state = recurring_state(cfg, today);
            data.push(RecurringTemplate { transaction, state });
        }
    }
    Ok(data)
}

pub fn list_templates(
    conn: &Connection,
    owner: &str,
    today: NaiveDate,
) -> Result<Vec<RecurringTemplate>> {
    templates(conn, owner, today)
}

pub fn get_template(
    conn: &Connection,
    owner: &str,
    id: Id,
    today: NaiveDate,
) -> Result<RecurringTemplate> {
    let transaction = get_transaction(conn, owner, id)?;
    let state = match &transaction.recurring {
        Some(cfg) => recurring_state(cfg, today),
        None => {
            return Err(LedgerError::invalid(format!(
                "transaction {} is not a recurring template",
                id
            )));
        }
    };
    Ok(RecurringTemplate { transaction, state })
}

fn store_config(uow: &UnitOfWork<'_>, id: Id, cfg: &RecurringConfig) -> Result<()> {
    uow.execute(
        "UPDATE transactions SET recurring=?1, updated_at=?2 WHERE id=?3",
        params![serde_json::to_string(cfg)?, uow.now(), id],
    )?;
    Ok(())
}

fn expect_state(
    template: &RecurringTemplate,
    allowed: &[RecurringState],
    action: &str,
) -> Result<()> {
    if allowed.contains(&template.state) {
        return Ok(());
    }
    Err(LedgerError::invalid(format!(
        "cannot {} recurring transaction {} while it is {}",
        action, template.transaction.id, template.state
    )))
}

/// Posts the concrete transaction for the current cycle and advances the schedule.
fn materialize(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    template: &RecurringTemplate,
    amount: Option<Decimal>,
) -> Result<Transaction> {
    let tpl = &template.transaction;
    let mut cfg = template.config()?.clone();
    let mut draft = TransactionDraft::new(
        tpl.tx_type,
        tpl.account_id,
        amount.unwrap_or(tpl.amount),
        cfg.next_execution,
    );
    draft.category = tpl.category;
    draft.description = tpl.description.clone();
    let child = insert_transaction(
        uow,
        owner,
        draft,
        Links {
            recurring_parent_id: Some(tpl.id),
            ..Links::default()
        },
    )?;
    cfg.last_executed = Some(cfg.next_execution);
    cfg.next_execution = cfg.schedule.advance(cfg.next_execution)?;
    cfg.is_approved = false;
    store_config(uow, tpl.id, &cfg)?;
    Ok(child)
}

/// Approves the pending cycle, optionally overriding its amount.
pub fn approve(
    uow: &mut UnitOfWork<'_>,
    owner: &str,
    id: Id,
    amount: Option<Decimal>,
) -> Result<Transaction> {
    let template = get_template(uow, owner, id, uow.today())?;
    expect_state(&template, &[RecurringState::PendingApproval], "approve")?;
    let child = materialize(uow, owner, &template, amount)?;
    uow.audit(
        owner,
        AuditAction::RecurringApproved,
        EntityRef::new(EntityKind::Transaction, id),
        json!({ "transaction_id": child.id, "amount": child.amount, "date": child.date }),
    );
    tracing::info!(owner, template_id = id, transaction_id = child.id, "recurring cycle approved");
    Ok(child)
}

/// Drops the pending cycle without posting anything. The cycle still counts against the
/// end date.
pub fn skip(uow: &mut UnitOfWork<'_>, owner: &str, id: Id) -> Result<RecurringConfig> {
    let template = get_template(uow, owner, id, uow.today())?;
    expect_state(&template, &[RecurringState::PendingApproval], "skip")?;
    let mut cfg = template.config()?.clone();
    let skipped = cfg.next_execution;
    cfg.next_execution = cfg.schedule.advance(skipped)?;
    cfg.is_approved = false;
    store_config(uow, id, &cfg)?;
    uow.audit(
        owner,
        AuditAction::RecurringSkipped,
        EntityRef::new(EntityKind::Transaction, id),
        json!({ "skipped": skipped, "next_execution": cfg.next_execution }),
    );
    tracing::info!(owner, template_id = id, %skipped, "recurring cycle skipped");
    Ok(cfg)
}

/// Ends the template today. A cycle already due is discarded with it.
pub fn cancel(uow: &mut UnitOfWork<'_>, owner: &str, id: Id) -> Result<RecurringConfig> {
    let today = uow.today();
    let template = get_template(uow, owner, id, today)?;
    expect_state(
        &template,
        &[RecurringState::Scheduled, RecurringState::PendingApproval],
        "cancel",
    )?;
    let mut cfg = template.config()?.clone();
    cfg.end_date = Some(today);
    while cfg.next_execution <= today {
        cfg.next_execution = cfg.schedule.advance(cfg.next_execution)?;
    }
    cfg.is_approved = false;
    store_config(uow, id, &cfg)?;
    uow.audit(
        owner,
        AuditAction::RecurringCancelled,
        EntityRef::new(EntityKind::Transaction, id),
        json!({ "end_date": today }),
    );
    tracing::info!(owner, template_id = id, "recurring template cancelled");
    Ok(cfg)
}

/// Sweep for templates needing approval within the lookahead window. Sends one
/// notification per template and never approves anything.
pub fn pending_approvals(uow: &mut UnitOfWork<'_>, owner: &str) -> Result<Vec<RecurringTemplate>> {
    let today = uow.today();
    let lookahead = config::recurring_lookahead_days(uow)?;
    let horizon = today
        .checked_add_days(Days::new(u64::try_from(lookahead).unwrap_or(0)))
        .unwrap_or(NaiveDate::MAX);
    let mut out = Vec::new();
    for template in templates(uow, owner, today)? {
        let Some(cfg) = template.transaction.recurring.as_ref() else {
            continue;
        };
        if template.state == RecurringState::Ended
            || !cfg.requires_approval
            || cfg.next_execution > horizon
        {
            continue;
        }
        let priority = if template.state == RecurringState::PendingApproval {
            Priority::High
        } else {
            Priority::Medium
        };
        uow.notify(Notification::new(
            owner,
            NotificationKind::RecurringApproval,
            priority,
            format!(
                "Recurring {} of {} due {} needs approval",
                template.transaction.tx_type, template.transaction.amount, cfg.next_execution
            ),
            Some(EntityRef::new(EntityKind::Transaction, template.transaction.id)),
        ));
        out.push(template);
    }
    Ok(out)
}

/// Posts every due cycle of templates that run without approval, catching up missed ones.
pub fn process_due(uow: &mut UnitOfWork<'_>, owner: &str) -> Result<Vec<Transaction>> {
    let today = uow.today();
    let mut posted = Vec::new();
    for template in templates(uow, owner, today)? {
        let auto = template
            .transaction
            .recurring
            .as_ref()
            .is_some_and(|cfg| !cfg.requires_approval);
        if !auto {
            continue;
        }
        let id = template.transaction.id;
        let mut current = template;
        loop {
            let cfg = current.config()?;
            if current.state == RecurringState::Ended || cfg.next_execution > today {
                break;
            }
            let child = materialize(uow, owner, &current, None)?;
            uow.audit(
                owner,
                AuditAction::RecurringApproved,
                EntityRef::new(EntityKind::Transaction, id),
                json!({ "transaction_id": child.id, "amount": child.amount, "date": child.date, "auto": true }),
            );
            posted.push(child);
            current = get_template(uow, owner, id, today)?;
        }
    }
    if !posted.is_empty() {
        tracing::info!(owner, count = posted.len(), "recurring transactions posted");
    }
    Ok(posted)
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Outbound contracts of the core: notifications, audit records and domain events.
//! Sinks are invoked only after the owning unit of work has committed.

use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Category, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BudgetAlert,
    BudgetExceeded,
    BillReminder,
    BillPaid,
    LiabilityPaidOff,
    GoalMilestone,
    GoalCompleted,
    RecurringApproval,
    SettlementCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    Transaction,
    Liability,
    Bill,
    Budget,
    Goal,
    Settlement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Id,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: Id) -> Self {
        EntityRef { kind, id }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub owner: String,
    pub kind: NotificationKind,
    pub priority: Priority,
    pub message: String,
    pub related: Option<EntityRef>,
}

impl Notification {
    pub fn new(
        owner: &str,
        kind: NotificationKind,
        priority: Priority,
        message: impl Into<String>,
        related: Option<EntityRef>,
    ) -> Self {
        Notification {
            owner: owner.to_string(),
            kind,
            priority,
            message: message.into(),
            related,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AccountCreated,
    AccountUpdated,
    TransactionCreated,
    TransactionUpdated,
    TransactionDeleted,
    LiabilityCreated,
    LiabilityPayment,
    BillCreated,
    BillPayment,
    BudgetCreated,
    GoalCreated,
    GoalContribution,
    RecurringApproved,
    RecurringSkipped,
    RecurringCancelled,
    SettlementPerformed,
    SettlementNotesUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub owner: String,
    pub action: AuditAction,
    pub resource: EntityRef,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Facts published by the ledger core for independent consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    LiabilityPaid {
        owner: String,
        liability_id: Id,
        amount: Decimal,
    },
    LedgerChanged {
        owner: String,
        account_ids: Vec<Id>,
        categories: Vec<Category>,
    },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Writes notifications and audit records to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: &Notification) -> Result<()> {
        tracing::info!(
            target: "ledgerwise::notify",
            owner = %n.owner,
            kind = ?n.kind,
            priority = ?n.priority,
            related = ?n.related,
            "{}",
            n.message
        );
        Ok(())
    }
}

impl AuditSink for TracingSink {
    fn record(&self, r: &AuditRecord) -> Result<()> {
        tracing::info!(
            target: "ledgerwise::audit",
            owner = %r.owner,
            action = ?r.action,
            resource = ?r.resource,
            details = %r.details,
            at = %r.at,
            "audit"
        );
        Ok(())
    }
}

/// Keeps everything in memory; handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    notifications: Mutex<Vec<Notification>>,
    audit: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn notifications_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut v) = self.notifications.lock() {
            v.clear();
        }
        if let Ok(mut v) = self.audit.lock() {
            v.clear();
        }
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, n: &Notification) -> Result<()> {
        self.notifications
            .lock()
            .map_err(|_| anyhow::anyhow!("notification buffer poisoned"))?
            .push(n.clone());
        Ok(())
    }
}

impl AuditSink for MemorySink {
    fn record(&self, r: &AuditRecord) -> Result<()> {
        self.audit
            .lock()
            .map_err(|_| anyhow::anyhow!("audit buffer poisoned"))?
            .push(r.clone());
        Ok(())
    }
}

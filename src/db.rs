// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, TransactionBehavior};
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config;
use crate::sinks::{AuditAction, AuditRecord, DomainEvent, EntityRef, Notification};

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Ledgerwise", "ledgerwise"));

pub const DB_ENV: &str = "LEDGERWISE_DB";

pub fn db_path() -> Result<PathBuf> {
    if let Some(custom) = std::env::var_os(DB_ENV) {
        return Ok(PathBuf::from(custom));
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("ledgerwise.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    open_at(&path)
}

pub fn open_at(path: &Path) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    conn.busy_timeout(Duration::from_millis(config::DEFAULT_BUSY_TIMEOUT_MS))?;
    init_schema(&conn)?;
    let timeout = config::busy_timeout_ms(&conn)?;
    conn.busy_timeout(Duration::from_millis(timeout))?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS accounts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        balance TEXT NOT NULL,
        opening_balance TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_settled_at TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE(owner, name)
    );

    CREATE TABLE IF NOT EXISTS liabilities(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        lender TEXT,
        total_amount TEXT NOT NULL,
        paid_amount TEXT NOT NULL DEFAULT '0',
        interest_rate TEXT,
        due_date TEXT,
        settlement_period TEXT NOT NULL,
        carried_forward_from TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_liabilities_owner ON liabilities(owner, settlement_period);

    CREATE TABLE IF NOT EXISTS bills(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        amount TEXT NOT NULL,
        category TEXT NOT NULL,
        due_date TEXT NOT NULL,
        recurring TEXT, -- JSON RecurringPattern
        reminder_days TEXT NOT NULL DEFAULT '[]',
        paid_amount TEXT NOT NULL DEFAULT '0',
        previous_bill_id INTEGER,
        is_active INTEGER NOT NULL DEFAULT 1,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        FOREIGN KEY(previous_bill_id) REFERENCES bills(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_bills_owner_due ON bills(owner, due_date);

    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        type TEXT NOT NULL CHECK(type IN ('income','expense','transfer','liability')),
        account_id INTEGER NOT NULL,
        to_account_id INTEGER,
        amount TEXT NOT NULL,
        category TEXT,
        description TEXT,
        date TEXT NOT NULL,
        is_liability_payment INTEGER NOT NULL DEFAULT 0,
        liability_id INTEGER,
        bill_id INTEGER,
        recurring TEXT, -- JSON RecurringConfig, set only on templates
        recurring_parent_id INTEGER,
        settlement_period TEXT,
        is_settled INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(account_id) REFERENCES accounts(id),
        FOREIGN KEY(to_account_id) REFERENCES accounts(id),
        FOREIGN KEY(liability_id) REFERENCES liabilities(id),
        FOREIGN KEY(bill_id) REFERENCES bills(id),
        FOREIGN KEY(recurring_parent_id) REFERENCES transactions(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_owner_date ON transactions(owner, date);
    CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);

    CREATE TABLE IF NOT EXISTS liability_payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        liability_id INTEGER NOT NULL,
        transaction_id INTEGER NOT NULL,
        account_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(liability_id) REFERENCES liabilities(id) ON DELETE CASCADE,
        FOREIGN KEY(transaction_id) REFERENCES transactions(id)
    );

    CREATE TABLE IF NOT EXISTS bill_payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bill_id INTEGER NOT NULL,
        transaction_id INTEGER NOT NULL,
        account_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(bill_id) REFERENCES bills(id) ON DELETE CASCADE,
        FOREIGN KEY(transaction_id) REFERENCES transactions(id)
    );

    CREATE TABLE IF NOT EXISTS bill_reminders(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bill_id INTEGER NOT NULL,
        remind_on TEXT NOT NULL,
        sent_at TEXT,
        UNIQUE(bill_id, remind_on),
        FOREIGN KEY(bill_id) REFERENCES bills(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS budgets(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        amount TEXT NOT NULL,
        spent TEXT NOT NULL DEFAULT '0',
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        alert_threshold INTEGER NOT NULL DEFAULT 80,
        alert_level TEXT NOT NULL DEFAULT 'none',
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_budgets_owner_category ON budgets(owner, category);

    CREATE TABLE IF NOT EXISTS goals(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        target_amount TEXT NOT NULL,
        current_amount TEXT NOT NULL DEFAULT '0',
        start_date TEXT NOT NULL,
        target_date TEXT NOT NULL,
        linked_account_id INTEGER,
        linked_liability_id INTEGER,
        linked_category TEXT,
        status TEXT NOT NULL DEFAULT 'active',
        progress TEXT NOT NULL DEFAULT '{}', -- JSON GoalProgress
        completed_at TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY(linked_account_id) REFERENCES accounts(id) ON DELETE SET NULL,
        FOREIGN KEY(linked_liability_id) REFERENCES liabilities(id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS goal_milestones(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        goal_id INTEGER NOT NULL,
        percentage INTEGER NOT NULL,
        amount TEXT NOT NULL,
        achieved INTEGER NOT NULL DEFAULT 0,
        achieved_at TEXT,
        UNIQUE(goal_id, percentage),
        FOREIGN KEY(goal_id) REFERENCES goals(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS settlements(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        period TEXT NOT NULL,
        period_type TEXT NOT NULL,
        period_start TEXT NOT NULL,
        period_end TEXT NOT NULL,
        summary TEXT NOT NULL,           -- JSON SettlementSummary
        account_snapshots TEXT NOT NULL, -- JSON [AccountSnapshot]
        liability_summary TEXT NOT NULL, -- JSON LiabilitySummary
        carry_forward_balance TEXT NOT NULL,
        is_settled INTEGER NOT NULL DEFAULT 1,
        settled_at TEXT NOT NULL,
        notes TEXT,
        UNIQUE(owner, period)
    );
    "#,
    )
}

pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Side effects queued by a unit of work, released only after it commits.
#[derive(Debug, Default)]
pub struct Outbox {
    pub notifications: Vec<Notification>,
    pub audit: Vec<AuditRecord>,
    pub events: Vec<DomainEvent>,
}

/// One logical operation against the store: an IMMEDIATE SQLite transaction plus the
/// operation clock and an outbox. Dropping it without [`UnitOfWork::commit`] rolls back.
pub struct UnitOfWork<'c> {
    tx: rusqlite::Transaction<'c>,
    now: DateTime<Utc>,
    outbox: Outbox,
}

impl<'c> UnitOfWork<'c> {
    pub fn begin(conn: &'c mut Connection, now: DateTime<Utc>) -> rusqlite::Result<Self> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(UnitOfWork {
            tx,
            now,
            outbox: Outbox::default(),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn notify(&mut self, notification: Notification) {
        self.outbox.notifications.push(notification);
    }

    pub fn audit(
        &mut self,
        owner: &str,
        action: AuditAction,
        resource: EntityRef,
        details: serde_json::Value,
    ) {
        self.outbox.audit.push(AuditRecord {
            owner: owner.to_string(),
            action,
            resource,
            details,
            at: self.now,
        });
    }

    pub fn emit(&mut self, event: DomainEvent) {
        self.outbox.events.push(event);
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn commit(self) -> rusqlite::Result<Outbox> {
        self.tx.commit()?;
        Ok(self.outbox)
    }
}

impl Deref for UnitOfWork<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

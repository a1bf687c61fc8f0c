// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The ledger core and its facade.
//!
//! Core operations are free functions over a [`UnitOfWork`]. [`Engine`] opens the unit,
//! commits it and then releases the outbox: notifications and audit records go to their
//! sinks, domain events go to every subscriber. Nothing after the commit can undo it;
//! failures there are logged and dropped.

pub mod accounts;
pub mod bills;
pub mod budgets;
pub mod goals;
pub mod liabilities;
pub mod recurring;
pub mod settlement;
pub mod transactions;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::db::{Outbox, UnitOfWork};
use crate::error::Result;
use crate::models::{
    Account, Bill, Budget, Category, Goal, Id, Liability, RecurringConfig, Settlement, Transaction,
};
use crate::period::Period;
use crate::sinks::{AuditSink, DomainEvent, NotificationSink, TracingSink};

use self::accounts::{BalanceCheck, NewAccount};
use self::bills::{BillPayment, BillPaymentRequest, NewBill, SentReminder};
use self::budgets::NewBudget;
use self::goals::{GoalRecompute, NewGoal};
use self::liabilities::{LiabilityPayment, NewLiability, PaymentRequest};
use self::recurring::RecurringTemplate;
use self::settlement::SettlementAdvice;
use self::transactions::{TransactionDraft, TransactionPatch};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    /// Noon UTC on `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        let noon = date
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Self::new(noon)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn set_date(&self, date: NaiveDate) {
        if let Some(dt) = date.and_hms_opt(12, 0, 0) {
            self.set(dt.and_utc());
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|p| *p.into_inner())
    }
}

/// Consumer of committed domain events. Handlers run after the producing unit of work
/// has committed and open their own units through [`Engine::run`].
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, engine: &Engine, conn: &mut Connection, event: &DomainEvent) -> Result<()>;
}

#[derive(Clone)]
pub struct Engine {
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(Arc::new(TracingSink), Arc::new(TracingSink))
    }
}

impl Engine {
    /// An engine on the system clock with goal recompute subscribed.
    pub fn new(notifier: Arc<dyn NotificationSink>, audit: Arc<dyn AuditSink>) -> Self {
        Engine {
            clock: Arc::new(SystemClock),
            notifier,
            audit,
            handlers: vec![Arc::new(GoalRecompute)],
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Runs `f` in one unit of work. On success the unit commits and its outbox is
    /// released; on error it rolls back and nothing is released.
    pub fn run<T, F>(&self, conn: &mut Connection, f: F) -> Result<T>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T>,
    {
        let mut uow = UnitOfWork::begin(conn, self.now())?;
        let value = f(&mut uow)?;
        let outbox = uow.commit()?;
        self.flush(conn, outbox);
        Ok(value)
    }

    fn flush(&self, conn: &mut Connection, outbox: Outbox) {
        for n in &outbox.notifications {
            if let Err(e) = self.notifier.notify(n) {
                tracing::warn!(error = %e, kind = ?n.kind, owner = %n.owner, "notification sink failed");
            }
        }
        for r in &outbox.audit {
            if let Err(e) = self.audit.record(r) {
                tracing::warn!(error = %e, action = ?r.action, owner = %r.owner, "audit sink failed");
            }
        }
        for event in &outbox.events {
            for handler in &self.handlers {
                if let Err(e) = handler.handle(self, conn, event) {
                    tracing::warn!(error = %e, handler = handler.name(), "event handler failed");
                }
            }
        }
    }

    // Accounts

    pub fn create_account(
        &self,
        conn: &mut Connection,
        owner: &str,
        new: NewAccount,
    ) -> Result<Account> {
        self.run(conn, |uow| accounts::create_account(uow, owner, new))
    }

    pub fn rename_account(
        &self,
        conn: &mut Connection,
        owner: &str,
        id: Id,
        name: &str,
    ) -> Result<Account> {
        self.run(conn, |uow| accounts::rename_account(uow, owner, id, name))
    }

    pub fn deactivate_account(
        &self,
        conn: &mut Connection,
        owner: &str,
        id: Id,
    ) -> Result<Account> {
        self.run(conn, |uow| accounts::set_account_active(uow, owner, id, false))
    }

    pub fn reactivate_account(
        &self,
        conn: &mut Connection,
        owner: &str,
        id: Id,
    ) -> Result<Account> {
        self.run(conn, |uow| accounts::set_account_active(uow, owner, id, true))
    }

    pub fn verify_account_balance(
        &self,
        conn: &Connection,
        owner: &str,
        id: Id,
    ) -> Result<BalanceCheck> {
        accounts::verify_account_balance(conn, owner, id)
    }

    // Ledger

    pub fn create_transaction(
        &self,
        conn: &mut Connection,
        owner: &str,
        draft: TransactionDraft,
    ) -> Result<Transaction> {
        self.run(conn, |uow| transactions::create_transaction(uow, owner, draft))
    }

    pub fn update_transaction(
        &self,
        conn: &mut Connection,
        owner: &str,
        id: Id,
        patch: TransactionPatch,
    ) -> Result<Transaction> {
        self.run(conn, |uow| transactions::update_transaction(uow, owner, id, patch))
    }

    pub fn delete_transaction(&self, conn: &mut Connection, owner: &str, id: Id) -> Result<()> {
        self.run(conn, |uow| transactions::delete_transaction(uow, owner, id))
    }

    // Liabilities and bills

    pub fn create_liability(
        &self,
        conn: &mut Connection,
        owner: &str,
        new: NewLiability,
    ) -> Result<Liability> {
        self.run(conn, |uow| liabilities::create_liability(uow, owner, new))
    }

    pub fn make_payment(
        &self,
        conn: &mut Connection,
        owner: &str,
        liability_id: Id,
        req: PaymentRequest,
    ) -> Result<LiabilityPayment> {
        self.run(conn, |uow| liabilities::make_payment(uow, owner, liability_id, req))
    }

    pub fn create_bill(&self, conn: &mut Connection, owner: &str, new: NewBill) -> Result<Bill> {
        self.run(conn, |uow| bills::create_bill(uow, owner, new))
    }

    pub fn mark_bill_as_paid(
        &self,
        conn: &mut Connection,
        owner: &str,
        bill_id: Id,
        req: BillPaymentRequest,
    ) -> Result<BillPayment> {
        self.run(conn, |uow| bills::mark_bill_as_paid(uow, owner, bill_id, req))
    }

    pub fn upcoming_bills(
        &self,
        conn: &Connection,
        owner: &str,
        within_days: u32,
    ) -> Result<Vec<Bill>> {
        bills::upcoming_bills(conn, owner, self.today(), within_days)
    }

    pub fn dispatch_due_reminders(
        &self,
        conn: &mut Connection,
        owner: &str,
    ) -> Result<Vec<SentReminder>> {
        self.run(conn, |uow| bills::dispatch_due_reminders(uow, owner))
    }

    // Budgets and goals

    pub fn create_budget(
        &self,
        conn: &mut Connection,
        owner: &str,
        new: NewBudget,
    ) -> Result<Budget> {
        self.run(conn, |uow| budgets::create_budget(uow, owner, new))
    }

    pub fn update_budget_spending(
        &self,
        conn: &mut Connection,
        owner: &str,
        category: Category,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<Vec<Budget>> {
        self.run(conn, |uow| {
            budgets::update_budget_spending(uow, owner, category, amount, date)
        })
    }

    pub fn refresh_budget(&self, conn: &mut Connection, owner: &str, id: Id) -> Result<Budget> {
        self.run(conn, |uow| budgets::refresh_budget(uow, owner, id))
    }

    pub fn create_goal(&self, conn: &mut Connection, owner: &str, new: NewGoal) -> Result<Goal> {
        self.run(conn, |uow| goals::create_goal(uow, owner, new))
    }

    pub fn update_goal_progress(&self, conn: &mut Connection, owner: &str, id: Id) -> Result<Goal> {
        self.run(conn, |uow| goals::update_goal_progress(uow, owner, id))
    }

    pub fn contribute_to_goal(
        &self,
        conn: &mut Connection,
        owner: &str,
        id: Id,
        amount: Decimal,
    ) -> Result<Goal> {
        self.run(conn, |uow| goals::contribute_to_goal(uow, owner, id, amount))
    }

    // Recurring

    pub fn approve_recurring(
        &self,
        conn: &mut Connection,
        owner: &str,
        id: Id,
        amount: Option<Decimal>,
    ) -> Result<Transaction> {
        self.run(conn, |uow| recurring::approve(uow, owner, id, amount))
    }

    pub fn skip_recurring(
        &self,
        conn: &mut Connection,
        owner: &str,
        id: Id,
    ) -> Result<RecurringConfig> {
        self.run(conn, |uow| recurring::skip(uow, owner, id))
    }

    pub fn cancel_recurring(
        &self,
        conn: &mut Connection,
        owner: &str,
        id: Id,
    ) -> Result<RecurringConfig> {
        self.run(conn, |uow| recurring::cancel(uow, owner, id))
    }

    pub fn pending_approvals(
        &self,
        conn: &mut Connection,
        owner: &str,
    ) -> Result<Vec<RecurringTemplate>> {
        self.run(conn, |uow| recurring::pending_approvals(uow, owner))
    }

    pub fn process_due_recurring(
        &self,
        conn: &mut Connection,
        owner: &str,
    ) -> Result<Vec<Transaction>> {
        self.run(conn, |uow| recurring::process_due(uow, owner))
    }

    // Settlement

    pub fn perform_settlement(
        &self,
        conn: &mut Connection,
        owner: &str,
        period: &Period,
    ) -> Result<Settlement> {
        self.run(conn, |uow| settlement::perform_settlement(uow, owner, period))
    }

    pub fn check_settlement_needed(
        &self,
        conn: &Connection,
        owner: &str,
    ) -> Result<SettlementAdvice> {
        settlement::check_settlement_needed(conn, owner, self.today())
    }

    pub fn update_settlement_notes(
        &self,
        conn: &mut Connection,
        owner: &str,
        period: &str,
        notes: Option<String>,
    ) -> Result<Settlement> {
        self.run(conn, |uow| {
            settlement::update_settlement_notes(uow, owner, period, notes)
        })
    }
}

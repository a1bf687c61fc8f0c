// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use chrono::NaiveDate;
use ledgerwise::db;
use ledgerwise::engine::accounts::{get_account, NewAccount};
use ledgerwise::engine::recurring::{get_template, list_templates, RecurringState};
use ledgerwise::engine::transactions::{
    list_transactions, RecurringDraft, TransactionDraft, TransactionFilter,
};
use ledgerwise::engine::{Engine, ManualClock};
use ledgerwise::error::ErrorKind;
use ledgerwise::models::{AccountType, Category, TransactionType};
use ledgerwise::schedule::Schedule;
use ledgerwise::sinks::{MemorySink, NotificationKind, Priority};
use rusqlite::Connection;
use rust_decimal::Decimal;

const OWNER: &str = "alice";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

struct Fixture {
    conn: Connection,
    engine: Engine,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
    account: i64,
}

fn setup() -> Fixture {
    let mut conn = db::open_in_memory().unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::at_date(d(2024, 3, 15)));
    let engine = Engine::new(sink.clone(), sink.clone()).with_clock(clock.clone());
    let account = engine
        .create_account(
            &mut conn,
            OWNER,
            NewAccount {
                name: "Checking".into(),
                account_type: AccountType::Bank,
                opening_balance: dec(1000),
            },
        )
        .unwrap()
        .id;
    Fixture {
        conn,
        engine,
        sink,
        clock,
        account,
    }
}

fn gym(f: &mut Fixture, start: NaiveDate, end: Option<NaiveDate>) -> i64 {
    f.engine
        .create_transaction(
            &mut f.conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, f.account, dec(50), start)
                .category(Category::PersonalCare)
                .description("Gym")
                .recurring(RecurringDraft {
                    schedule: Schedule::monthly(),
                    end_date: end,
                    requires_approval: true,
                }),
        )
        .unwrap()
        .id
}

fn state(f: &Fixture, id: i64) -> RecurringState {
    get_template(&f.conn, OWNER, id, f.engine.today()).unwrap().state
}

#[test]
fn templates_do_not_touch_the_ledger() {
    let mut f = setup();
    let id = gym(&mut f, d(2024, 3, 20), None);
    assert_eq!(get_account(&f.conn, OWNER, f.account).unwrap().balance, dec(1000));
    assert!(list_transactions(&f.conn, OWNER, &TransactionFilter::default()).unwrap().is_empty());
    assert_eq!(state(&f, id), RecurringState::Scheduled);
    assert_eq!(list_templates(&f.conn, OWNER, f.engine.today()).unwrap().len(), 1);
}

#[test]
fn approval_cycle() {
    let mut f = setup();
    let id = gym(&mut f, d(2024, 3, 20), None);

    assert!(f.engine.pending_approvals(&mut f.conn, OWNER).unwrap().is_empty());
    let err = f.engine.approve_recurring(&mut f.conn, OWNER, id, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    f.clock.set_date(d(2024, 3, 18));
    let upcoming = f.engine.pending_approvals(&mut f.conn, OWNER).unwrap();
    assert_eq!(upcoming.len(), 1);
    let notes = f.sink.notifications_of(NotificationKind::RecurringApproval);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].priority, Priority::Medium);

    f.clock.set_date(d(2024, 3, 20));
    assert_eq!(state(&f, id), RecurringState::PendingApproval);
    f.engine.pending_approvals(&mut f.conn, OWNER).unwrap();
    let notes = f.sink.notifications_of(NotificationKind::RecurringApproval);
    assert_eq!(notes.last().unwrap().priority, Priority::High);

    let child = f
        .engine
        .approve_recurring(&mut f.conn, OWNER, id, Some(dec(55)))
        .unwrap();
    assert_eq!(child.amount, dec(55));
    assert_eq!(child.date, d(2024, 3, 20));
    assert_eq!(child.recurring_parent_id, Some(id));
    assert!(!child.is_template());
    assert_eq!(get_account(&f.conn, OWNER, f.account).unwrap().balance, dec(945));

    let tpl = get_template(&f.conn, OWNER, id, f.engine.today()).unwrap();
    let cfg = tpl.transaction.recurring.unwrap();
    assert_eq!(cfg.last_executed, Some(d(2024, 3, 20)));
    assert_eq!(cfg.next_execution, d(2024, 4, 20));
    assert_eq!(tpl.state, RecurringState::Scheduled);

    // A second approval in the same cycle has nothing to approve.
    let err = f.engine.approve_recurring(&mut f.conn, OWNER, id, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn skip_consumes_the_cycle() {
    let mut f = setup();
    let id = gym(&mut f, d(2024, 3, 20), Some(d(2024, 4, 30)));
    f.clock.set_date(d(2024, 3, 21));
    let cfg = f.engine.skip_recurring(&mut f.conn, OWNER, id).unwrap();
    assert_eq!(cfg.next_execution, d(2024, 4, 20));
    assert_eq!(get_account(&f.conn, OWNER, f.account).unwrap().balance, dec(1000));

    f.clock.set_date(d(2024, 4, 20));
    f.engine.skip_recurring(&mut f.conn, OWNER, id).unwrap();
    assert_eq!(state(&f, id), RecurringState::Ended);
    let err = f.engine.skip_recurring(&mut f.conn, OWNER, id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn cancel_ends_the_template() {
    let mut f = setup();
    let id = gym(&mut f, d(2024, 3, 20), None);
    f.clock.set_date(d(2024, 3, 25));
    assert_eq!(state(&f, id), RecurringState::PendingApproval);

    let cfg = f.engine.cancel_recurring(&mut f.conn, OWNER, id).unwrap();
    assert_eq!(cfg.end_date, Some(d(2024, 3, 25)));
    assert_eq!(state(&f, id), RecurringState::Ended);

    for err in [
        f.engine.approve_recurring(&mut f.conn, OWNER, id, None).unwrap_err(),
        f.engine.skip_recurring(&mut f.conn, OWNER, id).unwrap_err(),
        f.engine.cancel_recurring(&mut f.conn, OWNER, id).unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[test]
fn process_due_catches_up_automatic_templates() {
    let mut f = setup();
    let salary = f
        .engine
        .create_transaction(
            &mut f.conn,
            OWNER,
            TransactionDraft::new(TransactionType::Income, f.account, dec(1000), d(2024, 1, 31))
                .category(Category::Salary)
                .recurring(RecurringDraft {
                    schedule: Schedule::monthly(),
                    end_date: None,
                    requires_approval: false,
                }),
        )
        .unwrap();
    gym(&mut f, d(2024, 3, 1), None);

    let posted = f.engine.process_due_recurring(&mut f.conn, OWNER).unwrap();
    let dates: Vec<NaiveDate> = posted.iter().map(|t| t.date).collect();
    assert_eq!(dates, vec![d(2024, 1, 31), d(2024, 2, 29)]);
    assert!(posted.iter().all(|t| t.recurring_parent_id == Some(salary.id)));
    assert_eq!(get_account(&f.conn, OWNER, f.account).unwrap().balance, dec(3000));

    assert!(f.engine.process_due_recurring(&mut f.conn, OWNER).unwrap().is_empty());
}

#[test]
fn only_income_and_expense_recur() {
    let mut f = setup();
    let other = f
        .engine
        .create_account(
            &mut f.conn,
            OWNER,
            NewAccount {
                name: "Savings".into(),
                account_type: AccountType::Savings,
                opening_balance: Decimal::ZERO,
            },
        )
        .unwrap();
    let err = f
        .engine
        .create_transaction(
            &mut f.conn,
            OWNER,
            TransactionDraft::new(TransactionType::Transfer, f.account, dec(10), d(2024, 3, 20))
                .to_account(other.id)
                .recurring(RecurringDraft {
                    schedule: Schedule::monthly(),
                    end_date: None,
                    requires_approval: false,
                }),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use ledgerwise::db;
use ledgerwise::engine::accounts::{get_account, NewAccount};
use ledgerwise::engine::transactions::{
    get_transaction, list_transactions, TransactionDraft, TransactionFilter, TransactionPatch,
};
use ledgerwise::engine::{Engine, EventHandler, ManualClock};
use ledgerwise::error::{ErrorKind, Result as LedgerResult};
use ledgerwise::models::{AccountType, Category, TransactionType};
use ledgerwise::period::Period;
use ledgerwise::sinks::{
    AuditRecord, AuditSink, DomainEvent, MemorySink, Notification, NotificationSink,
};
use rusqlite::Connection;
use rust_decimal::Decimal;

const OWNER: &str = "alice";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

fn setup() -> (Connection, Engine, Arc<MemorySink>) {
    let conn = db::open_in_memory().unwrap();
    let sink = Arc::new(MemorySink::new());
    let engine = Engine::new(sink.clone(), sink.clone())
        .with_clock(Arc::new(ManualClock::at_date(d(2024, 3, 15))));
    (conn, engine, sink)
}

fn account(
    engine: &Engine,
    conn: &mut Connection,
    name: &str,
    kind: AccountType,
    opening: i64,
) -> i64 {
    engine
        .create_account(
            conn,
            OWNER,
            NewAccount {
                name: name.into(),
                account_type: kind,
                opening_balance: dec(opening),
            },
        )
        .unwrap()
        .id
}

fn balance(conn: &Connection, id: i64) -> Decimal {
    get_account(conn, OWNER, id).unwrap().balance
}

#[test]
fn expense_update_and_delete_rederive_balance() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 1000);

    let txn = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, a, dec(300), d(2024, 3, 10))
                .category(Category::Food),
        )
        .unwrap();
    assert_eq!(balance(&conn, a), dec(700));

    let patch = TransactionPatch {
        amount: Some(dec(500)),
        ..TransactionPatch::default()
    };
    engine.update_transaction(&mut conn, OWNER, txn.id, patch).unwrap();
    assert_eq!(balance(&conn, a), dec(500));

    engine.delete_transaction(&mut conn, OWNER, txn.id).unwrap();
    assert_eq!(balance(&conn, a), dec(1000));
    let err = get_transaction(&conn, OWNER, txn.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn moving_a_transaction_between_accounts() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 1000);
    let b = account(&engine, &mut conn, "Wallet", AccountType::Cash, 100);

    let txn = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Income, a, dec(250), d(2024, 3, 1))
                .category(Category::Salary),
        )
        .unwrap();
    assert_eq!(balance(&conn, a), dec(1250));

    let patch = TransactionPatch {
        account_id: Some(b),
        ..TransactionPatch::default()
    };
    engine.update_transaction(&mut conn, OWNER, txn.id, patch).unwrap();
    assert_eq!(balance(&conn, a), dec(1000));
    assert_eq!(balance(&conn, b), dec(350));
}

#[test]
fn transfers_conserve_money() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 1000);
    let s = account(&engine, &mut conn, "Savings", AccountType::Savings, 0);

    engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Transfer, a, dec(400), d(2024, 3, 2))
                .to_account(s),
        )
        .unwrap();
    assert_eq!(balance(&conn, a), dec(600));
    assert_eq!(balance(&conn, s), dec(400));
    assert_eq!(balance(&conn, a) + balance(&conn, s), dec(1000));

    let same = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Transfer, a, dec(1), d(2024, 3, 2))
                .to_account(a),
        )
        .unwrap_err();
    assert_eq!(same.kind(), ErrorKind::Validation);
}

#[test]
fn insufficient_balance_leaves_nothing_behind() {
    let (mut conn, engine, sink) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 100);
    sink.clear();

    let err = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, a, dec(150), d(2024, 3, 3))
                .category(Category::Shopping),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert_eq!(balance(&conn, a), dec(100));
    assert!(list_transactions(&conn, OWNER, &TransactionFilter::default()).unwrap().is_empty());
    assert!(sink.audit_records().is_empty());
}

#[test]
fn loan_accounts_may_go_negative() {
    let (mut conn, engine, _) = setup();
    let loan = account(&engine, &mut conn, "Car loan", AccountType::Loan, -5000);
    engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, loan, dec(100), d(2024, 3, 4))
                .category(Category::Transport),
        )
        .unwrap();
    assert_eq!(balance(&conn, loan), dec(-5100));

    let err = engine
        .create_account(
            &mut conn,
            OWNER,
            NewAccount {
                name: "Overdrawn".into(),
                account_type: AccountType::Bank,
                opening_balance: dec(-1),
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn shape_rules_are_enforced() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 100);

    let cases = vec![
        TransactionDraft::new(TransactionType::Expense, a, Decimal::ZERO, d(2024, 3, 5))
            .category(Category::Food),
        TransactionDraft::new(TransactionType::Expense, a, dec(5), d(2024, 3, 5)),
        TransactionDraft::new(TransactionType::Expense, a, dec(5), d(2024, 3, 5))
            .category(Category::Salary),
        TransactionDraft::new(TransactionType::Transfer, a, dec(5), d(2024, 3, 5)),
    ];
    for draft in cases {
        let err = engine.create_transaction(&mut conn, OWNER, draft).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(balance(&conn, a), dec(100));
}

#[test]
fn type_change_is_rejected() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 100);
    let txn = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, a, dec(10), d(2024, 3, 5))
                .category(Category::Food),
        )
        .unwrap();
    let patch = TransactionPatch {
        tx_type: Some(TransactionType::Income),
        ..TransactionPatch::default()
    };
    let err = engine.update_transaction(&mut conn, OWNER, txn.id, patch).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(balance(&conn, a), dec(90));
}

#[test]
fn settled_periods_are_locked() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 1000);
    let feb = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, a, dec(40), d(2024, 2, 20))
                .category(Category::Food),
        )
        .unwrap();
    engine
        .perform_settlement(&mut conn, OWNER, &Period::parse("2024-02").unwrap())
        .unwrap();

    let settled = get_transaction(&conn, OWNER, feb.id).unwrap();
    assert!(settled.is_settled);
    assert_eq!(settled.settlement_period.as_deref(), Some("2024-02"));

    let patch = TransactionPatch {
        amount: Some(dec(41)),
        ..TransactionPatch::default()
    };
    let err = engine.update_transaction(&mut conn, OWNER, feb.id, patch).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SettledImmutable);
    let err = engine.delete_transaction(&mut conn, OWNER, feb.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SettledImmutable);

    let err = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, a, dec(5), d(2024, 2, 21))
                .category(Category::Food),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SettledImmutable);

    let march = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, a, dec(5), d(2024, 3, 1))
                .category(Category::Food),
        )
        .unwrap();
    let patch = TransactionPatch {
        date: Some(d(2024, 2, 28)),
        ..TransactionPatch::default()
    };
    let err = engine.update_transaction(&mut conn, OWNER, march.id, patch).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SettledImmutable);

    let check = engine.verify_account_balance(&conn, OWNER, a).unwrap();
    assert!(check.consistent);
    assert_eq!(check.stored, dec(955));
}

#[test]
fn owners_do_not_see_each_other() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 100);
    let err = engine
        .create_transaction(
            &mut conn,
            "mallory",
            TransactionDraft::new(TransactionType::Expense, a, dec(10), d(2024, 3, 5))
                .category(Category::Food),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(get_account(&conn, "mallory", a).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn inactive_accounts_take_no_new_transactions() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 100);
    engine.deactivate_account(&mut conn, OWNER, a).unwrap();
    let err = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Income, a, dec(10), d(2024, 3, 5))
                .category(Category::Gift),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    engine.reactivate_account(&mut conn, OWNER, a).unwrap();
    engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Income, a, dec(10), d(2024, 3, 5))
                .category(Category::Gift),
        )
        .unwrap();
    assert_eq!(balance(&conn, a), dec(110));
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<DomainEvent>>,
}

impl EventHandler for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn handle(
        &self,
        _engine: &Engine,
        _conn: &mut Connection,
        event: &DomainEvent,
    ) -> LedgerResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[test]
fn ledger_writes_publish_events_after_commit() {
    let (mut conn, engine, _) = setup();
    let recorder = Arc::new(Recorder::default());
    let engine = engine.subscribe(recorder.clone());
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 100);

    engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, a, dec(10), d(2024, 3, 5))
                .category(Category::Food),
        )
        .unwrap();
    let _ = engine.create_transaction(
        &mut conn,
        OWNER,
        TransactionDraft::new(TransactionType::Expense, a, dec(1000), d(2024, 3, 5))
            .category(Category::Food),
    );

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![DomainEvent::LedgerChanged {
            owner: OWNER.into(),
            account_ids: vec![a],
            categories: vec![Category::Food],
        }]
    );
}

struct FailingSink;

impl NotificationSink for FailingSink {
    fn notify(&self, _: &Notification) -> anyhow::Result<()> {
        anyhow::bail!("mail server down")
    }
}

impl AuditSink for FailingSink {
    fn record(&self, _: &AuditRecord) -> anyhow::Result<()> {
        anyhow::bail!("audit store down")
    }
}

#[test]
fn sink_failures_do_not_undo_the_operation() {
    let mut conn = db::open_in_memory().unwrap();
    let engine = Engine::new(Arc::new(FailingSink), Arc::new(FailingSink))
        .with_clock(Arc::new(ManualClock::at_date(d(2024, 3, 15))));
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 100);
    engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, a, dec(30), d(2024, 3, 5))
                .category(Category::Food),
        )
        .unwrap();
    assert_eq!(balance(&conn, a), dec(70));
}

#[test]
fn listing_filters_by_period_and_category() {
    let (mut conn, engine, _) = setup();
    let a = account(&engine, &mut conn, "Checking", AccountType::Bank, 1000);
    for (amount, category, date) in [
        (10, Category::Food, d(2024, 2, 3)),
        (20, Category::Food, d(2024, 3, 3)),
        (30, Category::Travel, d(2024, 3, 4)),
    ] {
        engine
            .create_transaction(
                &mut conn,
                OWNER,
                TransactionDraft::new(TransactionType::Expense, a, dec(amount), date)
                    .category(category),
            )
            .unwrap();
    }
    let filter = TransactionFilter {
        period: Some(Period::parse("2024-03").unwrap()),
        category: Some(Category::Food),
        ..TransactionFilter::default()
    };
    let rows = list_transactions(&conn, OWNER, &filter).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount, dec(20));

    let limited = TransactionFilter {
        limit: Some(2),
        ..TransactionFilter::default()
    };
    let rows = list_transactions(&conn, OWNER, &limited).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].date, d(2024, 3, 4));
}

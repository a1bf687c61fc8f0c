// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use chrono::NaiveDate;
use ledgerwise::db;
use ledgerwise::engine::accounts::{get_account, NewAccount};
use ledgerwise::engine::liabilities::{get_liability, NewLiability, PaymentRequest};
use ledgerwise::engine::settlement::{get_settlement, list_settlements};
use ledgerwise::engine::transactions::{get_transaction, TransactionDraft};
use ledgerwise::engine::{Engine, ManualClock};
use ledgerwise::error::ErrorKind;
use ledgerwise::models::{AccountType, Category, LiabilityKind, TransactionType};
use ledgerwise::period::Period;
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

struct January {
    conn: Connection,
    engine: Engine,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
    checking: i64,
    savings: i64,
    loan: i64,
    income: i64,
    february_expense: i64,
}

fn account(
    engine: &Engine,
    conn: &mut Connection,
    name: &str,
    t: AccountType,
    opening: i64,
) -> i64 {
    engine
        .create_account(
            conn,
            OWNER,
            NewAccount {
                name: name.into(),
                account_type: t,
                opening_balance: dec(opening),
            },
        )
        .unwrap()
        .id
}

/// A month of activity: income, an expense, a transfer and a partial loan payment, plus
/// one February expense recorded before January is closed.
fn january() -> January {
    let mut conn = db::open_in_memory().unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::at_date(d(2024, 1, 10)));
    let engine = Engine::new(sink.clone(), sink.clone()).with_clock(clock.clone());
    let checking = account(&engine, &mut conn, "Checking", AccountType::Bank, 1000);
    let savings = account(&engine, &mut conn, "Savings", AccountType::Savings, 500);

    let income = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Income, checking, dec(200), d(2024, 1, 5))
                .category(Category::Salary),
        )
        .unwrap()
        .id;
    engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, checking, dec(100), d(2024, 1, 8))
                .category(Category::Food),
        )
        .unwrap();
    engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Transfer, checking, dec(50), d(2024, 1, 9))
                .to_account(savings),
        )
        .unwrap();

    let loan = engine
        .create_liability(
            &mut conn,
            OWNER,
            NewLiability {
                name: "Personal loan".into(),
                kind: LiabilityKind::PersonalDebt,
                lender: None,
                total_amount: dec(300),
                interest_rate: None,
                due_date: None,
                received_into: None,
            },
        )
        .unwrap()
        .id;
    engine
        .make_payment(
            &mut conn,
            OWNER,
            loan,
            PaymentRequest {
                account_id: checking,
                amount: dec(100),
                date: None,
                description: None,
            },
        )
        .unwrap();

    clock.set_date(d(2024, 2, 5));
    let february_expense = engine
        .create_transaction(
            &mut conn,
            OWNER,
            TransactionDraft::new(TransactionType::Expense, checking, dec(30), d(2024, 2, 2))
                .category(Category::Food),
        )
        .unwrap()
        .id;

    January {
        conn,
        engine,
        sink,
        clock,
        checking,
        savings,
        loan,
        income,
        february_expense,
    }
}

fn jan() -> Period {
    Period::parse("2024-01").unwrap()
}

#[test]
fn closing_january() {
    let mut j = january();
    assert_eq!(get_account(&j.conn, OWNER, j.checking).unwrap().balance, dec(920));

    let s = j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap();
    assert_eq!(s.period, "2024-01");
    assert!(s.is_settled);
    assert_eq!(s.period_start, d(2024, 1, 1));
    assert_eq!(s.period_end, d(2024, 1, 31));

    assert_eq!(s.summary.total_income, dec(200));
    assert_eq!(s.summary.total_expense, dec(100));
    assert_eq!(s.summary.total_liability_payments, dec(100));
    assert_eq!(s.summary.total_transfers, dec(50));
    assert_eq!(s.summary.net_savings, dec(100));
    assert_eq!(s.summary.transaction_count, 4);

    let checking = s.accounts.iter().find(|a| a.account_id == j.checking).unwrap();
    assert_eq!(checking.opening_balance, dec(1000));
    assert_eq!(checking.closing_balance, dec(950));
    assert_eq!(checking.total_inflow, dec(200));
    assert_eq!(checking.total_outflow, dec(250));
    let savings = s.accounts.iter().find(|a| a.account_id == j.savings).unwrap();
    assert_eq!(savings.closing_balance, dec(550));
    assert_eq!(s.carry_forward_balance, dec(1500));

    assert_eq!(s.liabilities.total_new, dec(300));
    assert_eq!(s.liabilities.total_carry_forward, dec(200));
    assert_eq!(s.liabilities.carry_forward.len(), 1);
    let loan = get_liability(&j.conn, OWNER, j.loan).unwrap();
    assert_eq!(loan.settlement_period, "2024-02");
    assert_eq!(loan.carried_forward_from.as_deref(), Some("2024-01"));

    let income = get_transaction(&j.conn, OWNER, j.income).unwrap();
    assert!(income.is_settled);
    assert_eq!(income.settlement_period.as_deref(), Some("2024-01"));
    let pending = get_transaction(&j.conn, OWNER, j.february_expense).unwrap();
    assert!(!pending.is_settled);

    let notes = j.sink.notifications_of(NotificationKind::SettlementCompleted);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].priority, Priority::Low);
}

#[test]
fn opening_balance_plus_pending_equals_live_balance() {
    let mut j = january();
    j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap();

    let checking = get_account(&j.conn, OWNER, j.checking).unwrap();
    assert_eq!(checking.opening_balance, dec(950));
    assert_eq!(checking.balance, dec(920));
    assert!(checking.last_settled_at.is_some());
    let savings = get_account(&j.conn, OWNER, j.savings).unwrap();
    assert_eq!(savings.opening_balance, savings.balance);

    let report = j.engine.verify_account_balance(&j.conn, OWNER, j.checking).unwrap();
    assert!(report.consistent);
}

#[test]
fn carried_liability_reappears_as_opening_next_month() {
    let mut j = january();
    j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap();

    j.clock.set_date(d(2024, 3, 2));
    let feb = Period::parse("2024-02").unwrap();
    let s = j.engine.perform_settlement(&mut j.conn, OWNER, &feb).unwrap();
    assert_eq!(s.liabilities.total_opening, dec(200));
    assert_eq!(s.liabilities.total_new, Decimal::ZERO);
    assert_eq!(s.liabilities.total_carry_forward, dec(200));
    assert_eq!(s.summary.total_expense, dec(30));
    assert_eq!(
        get_liability(&j.conn, OWNER, j.loan).unwrap().settlement_period,
        "2024-03"
    );

    let all = list_settlements(&j.conn, OWNER).unwrap();
    let periods: Vec<&str> = all.iter().map(|s| s.period.as_str()).collect();
    assert_eq!(periods, vec!["2024-02", "2024-01"]);
}

#[test]
fn settlement_is_written_once() {
    let mut j = january();
    j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap();
    let err = j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSettlement);

    let future = Period::parse("2024-03").unwrap();
    let err = j.engine.perform_settlement(&mut j.conn, OWNER, &future).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(list_settlements(&j.conn, OWNER).unwrap().len(), 1);
}

#[test]
fn notes_stay_editable() {
    let mut j = january();
    j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap();
    let s = j
        .engine
        .update_settlement_notes(&mut j.conn, OWNER, "2024-01", Some("reconciled with bank".into()))
        .unwrap();
    assert_eq!(s.notes.as_deref(), Some("reconciled with bank"));
    let s = j
        .engine
        .update_settlement_notes(&mut j.conn, OWNER, "2024-01", None)
        .unwrap();
    assert_eq!(s.notes, None);
    assert_eq!(get_settlement(&j.conn, OWNER, "2024-01").unwrap().carry_forward_balance, dec(1500));

    let err = j
        .engine
        .update_settlement_notes(&mut j.conn, OWNER, "2023-12", Some("x".into()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn advice_near_month_end() {
    let mut j = january();
    let advice = j.engine.check_settlement_needed(&j.conn, OWNER).unwrap();
    assert_eq!(advice.period, "2024-02");
    assert!(!advice.needed);
    assert_eq!(advice.previous_unsettled.as_deref(), Some("2024-01"));

    j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap();
    j.clock.set_date(d(2024, 2, 27));
    let advice = j.engine.check_settlement_needed(&j.conn, OWNER).unwrap();
    assert_eq!(advice.days_remaining, 2);
    assert!(advice.needed);
    assert!(!advice.is_settled);
    assert_eq!(advice.previous_unsettled, None);
}

#[test]
fn other_owners_are_untouched() {
    let mut j = january();
    let bob = j
        .engine
        .create_account(
            &mut j.conn,
            "bob",
            NewAccount {
                name: "Wallet".into(),
                account_type: AccountType::Cash,
                opening_balance: dec(40),
            },
        )
        .unwrap();
    let s = j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap();
    assert!(s.accounts.iter().all(|a| a.account_id != bob.id));
    assert!(get_account(&j.conn, "bob", bob.id).unwrap().last_settled_at.is_none());
    j.engine.perform_settlement(&mut j.conn, "bob", &jan()).unwrap();
}

#[test]
fn overlapping_periods_are_refused() {
    let mut j = january();
    j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap();
    j.clock.set_date(d(2025, 1, 5));

    let year = Period::parse("2024").unwrap();
    let err = j.engine.perform_settlement(&mut j.conn, OWNER, &year).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSettlement);
    let checking = get_account(&j.conn, OWNER, j.checking).unwrap();
    assert_eq!(checking.opening_balance, dec(950));
    assert_eq!(list_settlements(&j.conn, OWNER).unwrap().len(), 1);
}

#[test]
fn a_month_inside_a_settled_year_is_refused() {
    let mut j = january();
    j.clock.set_date(d(2025, 1, 5));
    let year = Period::parse("2024").unwrap();
    let s = j.engine.perform_settlement(&mut j.conn, OWNER, &year).unwrap();
    assert_eq!(s.summary.transaction_count, 5);

    let err = j
        .engine
        .perform_settlement(&mut j.conn, OWNER, &Period::parse("2024-06").unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSettlement);
}

#[test]
fn earlier_periods_cannot_be_settled_after_later_ones() {
    let mut j = january();
    j.clock.set_date(d(2024, 3, 2));
    let feb = Period::parse("2024-02").unwrap();
    j.engine.perform_settlement(&mut j.conn, OWNER, &feb).unwrap();
    let opening = get_account(&j.conn, OWNER, j.checking).unwrap().opening_balance;

    let err = j.engine.perform_settlement(&mut j.conn, OWNER, &jan()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(get_account(&j.conn, OWNER, j.checking).unwrap().opening_balance, opening);
    assert!(!get_transaction(&j.conn, OWNER, j.income).unwrap().is_settled);
}

#[test]
fn liabilities_from_an_unsettled_month_are_still_carried() {
    let mut j = january();
    j.clock.set_date(d(2024, 3, 2));
    let feb = Period::parse("2024-02").unwrap();
    let s = j.engine.perform_settlement(&mut j.conn, OWNER, &feb).unwrap();
    assert_eq!(s.liabilities.total_opening, dec(200));
    assert_eq!(s.liabilities.total_carry_forward, dec(200));
    assert_eq!(s.liabilities.total_new, Decimal::ZERO);
    let loan = get_liability(&j.conn, OWNER, j.loan).unwrap();
    assert_eq!(loan.settlement_period, "2024-03");
    assert_eq!(loan.carried_forward_from.as_deref(), Some("2024-02"));

    j.clock.set_date(d(2024, 4, 2));
    let mar = Period::parse("2024-03").unwrap();
    let s = j.engine.perform_settlement(&mut j.conn, OWNER, &mar).unwrap();
    assert_eq!(s.liabilities.total_opening, dec(200));
    assert_eq!(s.liabilities.total_carry_forward, dec(200));
}

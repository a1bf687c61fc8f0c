// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use chrono::NaiveDate;
use ledgerwise::db;
use ledgerwise::engine::accounts::{get_account, NewAccount};
use ledgerwise::engine::bills::{bill_payments, get_bill, list_bills, BillPaymentRequest, NewBill};
use ledgerwise::engine::{Engine, ManualClock};
use ledgerwise::error::ErrorKind;
use ledgerwise::models::{AccountType, BillStatus, Category, RecurringPattern};
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
    let clock = Arc::new(ManualClock::at_date(d(2024, 3, 10)));
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

fn internet(due: NaiveDate, end: Option<NaiveDate>) -> NewBill {
    NewBill {
        name: "Internet".into(),
        amount: dec(120),
        category: Category::Utilities,
        due_date: due,
        recurring: Some(RecurringPattern {
            schedule: Schedule::monthly(),
            end_date: end,
        }),
        reminder_days: vec![7, 1],
    }
}

fn pay(account_id: i64, amount: Option<i64>) -> BillPaymentRequest {
    BillPaymentRequest {
        account_id,
        amount: amount.map(dec),
        date: None,
    }
}

#[test]
fn paying_a_recurring_bill_creates_the_next_one() {
    let mut f = setup();
    let bill = f.engine.create_bill(&mut f.conn, OWNER, internet(d(2024, 3, 20), None)).unwrap();
    assert_eq!(bill.reminder_days, vec![7, 1]);

    let partial = f
        .engine
        .mark_bill_as_paid(&mut f.conn, OWNER, bill.id, pay(f.account, Some(50)))
        .unwrap();
    assert_eq!(partial.bill.status(f.engine.today()), BillStatus::PartiallyPaid);
    assert!(partial.successor.is_none());
    assert_eq!(partial.transaction.bill_id, Some(bill.id));

    let rest = f
        .engine
        .mark_bill_as_paid(&mut f.conn, OWNER, bill.id, pay(f.account, None))
        .unwrap();
    assert_eq!(rest.payment.amount, dec(70));
    assert_eq!(rest.bill.status(f.engine.today()), BillStatus::Paid);
    let next = rest.successor.expect("successor bill");
    assert_eq!(next.due_date, d(2024, 4, 20));
    assert_eq!(next.previous_bill_id, Some(bill.id));
    assert_eq!(next.paid_amount, Decimal::ZERO);

    assert_eq!(get_account(&f.conn, OWNER, f.account).unwrap().balance, dec(880));
    assert_eq!(bill_payments(&f.conn, OWNER, bill.id).unwrap().len(), 2);
    assert_eq!(f.sink.notifications_of(NotificationKind::BillPaid).len(), 1);
    assert_eq!(list_bills(&f.conn, OWNER).unwrap().len(), 2);

    let err = f
        .engine
        .mark_bill_as_paid(&mut f.conn, OWNER, bill.id, pay(f.account, Some(1)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overpayment);
}

#[test]
fn recurrence_stops_at_its_end_date() {
    let mut f = setup();
    let bill = f
        .engine
        .create_bill(&mut f.conn, OWNER, internet(d(2024, 3, 20), Some(d(2024, 3, 31))))
        .unwrap();
    let out = f
        .engine
        .mark_bill_as_paid(&mut f.conn, OWNER, bill.id, pay(f.account, None))
        .unwrap();
    assert!(out.successor.is_none());
}

#[test]
fn overpaying_a_bill_is_rejected() {
    let mut f = setup();
    let bill = f.engine.create_bill(&mut f.conn, OWNER, internet(d(2024, 3, 20), None)).unwrap();
    let err = f
        .engine
        .mark_bill_as_paid(&mut f.conn, OWNER, bill.id, pay(f.account, Some(121)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overpayment);
    assert_eq!(get_bill(&f.conn, OWNER, bill.id).unwrap().paid_amount, Decimal::ZERO);
}

#[test]
fn reminders_go_out_once_when_due() {
    let mut f = setup();
    let bill = f.engine.create_bill(&mut f.conn, OWNER, internet(d(2024, 3, 20), None)).unwrap();

    assert!(f.engine.dispatch_due_reminders(&mut f.conn, OWNER).unwrap().is_empty());

    f.clock.set_date(d(2024, 3, 13));
    let sent = f.engine.dispatch_due_reminders(&mut f.conn, OWNER).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].bill_id, bill.id);
    assert_eq!(sent[0].remind_on, d(2024, 3, 13));
    assert_eq!(sent[0].notification.priority, Priority::Medium);
    assert!(f.engine.dispatch_due_reminders(&mut f.conn, OWNER).unwrap().is_empty());

    f.engine
        .mark_bill_as_paid(&mut f.conn, OWNER, bill.id, pay(f.account, None))
        .unwrap();
    f.clock.set_date(d(2024, 3, 19));
    assert!(f.engine.dispatch_due_reminders(&mut f.conn, OWNER).unwrap().is_empty());
    assert_eq!(f.sink.notifications_of(NotificationKind::BillReminder).len(), 1);
}

#[test]
fn overdue_reminders_are_urgent() {
    let mut f = setup();
    let mut new = internet(d(2024, 3, 5), None);
    new.reminder_days = vec![1];
    f.engine.create_bill(&mut f.conn, OWNER, new).unwrap();
    let sent = f.engine.dispatch_due_reminders(&mut f.conn, OWNER).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].notification.priority, Priority::High);
}

#[test]
fn upcoming_includes_overdue_and_skips_paid() {
    let mut f = setup();
    let overdue = f.engine.create_bill(&mut f.conn, OWNER, internet(d(2024, 3, 1), None)).unwrap();
    let soon = f.engine.create_bill(&mut f.conn, OWNER, internet(d(2024, 3, 14), None)).unwrap();
    f.engine.create_bill(&mut f.conn, OWNER, internet(d(2024, 5, 1), None)).unwrap();
    let paid = f
        .engine
        .create_bill(&mut f.conn, OWNER, internet(d(2024, 3, 12), Some(d(2024, 3, 12))))
        .unwrap();
    f.engine
        .mark_bill_as_paid(&mut f.conn, OWNER, paid.id, pay(f.account, None))
        .unwrap();

    let ids: Vec<i64> = f
        .engine
        .upcoming_bills(&f.conn, OWNER, 7)
        .unwrap()
        .iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, vec![overdue.id, soon.id]);
}

#[test]
fn month_end_bills_keep_their_due_day() {
    let mut f = setup();
    let first = f.engine.create_bill(&mut f.conn, OWNER, internet(d(2024, 1, 31), None)).unwrap();
    let feb = f
        .engine
        .mark_bill_as_paid(&mut f.conn, OWNER, first.id, pay(f.account, None))
        .unwrap()
        .successor
        .unwrap();
    assert_eq!(feb.due_date, d(2024, 2, 29));
    let mar = f
        .engine
        .mark_bill_as_paid(&mut f.conn, OWNER, feb.id, pay(f.account, None))
        .unwrap()
        .successor
        .unwrap();
    assert_eq!(mar.due_date, d(2024, 3, 31));
}

#[test]
fn zero_interval_patterns_are_refused() {
    let raw = r#"{"schedule":{"frequency":"monthly","interval":0},"end_date":null}"#;
    assert!(serde_json::from_str::<RecurringPattern>(raw).is_err());

    let mut f = setup();
    let bill = f.engine.create_bill(&mut f.conn, OWNER, internet(d(2024, 3, 20), None)).unwrap();
    f.conn
        .execute("UPDATE bills SET recurring=?1 WHERE id=?2", rusqlite::params![raw, bill.id])
        .unwrap();
    assert!(f
        .engine
        .mark_bill_as_paid(&mut f.conn, OWNER, bill.id, pay(f.account, None))
        .is_err());
    assert_eq!(get_account(&f.conn, OWNER, f.account).unwrap().balance, dec(1000));
}

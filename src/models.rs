// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::period::PeriodType;
use crate::schedule::Schedule;

pub type Id = i64;

/// Declares a closed enum persisted as a lowercase TEXT column.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::LedgerError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(crate::error::LedgerError::Validation(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}
pub(crate) use string_enum;

string_enum! {
    AccountType {
        Cash => "cash",
        Bank => "bank",
        Savings => "savings",
        Investment => "investment",
        Loan => "loan",
    }
}

impl AccountType {
    /// Only loan accounts may carry a negative balance.
    pub fn allows_negative(&self) -> bool {
        matches!(self, AccountType::Loan)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Id,
    pub owner: String,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub opening_balance: Decimal,
    pub is_active: bool,
    pub last_settled_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

string_enum! {
    TransactionType {
        Income => "income",
        Expense => "expense",
        Transfer => "transfer",
        Liability => "liability",
    }
}

string_enum! {
    /// Transaction categories. Income and expense categories are disjoint; transfers and
    /// loan proceeds have a single dedicated category each.
    Category {
        Salary => "salary",
        Freelance => "freelance",
        Business => "business",
        Investment => "investment",
        Rental => "rental",
        Gift => "gift",
        Refund => "refund",
        OtherIncome => "other_income",
        Food => "food",
        Transport => "transport",
        Shopping => "shopping",
        Entertainment => "entertainment",
        Bills => "bills",
        Utilities => "utilities",
        Healthcare => "healthcare",
        Education => "education",
        Travel => "travel",
        Housing => "housing",
        Insurance => "insurance",
        DebtPayment => "debt_payment",
        PersonalCare => "personal_care",
        OtherExpense => "other_expense",
        Transfer => "transfer",
        Loan => "loan",
    }
}

impl Category {
    pub fn is_income(&self) -> bool {
        matches!(
            self,
            Category::Salary
                | Category::Freelance
                | Category::Business
                | Category::Investment
                | Category::Rental
                | Category::Gift
                | Category::Refund
                | Category::OtherIncome
        )
    }

    pub fn is_expense(&self) -> bool {
        !self.is_income() && !matches!(self, Category::Transfer | Category::Loan)
    }

    pub fn valid_for(&self, tx_type: TransactionType) -> bool {
        match tx_type {
            TransactionType::Income => self.is_income(),
            TransactionType::Expense => self.is_expense(),
            TransactionType::Transfer => matches!(self, Category::Transfer),
            TransactionType::Liability => matches!(self, Category::Loan),
        }
    }
}

/// Schedule state of a recurring template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurringConfig {
    pub schedule: Schedule,
    pub end_date: Option<NaiveDate>,
    pub last_executed: Option<NaiveDate>,
    pub next_execution: NaiveDate,
    pub requires_approval: bool,
    pub is_approved: bool,
}

impl RecurringConfig {
    /// True once the next execution falls past the end date.
    pub fn is_ended(&self) -> bool {
        self.end_date
            .is_some_and(|end| self.next_execution > end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Id,
    pub owner: String,
    pub tx_type: TransactionType,
    pub account_id: Id,
    pub to_account_id: Option<Id>,
    pub amount: Decimal,
    pub category: Option<Category>,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub is_liability_payment: bool,
    pub liability_id: Option<Id>,
    pub bill_id: Option<Id>,
    pub recurring: Option<RecurringConfig>,
    pub recurring_parent_id: Option<Id>,
    pub settlement_period: Option<String>,
    pub is_settled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Recurring templates are stored but never posted to the ledger.
    pub fn is_template(&self) -> bool {
        self.recurring.is_some()
    }

    pub fn is_payment_link(&self) -> bool {
        self.liability_id.is_some() || self.bill_id.is_some()
    }
}

string_enum! {
    LiabilityKind {
        Loan => "loan",
        CreditCard => "credit_card",
        Mortgage => "mortgage",
        PersonalDebt => "personal_debt",
        Other => "other",
    }
}

string_enum! {
    LiabilityStatus {
        Active => "active",
        PartiallyPaid => "partially_paid",
        FullyPaid => "fully_paid",
    }
}

impl LiabilityStatus {
    pub fn from_amounts(total: Decimal, paid: Decimal) -> Self {
        if total - paid <= Decimal::ZERO {
            LiabilityStatus::FullyPaid
        } else if paid > Decimal::ZERO {
            LiabilityStatus::PartiallyPaid
        } else {
            LiabilityStatus::Active
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Liability {
    pub id: Id,
    pub owner: String,
    pub name: String,
    pub kind: LiabilityKind,
    pub lender: Option<String>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub interest_rate: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    pub settlement_period: String,
    pub carried_forward_from: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Liability {
    pub fn remaining_amount(&self) -> Decimal {
        (self.total_amount - self.paid_amount).max(Decimal::ZERO)
    }

    pub fn status(&self) -> LiabilityStatus {
        LiabilityStatus::from_amounts(self.total_amount, self.paid_amount)
    }
}

/// A payment against a liability or a bill, realised by a ledger transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: Id,
    pub parent_id: Id,
    pub transaction_id: Id,
    pub account_id: Id,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

string_enum! {
    BillStatus {
        Upcoming => "upcoming",
        Overdue => "overdue",
        Paid => "paid",
        PartiallyPaid => "partially_paid",
    }
}

impl BillStatus {
    pub fn project(amount: Decimal, paid: Decimal, due_date: NaiveDate, today: NaiveDate) -> Self {
        if paid >= amount {
            BillStatus::Paid
        } else if paid > Decimal::ZERO {
            BillStatus::PartiallyPaid
        } else if due_date < today {
            BillStatus::Overdue
        } else {
            BillStatus::Upcoming
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurringPattern {
    pub schedule: Schedule,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bill {
    pub id: Id,
    pub owner: String,
    pub name: String,
    pub amount: Decimal,
    pub category: Category,
    pub due_date: NaiveDate,
    pub recurring: Option<RecurringPattern>,
    pub reminder_days: Vec<u32>,
    pub paid_amount: Decimal,
    pub previous_bill_id: Option<Id>,
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Bill {
    pub fn outstanding(&self) -> Decimal {
        (self.amount - self.paid_amount).max(Decimal::ZERO)
    }

    pub fn status(&self, today: NaiveDate) -> BillStatus {
        BillStatus::project(self.amount, self.paid_amount, self.due_date, today)
    }
}

string_enum! {
    AlertLevel {
        None => "none",
        Warned => "warned",
        Exceeded => "exceeded",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub id: Id,
    pub owner: String,
    pub name: String,
    pub category: Category,
    pub amount: Decimal,
    pub spent: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub alert_threshold: u8,
    pub alert_level: AlertLevel,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Budget {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Spent as a percentage of the budgeted amount.
    pub fn usage_percent(&self) -> Decimal {
        if self.amount.is_zero() {
            return Decimal::ZERO;
        }
        self.spent * Decimal::ONE_HUNDRED / self.amount
    }

    pub fn remaining(&self) -> Decimal {
        self.amount - self.spent
    }
}

string_enum! {
    GoalType {
        Savings => "savings",
        Investment => "investment",
        DebtPayoff => "debt_payoff",
        ExpenseReduction => "expense_reduction",
    }
}

string_enum! {
    GoalStatus {
        Active => "active",
        Completed => "completed",
    }
}

pub const MILESTONE_PERCENTAGES: [u8; 4] = [25, 50, 75, 100];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub percentage: u8,
    pub amount: Decimal,
    pub achieved: bool,
    pub achieved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GoalProgress {
    pub percentage: Decimal,
    pub monthly_target: Decimal,
    pub projected_completion: Option<NaiveDate>,
    pub is_on_track: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: Id,
    pub owner: String,
    pub name: String,
    pub goal_type: GoalType,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub start_date: NaiveDate,
    pub target_date: NaiveDate,
    pub linked_account_id: Option<Id>,
    pub linked_liability_id: Option<Id>,
    pub linked_category: Option<Category>,
    pub status: GoalStatus,
    pub progress: GoalProgress,
    pub milestones: Vec<Milestone>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryTotal {
    pub category: Option<Category>,
    pub tx_type: Option<TransactionType>,
    pub amount: Decimal,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettlementSummary {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub total_transfers: Decimal,
    pub total_liability_payments: Decimal,
    pub total_loan_proceeds: Decimal,
    pub net_savings: Decimal,
    pub transaction_count: u32,
    pub categories: Vec<CategoryTotal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountSnapshot {
    pub account_id: Id,
    pub name: String,
    pub account_type: AccountType,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub total_inflow: Decimal,
    pub total_outflow: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiabilitySnapshot {
    pub liability_id: Id,
    pub name: String,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub status: LiabilityStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LiabilitySummary {
    pub opening: Vec<LiabilitySnapshot>,
    pub new: Vec<LiabilitySnapshot>,
    pub paid: Vec<LiabilitySnapshot>,
    pub carry_forward: Vec<LiabilitySnapshot>,
    pub total_opening: Decimal,
    pub total_new: Decimal,
    pub total_paid: Decimal,
    pub total_carry_forward: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settlement {
    pub id: Id,
    pub owner: String,
    pub period: String,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub summary: SettlementSummary,
    pub accounts: Vec<AccountSnapshot>,
    pub liabilities: LiabilitySummary,
    pub carry_forward_balance: Decimal,
    pub is_settled: bool,
    pub settled_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(" Income ".parse::<TransactionType>().unwrap(), TransactionType::Income);
        assert_eq!("DEBT_PAYOFF".parse::<GoalType>().unwrap(), GoalType::DebtPayoff);
        for status in GoalStatus::ALL {
            assert_eq!(status.as_str().parse::<GoalStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn unknown_labels_are_validation_errors() {
        let err = "paused".parse::<GoalStatus>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("GoalStatus"));
    }
}

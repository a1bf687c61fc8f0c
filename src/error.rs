// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::Id;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failures raised by the ledger core. Every variant maps to a stable [`ErrorKind`].
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("insufficient balance in account {account_id}: available {available}, required {required}")]
    InsufficientBalance {
        account_id: Id,
        available: Decimal,
        required: Decimal,
    },
    #[error("{0} is settled and cannot be modified")]
    SettledImmutable(String),
    #[error("period {period} is already settled")]
    DuplicateSettlement { period: String },
    #[error("payment of {attempted} exceeds remaining amount {remaining}")]
    Overpayment {
        attempted: Decimal,
        remaining: Decimal,
    },
    #[error("{0} was modified concurrently, retry the operation")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InsufficientBalance,
    SettledImmutable,
    DuplicateSettlement,
    Overpayment,
    Conflict,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::InsufficientBalance => "InsufficientBalanceError",
            ErrorKind::SettledImmutable => "SettledImmutableError",
            ErrorKind::DuplicateSettlement => "DuplicateSettlementError",
            ErrorKind::Overpayment => "OverpaymentError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::Storage => "StorageError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::SettledImmutable(_) => ErrorKind::SettledImmutable,
            LedgerError::DuplicateSettlement { .. } => ErrorKind::DuplicateSettlement,
            LedgerError::Overpayment { .. } => ErrorKind::Overpayment,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::Storage(_) | LedgerError::Serde(_) => ErrorKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_stable_names() {
        let err = LedgerError::DuplicateSettlement {
            period: "2024-01".into(),
        };
        assert_eq!(err.kind().as_str(), "DuplicateSettlementError");
        assert_eq!(err.to_string(), "period 2024-01 is already settled");
        assert_eq!(
            LedgerError::not_found("account", 7).kind(),
            ErrorKind::NotFound
        );
    }
}

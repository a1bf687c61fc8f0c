// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod accounts;
pub mod transactions;
pub mod liabilities;
pub mod bills;
pub mod budgets;
pub mod goals;
pub mod recurring;
pub mod settlements;
pub mod reports;
pub mod doctor;
pub mod settings;

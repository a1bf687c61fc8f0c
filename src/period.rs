// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Settlement period labels: `YYYY-MM` for a calendar month, `YYYY` for a calendar year.

use chrono::{Datelike, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

static PERIOD_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(?:-(\d{2}))?$").expect("period label pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Yearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Monthly => "monthly",
            PeriodType::Yearly => "yearly",
        }
    }
}

impl std::str::FromStr for PeriodType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(PeriodType::Monthly),
            "yearly" => Ok(PeriodType::Yearly),
            other => Err(LedgerError::invalid(format!("unknown period type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Period {
    label: String,
    kind: PeriodType,
    start: NaiveDate,
    end: NaiveDate,
}

impl Period {
    pub fn parse(label: &str) -> Result<Period> {
        let label = label.trim();
        let caps = PERIOD_LABEL.captures(label).ok_or_else(|| {
            LedgerError::invalid(format!(
                "invalid period '{}', expected YYYY-MM or YYYY",
                label
            ))
        })?;
        let year: i32 = caps[1]
            .parse()
            .map_err(|_| LedgerError::invalid(format!("invalid year in '{}'", label)))?;
        match caps.get(2) {
            Some(month) => {
                let month: u32 = month
                    .as_str()
                    .parse()
                    .map_err(|_| LedgerError::invalid(format!("invalid month in '{}'", label)))?;
                Period::monthly(year, month)
            }
            None => Period::yearly(year),
        }
    }

    pub fn monthly(year: i32, month: u32) -> Result<Period> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            LedgerError::invalid(format!("invalid month {:04}-{:02}", year, month))
        })?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| LedgerError::invalid("period out of calendar range"))?;
        Ok(Period {
            label: format!("{:04}-{:02}", year, month),
            kind: PeriodType::Monthly,
            start,
            end,
        })
    }

    pub fn yearly(year: i32) -> Result<Period> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| LedgerError::invalid(format!("invalid year {}", year)))?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| LedgerError::invalid(format!("invalid year {}", year)))?;
        Ok(Period {
            label: format!("{:04}", year),
            kind: PeriodType::Yearly,
            start,
            end,
        })
    }

    /// The calendar month containing `date`.
    pub fn month_of(date: NaiveDate) -> Period {
        let start = date.with_day(1).unwrap_or(date);
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(date);
        Period {
            label: format!("{:04}-{:02}", date.year(), date.month()),
            kind: PeriodType::Monthly,
            start,
            end,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> PeriodType {
        self.kind
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn next(&self) -> Result<Period> {
        match self.kind {
            PeriodType::Monthly => {
                let first = self
                    .end
                    .succ_opt()
                    .ok_or_else(|| LedgerError::invalid("period out of calendar range"))?;
                Period::monthly(first.year(), first.month())
            }
            PeriodType::Yearly => Period::yearly(self.start.year() + 1),
        }
    }

    pub fn previous(&self) -> Result<Period> {
        match self.kind {
            PeriodType::Monthly => {
                let last = self
                    .start
                    .pred_opt()
                    .ok_or_else(|| LedgerError::invalid("period out of calendar range"))?;
                Period::monthly(last.year(), last.month())
            }
            PeriodType::Yearly => Period::yearly(self.start.year() - 1),
        }
    }

    /// Days from `today` to the last day of the period; zero once it has ended.
    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        if today > self.end {
            return 0;
        }
        (self.end - today).num_days()
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

impl std::str::FromStr for Period {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Period::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_month_and_year_labels() {
        let jan = Period::parse("2024-01").unwrap();
        assert_eq!(jan.kind(), PeriodType::Monthly);
        assert_eq!(jan.start(), d(2024, 1, 1));
        assert_eq!(jan.end(), d(2024, 1, 31));

        let feb = Period::parse(" 2024-02 ").unwrap();
        assert_eq!(feb.end(), d(2024, 2, 29));

        let year = Period::parse("2023").unwrap();
        assert_eq!(year.kind(), PeriodType::Yearly);
        assert_eq!(year.end(), d(2023, 12, 31));
    }

    #[test]
    fn rejects_malformed_labels() {
        for bad in ["2024-13", "2024-1", "24-01", "2024/01", ""] {
            assert!(Period::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn next_and_previous_cross_year_boundaries() {
        let dec = Period::parse("2023-12").unwrap();
        assert_eq!(dec.next().unwrap().label(), "2024-01");
        assert_eq!(Period::parse("2024-01").unwrap().previous().unwrap().label(), "2023-12");
        assert_eq!(Period::parse("2024").unwrap().next().unwrap().label(), "2025");
    }

    #[test]
    fn days_remaining_counts_down_to_zero() {
        let jan = Period::parse("2024-01").unwrap();
        assert_eq!(jan.days_remaining(d(2024, 1, 28)), 3);
        assert_eq!(jan.days_remaining(d(2024, 1, 31)), 0);
        assert_eq!(jan.days_remaining(d(2024, 2, 5)), 0);
        assert_eq!(Period::month_of(d(2024, 3, 17)).label(), "2024-03");
    }
}

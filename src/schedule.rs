// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::models::string_enum;

string_enum! {
    Frequency {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
}

/// A repetition rule: every `interval` units of `frequency`.
///
/// Month-based steps land on `anchor_day` when it is set, clamped to the length of the
/// target month, so a series started on the 31st returns to the 31st after February.
/// Without an anchor the step keeps the day of the date it starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule")]
pub struct Schedule {
    frequency: Frequency,
    interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anchor_day: Option<u32>,
}

#[derive(Deserialize)]
struct RawSchedule {
    frequency: Frequency,
    interval: u32,
    #[serde(default)]
    anchor_day: Option<u32>,
}

impl TryFrom<RawSchedule> for Schedule {
    type Error = LedgerError;

    fn try_from(raw: RawSchedule) -> Result<Schedule> {
        let schedule = Schedule::new(raw.frequency, raw.interval)?;
        match raw.anchor_day {
            Some(day) if !(1..=31).contains(&day) => Err(LedgerError::invalid(format!(
                "schedule anchor day {} is out of range",
                day
            ))),
            anchor_day => Ok(Schedule {
                anchor_day,
                ..schedule
            }),
        }
    }
}

impl Schedule {
    pub fn new(frequency: Frequency, interval: u32) -> Result<Schedule> {
        if interval == 0 {
            return Err(LedgerError::invalid("schedule interval must be at least 1"));
        }
        Ok(Schedule {
            frequency,
            interval,
            anchor_day: None,
        })
    }

    pub fn monthly() -> Schedule {
        Schedule {
            frequency: Frequency::Monthly,
            interval: 1,
            anchor_day: None,
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn anchor_day(&self) -> Option<u32> {
        self.anchor_day
    }

    /// Pins month-based steps to the day of month of `first`.
    pub fn anchored_at(self, first: NaiveDate) -> Schedule {
        Schedule {
            anchor_day: Some(first.day()),
            ..self
        }
    }

    /// Next occurrence after `from`.
    pub fn advance(&self, from: NaiveDate) -> Result<NaiveDate> {
        let n = self.interval;
        let next = match self.frequency {
            Frequency::Daily => from.checked_add_days(Days::new(u64::from(n))),
            Frequency::Weekly => from.checked_add_days(Days::new(u64::from(n) * 7)),
            Frequency::Monthly => self.add_months(from, Some(n)),
            Frequency::Quarterly => self.add_months(from, n.checked_mul(3)),
            Frequency::Yearly => self.add_months(from, n.checked_mul(12)),
        };
        next.ok_or_else(|| {
            LedgerError::invalid(format!("schedule overflows the calendar after {}", from))
        })
    }

    fn add_months(&self, from: NaiveDate, months: Option<u32>) -> Option<NaiveDate> {
        let first = from.with_day(1)?.checked_add_months(Months::new(months?))?;
        let last = first.checked_add_months(Months::new(1))?.pred_opt()?.day();
        let day = self.anchor_day.unwrap_or(from.day());
        first.with_day(day.min(last))
    }

    pub fn label(&self) -> String {
        match self.interval {
            1 => self.frequency.as_str().to_string(),
            n => format!("every {} x {}", n, self.frequency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn advances_by_frequency_and_interval() {
        let from = d(2024, 1, 15);
        let cases = [
            (Frequency::Daily, 3, d(2024, 1, 18)),
            (Frequency::Weekly, 2, d(2024, 1, 29)),
            (Frequency::Monthly, 1, d(2024, 2, 15)),
            (Frequency::Quarterly, 1, d(2024, 4, 15)),
            (Frequency::Yearly, 1, d(2025, 1, 15)),
        ];
        for (frequency, interval, expected) in cases {
            let schedule = Schedule::new(frequency, interval).unwrap();
            assert_eq!(schedule.advance(from).unwrap(), expected, "{frequency}");
        }
    }

    #[test]
    fn month_end_is_clamped() {
        let schedule = Schedule::monthly();
        assert_eq!(schedule.advance(d(2024, 1, 31)).unwrap(), d(2024, 2, 29));
        assert_eq!(schedule.advance(d(2023, 1, 31)).unwrap(), d(2023, 2, 28));
    }

    #[test]
    fn anchored_steps_return_to_the_anchor_day() {
        let schedule = Schedule::monthly().anchored_at(d(2024, 1, 31));
        let feb = schedule.advance(d(2024, 1, 31)).unwrap();
        let mar = schedule.advance(feb).unwrap();
        let apr = schedule.advance(mar).unwrap();
        assert_eq!((feb, mar, apr), (d(2024, 2, 29), d(2024, 3, 31), d(2024, 4, 30)));

        let unanchored = Schedule::monthly();
        assert_eq!(unanchored.advance(d(2024, 2, 29)).unwrap(), d(2024, 3, 29));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Schedule::new(Frequency::Weekly, 0).is_err());
        let stored = r#"{"frequency":"monthly","interval":0}"#;
        assert!(serde_json::from_str::<Schedule>(stored).is_err());
        let bad_anchor = r#"{"frequency":"monthly","interval":1,"anchor_day":32}"#;
        assert!(serde_json::from_str::<Schedule>(bad_anchor).is_err());
        let ok = r#"{"frequency":"weekly","interval":2}"#;
        let parsed: Schedule = serde_json::from_str(ok).unwrap();
        assert_eq!(parsed, Schedule::new(Frequency::Weekly, 2).unwrap());
    }
}

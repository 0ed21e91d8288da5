//! Month normalization and half-open month windows.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::MonthError;

/// A calendar month, stored as its first day.
///
/// Constructing a `Month` from any day of the month yields the same value, so
/// normalizing an already-normalized month is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month(NaiveDate);

impl Month {
    /// Returns the month containing `date`.
    #[must_use]
    pub fn containing(date: NaiveDate) -> Self {
        // Day 1 exists in every month, so with_day(1) cannot fail.
        Self(date.with_day(1).unwrap_or(date))
    }

    /// Returns the month containing the date part of `dt`.
    #[must_use]
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        Self::containing(dt.date())
    }

    /// Builds a month from a year and a 1-based month number.
    pub fn from_ym(year: i32, month: u32) -> Result<Self, MonthError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or(MonthError::OutOfRange)
    }

    /// Parses `YYYY-MM` or `YYYY-MM-DD`, normalizing to the first of the month.
    pub fn parse(s: &str) -> Result<Self, MonthError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MonthError::Empty);
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::containing(date));
        }

        NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| MonthError::InvalidFormat {
                input: s.to_string(),
            })
    }

    /// First day of the month (inclusive lower bound).
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.0
    }

    /// First day of the following month (exclusive upper bound).
    #[must_use]
    pub fn next_start(&self) -> NaiveDate {
        self.next().0
    }

    /// The following month.
    #[must_use]
    pub fn next(&self) -> Self {
        self.offset(1)
    }

    /// The preceding month.
    #[must_use]
    pub fn prev(&self) -> Self {
        self.offset(-1)
    }

    /// Shifts by `n` months (negative goes back in time).
    ///
    /// Saturates at the chrono calendar bounds, which are far outside any
    /// program month.
    #[must_use]
    pub fn offset(&self, n: i32) -> Self {
        let total = self.0.year() * 12 + self.0.month0() as i32 + n;
        let year = total.div_euclid(12);
        let month0 = total.rem_euclid(12) as u32;
        match NaiveDate::from_ymd_opt(year, month0 + 1, 1) {
            Some(date) => Self(date),
            None if n < 0 => Self(NaiveDate::MIN.with_day(1).unwrap_or(NaiveDate::MIN)),
            None => Self(NaiveDate::MAX.with_day(1).unwrap_or(NaiveDate::MAX)),
        }
    }

    /// The half-open window `[start, next_start)`.
    #[must_use]
    pub fn window(&self) -> MonthWindow {
        MonthWindow {
            start: self.start(),
            end: self.next_start(),
        }
    }

    /// Iterates from this month through `last`, inclusive.
    ///
    /// Yields nothing when `last` precedes `self`.
    #[must_use]
    pub fn through(self, last: Month) -> MonthRange {
        MonthRange {
            next: Some(self),
            last,
        }
    }

    /// Year of the month.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 1-based month number.
    #[must_use]
    pub fn month(&self) -> u32 {
        self.0.month()
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for Month {
    type Err = MonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<NaiveDate> for Month {
    fn from(date: NaiveDate) -> Self {
        Self::containing(date)
    }
}

impl Serialize for Month {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Half-open date interval `[start, end)` covering one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthWindow {
    /// Returns true when `date` falls inside the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Returns true when the date part of `dt` falls inside the window.
    #[must_use]
    pub fn contains_datetime(&self, dt: NaiveDateTime) -> bool {
        self.contains(dt.date())
    }
}

/// Inclusive iterator over consecutive months.
#[derive(Debug, Clone)]
pub struct MonthRange {
    next: Option<Month>,
    last: Month,
}

impl Iterator for MonthRange {
    type Item = Month;

    fn next(&mut self) -> Option<Month> {
        let current = self.next?;
        if current > self.last {
            self.next = None;
            return None;
        }
        self.next = if current == self.last {
            None
        } else {
            Some(current.next())
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case("2020-08-17", date(2020, 8, 1))]
    #[case("2020-08-01", date(2020, 8, 1))]
    #[case("2020-08", date(2020, 8, 1))]
    #[case(" 2019-12-31 ", date(2019, 12, 1))]
    fn test_parse_normalizes(#[case] input: &str, #[case] expected: NaiveDate) {
        assert_eq!(Month::parse(input).unwrap().start(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("2020/08/01")]
    #[case("2020-13")]
    #[case("august")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(Month::parse(input).is_err());
    }

    #[test]
    fn test_next_start_rolls_year() {
        let dec = Month::from_ym(2019, 12).unwrap();
        assert_eq!(dec.next_start(), date(2020, 1, 1));
        assert_eq!(dec.next().prev(), dec);
    }

    #[test]
    fn test_window_is_half_open() {
        let aug = Month::from_ym(2020, 8).unwrap();
        let window = aug.window();
        assert!(window.contains(date(2020, 8, 1)));
        assert!(window.contains(date(2020, 8, 31)));
        assert!(!window.contains(date(2020, 9, 1)));
        assert!(aug.next().window().contains(date(2020, 9, 1)));
        assert!(!window.contains(date(2020, 7, 31)));
    }

    #[test]
    fn test_datetime_at_next_month_start_is_excluded() {
        let aug = Month::from_ym(2020, 8).unwrap();
        let boundary = date(2020, 9, 1).and_hms_opt(0, 0, 0).unwrap();
        let last_second = date(2020, 8, 31).and_hms_opt(23, 59, 59).unwrap();
        assert!(!aug.window().contains_datetime(boundary));
        assert!(aug.window().contains_datetime(last_second));
    }

    #[test]
    fn test_range_is_inclusive() {
        let from = Month::from_ym(2019, 11).unwrap();
        let to = Month::from_ym(2020, 2).unwrap();
        let months: Vec<String> = from.through(to).map(|m| m.to_string()).collect();
        assert_eq!(
            months,
            vec!["2019-11-01", "2019-12-01", "2020-01-01", "2020-02-01"]
        );
        assert_eq!(to.through(from).count(), 0);
    }

    #[test]
    fn test_serde_as_date_string() {
        let m = Month::from_ym(2020, 8).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"2020-08-01\"");
        let back: Month = serde_json::from_str("\"2020-08-19\"").unwrap();
        assert_eq!(back, m);
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(y in 1900i32..2200, m in 1u32..=12, d in 1u32..=28) {
            let month = Month::containing(date(y, m, d));
            prop_assert_eq!(Month::containing(month.start()), month);
            prop_assert_eq!(month.start().day(), 1);
        }

        #[test]
        fn prop_offset_roundtrip(y in 1900i32..2200, m in 1u32..=12, n in -600i32..600) {
            let month = Month::from_ym(y, m).unwrap();
            prop_assert_eq!(month.offset(n).offset(-n), month);
        }

        #[test]
        fn prop_window_partitions_dates(y in 1900i32..2200, m in 1u32..=12, d in 1u32..=28) {
            let day = date(y, m, d);
            let month = Month::containing(day);
            prop_assert!(month.window().contains(day));
            prop_assert!(!month.next().window().contains(day));
            prop_assert!(!month.prev().window().contains(day));
        }
    }
}

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{DataError, PipelineError},
    impl_display_inner, impl_from_primitive,
};

pub const MILLIS_PER_DAY: i64 = 86_400_000;
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Number of CAMEO root categories a feature vector covers.
pub const CATEGORY_COUNT: u8 = 20;

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// A calendar year of the feed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Year(pub u16);
impl_from_primitive!(Year, u16);
impl_display_inner!(Year);

/// Trailing window length of the daily aggregation, in days.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LookbackDays(pub u32);
impl_from_primitive!(LookbackDays, u32);
impl_display_inner!(LookbackDays);

/// Days since the Unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpochDay(pub i64);
impl_from_primitive!(EpochDay, i64);

impl EpochDay {
    /// Floors an epoch-millisecond instant to its day.
    pub fn from_millis(ms: i64) -> Self {
        Self(ms.div_euclid(MILLIS_PER_DAY))
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.and_time(NaiveTime::MIN).and_utc().timestamp() / SECONDS_PER_DAY)
    }

    /// UTC midnight of the day in epoch seconds.
    pub fn timestamp(self) -> i64 {
        self.0 * SECONDS_PER_DAY
    }

    pub fn succ(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn date(self) -> Option<NaiveDate> {
        DateTime::from_timestamp(self.timestamp(), 0).map(|dt| dt.date_naive())
    }
}

impl fmt::Display for EpochDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date() {
            Some(d) => write!(f, "{d}"),
            None => write!(f, "day {}", self.0),
        }
    }
}

// ================================================================================================
// Quarters
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    Display,
    IntoStaticStr,
)]
pub enum Quarter {
    #[strum(serialize = "1")]
    Q1,
    #[strum(serialize = "2")]
    Q2,
    #[strum(serialize = "3")]
    Q3,
    #[strum(serialize = "4")]
    Q4,
}

impl Quarter {
    /// Maps a calendar month (1-12) to its quarter.
    pub fn from_month(month: u32) -> Option<Self> {
        match month {
            1..=3 => Some(Self::Q1),
            4..=6 => Some(Self::Q2),
            7..=9 => Some(Self::Q3),
            10..=12 => Some(Self::Q4),
            _ => None,
        }
    }

    pub fn number(self) -> u32 {
        match self {
            Self::Q1 => 1,
            Self::Q2 => 2,
            Self::Q3 => 3,
            Self::Q4 => 4,
        }
    }
}

impl TryFrom<u32> for Quarter {
    type Error = PipelineError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Q1),
            2 => Ok(Self::Q2),
            3 => Ok(Self::Q3),
            4 => Ok(Self::Q4),
            other => Err(DataError::InvalidQuarter(other).into()),
        }
    }
}

/// A (year, quarter) pair, the unit key of bucketing and correlation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct YearQuarter {
    pub year: Year,
    pub quarter: Quarter,
}

impl YearQuarter {
    pub fn new(year: Year, quarter: Quarter) -> Self {
        Self { year, quarter }
    }

    pub fn next(self) -> Self {
        match self.quarter {
            Quarter::Q1 => Self::new(self.year, Quarter::Q2),
            Quarter::Q2 => Self::new(self.year, Quarter::Q3),
            Quarter::Q3 => Self::new(self.year, Quarter::Q4),
            Quarter::Q4 => Self::new(Year(self.year.0 + 1), Quarter::Q1),
        }
    }
}

impl fmt::Display for YearQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.quarter)
    }
}

// ================================================================================================
// Categories
// ================================================================================================

/// CAMEO root category in `1..=20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(u8);

impl Category {
    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| (1..=CATEGORY_COUNT).contains(v))
            .map(Self)
    }

    /// Derives the root category from a raw CAMEO code.
    ///
    /// The code is left-padded with `0` to three characters and its first two
    /// characters are parsed. Blank and `---` placeholder codes yield `None`,
    /// as does anything outside `1..=20`.
    pub fn from_base_code(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.is_empty() || code == "---" {
            return None;
        }
        let padded = format!("{code:0>3}");
        let head = padded.get(..2)?;
        if !head.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        head.parse::<i64>().ok().and_then(Self::new)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (1..=CATEGORY_COUNT).map(Self)
    }

    /// Zero-based slot in a feature vector.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl_display_inner!(Category);

// ================================================================================================
// Compact Feed Timestamps
// ================================================================================================

/// Parses a compact `YYYYMMDD` integer to epoch milliseconds at UTC midnight.
pub fn compact_date_millis(value: i64) -> Option<i64> {
    if !(10_000_000..=99_999_999).contains(&value) {
        return None;
    }
    let year = i32::try_from(value / 10_000).ok()?;
    let month = u32::try_from(value / 100 % 100).ok()?;
    let day = u32::try_from(value % 100).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
}

/// Parses a compact `YYYYMMDDhhmmss` integer to epoch milliseconds (UTC).
pub fn compact_timestamp_millis(value: i64) -> Option<i64> {
    if !(10_000_000_000_000..=99_999_999_999_999).contains(&value) {
        return None;
    }
    let date = value / 1_000_000;
    let clock = value % 1_000_000;
    let year = i32::try_from(date / 10_000).ok()?;
    let month = u32::try_from(date / 100 % 100).ok()?;
    let day = u32::try_from(date % 100).ok()?;
    let hour = u32::try_from(clock / 10_000).ok()?;
    let minute = u32::try_from(clock / 100 % 100).ok()?;
    let second = u32::try_from(clock % 100).ok()?;
    let d = NaiveDate::from_ymd_opt(year, month, day)?;
    let t = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(NaiveDateTime::new(d, t).and_utc().timestamp_millis())
}

//! Query intervals over the tick timestamp domain.
//!
//! A [`DateRange`] is what callers hand to a read. Before any comparison it
//! is resolved against a timezone into a [`ResolvedRange`] of UTC epoch
//! milliseconds; naive and date-only bounds are read as wall-clock time in
//! that zone.

use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Boundary inclusion of a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalKind {
    #[default]
    ClosedClosed,
    ClosedOpen,
    OpenClosed,
    OpenOpen,
}

impl IntervalKind {
    pub fn start_closed(self) -> bool {
        matches!(self, IntervalKind::ClosedClosed | IntervalKind::ClosedOpen)
    }

    pub fn end_closed(self) -> bool {
        matches!(self, IntervalKind::ClosedClosed | IntervalKind::OpenClosed)
    }
}

/// One side of a [`DateRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    /// Timezone-qualified instant; compared as-is.
    Instant(DateTime<FixedOffset>),
    /// Wall-clock time in the resolving timezone.
    Naive(NaiveDateTime),
    /// Start of the day in the resolving timezone.
    Date(NaiveDate),
}

impl DateBound {
    /// Bound from a `YYYYMMDD` integer, e.g. `20130104`.
    pub fn ymd(value: u32) -> Result<Self> {
        let year = (value / 10_000) as i32;
        let month = (value / 100) % 100;
        let day = value % 100;
        NaiveDate::from_ymd_opt(year, month, day)
            .map(DateBound::Date)
            .ok_or_else(|| Error::InvalidRange(format!("{value} is not a YYYYMMDD date")))
    }

    /// UTC epoch milliseconds of this bound, reading naive values in `tz`.
    pub fn resolve(&self, tz: &Tz) -> Result<i64> {
        match self {
            DateBound::Instant(dt) => Ok(dt.timestamp_millis()),
            DateBound::Naive(naive) => local_to_millis(naive, tz),
            DateBound::Date(date) => day_start_millis(date, tz),
        }
    }
}

/// First instant of `date` in `tz`. Where midnight falls in a DST gap the
/// day starts at the first wall-clock minute after it.
fn day_start_millis(date: &NaiveDate, tz: &Tz) -> Result<i64> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::InvalidRange(format!("no midnight on {date}")))?;
    (0..MINUTES_PER_DAY)
        .map(|minute| midnight + Duration::minutes(minute))
        .find_map(|wall| match tz.from_local_datetime(&wall) {
            LocalResult::Single(dt) => Some(dt.timestamp_millis()),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp_millis()),
            LocalResult::None => None,
        })
        .ok_or_else(|| Error::InvalidRange(format!("{date} does not exist in {}", tz.name())))
}

const MINUTES_PER_DAY: i64 = 24 * 60;

fn local_to_millis(naive: &NaiveDateTime, tz: &Tz) -> Result<i64> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Ok(dt.timestamp_millis()),
        // Repeated wall-clock hour: take the first occurrence.
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.timestamp_millis()),
        LocalResult::None => Err(Error::InvalidRange(format!(
            "{naive} does not exist in {}",
            tz.name()
        ))),
    }
}

impl From<NaiveDate> for DateBound {
    fn from(value: NaiveDate) -> Self {
        DateBound::Date(value)
    }
}

impl From<NaiveDateTime> for DateBound {
    fn from(value: NaiveDateTime) -> Self {
        DateBound::Naive(value)
    }
}

impl<T: TimeZone> From<DateTime<T>> for DateBound {
    fn from(value: DateTime<T>) -> Self {
        DateBound::Instant(value.fixed_offset())
    }
}

/// A possibly half-bounded query range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateBound>,
    pub end: Option<DateBound>,
    pub kind: IntervalKind,
}

impl DateRange {
    /// Closed range `[start, end]`.
    pub fn new(start: impl Into<DateBound>, end: impl Into<DateBound>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
            kind: IntervalKind::ClosedClosed,
        }
    }

    /// Range with no bounds at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Everything from `start` onwards.
    pub fn from_start(start: impl Into<DateBound>) -> Self {
        Self {
            start: Some(start.into()),
            ..Self::default()
        }
    }

    /// Everything up to `end`.
    pub fn until(end: impl Into<DateBound>) -> Self {
        Self {
            end: Some(end.into()),
            ..Self::default()
        }
    }

    /// Closed range between two `YYYYMMDD` dates.
    pub fn ymd(start: u32, end: u32) -> Result<Self> {
        Ok(Self::new(DateBound::ymd(start)?, DateBound::ymd(end)?))
    }

    pub fn with_kind(mut self, kind: IntervalKind) -> Self {
        self.kind = kind;
        self
    }

    /// Resolve both bounds to UTC milliseconds in `tz`.
    pub fn resolve(&self, tz: &Tz) -> Result<ResolvedRange> {
        let start = self.start.map(|b| b.resolve(tz)).transpose()?;
        let end = self.end.map(|b| b.resolve(tz)).transpose()?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(Error::InvalidRange(format!("start {s} is after end {e}")));
            }
        }
        Ok(ResolvedRange {
            start,
            end,
            kind: self.kind,
        })
    }
}

/// A [`DateRange`] pinned to UTC epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub kind: IntervalKind,
}

impl ResolvedRange {
    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
            kind: IntervalKind::ClosedClosed,
        }
    }

    /// Exact membership test honouring the boundary kind.
    pub fn contains(&self, ts: i64) -> bool {
        let after_start = match self.start {
            None => true,
            Some(s) if self.kind.start_closed() => ts >= s,
            Some(s) => ts > s,
        };
        let before_end = match self.end {
            None => true,
            Some(e) if self.kind.end_closed() => ts <= e,
            Some(e) => ts < e,
        };
        after_start && before_end
    }

    /// Whether an inclusive `[start, end]` span can hold a member.
    ///
    /// This ignores the boundary kind and so over-selects at the edges.
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.start.map_or(true, |s| end >= s) && self.end.map_or(true, |e| start <= e)
    }
}

// src/utils/window.rs

//! Local time window in which a cycle is allowed to run.

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike, Utc};

use crate::error::{AppError, Result};

/// Inclusive `[start, end]` range of local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    offset: FixedOffset,
    start: NaiveTime,
    end: NaiveTime,
}

impl ActiveWindow {
    pub fn new(offset: FixedOffset, start: NaiveTime, end: NaiveTime) -> Self {
        Self { offset, start, end }
    }

    /// Parse `HH:MM` bounds for a zone `utc_offset_hours` east of UTC.
    pub fn parse(utc_offset_hours: i32, start: &str, end: &str) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
            AppError::validation(format!("invalid UTC offset: {utc_offset_hours}h"))
        })?;
        Ok(Self::new(offset, parse_time(start)?, parse_time(end)?))
    }

    /// Whether `now` falls inside the window.
    ///
    /// Bounds have minute resolution, so an end of `19:00` covers the whole
    /// minute. A window whose start is after its end wraps past midnight.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset).time();
        let local = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or(local);
        if self.start <= self.end {
            self.start <= local && local <= self.end
        } else {
            local >= self.start || local <= self.end
        }
    }
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| AppError::validation(format!("invalid time '{s}' (expected HH:MM): {e}")))
}

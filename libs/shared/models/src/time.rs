//! Wall-clock time of day in the clinic's local frame.
//!
//! All scheduling comparisons happen on minutes since midnight. No timezone
//! conversion is ever applied.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid time '{0}', expected HH:MM")]
pub struct TimeParseError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const LAST_MINUTE: TimeOfDay = TimeOfDay(MINUTES_PER_DAY - 1);

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour >= 24 || minute >= 60 {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    /// Minutes since midnight after adding `minutes`, which may exceed a day.
    pub fn minutes_after(self, minutes: u16) -> u32 {
        self.0 as u32 + minutes as u32
    }

    pub fn checked_add_minutes(self, minutes: u16) -> Option<Self> {
        u16::try_from(self.minutes_after(minutes))
            .ok()
            .and_then(Self::from_minutes)
    }

    /// Adds minutes, pinning the result to 23:59 instead of wrapping past midnight.
    pub fn saturating_add_minutes(self, minutes: u16) -> Self {
        self.checked_add_minutes(minutes).unwrap_or(Self::LAST_MINUTE)
    }

    /// Accepts `HH:MM` and the `HH:MM:SS` form Postgres returns for `time` columns.
    pub fn parse(value: &str) -> Result<Self, TimeParseError> {
        let err = || TimeParseError(value.to_string());
        let trimmed = value.trim();
        let mut parts = trimmed.split(':');

        let hour = parts.next().ok_or_else(err)?;
        let minute = parts.next().ok_or_else(err)?;
        let second = parts.next();
        if parts.next().is_some() {
            return Err(err());
        }

        let is_digits = |s: &str| !s.is_empty() && s.len() <= 2 && s.bytes().all(|b| b.is_ascii_digit());
        if !is_digits(hour) || minute.len() != 2 || !is_digits(minute) {
            return Err(err());
        }
        if let Some(sec) = second {
            if !sec.split('.').next().is_some_and(is_digits) {
                return Err(err());
            }
        }

        let hour: u16 = hour.parse().map_err(|_| err())?;
        let minute: u16 = minute.parse().map_err(|_| err())?;
        Self::from_hm(hour, minute).ok_or_else(err)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeOfDay::parse(&raw).map_err(de::Error::custom)
    }
}

use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use regex::Regex;

use shared_models::TimeOfDay;

use crate::models::NormalizeError;

/// Turns spoken dates and times into the booking engine's strict inputs.
pub trait DateTimeNormalizer: Send + Sync {
    /// Resolves `raw` to a calendar date, relative to `today` where needed.
    fn normalize_date(&self, raw: &str, today: NaiveDate) -> Result<NaiveDate, NormalizeError>;

    fn normalize_time(&self, raw: &str) -> Result<TimeOfDay, NormalizeError>;
}

static WEEKDAY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:(next|this)\s+)?([a-z]+)$").ok()
});

static DAY_MONTH: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?:st|nd|rd|th)?\s+(?:of\s+)?([a-z]+)(?:,?\s+(\d{4}))?$").ok()
});

static MONTH_DAY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^([a-z]+)\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?$").ok()
});

static CLOCK_TIME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?:[:.](\d{2}))?\s*(am|pm)?$").ok()
});

/// English-only rules covering what callers typically say.
///
/// Plain and `this` weekdays mean the nearest such day from today, today
/// included. `next` skips today. A month and day without a year that has
/// already passed rolls over to next year.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicNormalizer;

impl HeuristicNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl DateTimeNormalizer for HeuristicNormalizer {
    fn normalize_date(&self, raw: &str, today: NaiveDate) -> Result<NaiveDate, NormalizeError> {
        let unrecognized = || NormalizeError::UnrecognizedDate(raw.to_string());
        let text = clean(raw);
        let text = text.strip_prefix("on ").unwrap_or(&text);

        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Ok(date);
        }

        let relative = match text {
            "today" => Some(0),
            "tomorrow" => Some(1),
            "day after tomorrow" | "the day after tomorrow" => Some(2),
            _ => None,
        };
        if let Some(days) = relative {
            return today.checked_add_days(Days::new(days)).ok_or_else(unrecognized);
        }

        if let Some(caps) = WEEKDAY.as_ref().and_then(|re| re.captures(text)) {
            if let Some(weekday) = parse_weekday(&caps[2]) {
                let skip_today = caps.get(1).is_some_and(|m| m.as_str() == "next");
                return Ok(next_weekday(today, weekday, skip_today));
            }
        }

        let month_first = MONTH_DAY
            .as_ref()
            .and_then(|re| re.captures(text))
            .map(|caps| (caps[1].to_string(), caps[2].to_string(), caps.get(3).map(|m| m.as_str().to_string())));
        let day_first = DAY_MONTH
            .as_ref()
            .and_then(|re| re.captures(text))
            .map(|caps| (caps[2].to_string(), caps[1].to_string(), caps.get(3).map(|m| m.as_str().to_string())));

        if let Some((month, day, year)) = month_first.or(day_first) {
            let month = parse_month(&month).ok_or_else(unrecognized)?;
            let day: u32 = day.parse().map_err(|_| unrecognized())?;

            return match year {
                Some(year) => {
                    let year: i32 = year.parse().map_err(|_| unrecognized())?;
                    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(unrecognized)
                }
                None => {
                    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
                    match this_year {
                        Some(date) if date >= today => Ok(date),
                        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day).ok_or_else(unrecognized),
                    }
                }
            };
        }

        Err(unrecognized())
    }

    fn normalize_time(&self, raw: &str) -> Result<TimeOfDay, NormalizeError> {
        let unrecognized = || NormalizeError::UnrecognizedTime(raw.to_string());
        let text = clean(raw)
            .replace("a.m", "am")
            .replace("p.m", "pm")
            .replace("o'clock", "");
        let text = text.trim();
        let text = text.strip_prefix("at ").unwrap_or(text);

        match text {
            "noon" | "midday" | "12 noon" => return TimeOfDay::from_hm(12, 0).ok_or_else(unrecognized),
            "midnight" => return TimeOfDay::from_hm(0, 0).ok_or_else(unrecognized),
            _ => {}
        }

        if let Ok(time) = TimeOfDay::parse(text) {
            return Ok(time);
        }

        let caps = CLOCK_TIME
            .as_ref()
            .and_then(|re| re.captures(text))
            .ok_or_else(unrecognized)?;

        let hour: u16 = caps[1].parse().map_err(|_| unrecognized())?;
        let minute: u16 = match caps.get(2) {
            Some(m) => m.as_str().parse().map_err(|_| unrecognized())?,
            None => 0,
        };

        let hour = match caps.get(3).map(|m| m.as_str()) {
            Some(meridiem) => {
                if !(1..=12).contains(&hour) {
                    return Err(unrecognized());
                }
                match (meridiem, hour) {
                    ("am", 12) => 0,
                    ("am", h) => h,
                    ("pm", 12) => 12,
                    (_, h) => h + 12,
                }
            }
            // A bare "2" could be morning or afternoon.
            None if caps.get(2).is_none() => return Err(unrecognized()),
            None => hour,
        };

        TimeOfDay::from_hm(hour, minute).ok_or_else(unrecognized)
    }
}

fn clean(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', ',', '!', '?'])
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    let weekday = match name {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

fn parse_month(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];

    MONTHS
        .iter()
        .position(|month| name == *month || (name.len() >= 3 && month.starts_with(name)))
        .map(|index| index as u32 + 1)
}

fn next_weekday(today: NaiveDate, target: Weekday, skip_today: bool) -> NaiveDate {
    let mut days_ahead = (7 + target.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    if days_ahead == 0 && skip_today {
        days_ahead = 7;
    }
    today + Days::new(days_ahead as u64)
}

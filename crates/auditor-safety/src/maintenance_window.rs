//! Maintenance-window evaluation.
//!
//! spec.md §9 Open Question (a): the source derived a three-letter weekday
//! abbreviation from the machine locale, which breaks outside English
//! locales. This implementation never consults locale; weekday names are a
//! fixed English table indexed by `chrono::Weekday::num_days_from_monday`.

use chrono::{NaiveTime, Timelike};

/// Fixed, locale-independent three-letter weekday abbreviations, indexed by
/// `chrono::Weekday::num_days_from_monday()` (Mon = 0 .. Sun = 6).
const WEEKDAY_ABBREVIATIONS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Returns the fixed English three-letter abbreviation for a weekday.
#[must_use]
pub fn weekday_abbreviation(weekday: chrono::Weekday) -> &'static str {
    WEEKDAY_ABBREVIATIONS[weekday.num_days_from_monday() as usize]
}

/// A single day-of-week + time-of-day maintenance window.
///
/// A window whose `start` is later than `end` is interpreted as crossing
/// midnight (e.g. 22:00-02:00), per spec.md §8 boundary cases: it is split
/// into two same-day ranges internally by `contains`.
#[derive(Debug, Clone)]
pub struct MaintenanceWindow {
    /// Days (fixed English three-letter abbreviations) the window applies to.
    pub days: Vec<String>,
    /// Window start time (local, fixed timezone per configuration).
    pub start: NaiveTime,
    /// Window end time.
    pub end: NaiveTime,
}

impl MaintenanceWindow {
    /// Parse a window from a `"Mon-Fri 22:00-02:00"`-style string, or a
    /// single-day form `"Sat 00:00-23:59"`. Returns `None` on malformed
    /// input rather than panicking; callers should treat that as "no
    /// configured window" and surface a config warning.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split_whitespace();
        let day_part = parts.next()?;
        let time_part = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let days = parse_day_range(day_part)?;
        let (start_str, end_str) = time_part.split_once('-')?;
        let start = NaiveTime::parse_from_str(start_str, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end_str, "%H:%M").ok()?;

        Some(Self { days, start, end })
    }

    /// Whether `now` (a local `NaiveTime` plus weekday) falls inside the
    /// window.
    #[must_use]
    pub fn contains(&self, weekday: chrono::Weekday, time: NaiveTime) -> bool {
        let today = weekday_abbreviation(weekday);
        if !self.days.iter().any(|d| d == today) {
            return false;
        }

        if self.start <= self.end {
            time >= self.start && time <= self.end
        } else {
            // Crosses midnight: split into [start, 23:59:59] ∪ [00:00, end].
            time >= self.start || time <= self.end
        }
    }

    /// Convenience: evaluate against a `chrono::DateTime`.
    #[must_use]
    pub fn contains_at<Tz: chrono::TimeZone>(&self, at: chrono::DateTime<Tz>) -> bool {
        let time = NaiveTime::from_hms_opt(at.hour(), at.minute(), at.second())
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("valid midnight"));
        self.contains(at.weekday(), time)
    }
}

fn parse_day_range(part: &str) -> Option<Vec<String>> {
    if let Some((from, to)) = part.split_once('-') {
        let from_idx = WEEKDAY_ABBREVIATIONS.iter().position(|d| *d == from)?;
        let to_idx = WEEKDAY_ABBREVIATIONS.iter().position(|d| *d == to)?;
        let mut days = Vec::new();
        let mut i = from_idx;
        loop {
            days.push(WEEKDAY_ABBREVIATIONS[i].to_string());
            if i == to_idx {
                break;
            }
            i = (i + 1) % 7;
        }
        Some(days)
    } else {
        part.split(',')
            .map(|d| {
                WEEKDAY_ABBREVIATIONS
                    .iter()
                    .find(|w| **w == d)
                    .map(|w| (*w).to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn same_day_window() {
        let w = MaintenanceWindow::parse("Sat 00:00-23:59").unwrap();
        assert!(w.contains(Weekday::Sat, NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!w.contains(Weekday::Sun, NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn midnight_crossing_window_splits_into_two_ranges() {
        let w = MaintenanceWindow::parse("Mon-Fri 22:00-02:00").unwrap();
        assert!(w.contains(Weekday::Tue, NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(w.contains(Weekday::Wed, NaiveTime::from_hms_opt(1, 30, 0).unwrap()));
        assert!(!w.contains(Weekday::Wed, NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn day_range_expands_across_week_boundary() {
        let w = MaintenanceWindow::parse("Fri-Mon 00:00-23:59").unwrap();
        assert_eq!(w.days, vec!["Fri", "Sat", "Sun", "Mon"]);
    }

    #[test]
    fn fixed_weekday_table_is_english_regardless_of_locale() {
        assert_eq!(weekday_abbreviation(Weekday::Mon), "Mon");
        assert_eq!(weekday_abbreviation(Weekday::Sun), "Sun");
    }
}

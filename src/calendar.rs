//! Month grid of journal entries keyed by `log_date`.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::log_entry::LogEntry;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    /// 1-based.
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                month: self.month - 1,
                ..self
            }
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                month: self.month + 1,
                ..self
            }
        }
    }

    fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    fn days_in_month(self) -> Option<u32> {
        let next = self.next().first_day()?;
        let first = self.first_day()?;
        Some((next - first).num_days() as u32)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub entry_count: usize,
    pub max_severity: Option<i32>,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    /// Empty cells before the 1st in a Sunday-first week.
    pub leading_blanks: u32,
    pub days: Vec<CalendarDay>,
    pub previous: YearMonth,
    pub next: YearMonth,
}

/// Groups `logs` by `log_date` into the days of `ym`. Entries outside the
/// month are ignored; each day keeps the input order.
pub fn month_grid(ym: YearMonth, logs: &[LogEntry]) -> Option<MonthGrid> {
    let first = ym.first_day()?;
    let num_days = ym.days_in_month()?;

    let days = (1..=num_days)
        .filter_map(|day| NaiveDate::from_ymd_opt(ym.year, ym.month, day))
        .map(|date| {
            let entries: Vec<LogEntry> = logs
                .iter()
                .filter(|log| log.log_date == date)
                .cloned()
                .collect();
            CalendarDay {
                date,
                entry_count: entries.len(),
                max_severity: entries.iter().map(|e| e.severity).max(),
                entries,
            }
        })
        .collect();

    Some(MonthGrid {
        year: ym.year,
        month: ym.month,
        month_name: MONTH_NAMES[(ym.month - 1) as usize],
        leading_blanks: first.weekday().num_days_from_sunday(),
        days,
        previous: ym.previous(),
        next: ym.next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn log_on(date: NaiveDate, severity: i32) -> LogEntry {
        let now = Utc::now();
        LogEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            log_date: date,
            title: "Headache".into(),
            description: "Dull".into(),
            severity,
            image_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_leading_blanks_and_length() {
        // 1 February 2026 is a Sunday.
        let feb = month_grid(ym(2026, 2), &[]).unwrap();
        assert_eq!(feb.leading_blanks, 0);
        assert_eq!(feb.days.len(), 28);
        assert_eq!(feb.month_name, "February");

        // 1 October 2026 is a Thursday.
        let oct = month_grid(ym(2026, 10), &[]).unwrap();
        assert_eq!(oct.leading_blanks, 4);
        assert_eq!(oct.days.len(), 31);

        assert_eq!(month_grid(ym(2028, 2), &[]).unwrap().days.len(), 29);
    }

    #[test]
    fn test_entries_grouped_by_log_date() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        let logs = vec![
            log_on(d(4), 3),
            log_on(d(4), 8),
            log_on(d(20), 2),
            log_on(NaiveDate::from_ymd_opt(2026, 4, 4).unwrap(), 9),
        ];

        let grid = month_grid(ym(2026, 3), &logs).unwrap();
        let fourth = &grid.days[3];
        assert_eq!(fourth.date, d(4));
        assert_eq!(fourth.entry_count, 2);
        assert_eq!(fourth.max_severity, Some(8));
        assert_eq!(grid.days[19].entry_count, 1);
        assert_eq!(grid.days[0].max_severity, None);
        let total: usize = grid.days.iter().map(|d| d.entry_count).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_navigation_wraps_year() {
        assert_eq!(ym(2026, 1).previous(), ym(2025, 12));
        assert_eq!(ym(2026, 12).next(), ym(2027, 1));
        assert_eq!(ym(2026, 6).next(), ym(2026, 7));
        assert!(YearMonth::new(2026, 13).is_none());
        assert!(YearMonth::new(2026, 0).is_none());
    }
}

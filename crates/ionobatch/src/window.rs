use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use ionogram_core::SlotName;
use itertools::iproduct;
use tracing::{debug, warn};

use crate::config::BatchConfig;

/// Cadence of source records within a minute.
pub const SOURCE_INTERVAL_SECONDS: u32 = 15;
const HOURS: u32 = 24;
const MINUTES: u32 = 60;

/// One accumulation window: `[start_minute, end_minute)` of an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowJob {
    pub date: NaiveDate,
    pub hour: u32,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl WindowJob {
    /// The averaged record is named after the window start.
    pub fn output_name(&self, start_second: u32) -> SlotName {
        SlotName::new(
            self.date.month(),
            self.date.day(),
            self.hour,
            self.start_minute,
            start_second,
        )
    }

    pub fn source_slots(&self, start_second: u32) -> impl Iterator<Item = SlotName> {
        slots(self.date, self.hour, self.start_minute..self.end_minute, start_second)
    }
}

impl fmt::Display for WindowJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02} - {:02}:{:02}",
            self.date.format("%d.%m.%Y"),
            self.hour,
            self.start_minute,
            self.hour,
            self.end_minute.min(MINUTES - 1)
        )
    }
}

pub fn enumerate_windows(config: &BatchConfig) -> Vec<WindowJob> {
    let step = config.window_minutes.max(1);
    iproduct!(config.days(), 0..HOURS, (0..MINUTES).step_by(step as usize))
        .map(|(date, hour, start_minute)| WindowJob {
            date,
            hour,
            start_minute,
            end_minute: (start_minute + step).min(MINUTES),
        })
        .collect()
}

/// Every expected source slot of a day, minute by minute.
pub fn day_slots(date: NaiveDate, start_second: u32) -> impl Iterator<Item = SlotName> {
    (0..HOURS).flat_map(move |hour| slots(date, hour, 0..MINUTES, start_second))
}

fn slots(
    date: NaiveDate,
    hour: u32,
    minutes: std::ops::Range<u32>,
    start_second: u32,
) -> impl Iterator<Item = SlotName> {
    let (month, day) = (date.month(), date.day());
    minutes.flat_map(move |minute| {
        (start_second..MINUTES)
            .step_by(SOURCE_INTERVAL_SECONDS as usize)
            .map(move |second| SlotName::new(month, day, hour, minute, second))
    })
}

/// Seconds field of the first slot-named file in `dir`, or 0.
pub fn discover_start_second(dir: &Path) -> Result<u32> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "input directory not found; start second defaults to 0");
        return Ok(0);
    }
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut first: Option<String> = None;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if SlotName::parse(&name).is_some() && first.as_ref().map_or(true, |f| name < *f) {
            first = Some(name);
        }
    }
    let second = first
        .as_deref()
        .and_then(SlotName::parse)
        .map_or(0, |slot| slot.second);
    debug!(dir = %dir.display(), file = ?first, second, "discovered start second");
    Ok(second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathTemplate;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(from: NaiveDate, to: NaiveDate, window_minutes: u32) -> BatchConfig {
        BatchConfig {
            date_from: from,
            date_to: to,
            input_dir: PathTemplate::new("in"),
            output_dir: PathTemplate::new("out"),
            window_minutes,
            start_second: None,
            workers: None,
            check_resolution: false,
            overwrite: false,
        }
    }

    #[test]
    fn one_day_of_five_minute_windows() {
        let jobs = enumerate_windows(&config(date(2020, 1, 1), date(2020, 1, 1), 5));
        assert_eq!(jobs.len(), 288);
        assert_eq!(
            jobs[0],
            WindowJob {
                date: date(2020, 1, 1),
                hour: 0,
                start_minute: 0,
                end_minute: 5
            }
        );
        let last = jobs[287];
        assert_eq!((last.hour, last.start_minute, last.end_minute), (23, 55, 60));
    }

    #[test]
    fn uneven_window_is_clamped_to_the_hour() {
        let jobs = enumerate_windows(&config(date(2020, 1, 1), date(2020, 1, 1), 7));
        assert_eq!(jobs.len(), 24 * 9);
        let tail = jobs.iter().find(|j| j.start_minute == 56).unwrap();
        assert_eq!(tail.end_minute, 60);
    }

    #[test]
    fn range_spans_month_boundary() {
        let jobs = enumerate_windows(&config(date(2020, 1, 31), date(2020, 2, 1), 60));
        assert_eq!(jobs.len(), 48);
        assert_eq!(jobs[24].date, date(2020, 2, 1));
    }

    #[test]
    fn source_slots_follow_start_second() {
        let job = WindowJob {
            date: date(2020, 3, 7),
            hour: 4,
            start_minute: 10,
            end_minute: 12,
        };
        let names: Vec<_> = job.source_slots(3).map(|s| s.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "03_07_04_10_03.dat",
                "03_07_04_10_18.dat",
                "03_07_04_10_33.dat",
                "03_07_04_10_48.dat",
                "03_07_04_11_03.dat",
                "03_07_04_11_18.dat",
                "03_07_04_11_33.dat",
                "03_07_04_11_48.dat",
            ]
        );
        assert_eq!(job.output_name(3).file_name(), "03_07_04_10_03.dat");
        assert_eq!(job.to_string(), "07.03.2020 04:10 - 04:12");
    }

    #[test]
    fn day_slots_cover_every_minute() {
        assert_eq!(day_slots(date(2020, 1, 1), 0).count(), 24 * 60 * 4);
        assert_eq!(day_slots(date(2020, 1, 1), 50).count(), 24 * 60);
    }

    #[test]
    fn start_second_comes_from_first_matching_file() {
        let dir = tempdir().unwrap();
        for name in ["readme.txt", "01_01_00_05_03.dat", "01_01_00_00_07.dat"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(discover_start_second(dir.path()).unwrap(), 7);
    }

    #[test]
    fn start_second_defaults_to_zero() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        assert_eq!(discover_start_second(dir.path()).unwrap(), 0);
        assert_eq!(
            discover_start_second(&dir.path().join("missing")).unwrap(),
            0
        );
    }
}

//! Time-of-day charge current schedule.
//!
//! Pure lookup: the local time selects at most one window, and its amp pair
//! becomes the baseline for this cycle. Anything unmatched gets the default
//! pair.

use crate::config::{ScheduleConfig, ScheduleWindow};
use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

/// Charge currents requested by the schedule before any boost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeBaseline {
    pub max_charge_amps: u16,
    pub grid_charge_amps: u16,
    /// Index of the window that matched, if any
    pub window: Option<usize>,
}

/// Convert a wall-clock instant to local time in `tz`
pub fn local_time(at: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    at.with_timezone(&tz).naive_local()
}

/// Baseline charge currents at local time `now`
pub fn baseline(cfg: &ScheduleConfig, now: NaiveDateTime) -> ChargeBaseline {
    let default = ChargeBaseline {
        max_charge_amps: cfg.default_max_charge_amps,
        grid_charge_amps: cfg.default_grid_charge_amps,
        window: None,
    };
    if !cfg.enabled {
        return default;
    }

    let weekday = weekday_index(&now);
    let time = now.time();
    cfg.windows
        .iter()
        .position(|w| window_active(w, weekday, time))
        .map_or(default, |i| ChargeBaseline {
            max_charge_amps: cfg.windows[i].max_charge_amps,
            grid_charge_amps: cfg.windows[i].grid_charge_amps,
            window: Some(i),
        })
}

fn weekday_index(now: &NaiveDateTime) -> u8 {
    // 0..=6 always fits
    now.weekday().num_days_from_monday() as u8
}

fn starts_on(window: &ScheduleWindow, weekday: u8) -> bool {
    window.days.is_empty() || window.days.contains(&weekday)
}

/// Whether `window` covers `time` on `weekday` (0 = Monday)
///
/// Windows are half-open. One that ends before it starts runs past midnight,
/// and the part after midnight belongs to the previous day's allowance.
pub fn window_active(window: &ScheduleWindow, weekday: u8, time: NaiveTime) -> bool {
    if window.start == window.end {
        return false;
    }
    if window.start < window.end {
        return starts_on(window, weekday) && time >= window.start && time < window.end;
    }
    let yesterday = (weekday + 6) % 7;
    (starts_on(window, weekday) && time >= window.start)
        || (starts_on(window, yesterday) && time < window.end)
}

/// First pair of windows active at the same minute of the week
pub fn find_overlap(windows: &[ScheduleWindow]) -> Option<(usize, usize)> {
    if windows.len() < 2 {
        return None;
    }
    for weekday in 0..7u8 {
        for minute in 0..24 * 60u32 {
            let Some(time) = NaiveTime::from_num_seconds_from_midnight_opt(minute * 60, 0) else {
                continue;
            };
            let mut active = windows
                .iter()
                .enumerate()
                .filter(|(_, w)| window_active(w, weekday, time))
                .map(|(i, _)| i);
            if let (Some(a), Some(b)) = (active.next(), active.next()) {
                return Some((a, b));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(start: NaiveTime, end: NaiveTime, days: Vec<u8>, amps: u16) -> ScheduleWindow {
        ScheduleWindow {
            name: String::new(),
            start,
            end,
            days,
            max_charge_amps: amps,
            grid_charge_amps: amps / 2,
        }
    }

    fn cfg(windows: Vec<ScheduleWindow>) -> ScheduleConfig {
        ScheduleConfig {
            enabled: true,
            default_max_charge_amps: 50,
            default_grid_charge_amps: 0,
            windows,
        }
    }

    // 2024-01-01 is a Monday
    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_time(hm(h, m))
    }

    #[test]
    fn default_pair_outside_windows() {
        let c = cfg(vec![window(hm(1, 0), hm(5, 0), vec![], 120)]);
        let b = baseline(&c, at(1, 12, 0));
        assert_eq!(b.max_charge_amps, 50);
        assert_eq!(b.grid_charge_amps, 0);
        assert_eq!(b.window, None);
    }

    #[test]
    fn window_is_half_open() {
        let c = cfg(vec![window(hm(1, 0), hm(5, 0), vec![], 120)]);
        assert_eq!(baseline(&c, at(1, 1, 0)).window, Some(0));
        assert_eq!(baseline(&c, at(1, 4, 59)).max_charge_amps, 120);
        assert_eq!(baseline(&c, at(1, 5, 0)).window, None);
    }

    #[test]
    fn disabled_schedule_ignores_windows() {
        let mut c = cfg(vec![window(hm(0, 0), hm(23, 59), vec![], 120)]);
        c.enabled = false;
        assert_eq!(baseline(&c, at(1, 12, 0)).max_charge_amps, 50);
    }

    #[test]
    fn overnight_window_uses_start_day() {
        // Friday 22:00 to 06:00
        let c = cfg(vec![window(hm(22, 0), hm(6, 0), vec![4], 90)]);
        assert_eq!(baseline(&c, at(5, 23, 0)).window, Some(0)); // Friday night
        assert_eq!(baseline(&c, at(6, 5, 0)).window, Some(0)); // Saturday early
        assert_eq!(baseline(&c, at(6, 23, 0)).window, None); // Saturday night
        assert_eq!(baseline(&c, at(5, 5, 0)).window, None); // Friday early
    }

    #[test]
    fn empty_window_never_matches() {
        let w = window(hm(8, 0), hm(8, 0), vec![], 10);
        assert!(!window_active(&w, 0, hm(8, 0)));
    }

    #[test]
    fn detects_overlap() {
        let a = window(hm(22, 0), hm(2, 0), vec![], 10);
        let b = window(hm(1, 0), hm(3, 0), vec![], 10);
        let c = window(hm(3, 0), hm(4, 0), vec![], 10);
        assert_eq!(find_overlap(&[a.clone(), c.clone()]), None);
        assert_eq!(find_overlap(&[a, b.clone()]), Some((0, 1)));
        assert_eq!(find_overlap(&[b, c]), None);
    }

    #[test]
    fn disjoint_days_do_not_overlap() {
        let a = window(hm(8, 0), hm(12, 0), vec![0, 1], 10);
        let b = window(hm(9, 0), hm(10, 0), vec![5, 6], 10);
        assert_eq!(find_overlap(&[a, b]), None);
    }

    #[test]
    fn local_time_applies_timezone() {
        let utc = DateTime::parse_from_rfc3339("2024-07-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let local = local_time(utc, chrono_tz::Europe::Bucharest);
        assert_eq!(local.time(), hm(13, 0));
    }
}

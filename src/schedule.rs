use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDateTime, NaiveTime};

pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("Invalid schedule time '{}', expected HH:MM", s))
}

/// Next occurrence of `at` strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// How long to sleep from the local wall clock until the next `at`.
pub fn until_next(at: NaiveTime) -> (NaiveDateTime, std::time::Duration) {
    let now = Local::now().naive_local();
    let next = next_run_after(now, at);
    let wait = (next - now).to_std().unwrap_or_default();
    (next, wait)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn later_today_or_tomorrow() {
        let eight = parse_time("08:00").unwrap();
        assert_eq!(next_run_after(at("2026-01-20 06:30"), eight), at("2026-01-20 08:00"));
        assert_eq!(next_run_after(at("2026-01-20 08:00"), eight), at("2026-01-21 08:00"));
        assert_eq!(next_run_after(at("2026-01-31 21:15"), eight), at("2026-02-01 08:00"));
    }

    #[test]
    fn rejects_bad_times() {
        assert!(parse_time("8am").is_err());
        assert!(parse_time("25:00").is_err());
        assert_eq!(parse_time(" 07:05 ").unwrap(), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
    }
}

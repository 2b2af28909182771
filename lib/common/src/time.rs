//! Sentinel-aware time handling.
//!
//! Wire fields use sentinel integers rather than `Option`: `0` means
//! "unknown", `INFINITE`/`INFINITE64` mean "unlimited", `NO_VAL`/`NO_VAL64`
//! mean "not specified". These survive encode/decode unchanged and must
//! never be treated as finite by formatting routines (§8 property 7).

use chrono::{DateTime, Datelike, Local, TimeZone};
use std::time::SystemTime;

pub const INFINITE: u32 = u32::MAX;
pub const INFINITE64: u64 = u64::MAX;
pub const NO_VAL: u32 = u32::MAX;
pub const NO_VAL16: u16 = u16::MAX;
pub const NO_VAL64: u64 = u64::MAX;

/// High bit of `pn_min_memory`: set means "per CPU", clear means "per node".
pub const MEM_PER_CPU_FLAG: u64 = 1 << 63;
/// High bit of `core_spec`: set means "threads" rather than cores.
pub const CORE_SPEC_THREADS_FLAG: u16 = 1 << 15;

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01).
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs()
}

#[inline]
pub fn is_sentinel_secs(value: u32) -> bool {
    value == 0 || value == NO_VAL || value == INFINITE
}

#[inline]
pub fn is_sentinel64(value: u64) -> bool {
    value == 0 || value == NO_VAL64 || value == INFINITE64
}

/// Output style selected by `SLURM_TIME_FORMAT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeFormat {
    Standard,
    Relative,
    Pattern(String),
}

impl TimeFormat {
    pub fn from_env_value(value: &str) -> TimeFormat {
        match value {
            "standard" => TimeFormat::Standard,
            "relative" => TimeFormat::Relative,
            pattern => TimeFormat::Pattern(pattern.to_string()),
        }
    }

    pub fn from_env() -> TimeFormat {
        match std::env::var("SLURM_TIME_FORMAT") {
            Ok(value) => TimeFormat::from_env_value(&value),
            Err(_) => TimeFormat::Standard,
        }
    }
}

/// Formats a unix timestamp for human display, honoring sentinel values and
/// the three `SLURM_TIME_FORMAT` styles. `today` is passed in rather than
/// read from a static so the "relative" style stays a pure function of its
/// inputs.
pub fn format_time(epoch_secs: u32, format: &TimeFormat, today: DateTime<Local>) -> String {
    if epoch_secs == 0 {
        return "Unknown".to_string();
    }
    if epoch_secs == NO_VAL || epoch_secs == INFINITE {
        return "Unlimited".to_string();
    }

    let when = match Local.timestamp_opt(epoch_secs as i64, 0).single() {
        Some(when) => when,
        None => return "Invalid".to_string(),
    };

    match format {
        TimeFormat::Standard => when.format("%FT%T").to_string(),
        TimeFormat::Pattern(pattern) => when.format(pattern).to_string(),
        TimeFormat::Relative => format_relative(when, today),
    }
}

fn format_relative(when: DateTime<Local>, today: DateTime<Local>) -> String {
    let day_delta = when.date_naive().num_days_from_ce() - today.date_naive().num_days_from_ce();

    match day_delta {
        0 => when.format("%T").to_string(),
        1 => format!("Tomorr {}", when.format("%R")),
        -1 => format!("Ystday {}", when.format("%R")),
        _ if when.year() == today.year() => when.format("%d %b %R").to_string(),
        _ => when.format("%d %b %Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn sentinel_secs_are_detected() {
        assert!(is_sentinel_secs(0));
        assert!(is_sentinel_secs(NO_VAL));
        assert!(is_sentinel_secs(INFINITE));
        assert!(!is_sentinel_secs(12345));
    }

    #[test]
    fn relative_today_is_time_only() {
        let today = at(2026, 7, 28, 9, 0);
        let when = at(2026, 7, 28, 14, 22);
        assert_eq!(format_relative(when, today), "14:22:00");
    }

    #[test]
    fn relative_tomorrow() {
        let today = at(2026, 7, 28, 9, 0);
        let when = at(2026, 7, 29, 14, 22);
        assert_eq!(format_relative(when, today), "Tomorr 14:22");
    }

    #[test]
    fn relative_yesterday() {
        let today = at(2026, 7, 28, 9, 0);
        let when = at(2026, 7, 27, 9, 1);
        assert_eq!(format_relative(when, today), "Ystday 09:01");
    }

    #[test]
    fn relative_within_year() {
        let today = at(2026, 7, 28, 9, 0);
        let when = at(2026, 6, 18, 13, 14);
        assert_eq!(format_relative(when, today), "18 Jun 13:14");
    }

    #[test]
    fn standard_format_ignores_sentinels() {
        let fmt = TimeFormat::Standard;
        assert_eq!(format_time(0, &fmt, at(2026, 7, 28, 0, 0)), "Unknown");
        assert_eq!(format_time(INFINITE, &fmt, at(2026, 7, 28, 0, 0)), "Unlimited");
    }
}

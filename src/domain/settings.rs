//! Screen configuration validation.
//!
//! Reads the `[screen]` section through a [`ConfigPort`] and validates every
//! field into an immutable [`ScreenSettings`].

use crate::domain::compiler::OperatorPolicy;
use crate::domain::error::ScreenerError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveTime;

const SECTION: &str = "screen";

/// Upper bound for the daily trading-date window.
pub const MAX_DAILY_WINDOW: i64 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSettings {
    /// Trading dates kept in a daily window (offsets 0..daily_window).
    pub daily_window: usize,
    /// Intraday close-of-session marker, `HH:MM:SS`.
    pub hourly_cutoff: NaiveTime,
    pub hourly_lookback: usize,
    /// Candidate week-end dates fetched before de-duplication.
    pub weekly_lookback: usize,
    pub weekly_count: usize,
    pub weekly_min_gap_days: i64,
    pub operator_policy: OperatorPolicy,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            daily_window: 6,
            hourly_cutoff: NaiveTime::from_hms_opt(14, 0, 0).unwrap_or_default(),
            hourly_lookback: 24,
            weekly_lookback: 20,
            weekly_count: 4,
            weekly_min_gap_days: 6,
            operator_policy: OperatorPolicy::Strict,
        }
    }
}

impl ScreenSettings {
    pub fn hourly_cutoff_text(&self) -> String {
        self.hourly_cutoff.format("%H:%M:%S").to_string()
    }
}

pub fn load_screen_settings(config: &dyn ConfigPort) -> Result<ScreenSettings, ScreenerError> {
    let defaults = ScreenSettings::default();
    let daily_window = bounded(config, "daily_window", defaults.daily_window, MAX_DAILY_WINDOW)?;
    let hourly_cutoff = parse_cutoff(config, defaults.hourly_cutoff)?;
    let hourly_lookback = positive(config, "hourly_lookback", defaults.hourly_lookback)?;
    let weekly_lookback = positive(config, "weekly_lookback", defaults.weekly_lookback)?;
    let weekly_count = positive(config, "weekly_count", defaults.weekly_count)?;
    let weekly_min_gap_days =
        positive(config, "weekly_min_gap_days", defaults.weekly_min_gap_days as usize)? as i64;
    if weekly_count > weekly_lookback {
        return Err(invalid(
            "weekly_count",
            "weekly_count must not exceed weekly_lookback",
        ));
    }
    let operator_policy = if config.get_bool(SECTION, "operator_fallback", false) {
        OperatorPolicy::FallbackToEq
    } else {
        OperatorPolicy::Strict
    };
    Ok(ScreenSettings {
        daily_window,
        hourly_cutoff,
        hourly_lookback,
        weekly_lookback,
        weekly_count,
        weekly_min_gap_days,
        operator_policy,
    })
}

fn positive(config: &dyn ConfigPort, key: &str, default: usize) -> Result<usize, ScreenerError> {
    let value = config.get_int(SECTION, key, default as i64);
    if value < 1 {
        return Err(invalid(key, &format!("{key} must be at least 1")));
    }
    Ok(value as usize)
}

fn bounded(
    config: &dyn ConfigPort,
    key: &str,
    default: usize,
    max: i64,
) -> Result<usize, ScreenerError> {
    let value = config.get_int(SECTION, key, default as i64);
    if !(1..=max).contains(&value) {
        return Err(invalid(key, &format!("{key} must be between 1 and {max}")));
    }
    Ok(value as usize)
}

fn parse_cutoff(config: &dyn ConfigPort, default: NaiveTime) -> Result<NaiveTime, ScreenerError> {
    match config.get_string(SECTION, "hourly_cutoff") {
        None => Ok(default),
        Some(text) => NaiveTime::parse_from_str(text.trim(), "%H:%M:%S")
            .map_err(|_| invalid("hourly_cutoff", "hourly_cutoff must be HH:MM:SS")),
    }
}

fn invalid(key: &str, reason: &str) -> ScreenerError {
    ScreenerError::ConfigInvalid {
        section: SECTION.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(result: Result<ScreenSettings, ScreenerError>) -> String {
        match result {
            Err(ScreenerError::ConfigInvalid { key, .. }) => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn empty_section_uses_defaults() {
        let settings = load_screen_settings(&make_config("[sqlite]\npath = x.db\n")).unwrap();
        assert_eq!(settings, ScreenSettings::default());
        assert_eq!(settings.hourly_cutoff_text(), "14:00:00");
    }

    #[test]
    fn reads_all_fields() {
        let settings = load_screen_settings(&make_config(
            r#"
[screen]
daily_window = 10
hourly_cutoff = 13:30:00
hourly_lookback = 12
weekly_lookback = 30
weekly_count = 5
weekly_min_gap_days = 5
operator_fallback = true
"#,
        ))
        .unwrap();
        assert_eq!(settings.daily_window, 10);
        assert_eq!(settings.hourly_cutoff_text(), "13:30:00");
        assert_eq!(settings.hourly_lookback, 12);
        assert_eq!(settings.weekly_lookback, 30);
        assert_eq!(settings.weekly_count, 5);
        assert_eq!(settings.weekly_min_gap_days, 5);
        assert_eq!(settings.operator_policy, OperatorPolicy::FallbackToEq);
    }

    #[test]
    fn daily_window_out_of_range_fails() {
        let result = load_screen_settings(&make_config("[screen]\ndaily_window = 65\n"));
        assert_eq!(invalid_key(result), "daily_window");
        let result = load_screen_settings(&make_config("[screen]\ndaily_window = 0\n"));
        assert_eq!(invalid_key(result), "daily_window");
    }

    #[test]
    fn bad_cutoff_fails() {
        let result = load_screen_settings(&make_config("[screen]\nhourly_cutoff = 2pm\n"));
        assert_eq!(invalid_key(result), "hourly_cutoff");
    }

    #[test]
    fn weekly_count_above_lookback_fails() {
        let result = load_screen_settings(&make_config(
            "[screen]\nweekly_lookback = 3\nweekly_count = 4\n",
        ));
        assert_eq!(invalid_key(result), "weekly_count");
    }

    #[test]
    fn zero_gap_fails() {
        let result = load_screen_settings(&make_config("[screen]\nweekly_min_gap_days = 0\n"));
        assert_eq!(invalid_key(result), "weekly_min_gap_days");
    }
}

//! Per-timeframe date windows.
//!
//! A [`DateWindow`] maps an offset to a concrete date (daily, weekly) or
//! timestamp (hourly), most recent first. Each timeframe has its own
//! calendar:
//!
//! - daily offsets index straight into the ordered trading-date feed;
//! - hourly offsets index the most recent distinct timestamps at or before the
//!   session cutoff on the anchor date;
//! - weekly offsets index one representative date per week, picked greedily
//!   from recent weekly rows so that kept dates are at least
//!   `weekly_min_gap_days` apart.
//!
//! A resolver may return fewer dates than requested; callers must tolerate a
//! short window.

use crate::domain::error::ScreenerError;
use crate::domain::query::quote_literal;
use crate::domain::settings::ScreenSettings;
use crate::domain::timeframe::{TableKind, Timeframe};
use crate::domain::value::text_column;
use crate::ports::query_port::QueryPort;
use chrono::NaiveDate;
use log::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    timeframe: Timeframe,
    dates: Vec<String>,
}

impl DateWindow {
    /// Builds a window; dates are ordered most recent first and de-duplicated.
    pub fn new(timeframe: Timeframe, mut dates: Vec<String>) -> Self {
        dates.sort_by(|a, b| b.cmp(a));
        dates.dedup();
        Self { timeframe, dates }
    }

    pub fn empty(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            dates: Vec::new(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn date_at(&self, offset: usize) -> Option<&str> {
        self.dates.get(offset).map(String::as_str)
    }

    pub fn anchor(&self) -> Option<&str> {
        self.date_at(0)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }
}

/// Daily window: up to `size` trading dates at or before `anchor`.
///
/// `trading_dates` must be ordered most recent first.
pub fn daily_window(trading_dates: &[String], anchor: &str, size: usize) -> DateWindow {
    let dates = trading_dates
        .iter()
        .skip_while(|date| date.as_str() > anchor)
        .take(size)
        .cloned()
        .collect();
    DateWindow::new(Timeframe::Daily, dates)
}

/// Greedy weekly de-duplication over candidate dates, most recent first.
///
/// Keeps the first date, then each next date lying at least `min_gap_days`
/// before the last kept one, until `count` dates are kept. Unparseable dates
/// are skipped.
pub fn select_week_representatives(
    candidates: &[String],
    min_gap_days: i64,
    count: usize,
) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(count);
    let mut last: Option<NaiveDate> = None;
    for candidate in candidates {
        if kept.len() >= count {
            break;
        }
        let Ok(date) = NaiveDate::parse_from_str(candidate.trim(), "%Y-%m-%d") else {
            warn!("skipping unparseable weekly date '{candidate}'");
            continue;
        };
        let far_enough = match last {
            None => true,
            Some(prev) => (prev - date).num_days() >= min_gap_days,
        };
        if far_enough {
            kept.push(candidate.clone());
            last = Some(date);
        }
    }
    kept
}

pub struct DateWindowResolver<'a, P: QueryPort> {
    port: &'a P,
    settings: &'a ScreenSettings,
    trading_dates: &'a [String],
}

impl<'a, P: QueryPort> DateWindowResolver<'a, P> {
    pub fn new(port: &'a P, settings: &'a ScreenSettings, trading_dates: &'a [String]) -> Self {
        Self {
            port,
            settings,
            trading_dates,
        }
    }

    pub async fn resolve(
        &self,
        timeframe: Timeframe,
        anchor: &str,
    ) -> Result<DateWindow, ScreenerError> {
        let window = match timeframe {
            Timeframe::Daily => daily_window(self.trading_dates, anchor, self.settings.daily_window),
            Timeframe::Hourly => self.hourly(anchor).await?,
            Timeframe::Weekly => self.weekly(anchor).await?,
        };
        if window.is_empty() {
            warn!("{timeframe} date window for {anchor} is empty");
        } else {
            debug!("{timeframe} window for {anchor}: {:?}", window.dates());
        }
        Ok(window)
    }

    async fn hourly(&self, anchor: &str) -> Result<DateWindow, ScreenerError> {
        let cutoff = format!("{} {}", anchor, self.settings.hourly_cutoff_text());
        let sql = format!(
            "SELECT DISTINCT ts FROM {} WHERE ts <= {} ORDER BY ts DESC LIMIT {}",
            Timeframe::Hourly.table(TableKind::Raw),
            quote_literal(&cutoff),
            self.settings.hourly_lookback
        );
        let rows = self.port.execute(&sql).await?;
        let dates = rows.iter().filter_map(|row| text_column(row, "ts")).collect();
        Ok(DateWindow::new(Timeframe::Hourly, dates))
    }

    async fn weekly(&self, anchor: &str) -> Result<DateWindow, ScreenerError> {
        let sql = format!(
            "SELECT DISTINCT t FROM {} WHERE t <= {} ORDER BY t DESC LIMIT {}",
            Timeframe::Weekly.table(TableKind::Raw),
            quote_literal(anchor),
            self.settings.weekly_lookback
        );
        let rows = self.port.execute(&sql).await?;
        let candidates: Vec<String> = rows.iter().filter_map(|row| text_column(row, "t")).collect();
        let kept = select_week_representatives(
            &candidates,
            self.settings.weekly_min_gap_days,
            self.settings.weekly_count,
        );
        Ok(DateWindow::new(Timeframe::Weekly, kept))
    }
}

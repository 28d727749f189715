//! Per-date backtest memoization.
//!
//! A simulation asks "does stock X qualify for side S on date D?" once per
//! stock per date. The memoizer answers from a single live [`MemoEntry`]:
//! the date's raw rows are fetched once, each side's qualifying set is
//! computed at most once for that date, and the hourly/weekly windows are
//! resolved once and shared by both sides. Moving to a later date replaces the
//! entry; asking for an earlier one is a driver bug and fails loudly.
//!
//! The slot is a `tokio::sync::Mutex` held across the fetches, so concurrent
//! callers for the same date wait for the in-flight work instead of
//! repeating it.

use crate::domain::catalog::Catalogs;
use crate::domain::error::ScreenerError;
use crate::domain::planner::ENTITY_COLUMN;
use crate::domain::prompt::RuleConditions;
use crate::domain::query::quote_literal;
use crate::domain::rule_query::{ResolvedWindows, RuleQueryBuilder};
use crate::domain::settings::ScreenSettings;
use crate::domain::timeframe::{TableKind, Timeframe};
use crate::domain::value::{Row, text_column};
use crate::ports::query_port::QueryPort;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// A positive answer: the entity's raw row on the evaluated date.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub stock_id: String,
    pub date: String,
    pub row: Row,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    pub raw_fetches: usize,
    pub buy_computations: usize,
    pub sell_computations: usize,
}

#[derive(Debug)]
struct MemoEntry {
    date: String,
    raw_rows_by_stock_id: HashMap<String, Row>,
    windows: ResolvedWindows,
    buy_ids: Option<HashSet<String>>,
    sell_ids: Option<HashSet<String>>,
}

impl MemoEntry {
    fn ids(&self, side: Side) -> Option<&HashSet<String>> {
        match side {
            Side::Buy => self.buy_ids.as_ref(),
            Side::Sell => self.sell_ids.as_ref(),
        }
    }

    fn ids_mut(&mut self, side: Side) -> &mut Option<HashSet<String>> {
        match side {
            Side::Buy => &mut self.buy_ids,
            Side::Sell => &mut self.sell_ids,
        }
    }
}

pub struct BacktestMemoizer<'a, P: QueryPort> {
    port: &'a P,
    catalogs: &'a Catalogs,
    settings: &'a ScreenSettings,
    /// Known trading dates, most recent first.
    trading_dates: Vec<String>,
    trading_date_set: HashSet<String>,
    buy_rule: RuleConditions,
    sell_rule: RuleConditions,
    slot: Mutex<Option<MemoEntry>>,
    raw_fetches: AtomicUsize,
    buy_computations: AtomicUsize,
    sell_computations: AtomicUsize,
}

impl<'a, P: QueryPort> BacktestMemoizer<'a, P> {
    pub fn new(
        port: &'a P,
        catalogs: &'a Catalogs,
        settings: &'a ScreenSettings,
        trading_dates: Vec<String>,
        buy_rule: RuleConditions,
        sell_rule: RuleConditions,
    ) -> Self {
        let trading_date_set = trading_dates.iter().cloned().collect();
        Self {
            port,
            catalogs,
            settings,
            trading_dates,
            trading_date_set,
            buy_rule,
            sell_rule,
            slot: Mutex::new(None),
            raw_fetches: AtomicUsize::new(0),
            buy_computations: AtomicUsize::new(0),
            sell_computations: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            raw_fetches: self.raw_fetches.load(Ordering::Relaxed),
            buy_computations: self.buy_computations.load(Ordering::Relaxed),
            sell_computations: self.sell_computations.load(Ordering::Relaxed),
        }
    }

    fn rule(&self, side: Side) -> &RuleConditions {
        match side {
            Side::Buy => &self.buy_rule,
            Side::Sell => &self.sell_rule,
        }
    }

    /// Evaluates one entity for one side on `date`.
    ///
    /// `Ok(None)` means "no verdict": the rule is empty, the date is not a
    /// trading date, the entity has no row on that date, or it does not
    /// qualify and is not in the wait list. Data-store failures propagate.
    pub async fn evaluate(
        &self,
        side: Side,
        stock_id: &str,
        date: &str,
        in_wait: bool,
    ) -> Result<Option<Verdict>, ScreenerError> {
        let rule = self.rule(side);
        if rule.is_empty() {
            debug!("{side} rule has no conditions");
            return Ok(None);
        }
        if !self.trading_date_set.contains(date) {
            debug!("{date} is not a trading date");
            return Ok(None);
        }

        let mut slot = self.slot.lock().await;
        if let Some(entry) = slot.as_ref().filter(|e| e.date.as_str() > date) {
            return Err(ScreenerError::OutOfOrderDate {
                requested: date.to_string(),
                current: entry.date.clone(),
            });
        }
        if !matches!(slot.as_ref(), Some(entry) if entry.date == date) {
            *slot = Some(self.load(date).await?);
        }
        let Some(entry) = slot.as_mut() else {
            return Ok(None);
        };

        let Some(row) = entry.raw_rows_by_stock_id.get(stock_id).cloned() else {
            return Ok(None);
        };

        if entry.ids(side).is_none() {
            let builder =
                RuleQueryBuilder::new(self.port, self.catalogs, self.settings, &self.trading_dates);
            let found = builder
                .qualifying_ids_with(&mut entry.windows, rule, date, None)
                .await?;
            match side {
                Side::Buy => self.buy_computations.fetch_add(1, Ordering::Relaxed),
                Side::Sell => self.sell_computations.fetch_add(1, Ordering::Relaxed),
            };
            debug!("{side} set for {date}: {} stocks", found.len());
            *entry.ids_mut(side) = Some(found.into_iter().collect());
        }
        let qualifies = entry.ids(side).is_some_and(|set| set.contains(stock_id));

        if qualifies || in_wait {
            Ok(Some(Verdict {
                stock_id: stock_id.to_string(),
                date: date.to_string(),
                row,
            }))
        } else {
            Ok(None)
        }
    }

    async fn load(&self, date: &str) -> Result<MemoEntry, ScreenerError> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = {}",
            Timeframe::Daily.table(TableKind::Raw),
            Timeframe::Daily.time_column(),
            quote_literal(date)
        );
        let rows = self.port.execute(&sql).await?;
        self.raw_fetches.fetch_add(1, Ordering::Relaxed);
        let raw_rows_by_stock_id: HashMap<String, Row> = rows
            .into_iter()
            .filter_map(|row| text_column(&row, ENTITY_COLUMN).map(|id| (id, row)))
            .collect();
        info!("loaded {} rows for {date}", raw_rows_by_stock_id.len());
        Ok(MemoEntry {
            date: date.to_string(),
            raw_rows_by_stock_id,
            windows: ResolvedWindows::new(),
            buy_ids: None,
            sell_ids: None,
        })
    }
}

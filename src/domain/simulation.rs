//! Sequential backtest driver.
//!
//! Walks trading dates oldest first and asks the memoizer for verdicts. A
//! signal on one date puts the stock on a wait list; the order fills on the
//! next trading date at that date's close, fetched with `in_wait` set so the
//! row comes back whether or not the stock still qualifies.

use crate::domain::error::ScreenerError;
use crate::domain::memo::{BacktestMemoizer, MemoStats, Side, Verdict};
use crate::ports::query_port::QueryPort;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Column used as the fill price.
pub const PRICE_COLUMN: &str = "c";

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub stock_id: String,
    pub entry_date: String,
    pub entry_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub stock_id: String,
    pub entry_date: String,
    pub entry_price: f64,
    pub exit_date: String,
    pub exit_price: f64,
}

impl ClosedTrade {
    /// Fractional return, e.g. `0.05` for +5%.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (self.exit_price - self.entry_price) / self.entry_price
    }
}

/// Inclusive date bounds; `None` leaves a side open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn contains(&self, date: &str) -> bool {
        self.start.as_deref().is_none_or(|s| date >= s)
            && self.end.as_deref().is_none_or(|e| date <= e)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationResult {
    pub closed_trades: Vec<ClosedTrade>,
    pub open_positions: Vec<OpenPosition>,
    pub dates_processed: usize,
    pub dates_skipped: usize,
    pub cancelled: bool,
    pub stats: MemoStats,
}

#[derive(Default)]
struct Book {
    held: BTreeMap<String, OpenPosition>,
    waiting_buy: BTreeSet<String>,
    waiting_sell: BTreeSet<String>,
    closed: Vec<ClosedTrade>,
}

fn price(verdict: &Verdict) -> Option<f64> {
    verdict.row.get(PRICE_COLUMN).and_then(|v| v.as_f64())
}

impl Book {
    async fn step<P: QueryPort>(
        &mut self,
        memo: &BacktestMemoizer<'_, P>,
        stock_id: &str,
        date: &str,
    ) -> Result<(), ScreenerError> {
        if let Some(position) = self.held.get(stock_id) {
            let waiting = self.waiting_sell.contains(stock_id);
            let Some(verdict) = memo.evaluate(Side::Sell, stock_id, date, waiting).await? else {
                return Ok(());
            };
            if !waiting {
                self.waiting_sell.insert(stock_id.to_string());
                return Ok(());
            }
            let Some(exit_price) = price(&verdict) else {
                warn!("{stock_id} has no close on {date}; sell stays pending");
                return Ok(());
            };
            self.closed.push(ClosedTrade {
                stock_id: stock_id.to_string(),
                entry_date: position.entry_date.clone(),
                entry_price: position.entry_price,
                exit_date: date.to_string(),
                exit_price,
            });
            self.held.remove(stock_id);
            self.waiting_sell.remove(stock_id);
        } else {
            let waiting = self.waiting_buy.contains(stock_id);
            let Some(verdict) = memo.evaluate(Side::Buy, stock_id, date, waiting).await? else {
                return Ok(());
            };
            if !waiting {
                self.waiting_buy.insert(stock_id.to_string());
                return Ok(());
            }
            let Some(entry_price) = price(&verdict) else {
                warn!("{stock_id} has no close on {date}; buy stays pending");
                return Ok(());
            };
            self.held.insert(
                stock_id.to_string(),
                OpenPosition {
                    stock_id: stock_id.to_string(),
                    entry_date: date.to_string(),
                    entry_price,
                },
            );
            self.waiting_buy.remove(stock_id);
        }
        Ok(())
    }
}

/// Runs the simulation over `trading_dates` (most recent first) inside `range`.
///
/// `stop` is checked between dates. A data-store failure skips the rest of
/// that date; any other error aborts the run.
pub async fn run_simulation<P: QueryPort>(
    memo: &BacktestMemoizer<'_, P>,
    trading_dates: &[String],
    stocks: &[String],
    range: &DateRange,
    stop: &AtomicBool,
) -> Result<SimulationResult, ScreenerError> {
    let mut book = Book::default();
    let mut result = SimulationResult::default();
    let dates: Vec<&String> = trading_dates
        .iter()
        .rev()
        .filter(|d| range.contains(d))
        .collect();
    info!("simulating {} stocks over {} dates", stocks.len(), dates.len());

    'dates: for date in dates {
        if stop.load(Ordering::Relaxed) {
            info!("stop requested before {date}");
            result.cancelled = true;
            break;
        }
        for stock_id in stocks {
            match book.step(memo, stock_id, date).await {
                Ok(()) => {}
                Err(e) if e.is_data_store() => {
                    warn!("skipping {date}: {e}");
                    result.dates_skipped += 1;
                    continue 'dates;
                }
                Err(e) => return Err(e),
            }
        }
        result.dates_processed += 1;
    }

    result.closed_trades = book.closed;
    result.open_positions = book.held.into_values().collect();
    result.stats = memo.stats();
    Ok(result)
}

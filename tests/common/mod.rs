#![allow(dead_code)]

use screener::domain::catalog::Catalogs;
use screener::domain::error::ScreenerError;
use screener::domain::prompt::{Prompt, RuleConditions};
use screener::domain::settings::ScreenSettings;
use screener::domain::value::{Row, Value};
use screener::ports::query_port::QueryPort;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[cfg(feature = "sqlite")]
use screener::adapters::sqlite_adapter::SqliteAdapter;

/// Answers queries by substring match and records every query it sees.
///
/// Errors are checked before responses; the first matching entry wins and
/// unmatched queries return no rows.
pub struct MockQueryPort {
    pub responses: Vec<(Vec<String>, Vec<Row>)>,
    pub errors: Vec<(String, String)>,
    stop_on: Option<(String, Arc<AtomicBool>)>,
    executed: Mutex<Vec<String>>,
}

impl MockQueryPort {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            errors: Vec::new(),
            stop_on: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rows(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.with_rows_when(&[pattern], rows)
    }

    /// Rows returned for queries containing every pattern.
    pub fn with_rows_when(mut self, patterns: &[&str], rows: Vec<Row>) -> Self {
        let patterns = patterns.iter().map(|p| p.to_string()).collect();
        self.responses.push((patterns, rows));
        self
    }

    pub fn with_error(mut self, pattern: &str, reason: &str) -> Self {
        self.errors.push((pattern.to_string(), reason.to_string()));
        self
    }

    /// Raises `flag` when a query containing `pattern` runs.
    pub fn with_stop_on(mut self, pattern: &str, flag: Arc<AtomicBool>) -> Self {
        self.stop_on = Some((pattern.to_string(), flag));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn count_containing(&self, pattern: &str) -> usize {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|sql| sql.contains(pattern))
            .count()
    }
}

impl QueryPort for MockQueryPort {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ScreenerError> {
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some((pattern, flag)) = &self.stop_on {
            if sql.contains(pattern.as_str()) {
                flag.store(true, Ordering::Relaxed);
            }
        }
        if let Some((_, reason)) = self.errors.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(ScreenerError::DatabaseQuery {
                reason: reason.clone(),
            });
        }
        Ok(self
            .responses
            .iter()
            .find(|(patterns, _)| patterns.iter().all(|p| sql.contains(p.as_str())))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn deal_row(stock_id: &str, date: &str, close: f64) -> Row {
    row(&[
        ("stock_id", Value::from(stock_id)),
        ("t", Value::from(date)),
        ("c", Value::from(close)),
    ])
}

pub fn id_rows(ids: &[&str]) -> Vec<Row> {
    ids.iter()
        .map(|id| row(&[("stock_id", Value::from(*id))]))
        .collect()
}

pub fn date_rows(column: &str, list: &[&str]) -> Vec<Row> {
    list.iter()
        .map(|d| row(&[(column, Value::from(*d))]))
        .collect()
}

/// Dates in the order given.
pub fn dates(list: &[&str]) -> Vec<String> {
    list.iter().map(|d| d.to_string()).collect()
}

/// `2024-01-{first}` through `2024-01-{last}`, most recent first.
pub fn january(first: u32, last: u32) -> Vec<String> {
    (first..=last).rev().map(|d| format!("2024-01-{d:02}")).collect()
}

pub fn daily_rule(prompts: Vec<Prompt>) -> RuleConditions {
    RuleConditions {
        daily: prompts,
        ..RuleConditions::default()
    }
}

pub fn close_rising() -> RuleConditions {
    daily_rule(vec![Prompt::new(
        "today",
        "closing price",
        ">",
        "yesterday",
        "closing price",
    )])
}

pub fn close_falling() -> RuleConditions {
    daily_rule(vec![Prompt::new(
        "today",
        "closing price",
        "<",
        "yesterday",
        "closing price",
    )])
}

pub struct Fixture {
    pub catalogs: Catalogs,
    pub settings: ScreenSettings,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            catalogs: Catalogs::standard(),
            settings: ScreenSettings::default(),
        }
    }
}

/// In-memory database with the full schema and the given daily closes.
#[cfg(feature = "sqlite")]
pub fn seeded_sqlite(closes: Vec<(&str, Vec<(&str, f64)>)>) -> SqliteAdapter {
    let adapter = SqliteAdapter::in_memory().unwrap();
    adapter.initialize_schema().unwrap();
    let rows: Vec<Row> = closes
        .iter()
        .flat_map(|(stock_id, series)| {
            series
                .iter()
                .map(|(date, close)| deal_row(stock_id, date, *close))
        })
        .collect();
    adapter.insert_rows("daily_deal", &rows).unwrap();
    adapter
}

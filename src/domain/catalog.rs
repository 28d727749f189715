//! Indicator catalogs and the comparison operator vocabulary.
//!
//! One catalog per timeframe maps a display name to a physical column and a
//! table group (raw price/volume or derived technical columns). A separate
//! fundamentals catalog maps display names to a column and its owning table.
//! Catalogs are immutable values built once and passed by reference.

use crate::domain::error::ScreenerError;
use crate::domain::timeframe::{TableKind, Timeframe};
use std::collections::HashMap;
use std::fmt;

/// Where an indicator's column lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableGroup {
    /// A per-timeframe table, addressed through offset aliases.
    Timeframe(TableKind),
    /// A fundamentals table with no time dimension.
    Fundamental(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorDescriptor {
    pub display_name: String,
    pub physical_column: String,
    pub table_group: TableGroup,
}

impl IndicatorDescriptor {
    pub fn raw(display_name: &str, column: &str) -> Self {
        Self::new(display_name, column, TableGroup::Timeframe(TableKind::Raw))
    }

    pub fn derived(display_name: &str, column: &str) -> Self {
        Self::new(display_name, column, TableGroup::Timeframe(TableKind::Derived))
    }

    pub fn fundamental(display_name: &str, column: &str, table: &str) -> Self {
        Self::new(display_name, column, TableGroup::Fundamental(table.to_string()))
    }

    fn new(display_name: &str, column: &str, table_group: TableGroup) -> Self {
        Self {
            display_name: display_name.to_string(),
            physical_column: column.to_string(),
            table_group,
        }
    }

    /// Owning fundamentals table, if any.
    pub fn fundamental_table(&self) -> Option<&str> {
        match &self.table_group {
            TableGroup::Fundamental(table) => Some(table),
            TableGroup::Timeframe(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorCatalog {
    scope: String,
    entries: Vec<IndicatorDescriptor>,
    index: HashMap<String, usize>,
}

impl IndicatorCatalog {
    /// Builds a catalog, rejecting duplicate display names.
    pub fn new(
        scope: impl Into<String>,
        entries: Vec<IndicatorDescriptor>,
    ) -> Result<Self, ScreenerError> {
        let scope = scope.into();
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.display_name.clone(), i).is_some() {
                return Err(ScreenerError::RuleInvalid {
                    reason: format!(
                        "duplicate indicator '{}' in {} catalog",
                        entry.display_name, scope
                    ),
                });
            }
        }
        Ok(Self {
            scope,
            entries,
            index,
        })
    }

    // Built-in tables have unique names; later duplicates would shadow earlier ones.
    fn from_static(scope: &str, entries: Vec<IndicatorDescriptor>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.display_name.clone(), i))
            .collect();
        Self {
            scope: scope.to_string(),
            entries,
            index,
        }
    }

    pub fn lookup(&self, display_name: &str) -> Result<&IndicatorDescriptor, ScreenerError> {
        self.get(display_name)
            .ok_or_else(|| ScreenerError::UnknownIndicator {
                timeframe: self.scope.clone(),
                name: display_name.to_string(),
            })
    }

    pub fn get(&self, display_name: &str) -> Option<&IndicatorDescriptor> {
        self.index
            .get(display_name.trim())
            .map(|&i| &self.entries[i])
    }

    pub fn list_indicators(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.display_name.as_str()).collect()
    }

    pub fn entries(&self) -> &[IndicatorDescriptor] {
        &self.entries
    }
}

/// The four catalogs the compiler works against.
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub hourly: IndicatorCatalog,
    pub daily: IndicatorCatalog,
    pub weekly: IndicatorCatalog,
    pub fundamentals: IndicatorCatalog,
}

impl Catalogs {
    /// Catalogs matching the bundled schema.
    pub fn standard() -> Self {
        Self {
            hourly: standard_catalog(Timeframe::Hourly),
            daily: standard_catalog(Timeframe::Daily),
            weekly: standard_catalog(Timeframe::Weekly),
            fundamentals: fundamentals_catalog(),
        }
    }

    pub fn timeframe(&self, timeframe: Timeframe) -> &IndicatorCatalog {
        match timeframe {
            Timeframe::Hourly => &self.hourly,
            Timeframe::Daily => &self.daily,
            Timeframe::Weekly => &self.weekly,
        }
    }

    pub fn lookup(
        &self,
        timeframe: Timeframe,
        display_name: &str,
    ) -> Result<&IndicatorDescriptor, ScreenerError> {
        self.timeframe(timeframe).lookup(display_name)
    }

    pub fn list_indicators(&self, timeframe: Timeframe) -> Vec<&str> {
        self.timeframe(timeframe).list_indicators()
    }

    pub fn list_operators(&self) -> Vec<&'static str> {
        ComparisonOp::ALL.iter().map(|op| op.label()).collect()
    }
}

const RAW_COLUMNS: [(&str, &str); 5] = [
    ("closing price", "c"),
    ("opening price", "o"),
    ("volume", "v"),
    ("lowest price", "l"),
    ("highest price", "h"),
];

const DERIVED_COLUMNS: [(&str, &str); 36] = [
    ("ma5", "ma5"),
    ("ma5 deduction", "ma5_ded"),
    ("ma10", "ma10"),
    ("ma10 deduction", "ma10_ded"),
    ("ma20", "ma20"),
    ("ma20 deduction", "ma20_ded"),
    ("ma60", "ma60"),
    ("ma60 deduction", "ma60_ded"),
    ("ma120", "ma120"),
    ("ma120 deduction", "ma120_ded"),
    ("ema5", "ema5"),
    ("ema10", "ema10"),
    ("ema20", "ema20"),
    ("ema60", "ema60"),
    ("ema120", "ema120"),
    ("macd", "macd"),
    ("dif", "dif"),
    ("osc", "osc"),
    ("k", "k"),
    ("d", "d"),
    ("j", "j"),
    ("rsi5", "rsi5"),
    ("rsi10", "rsi10"),
    ("bollinger upper", "bollUb"),
    ("bollinger middle", "bollMa"),
    ("bollinger lower", "bollLb"),
    ("obv", "obv"),
    ("obv ma5", "obv_ma5"),
    ("obv ma10", "obv_ma10"),
    ("obv ma20", "obv_ma20"),
    ("obv ma60", "obv_ma60"),
    ("obv ema5", "obv_ema5"),
    ("obv ema10", "obv_ema10"),
    ("obv ema20", "obv_ema20"),
    ("obv ema60", "obv_ema60"),
    ("mfi", "mfi"),
];

const ICHIMOKU_DMI_COLUMNS: [(&str, &str); 8] = [
    ("conversion line", "tenkan"),
    ("base line", "kijun"),
    ("leading span a", "senkouA"),
    ("leading span b", "senkouB"),
    ("lagging span", "chikou"),
    ("positive directional", "di_plus"),
    ("negative directional", "di_minus"),
    ("adx", "adx"),
];

const HOURLY_ONLY_COLUMNS: [(&str, &str); 2] = [("cmf", "cmf"), ("cmf ema5", "cmf_ema5")];

const FUNDAMENTAL_COLUMNS: [(&str, &str, &str); 16] = [
    ("price to earnings", "pe", "financial_metric"),
    ("price to book", "pb", "financial_metric"),
    ("dividend yield", "dividend_yield", "financial_metric"),
    ("gross profit margin", "gross_profit_margin", "financial_metric"),
    ("operating margin", "operating_margin", "financial_metric"),
    ("pre-tax profit margin", "pre_tax_profit_margin", "financial_metric"),
    ("roa", "roa", "financial_metric"),
    ("roe", "roe", "financial_metric"),
    ("book value per share", "book_value_per_share", "financial_metric"),
    ("eps last quarter", "eps_recent_q1", "recent_fundamental"),
    ("eps last year", "eps_recent_y1", "recent_fundamental"),
    ("revenue mom", "revenue_recent_m1_mom", "recent_fundamental"),
    ("revenue yoy", "revenue_recent_m1_yoy", "recent_fundamental"),
    ("revenue accumulated yoy", "revenue_recent_m1_yoy_acc", "recent_fundamental"),
    ("foreign holding ratio", "recent_w1_foreign_ratio", "investor_positions"),
    ("major holder ratio", "recent_w1_big_investor_ratio", "investor_positions"),
];

/// Derived columns a timeframe's skills table carries.
pub fn derived_columns(timeframe: Timeframe) -> Vec<(&'static str, &'static str)> {
    let mut columns: Vec<_> = DERIVED_COLUMNS.to_vec();
    if timeframe != Timeframe::Weekly {
        columns.extend_from_slice(&ICHIMOKU_DMI_COLUMNS);
    }
    if timeframe == Timeframe::Hourly {
        columns.extend_from_slice(&HOURLY_ONLY_COLUMNS);
    }
    columns
}

/// Fundamentals `(display name, column, table)` triples.
pub fn fundamental_columns() -> &'static [(&'static str, &'static str, &'static str)] {
    &FUNDAMENTAL_COLUMNS
}

fn standard_catalog(timeframe: Timeframe) -> IndicatorCatalog {
    let entries = RAW_COLUMNS
        .iter()
        .map(|(name, column)| IndicatorDescriptor::raw(name, column))
        .chain(
            derived_columns(timeframe)
                .into_iter()
                .map(|(name, column)| IndicatorDescriptor::derived(name, column)),
        )
        .collect();
    IndicatorCatalog::from_static(timeframe.name(), entries)
}

fn fundamentals_catalog() -> IndicatorCatalog {
    let entries = FUNDAMENTAL_COLUMNS
        .iter()
        .map(|(name, column, table)| IndicatorDescriptor::fundamental(name, column, table))
        .collect();
    IndicatorCatalog::from_static("fundamentals", entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Gt,
    Lt,
    Eq,
    Ge,
    Le,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 5] = [
        ComparisonOp::Gt,
        ComparisonOp::Lt,
        ComparisonOp::Eq,
        ComparisonOp::Ge,
        ComparisonOp::Le,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Gt => ">",
            ComparisonOp::Lt => "<",
            ComparisonOp::Eq => "=",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Le => "<=",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ComparisonOp::Gt => "greater than",
            ComparisonOp::Lt => "less than",
            ComparisonOp::Eq => "equal to",
            ComparisonOp::Ge => "greater or equal",
            ComparisonOp::Le => "less or equal",
        }
    }

    /// Accepts either the symbol or the label.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == text || op.label().eq_ignore_ascii_case(text))
    }

    pub fn apply(self, left: f64, right: f64) -> bool {
        const EPSILON: f64 = 1e-9;
        match self {
            ComparisonOp::Gt => left > right,
            ComparisonOp::Lt => left < right,
            ComparisonOp::Eq => (left - right).abs() < EPSILON,
            ComparisonOp::Ge => left >= right,
            ComparisonOp::Le => left <= right,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

//! Timeframes and their table/alias vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset label marking a literal right-hand side.
pub const CUSTOM_VALUE: &str = "custom value";

/// Offset label routing an operand to the fundamentals catalog.
pub const OTHER: &str = "other";

/// Deepest offset any timeframe label resolves to.
pub const MAX_OFFSET: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Hourly,
    Daily,
    Weekly,
}

/// Which of the two per-timeframe tables a column lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Raw,
    Derived,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::Hourly, Timeframe::Daily, Timeframe::Weekly];

    pub fn name(self) -> &'static str {
        match self {
            Timeframe::Hourly => "hourly",
            Timeframe::Daily => "daily",
            Timeframe::Weekly => "weekly",
        }
    }

    pub fn table(self, kind: TableKind) -> &'static str {
        match (self, kind) {
            (Timeframe::Hourly, TableKind::Raw) => "hourly_deal",
            (Timeframe::Hourly, TableKind::Derived) => "hourly_skills",
            (Timeframe::Daily, TableKind::Raw) => "daily_deal",
            (Timeframe::Daily, TableKind::Derived) => "daily_skills",
            (Timeframe::Weekly, TableKind::Raw) => "weekly_deal",
            (Timeframe::Weekly, TableKind::Derived) => "weekly_skills",
        }
    }

    /// Column holding the date or timestamp of a row.
    pub fn time_column(self) -> &'static str {
        match self {
            Timeframe::Hourly => "ts",
            Timeframe::Daily | Timeframe::Weekly => "t",
        }
    }

    pub fn alias_suffix(self, kind: TableKind) -> &'static str {
        match (self, kind) {
            (Timeframe::Hourly, TableKind::Raw) => "_hour_ago",
            (Timeframe::Hourly, TableKind::Derived) => "_hour_ago_sk",
            (Timeframe::Daily, TableKind::Raw) => "_day_ago",
            (Timeframe::Daily, TableKind::Derived) => "_day_ago_sk",
            (Timeframe::Weekly, TableKind::Raw) => "_week_ago",
            (Timeframe::Weekly, TableKind::Derived) => "_week_ago_sk",
        }
    }

    /// Self-join alias for a table kind at an offset, e.g. `2_day_ago_sk`.
    pub fn alias(self, offset: usize, kind: TableKind) -> String {
        format!("{}{}", offset, self.alias_suffix(kind))
    }

    /// Offset labels in ascending order; index equals offset.
    pub fn offset_labels(self) -> [&'static str; MAX_OFFSET + 1] {
        match self {
            Timeframe::Hourly => [
                "now",
                "1 hour ago",
                "2 hours ago",
                "3 hours ago",
                "4 hours ago",
                "5 hours ago",
            ],
            Timeframe::Daily => [
                "today",
                "yesterday",
                "2 days ago",
                "3 days ago",
                "4 days ago",
                "5 days ago",
            ],
            Timeframe::Weekly => [
                "this week",
                "last week",
                "2 weeks ago",
                "3 weeks ago",
                "4 weeks ago",
                "5 weeks ago",
            ],
        }
    }

    pub fn offset_for_label(self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.offset_labels()
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" | "hour" => Ok(Timeframe::Hourly),
            "daily" | "day" => Ok(Timeframe::Daily),
            "weekly" | "week" => Ok(Timeframe::Weekly),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

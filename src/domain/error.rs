//! Domain error types.

use crate::domain::timeframe::Timeframe;

/// Top-level error type for screener.
#[derive(Debug, thiserror::Error)]
pub enum ScreenerError {
    #[error("unknown {timeframe} indicator: {name}")]
    UnknownIndicator { timeframe: String, name: String },

    #[error("unknown {timeframe} offset label: {label}")]
    UnknownOffset { timeframe: Timeframe, label: String },

    #[error("unsupported operator: {operator}")]
    UnsupportedOperator { operator: String },

    #[error(
        "cannot compare {left} ({left_table}) with {right} ({right_table}): indicators must share a table"
    )]
    CrossTableComparison {
        left: String,
        left_table: String,
        right: String,
        right_table: String,
    },

    #[error("rule has no active conditions")]
    NoActiveConditions,

    #[error("date {date} is not a known trading date")]
    DateNotFound { date: String },

    #[error("out-of-order date access: requested {requested} after {current}")]
    OutOfOrderDate { requested: String, current: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScreenerError {
    /// Errors raised by the data store rather than by rule compilation.
    pub fn is_data_store(&self) -> bool {
        matches!(
            self,
            ScreenerError::Database { .. } | ScreenerError::DatabaseQuery { .. }
        )
    }
}

impl From<&ScreenerError> for std::process::ExitCode {
    fn from(err: &ScreenerError) -> Self {
        let code: u8 = match err {
            ScreenerError::Io(_) => 1,
            ScreenerError::ConfigParse { .. }
            | ScreenerError::ConfigMissing { .. }
            | ScreenerError::ConfigInvalid { .. } => 2,
            ScreenerError::Database { .. } | ScreenerError::DatabaseQuery { .. } => 3,
            ScreenerError::UnknownIndicator { .. }
            | ScreenerError::UnknownOffset { .. }
            | ScreenerError::UnsupportedOperator { .. }
            | ScreenerError::CrossTableComparison { .. }
            | ScreenerError::NoActiveConditions
            | ScreenerError::RuleInvalid { .. } => 4,
            ScreenerError::DateNotFound { .. } | ScreenerError::OutOfOrderDate { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

//! Data store access port.

use crate::domain::error::ScreenerError;
use crate::domain::value::{Row, text_column};
use std::future::Future;

/// The single data-access primitive the screener depends on.
pub trait QueryPort: Sync {
    /// Runs one query and returns its rows addressable by column name.
    fn execute(&self, sql: &str) -> impl Future<Output = Result<Vec<Row>, ScreenerError>> + Send;

    /// Known trading dates, most recent first.
    fn trading_dates(&self) -> impl Future<Output = Result<Vec<String>, ScreenerError>> + Send {
        async move {
            let rows = self
                .execute("SELECT DISTINCT t FROM daily_deal ORDER BY t DESC")
                .await?;
            Ok(rows.iter().filter_map(|row| text_column(row, "t")).collect())
        }
    }
}

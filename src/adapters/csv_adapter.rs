//! CSV import of table rows and export of simulated trades.
//!
//! Import reads a headered CSV into [`Row`]s: empty cells become NULL, cells
//! parsing as integers or floats become numbers, and the identifier and time
//! columns always stay text.

use crate::domain::error::ScreenerError;
use crate::domain::simulation::{ClosedTrade, OpenPosition};
use crate::domain::value::{Row, Value};
use std::io::{Read, Write};
use std::path::Path;

const TEXT_COLUMNS: [&str; 6] = ["stock_id", "t", "ts", "stock_name", "industry_group", "market_type"];

fn parse_cell(column: &str, cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if TEXT_COLUMNS.contains(&column) {
        return Value::Text(cell.to_string());
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::Real(f);
    }
    Value::Text(cell.to_string())
}

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<Row>, ScreenerError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| ScreenerError::Database {
            reason: format!("CSV header error: {}", e),
        })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| ScreenerError::Database {
            reason: format!("CSV parse error: {}", e),
        })?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(column, cell)| (column.clone(), parse_cell(column, cell)))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

pub fn read_rows_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<Row>, ScreenerError> {
    let file = std::fs::File::open(path.as_ref())?;
    read_rows(file)
}

/// Writes closed trades, then open positions with empty exit fields.
pub fn write_trades<W: Write>(
    writer: W,
    closed: &[ClosedTrade],
    open: &[OpenPosition],
) -> Result<(), ScreenerError> {
    let map_err = |e: csv::Error| ScreenerError::Database {
        reason: format!("CSV write error: {}", e),
    };
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "stock_id",
        "entry_date",
        "entry_price",
        "exit_date",
        "exit_price",
        "return_pct",
    ])
    .map_err(map_err)?;
    for trade in closed {
        wtr.write_record([
            trade.stock_id.clone(),
            trade.entry_date.clone(),
            format!("{:.4}", trade.entry_price),
            trade.exit_date.clone(),
            format!("{:.4}", trade.exit_price),
            format!("{:.6}", trade.return_pct()),
        ])
        .map_err(map_err)?;
    }
    for position in open {
        wtr.write_record([
            position.stock_id.clone(),
            position.entry_date.clone(),
            format!("{:.4}", position.entry_price),
            String::new(),
            String::new(),
            String::new(),
        ])
        .map_err(map_err)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_trades_to_file<P: AsRef<Path>>(
    path: P,
    closed: &[ClosedTrade],
    open: &[OpenPosition],
) -> Result<(), ScreenerError> {
    let file = std::fs::File::create(path.as_ref())?;
    write_trades(file, closed, open)
}

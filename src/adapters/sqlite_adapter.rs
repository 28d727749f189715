//! SQLite data adapter.
//!
//! Implements [`QueryPort`] over an r2d2 pool of rusqlite connections. Queries
//! run on tokio's blocking pool so async callers never block a worker thread.

use crate::domain::catalog::{derived_columns, fundamental_columns};
use crate::domain::error::ScreenerError;
use crate::domain::timeframe::{TableKind, Timeframe};
use crate::domain::value::{Row, Value};
use crate::ports::config_port::ConfigPort;
use crate::ports::query_port::QueryPort;
use log::debug;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqlValue, ValueRef};
use std::collections::BTreeSet;

/// Table name for the stock master list.
pub const STOCK_TABLE: &str = "stock";

const STOCK_COLUMNS: [&str; 4] = ["stock_id", "stock_name", "industry_group", "market_type"];

const RAW_COLUMNS: [&str; 5] = ["c", "o", "h", "l", "v"];

#[derive(Clone)]
pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScreenerError> {
        let db_path =
            config
                .get_non_empty("sqlite", "path")
                .ok_or_else(|| ScreenerError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| ScreenerError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, ScreenerError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| ScreenerError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, ScreenerError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| ScreenerError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), ScreenerError> {
        let conn = self.conn()?;
        conn.execute_batch(&schema_sql())
            .map_err(|e: rusqlite::Error| ScreenerError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Inserts (or replaces) rows into a known table. Every key of every row
    /// must be a column of that table. Returns the number of rows written.
    pub fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<usize, ScreenerError> {
        let known = table_columns(table).ok_or_else(|| ScreenerError::DatabaseQuery {
            reason: format!("unknown table '{table}'"),
        })?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| ScreenerError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        for row in rows {
            let mut columns: Vec<&String> = row.keys().collect();
            columns.sort();
            if let Some(bad) = columns.iter().find(|c| !known.contains(c.as_str())) {
                return Err(ScreenerError::DatabaseQuery {
                    reason: format!("table '{table}' has no column '{bad}'"),
                });
            }
            let names: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT OR REPLACE INTO {table} ({}) VALUES ({})",
                names.join(", "),
                placeholders.join(", ")
            );
            let values = columns.iter().map(|c| to_sql_value(&row[*c]));
            tx.execute(&sql, params_from_iter(values))
                .map_err(|e: rusqlite::Error| ScreenerError::DatabaseQuery {
                    reason: e.to_string(),
                })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| ScreenerError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(rows.len())
    }
}

impl QueryPort for SqliteAdapter {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ScreenerError> {
        let pool = self.pool.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || run_query(&pool, &sql))
            .await
            .map_err(|e| ScreenerError::Database {
                reason: e.to_string(),
            })?
    }
}

fn run_query(pool: &Pool<SqliteConnectionManager>, sql: &str) -> Result<Vec<Row>, ScreenerError> {
    let conn = pool.get().map_err(|e: r2d2::Error| ScreenerError::Database {
        reason: e.to_string(),
    })?;

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e: rusqlite::Error| ScreenerError::DatabaseQuery {
            reason: e.to_string(),
        })?;
    let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();

    let rows = stmt
        .query_map([], |row| {
            let mut out = Row::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                out.insert(name.clone(), from_value_ref(row.get_ref(i)?));
            }
            Ok(out)
        })
        .map_err(|e: rusqlite::Error| ScreenerError::DatabaseQuery {
            reason: e.to_string(),
        })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(
            row.map_err(|e: rusqlite::Error| ScreenerError::DatabaseQuery {
                reason: e.to_string(),
            })?,
        );
    }
    debug!("query returned {} rows", result.len());
    Ok(result)
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

/// Tables the schema defines, in creation order.
pub fn schema_tables() -> Vec<String> {
    let mut tables: Vec<String> = Timeframe::ALL
        .into_iter()
        .flat_map(|tf| [tf.table(TableKind::Raw), tf.table(TableKind::Derived)])
        .map(str::to_string)
        .collect();
    tables.extend(fundamental_tables());
    tables.push(STOCK_TABLE.to_string());
    tables
}

fn fundamental_tables() -> BTreeSet<String> {
    fundamental_columns()
        .iter()
        .map(|(_, _, table)| table.to_string())
        .collect()
}

/// Columns of a schema table, including keys.
pub fn table_columns(table: &str) -> Option<BTreeSet<String>> {
    let mut columns = BTreeSet::from(["stock_id".to_string()]);
    if let Some(tf) = Timeframe::ALL
        .into_iter()
        .find(|tf| tf.table(TableKind::Raw) == table)
    {
        columns.insert(tf.time_column().to_string());
        columns.extend(RAW_COLUMNS.iter().map(|c| c.to_string()));
        return Some(columns);
    }
    if let Some(tf) = Timeframe::ALL
        .into_iter()
        .find(|tf| tf.table(TableKind::Derived) == table)
    {
        columns.insert(tf.time_column().to_string());
        columns.extend(derived_columns(tf).into_iter().map(|(_, c)| c.to_string()));
        return Some(columns);
    }
    if table == STOCK_TABLE {
        return Some(STOCK_COLUMNS.iter().map(|c| c.to_string()).collect());
    }
    let fundamentals: Vec<String> = fundamental_columns()
        .iter()
        .filter(|(_, _, t)| *t == table)
        .map(|(_, c, _)| c.to_string())
        .collect();
    if fundamentals.is_empty() {
        return None;
    }
    columns.extend(fundamentals);
    Some(columns)
}

/// `CREATE TABLE IF NOT EXISTS` statements for every table and time index.
pub fn schema_sql() -> String {
    let mut sql = String::new();
    for tf in Timeframe::ALL {
        let time = tf.time_column();
        let raw = tf.table(TableKind::Raw);
        let derived = tf.table(TableKind::Derived);
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {raw} (\n    stock_id TEXT NOT NULL,\n    {time} TEXT NOT NULL,\n    c REAL,\n    o REAL,\n    h REAL,\n    l REAL,\n    v INTEGER,\n    PRIMARY KEY (stock_id, {time})\n);\n"
        ));
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{raw}_{time} ON {raw}({time});\n"
        ));
        let skill_columns: String = derived_columns(tf)
            .into_iter()
            .map(|(_, c)| format!("    \"{c}\" REAL,\n"))
            .collect();
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {derived} (\n    stock_id TEXT NOT NULL,\n    {time} TEXT NOT NULL,\n{skill_columns}    PRIMARY KEY (stock_id, {time})\n);\n"
        ));
    }
    for table in fundamental_tables() {
        let columns: String = fundamental_columns()
            .iter()
            .filter(|(_, _, t)| *t == table)
            .map(|(_, c, _)| format!(",\n    \"{c}\" REAL"))
            .collect();
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    stock_id TEXT PRIMARY KEY{columns}\n);\n"
        ));
    }
    sql.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS {STOCK_TABLE} (\n    stock_id TEXT PRIMARY KEY,\n    stock_name TEXT,\n    industry_group TEXT,\n    market_type TEXT\n);\n"
    ));
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    fn deal(stock_id: &str, t: &str, close: f64) -> Row {
        [
            ("stock_id", Value::from(stock_id)),
            ("t", Value::from(t)),
            ("c", Value::from(close)),
            ("v", Value::from(1000_i64)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn from_config_missing_path() {
        let config = EmptyConfig;
        let result = SqliteAdapter::from_config(&config);
        match result {
            Err(ScreenerError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn in_memory_initialization_is_idempotent() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn schema_covers_every_table() {
        let tables = schema_tables();
        assert!(tables.contains(&"hourly_skills".to_string()));
        assert!(tables.contains(&"recent_fundamental".to_string()));
        let sql = schema_sql();
        for table in &tables {
            assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")));
        }
        assert!(sql.contains("\"bollUb\" REAL"));
    }

    #[test]
    fn table_columns_know_time_column() {
        let hourly = table_columns("hourly_deal").unwrap();
        assert!(hourly.contains("ts"));
        assert!(!hourly.contains("t"));
        let weekly = table_columns("weekly_skills").unwrap();
        assert!(weekly.contains("t"));
        assert!(!weekly.contains("tenkan"));
        assert!(table_columns("sqlite_master").is_none());
    }

    #[tokio::test]
    async fn insert_then_query() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let written = adapter
            .insert_rows(
                "daily_deal",
                &[deal("2330", "2024-01-02", 590.0), deal("2317", "2024-01-02", 104.5)],
            )
            .unwrap();
        assert_eq!(written, 2);

        let rows = adapter
            .execute("SELECT stock_id, c, v, o FROM daily_deal ORDER BY stock_id")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["stock_id"], Value::Text("2317".into()));
        assert_eq!(rows[1]["c"], Value::Real(590.0));
        assert_eq!(rows[1]["v"], Value::Integer(1000));
        assert_eq!(rows[1]["o"], Value::Null);
    }

    #[tokio::test]
    async fn trading_dates_are_descending() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
            .insert_rows(
                "daily_deal",
                &[
                    deal("2330", "2024-01-02", 590.0),
                    deal("2330", "2024-01-03", 593.0),
                    deal("2317", "2024-01-03", 105.0),
                ],
            )
            .unwrap();
        let dates = adapter.trading_dates().await.unwrap();
        assert_eq!(dates, vec!["2024-01-03", "2024-01-02"]);
    }

    #[test]
    fn insert_rejects_unknown_column() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let mut row = deal("2330", "2024-01-02", 590.0);
        row.insert("close; DROP TABLE stock".into(), Value::Null);
        let err = adapter.insert_rows("daily_deal", &[row]).unwrap_err();
        assert!(matches!(err, ScreenerError::DatabaseQuery { .. }));
    }

    #[tokio::test]
    async fn bad_sql_surfaces_as_query_error() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let err = adapter.execute("SELECT * FROM missing_table").await.unwrap_err();
        assert!(err.is_data_store());
    }
}

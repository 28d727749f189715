//! CLI definition and dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::adapters::csv_adapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_rule_adapter::{load_fundamental_prompts, load_rule};
use crate::adapters::sqlite_adapter::{SqliteAdapter, schema_tables};
use crate::domain::catalog::{Catalogs, IndicatorCatalog};
use crate::domain::combinator::CombineMode;
use crate::domain::error::ScreenerError;
use crate::domain::fundamental::FundamentalFilter;
use crate::domain::memo::BacktestMemoizer;
use crate::domain::rule_query::RuleQueryBuilder;
use crate::domain::settings::{ScreenSettings, load_screen_settings};
use crate::domain::simulation::{DateRange, run_simulation};
use crate::domain::timeframe::Timeframe;
use crate::domain::value::text_column;
use crate::ports::query_port::QueryPort;

#[derive(Parser, Debug)]
#[command(name = "screener", about = "Rule-based stock screener and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CatalogChoice {
    Hourly,
    Daily,
    Weekly,
    Fundamentals,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create every table of the schema
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Import a headered CSV file into a table
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        table: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List indicators and operators
    Indicators {
        #[arg(value_enum, default_value = "daily")]
        catalog: CatalogChoice,
    },
    /// Print the combined query for a saved rule
    Explain {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        rule: PathBuf,
        #[arg(short, long)]
        date: Option<String>,
        #[arg(long)]
        stocks: Option<String>,
        #[arg(long)]
        union: bool,
    },
    /// Print stocks satisfying a saved rule
    Screen {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        rule: PathBuf,
        #[arg(short, long)]
        date: Option<String>,
        #[arg(long)]
        stocks: Option<String>,
        #[arg(long)]
        union: bool,
    },
    /// Print stocks satisfying fundamentals conditions
    Fundamentals {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        conditions: PathBuf,
        #[arg(long)]
        stocks: Option<String>,
    },
    /// Simulate buy/sell rules over historical dates
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        buy: PathBuf,
        #[arg(long)]
        sell: PathBuf,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        stocks: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::InitDb { config } => run_init_db(&config),
        Command::Import {
            config,
            table,
            file,
        } => run_import(&config, &table, &file),
        Command::Indicators { catalog } => {
            print_catalog(catalog);
            Ok(())
        }
        Command::Explain {
            config,
            rule,
            date,
            stocks,
            union,
        } => block_on(run_explain(&config, &rule, date, stocks.as_deref(), union)),
        Command::Screen {
            config,
            rule,
            date,
            stocks,
            union,
        } => block_on(run_screen(&config, &rule, date, stocks.as_deref(), union)),
        Command::Fundamentals {
            config,
            conditions,
            stocks,
        } => block_on(run_fundamentals(&config, &conditions, stocks.as_deref())),
        Command::Backtest {
            config,
            buy,
            sell,
            start,
            end,
            stocks,
            output,
        } => block_on(run_backtest(
            &config,
            &buy,
            &sell,
            DateRange { start, end },
            stocks.as_deref(),
            output.as_deref(),
        )),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn block_on<F: Future<Output = Result<(), ScreenerError>>>(future: F) -> Result<(), ScreenerError> {
    tokio::runtime::Runtime::new()?.block_on(future)
}

/// Comma-separated stock ids; blank tokens and duplicates are rejected.
pub fn parse_stock_ids(input: &str) -> Result<Vec<String>, ScreenerError> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    for token in input.split(',') {
        let id = token.trim();
        if id.is_empty() {
            return Err(ScreenerError::RuleInvalid {
                reason: format!("empty stock id in '{input}'"),
            });
        }
        if !seen.insert(id.to_string()) {
            return Err(ScreenerError::RuleInvalid {
                reason: format!("duplicate stock id '{id}'"),
            });
        }
        ids.push(id.to_string());
    }
    Ok(ids)
}

fn parse_allowlist(stocks: Option<&str>) -> Result<Option<Vec<String>>, ScreenerError> {
    stocks.map(parse_stock_ids).transpose()
}

struct DataContext {
    adapter: SqliteAdapter,
    settings: ScreenSettings,
    catalogs: Catalogs,
}

fn open_data(config_path: &Path) -> Result<DataContext, ScreenerError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = FileConfigAdapter::from_file(config_path)?;
    let settings = load_screen_settings(&config)?;
    let adapter = SqliteAdapter::from_config(&config)?;
    Ok(DataContext {
        adapter,
        settings,
        catalogs: Catalogs::standard(),
    })
}

/// The requested date, or the most recent trading date.
fn resolve_anchor(dates: &[String], requested: Option<String>) -> Result<String, ScreenerError> {
    match requested {
        Some(date) => Ok(date),
        None => dates
            .first()
            .cloned()
            .ok_or_else(|| ScreenerError::DateNotFound {
                date: "latest".to_string(),
            }),
    }
}

fn combine_mode(union: bool) -> CombineMode {
    if union {
        CombineMode::Union
    } else {
        CombineMode::Intersect
    }
}

fn run_init_db(config_path: &Path) -> Result<(), ScreenerError> {
    let ctx = open_data(config_path)?;
    ctx.adapter.initialize_schema()?;
    eprintln!("Created {} tables", schema_tables().len());
    Ok(())
}

fn run_import(config_path: &Path, table: &str, file: &Path) -> Result<(), ScreenerError> {
    let ctx = open_data(config_path)?;
    ctx.adapter.initialize_schema()?;
    eprintln!("Reading {}", file.display());
    let rows = csv_adapter::read_rows_from_file(file)?;
    let written = ctx.adapter.insert_rows(table, &rows)?;
    eprintln!("Imported {written} rows into {table}");
    Ok(())
}

fn print_catalog(choice: CatalogChoice) {
    let catalogs = Catalogs::standard();
    let timeframe = match choice {
        CatalogChoice::Hourly => Some(Timeframe::Hourly),
        CatalogChoice::Daily => Some(Timeframe::Daily),
        CatalogChoice::Weekly => Some(Timeframe::Weekly),
        CatalogChoice::Fundamentals => None,
    };
    let catalog: &IndicatorCatalog = match timeframe {
        Some(tf) => catalogs.timeframe(tf),
        None => &catalogs.fundamentals,
    };
    for entry in catalog.entries() {
        match entry.fundamental_table() {
            Some(table) => println!("{}\t{}.{}", entry.display_name, table, entry.physical_column),
            None => println!("{}\t{}", entry.display_name, entry.physical_column),
        }
    }
    eprintln!("\nOperators: {}", catalogs.list_operators().join(", "));
    if let Some(tf) = timeframe {
        eprintln!("Offsets:   {}", tf.offset_labels().join(", "));
    }
}

async fn run_explain(
    config_path: &Path,
    rule_path: &Path,
    date: Option<String>,
    stocks: Option<&str>,
    union: bool,
) -> Result<(), ScreenerError> {
    let ctx = open_data(config_path)?;
    let rule = load_rule(rule_path)?;
    let allowlist = parse_allowlist(stocks)?;
    let dates = ctx.adapter.trading_dates().await?;
    let anchor = resolve_anchor(&dates, date)?;
    let builder = RuleQueryBuilder::new(&ctx.adapter, &ctx.catalogs, &ctx.settings, &dates)
        .with_mode(combine_mode(union));
    let sql = builder
        .build(&rule.conditions, &anchor, allowlist.as_deref())
        .await?;
    eprintln!("Rule '{}' at {anchor}:", rule.name);
    println!("{sql}");
    Ok(())
}

async fn run_screen(
    config_path: &Path,
    rule_path: &Path,
    date: Option<String>,
    stocks: Option<&str>,
    union: bool,
) -> Result<(), ScreenerError> {
    let ctx = open_data(config_path)?;
    let rule = load_rule(rule_path)?;
    let allowlist = parse_allowlist(stocks)?;
    let dates = ctx.adapter.trading_dates().await?;
    let anchor = resolve_anchor(&dates, date)?;
    let builder = RuleQueryBuilder::new(&ctx.adapter, &ctx.catalogs, &ctx.settings, &dates)
        .with_mode(combine_mode(union));
    let ids = builder
        .qualifying_ids(&rule.conditions, &anchor, allowlist.as_deref())
        .await?;
    for id in &ids {
        println!("{id}");
    }
    eprintln!("{} stocks match '{}' at {anchor}", ids.len(), rule.name);
    Ok(())
}

async fn run_fundamentals(
    config_path: &Path,
    conditions_path: &Path,
    stocks: Option<&str>,
) -> Result<(), ScreenerError> {
    let ctx = open_data(config_path)?;
    let prompts = load_fundamental_prompts(conditions_path)?;
    let allowlist = parse_allowlist(stocks)?;
    let filter = FundamentalFilter::new(
        &ctx.adapter,
        &ctx.catalogs.fundamentals,
        ctx.settings.operator_policy,
    );
    let ids = filter.filter(&prompts, allowlist.as_deref()).await?;
    for id in &ids {
        println!("{id}");
    }
    eprintln!("{} stocks match {} conditions", ids.len(), prompts.len());
    Ok(())
}

async fn all_stock_ids<P: QueryPort>(port: &P) -> Result<Vec<String>, ScreenerError> {
    let rows = port
        .execute("SELECT DISTINCT stock_id FROM daily_deal ORDER BY stock_id")
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| text_column(row, "stock_id"))
        .collect())
}

async fn run_backtest(
    config_path: &Path,
    buy_path: &Path,
    sell_path: &Path,
    range: DateRange,
    stocks: Option<&str>,
    output: Option<&Path>,
) -> Result<(), ScreenerError> {
    let ctx = open_data(config_path)?;
    let buy = load_rule(buy_path)?;
    let sell = load_rule(sell_path)?;
    eprintln!("Buy rule: {}  Sell rule: {}", buy.name, sell.name);

    let dates = ctx.adapter.trading_dates().await?;
    let stocks = match parse_allowlist(stocks)? {
        Some(ids) => ids,
        None => all_stock_ids(&ctx.adapter).await?,
    };

    let stop = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStop requested, finishing current date...");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let memo = BacktestMemoizer::new(
        &ctx.adapter,
        &ctx.catalogs,
        &ctx.settings,
        dates.clone(),
        buy.conditions,
        sell.conditions,
    );
    let result = run_simulation(&memo, &dates, &stocks, &range, &stop).await?;

    eprintln!("\n=== Backtest ===");
    eprintln!("Stocks:          {}", stocks.len());
    eprintln!("Dates processed: {}", result.dates_processed);
    eprintln!("Dates skipped:   {}", result.dates_skipped);
    eprintln!("Closed trades:   {}", result.closed_trades.len());
    eprintln!("Open positions:  {}", result.open_positions.len());
    eprintln!(
        "Queries:         {} raw fetches, {} buy sets, {} sell sets",
        result.stats.raw_fetches, result.stats.buy_computations, result.stats.sell_computations
    );
    if result.cancelled {
        eprintln!("Run cancelled before the last date");
    }
    for trade in &result.closed_trades {
        println!(
            "{}\t{}\t{:.2}\t{}\t{:.2}\t{:+.2}%",
            trade.stock_id,
            trade.entry_date,
            trade.entry_price,
            trade.exit_date,
            trade.exit_price,
            trade.return_pct() * 100.0
        );
    }

    if let Some(path) = output {
        csv_adapter::write_trades_to_file(path, &result.closed_trades, &result.open_positions)?;
        eprintln!("Trades written to {}", path.display());
    }
    Ok(())
}

//! CLI integration tests: config loading, import, screening and backtests
//! against a SQLite file in a temporary directory.

#![cfg(feature = "sqlite")]

use clap::Parser;
use screener::cli::{Cli, run};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;

const DAILY_CSV: &str = "\
stock_id,t,c,o,h,l,v
2330,2024-01-01,10,10,10,10,1000
2330,2024-01-02,11,11,11,11,1000
2330,2024-01-03,12,12,12,12,1000
2330,2024-01-04,11,11,11,11,1000
2330,2024-01-05,10,10,10,10,1000
2330,2024-01-06,13,13,13,13,1000
";

const RISING: &str = r#"{
  "name": "close rising",
  "conditions": {
    "daily": [
      {"left_offset": "today", "left_indicator": "closing price", "operator": ">",
       "right_offset": "yesterday", "right_indicator": "closing price"}
    ]
  }
}"#;

const FALLING: &str = r#"{
  "name": "close falling",
  "conditions": {
    "daily": [
      {"left_offset": "today", "left_indicator": "closing price", "operator": "<",
       "right_offset": "yesterday", "right_indicator": "closing price"}
    ]
  }
}"#;

fn same_code(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{actual:?}") == format!("{expected:?}")
}

fn run_args(args: &[&str]) -> ExitCode {
    let mut argv = vec!["screener"];
    argv.extend_from_slice(args);
    run(Cli::try_parse_from(argv).unwrap())
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(screen_section: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("market.db");
        let config = format!(
            "[sqlite]\npath = {}\npool_size = 2\n\n[screen]\n{}\n",
            db.display(),
            screen_section
        );
        fs::write(dir.path().join("screener.ini"), config).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self) -> String {
        self.path("screener.ini").display().to_string()
    }

    fn write(&self, name: &str, content: &str) -> String {
        let path = self.path(name);
        fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    fn seeded(screen_section: &str) -> Self {
        let ws = Self::new(screen_section);
        let csv = ws.write("daily.csv", DAILY_CSV);
        let code = run_args(&["import", "-c", &ws.config(), "-t", "daily_deal", "-f", &csv]);
        assert!(same_code(code, ExitCode::SUCCESS));
        ws
    }
}

fn exists(path: &Path) -> bool {
    path.metadata().is_ok()
}

mod setup {
    use super::*;

    #[test]
    fn init_db_creates_database_file() {
        let ws = Workspace::new("");
        let code = run_args(&["init-db", "-c", &ws.config()]);
        assert!(same_code(code, ExitCode::SUCCESS));
        assert!(exists(&ws.path("market.db")));
    }

    #[test]
    fn import_into_unknown_table_is_store_error() {
        let ws = Workspace::new("");
        let csv = ws.write("daily.csv", DAILY_CSV);
        let code = run_args(&["import", "-c", &ws.config(), "-t", "minute_deal", "-f", &csv]);
        assert!(same_code(code, ExitCode::from(3)));
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let ws = Workspace::new("");
        let missing = ws.path("absent.ini").display().to_string();
        let code = run_args(&["init-db", "-c", &missing]);
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn missing_sqlite_path_is_config_error() {
        let ws = Workspace::new("");
        let config = ws.write("bare.ini", "[screen]\ndaily_window = 6\n");
        let code = run_args(&["init-db", "-c", &config]);
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn out_of_range_window_is_config_error() {
        let ws = Workspace::new("daily_window = 0");
        let code = run_args(&["init-db", "-c", &ws.config()]);
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn indicators_lists_catalog() {
        assert!(same_code(run_args(&["indicators", "weekly"]), ExitCode::SUCCESS));
        assert!(same_code(
            run_args(&["indicators", "fundamentals"]),
            ExitCode::SUCCESS
        ));
    }
}

mod screening {
    use super::*;

    #[test]
    fn screen_and_explain_succeed() {
        let ws = Workspace::seeded("");
        let rule = ws.write("rising.json", RISING);
        let code = run_args(&["screen", "-c", &ws.config(), "-r", &rule]);
        assert!(same_code(code, ExitCode::SUCCESS));
        let code = run_args(&[
            "explain",
            "-c",
            &ws.config(),
            "-r",
            &rule,
            "-d",
            "2024-01-03",
            "--stocks",
            "2330",
        ]);
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn unknown_indicator_is_rule_error() {
        let ws = Workspace::seeded("");
        let rule = ws.write("bad.json", &RISING.replace("closing price", "ma7"));
        let code = run_args(&["screen", "-c", &ws.config(), "-r", &rule]);
        assert!(same_code(code, ExitCode::from(4)));
    }

    #[test]
    fn duplicate_allowlist_ids_are_rejected() {
        let ws = Workspace::seeded("");
        let rule = ws.write("rising.json", RISING);
        let code = run_args(&[
            "screen",
            "-c",
            &ws.config(),
            "-r",
            &rule,
            "--stocks",
            "2330,2330",
        ]);
        assert!(same_code(code, ExitCode::from(4)));
    }

    #[test]
    fn fundamentals_without_rows_succeeds() {
        let ws = Workspace::seeded("");
        let conditions = ws.write(
            "fundamentals.json",
            r#"[{"indicator": "roe", "operator": ">", "value": "15"}]"#,
        );
        let code = run_args(&["fundamentals", "-c", &ws.config(), "--conditions", &conditions]);
        assert!(same_code(code, ExitCode::SUCCESS));
    }
}

mod backtest {
    use super::*;

    #[test]
    fn backtest_writes_trades_csv() {
        let ws = Workspace::seeded("");
        let buy = ws.write("buy.json", RISING);
        let sell = ws.write("sell.json", FALLING);
        let output = ws.path("trades.csv").display().to_string();

        let code = run_args(&[
            "backtest", "-c", &ws.config(), "--buy", &buy, "--sell", &sell, "-o", &output,
        ]);

        assert!(same_code(code, ExitCode::SUCCESS));
        let written = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines[0],
            "stock_id,entry_date,entry_price,exit_date,exit_price,return_pct"
        );
        assert_eq!(
            lines[1],
            "2330,2024-01-03,12.0000,2024-01-05,10.0000,-0.166667"
        );
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn backtest_range_excludes_trades() {
        let ws = Workspace::seeded("");
        let buy = ws.write("buy.json", RISING);
        let sell = ws.write("sell.json", FALLING);
        let output = ws.path("trades.csv").display().to_string();

        let code = run_args(&[
            "backtest",
            "-c",
            &ws.config(),
            "--buy",
            &buy,
            "--sell",
            &sell,
            "--start",
            "2024-01-05",
            "-o",
            &output,
        ]);

        assert!(same_code(code, ExitCode::SUCCESS));
        let written = fs::read_to_string(&output).unwrap();
        assert_eq!(written.lines().count(), 1);
    }
}

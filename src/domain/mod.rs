//! Core domain types and logic.

pub mod catalog;
pub mod combinator;
pub mod compiler;
pub mod date_window;
pub mod error;
pub mod fundamental;
pub mod memo;
pub mod planner;
pub mod prompt;
pub mod query;
pub mod rule_query;
pub mod settings;
pub mod simulation;
pub mod timeframe;
pub mod value;

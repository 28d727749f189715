//! Saved rules and fundamentals conditions stored as JSON files.

use crate::domain::error::ScreenerError;
use crate::domain::prompt::{FundamentalPrompt, SavedRule};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ScreenerError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| ScreenerError::RuleInvalid {
        reason: format!("{}: {}", path.display(), e),
    })
}

pub fn load_rule<P: AsRef<Path>>(path: P) -> Result<SavedRule, ScreenerError> {
    load_json(path.as_ref())
}

/// Reads a JSON array of `{indicator, operator, value}` objects.
pub fn load_fundamental_prompts<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<FundamentalPrompt>, ScreenerError> {
    load_json(path.as_ref())
}

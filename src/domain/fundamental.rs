//! In-memory fundamentals filtering.
//!
//! Fundamentals carry no time dimension, so instead of generating joins the
//! filter fetches each involved table once and evaluates conditions row by
//! row. A condition compares an indicator against a number or against another
//! indicator of the same table. Per-table results are intersected.

use crate::domain::catalog::{ComparisonOp, IndicatorCatalog};
use crate::domain::compiler::OperatorPolicy;
use crate::domain::error::ScreenerError;
use crate::domain::planner::ENTITY_COLUMN;
use crate::domain::prompt::FundamentalPrompt;
use crate::domain::value::{Row, text_column};
use crate::ports::query_port::QueryPort;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub enum FundamentalOperand {
    Number(f64),
    Column(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalCondition {
    pub table: String,
    pub column: String,
    pub operator: ComparisonOp,
    pub right: FundamentalOperand,
}

impl FundamentalCondition {
    /// NULL or non-numeric cells never satisfy a condition.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(left) = row.get(&self.column).and_then(|v| v.as_f64()) else {
            return false;
        };
        let right = match &self.right {
            FundamentalOperand::Number(n) => Some(*n),
            FundamentalOperand::Column(col) => row.get(col).and_then(|v| v.as_f64()),
        };
        right.is_some_and(|right| self.operator.apply(left, right))
    }
}

pub struct FundamentalFilter<'a, P: QueryPort> {
    port: &'a P,
    catalog: &'a IndicatorCatalog,
    policy: OperatorPolicy,
}

impl<'a, P: QueryPort> FundamentalFilter<'a, P> {
    pub fn new(port: &'a P, catalog: &'a IndicatorCatalog, policy: OperatorPolicy) -> Self {
        Self {
            port,
            catalog,
            policy,
        }
    }

    pub fn compile(&self, prompt: &FundamentalPrompt) -> Result<FundamentalCondition, ScreenerError> {
        let left = self.catalog.lookup(&prompt.indicator)?;
        let left_table = left
            .fundamental_table()
            .ok_or_else(|| ScreenerError::RuleInvalid {
                reason: format!("'{}' is not a fundamentals indicator", prompt.indicator),
            })?;
        let operator = match ComparisonOp::parse(&prompt.operator) {
            Some(op) => op,
            None if self.policy == OperatorPolicy::FallbackToEq => {
                warn!("unsupported operator '{}', falling back to '='", prompt.operator);
                ComparisonOp::Eq
            }
            None => {
                return Err(ScreenerError::UnsupportedOperator {
                    operator: prompt.operator.clone(),
                });
            }
        };
        let value = prompt.value.trim();
        let right = if let Ok(number) = value.parse::<f64>() {
            FundamentalOperand::Number(number)
        } else {
            let other = self.catalog.lookup(value)?;
            let other_table = other.fundamental_table().unwrap_or_default();
            if other_table != left_table {
                return Err(ScreenerError::CrossTableComparison {
                    left: prompt.indicator.clone(),
                    left_table: left_table.to_string(),
                    right: value.to_string(),
                    right_table: other_table.to_string(),
                });
            }
            FundamentalOperand::Column(other.physical_column.clone())
        };
        Ok(FundamentalCondition {
            table: left_table.to_string(),
            column: left.physical_column.clone(),
            operator,
            right,
        })
    }

    /// Conditions grouped by owning table; every prompt compiles before any fetch.
    pub fn compile_all(
        &self,
        prompts: &[FundamentalPrompt],
    ) -> Result<BTreeMap<String, Vec<FundamentalCondition>>, ScreenerError> {
        if prompts.is_empty() {
            return Err(ScreenerError::NoActiveConditions);
        }
        let mut grouped: BTreeMap<String, Vec<FundamentalCondition>> = BTreeMap::new();
        for prompt in prompts {
            let condition = self.compile(prompt)?;
            grouped
                .entry(condition.table.clone())
                .or_default()
                .push(condition);
        }
        Ok(grouped)
    }

    /// Entity ids satisfying every prompt, sorted.
    pub async fn filter(
        &self,
        prompts: &[FundamentalPrompt],
        allowlist: Option<&[String]>,
    ) -> Result<Vec<String>, ScreenerError> {
        let grouped = self.compile_all(prompts)?;
        let mut per_table: Vec<BTreeSet<String>> = Vec::with_capacity(grouped.len());
        for (table, conditions) in &grouped {
            let rows = self.port.execute(&format!("SELECT * FROM {table}")).await?;
            let ids: BTreeSet<String> = rows
                .iter()
                .filter(|row| conditions.iter().all(|c| c.matches(row)))
                .filter_map(|row| text_column(row, ENTITY_COLUMN))
                .filter(|id| allowlist.is_none_or(|allowed| allowed.contains(id)))
                .collect();
            debug!("{table}: {} of {} rows qualify", ids.len(), rows.len());
            per_table.push(ids);
        }
        let mut sets = per_table.into_iter();
        let first = sets.next().unwrap_or_default();
        let result = sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect());
        Ok(result.into_iter().collect())
    }
}

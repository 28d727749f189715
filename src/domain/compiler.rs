//! Prompt compilation.
//!
//! Turns one [`Prompt`] into a [`CompiledCondition`]: two operand references
//! and a comparison operator. Operand references are structural (timeframe,
//! offset, table kind) so the planner never has to re-parse alias text.

use crate::domain::catalog::{Catalogs, ComparisonOp, TableGroup};
use crate::domain::error::ScreenerError;
use crate::domain::prompt::{OffsetLabel, Prompt};
use crate::domain::timeframe::{TableKind, Timeframe};
use log::warn;

/// Where a column reference points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AliasRef {
    /// A per-timeframe table shifted back by `offset` periods.
    Shifted { offset: usize, kind: TableKind },
    /// A fundamentals table, joined on entity id only.
    Table(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub timeframe: Timeframe,
    pub target: AliasRef,
    pub column: String,
}

impl ColumnRef {
    pub fn shifted(timeframe: Timeframe, offset: usize, kind: TableKind, column: &str) -> Self {
        Self {
            timeframe,
            target: AliasRef::Shifted { offset, kind },
            column: column.to_string(),
        }
    }

    pub fn table(timeframe: Timeframe, table: &str, column: &str) -> Self {
        Self {
            timeframe,
            target: AliasRef::Table(table.to_string()),
            column: column.to_string(),
        }
    }

    /// Rendered alias: `{offset}{suffix}` or the fundamentals table name.
    pub fn alias(&self) -> String {
        match &self.target {
            AliasRef::Shifted { offset, kind } => self.timeframe.alias(*offset, *kind),
            AliasRef::Table(table) => table.clone(),
        }
    }

    pub fn offset(&self) -> Option<usize> {
        match self.target {
            AliasRef::Shifted { offset, .. } => Some(offset),
            AliasRef::Table(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Column(ColumnRef),
    /// Raw text the user typed; coercion is left to the data store.
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledCondition {
    pub left: ColumnRef,
    pub operator: ComparisonOp,
    pub right: Operand,
}

impl CompiledCondition {
    /// Every column reference the condition touches, left first.
    pub fn column_refs(&self) -> impl Iterator<Item = &ColumnRef> {
        let right = match &self.right {
            Operand::Column(col) => Some(col),
            Operand::Literal(_) => None,
        };
        std::iter::once(&self.left).chain(right)
    }
}

/// What to do with operator text outside the five-symbol vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatorPolicy {
    #[default]
    Strict,
    /// Replace unrecognised operators with `=` and log a warning.
    FallbackToEq,
}

pub struct ExpressionCompiler<'a> {
    catalogs: &'a Catalogs,
    policy: OperatorPolicy,
}

impl<'a> ExpressionCompiler<'a> {
    pub fn new(catalogs: &'a Catalogs, policy: OperatorPolicy) -> Self {
        Self { catalogs, policy }
    }

    pub fn compile(
        &self,
        timeframe: Timeframe,
        prompt: &Prompt,
    ) -> Result<CompiledCondition, ScreenerError> {
        let left = self.resolve_column(timeframe, &prompt.left_offset, &prompt.left_indicator)?;
        let operator = self.resolve_operator(&prompt.operator)?;
        let right = if prompt.is_literal() {
            Operand::Literal(prompt.right_indicator.clone())
        } else {
            Operand::Column(self.resolve_column(
                timeframe,
                &prompt.right_offset,
                &prompt.right_indicator,
            )?)
        };
        Ok(CompiledCondition {
            left,
            operator,
            right,
        })
    }

    /// Compiles every prompt of one timeframe; the first failure aborts the batch.
    pub fn compile_all(
        &self,
        timeframe: Timeframe,
        prompts: &[Prompt],
    ) -> Result<Vec<CompiledCondition>, ScreenerError> {
        prompts
            .iter()
            .map(|prompt| self.compile(timeframe, prompt))
            .collect()
    }

    fn resolve_column(
        &self,
        timeframe: Timeframe,
        offset_label: &str,
        indicator: &str,
    ) -> Result<ColumnRef, ScreenerError> {
        let unknown_offset = || ScreenerError::UnknownOffset {
            timeframe,
            label: offset_label.to_string(),
        };
        match OffsetLabel::resolve(timeframe, offset_label).ok_or_else(unknown_offset)? {
            OffsetLabel::Periods(offset) => {
                let descriptor = self.catalogs.lookup(timeframe, indicator)?;
                match &descriptor.table_group {
                    TableGroup::Timeframe(kind) => Ok(ColumnRef::shifted(
                        timeframe,
                        offset,
                        *kind,
                        &descriptor.physical_column,
                    )),
                    TableGroup::Fundamental(table) => {
                        Ok(ColumnRef::table(timeframe, table, &descriptor.physical_column))
                    }
                }
            }
            OffsetLabel::Other => {
                let descriptor = self.catalogs.fundamentals.lookup(indicator)?;
                let table = descriptor.fundamental_table().ok_or_else(|| {
                    ScreenerError::RuleInvalid {
                        reason: format!("indicator '{indicator}' has no fundamentals table"),
                    }
                })?;
                Ok(ColumnRef::table(timeframe, table, &descriptor.physical_column))
            }
            // A literal is only meaningful on the right-hand side.
            OffsetLabel::CustomValue => Err(unknown_offset()),
        }
    }

    fn resolve_operator(&self, text: &str) -> Result<ComparisonOp, ScreenerError> {
        match ComparisonOp::parse(text) {
            Some(op) => Ok(op),
            None => match self.policy {
                OperatorPolicy::Strict => Err(ScreenerError::UnsupportedOperator {
                    operator: text.to_string(),
                }),
                OperatorPolicy::FallbackToEq => {
                    warn!("unsupported operator '{text}', falling back to '='");
                    Ok(ComparisonOp::Eq)
                }
            },
        }
    }
}

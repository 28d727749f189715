//! Join planning for one timeframe.
//!
//! The offset-0 raw table is the anchor; its derived table is always
//! left-joined. Every other referenced `(offset, kind)` pair gets exactly one
//! join bound to that offset's date from the [`DateWindow`]: raw joins are
//! inner, derived joins are left. Fundamentals tables referenced through the
//! `other` offset are left-joined on entity id only.
//!
//! Offsets missing from a short window lose their join, and every comparison
//! touching such an offset renders as constant false.

use crate::domain::compiler::{AliasRef, ColumnRef, CompiledCondition, Operand};
use crate::domain::date_window::DateWindow;
use crate::domain::query::{Expr, Join, JoinKind, Predicate, SelectQuery};
use crate::domain::timeframe::{TableKind, Timeframe};
use log::warn;
use std::collections::BTreeSet;

/// Entity identifier column shared by every table.
pub const ENTITY_COLUMN: &str = "stock_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinAlias {
    pub offset: usize,
    pub kind: TableKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedJoin {
    pub alias: JoinAlias,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub timeframe: Timeframe,
    /// `None` when the window is empty; the query then matches nothing.
    pub anchor_date: Option<String>,
    /// Shifted joins sorted by offset, raw before derived.
    pub joins: Vec<PlannedJoin>,
    /// Offsets referenced by conditions but absent from the window.
    pub dropped: Vec<JoinAlias>,
    pub fundamental_tables: Vec<String>,
    pub allowlist: Option<Vec<String>>,
    conditions: Vec<CompiledCondition>,
}

/// Distinct non-anchor shifted aliases referenced by `conditions`, sorted.
pub fn referenced_aliases(conditions: &[CompiledCondition]) -> BTreeSet<JoinAlias> {
    conditions
        .iter()
        .flat_map(CompiledCondition::column_refs)
        .filter_map(|col| match col.target {
            AliasRef::Shifted { offset, kind } if offset > 0 => Some(JoinAlias { offset, kind }),
            _ => None,
        })
        .collect()
}

fn referenced_tables(conditions: &[CompiledCondition]) -> BTreeSet<String> {
    conditions
        .iter()
        .flat_map(CompiledCondition::column_refs)
        .filter_map(|col| match &col.target {
            AliasRef::Table(table) => Some(table.clone()),
            AliasRef::Shifted { .. } => None,
        })
        .collect()
}

pub struct JoinPlanner;

impl JoinPlanner {
    pub fn plan(
        timeframe: Timeframe,
        conditions: &[CompiledCondition],
        window: &DateWindow,
        allowlist: Option<&[String]>,
    ) -> QueryPlan {
        let mut joins = Vec::new();
        let mut dropped = Vec::new();
        for alias in referenced_aliases(conditions) {
            match window.date_at(alias.offset) {
                Some(date) => joins.push(PlannedJoin {
                    alias,
                    date: date.to_string(),
                }),
                None => dropped.push(alias),
            }
        }
        if !dropped.is_empty() {
            warn!(
                "{timeframe} window holds {} dates; dropping joins for offsets {:?}",
                window.len(),
                dropped.iter().map(|a| a.offset).collect::<BTreeSet<_>>()
            );
        }
        QueryPlan {
            timeframe,
            anchor_date: window.anchor().map(str::to_string),
            joins,
            dropped,
            fundamental_tables: referenced_tables(conditions).into_iter().collect(),
            allowlist: allowlist.map(<[String]>::to_vec),
            conditions: conditions.to_vec(),
        }
    }
}

impl QueryPlan {
    fn anchor_alias(&self, kind: TableKind) -> String {
        self.timeframe.alias(0, kind)
    }

    fn entity(&self, alias: &str) -> Expr {
        Expr::column(alias, ENTITY_COLUMN)
    }

    fn is_dropped(&self, col: &ColumnRef) -> bool {
        match col.target {
            AliasRef::Shifted { offset, kind } => self.dropped.contains(&JoinAlias { offset, kind }),
            AliasRef::Table(_) => false,
        }
    }

    fn condition_predicate(&self, condition: &CompiledCondition) -> Predicate {
        if condition.column_refs().any(|col| self.is_dropped(col)) {
            return Predicate::Never;
        }
        let column = |col: &ColumnRef| Expr::column(&col.alias(), &col.column);
        let right = match &condition.right {
            Operand::Column(col) => column(col),
            Operand::Literal(text) => Expr::literal(text),
        };
        Predicate::compare(column(&condition.left), condition.operator, right)
    }

    pub fn to_query(&self) -> SelectQuery {
        let tf = self.timeframe;
        let time = tf.time_column();
        let anchor = self.anchor_alias(TableKind::Raw);
        let anchor_sk = self.anchor_alias(TableKind::Derived);

        let mut joins = vec![Join {
            kind: JoinKind::Left,
            table: tf.table(TableKind::Derived).to_string(),
            alias: anchor_sk.clone(),
            on: Predicate::And(vec![
                Predicate::eq(self.entity(&anchor), self.entity(&anchor_sk)),
                Predicate::eq(Expr::column(&anchor, time), Expr::column(&anchor_sk, time)),
            ]),
        }];
        for planned in &self.joins {
            let alias = tf.alias(planned.alias.offset, planned.alias.kind);
            let kind = match planned.alias.kind {
                TableKind::Raw => JoinKind::Inner,
                TableKind::Derived => JoinKind::Left,
            };
            joins.push(Join {
                kind,
                table: tf.table(planned.alias.kind).to_string(),
                on: Predicate::And(vec![
                    Predicate::eq(self.entity(&anchor), self.entity(&alias)),
                    Predicate::eq(Expr::column(&alias, time), Expr::literal(&planned.date)),
                ]),
                alias,
            });
        }
        for table in &self.fundamental_tables {
            joins.push(Join {
                kind: JoinKind::Left,
                table: table.clone(),
                alias: table.clone(),
                on: Predicate::eq(self.entity(&anchor), self.entity(table)),
            });
        }

        let mut filter = vec![match &self.anchor_date {
            Some(date) => Predicate::eq(Expr::column(&anchor, time), Expr::literal(date)),
            None => Predicate::Never,
        }];
        if let Some(ids) = &self.allowlist {
            filter.push(Predicate::InList {
                expr: self.entity(&anchor),
                values: ids.clone(),
            });
        }
        filter.extend(self.conditions.iter().map(|c| self.condition_predicate(c)));

        SelectQuery {
            select: self.entity(&anchor),
            select_as: ENTITY_COLUMN.to_string(),
            from_table: tf.table(TableKind::Raw).to_string(),
            from_alias: anchor,
            joins,
            filter: Predicate::And(filter),
        }
    }

    pub fn render(&self) -> String {
        self.to_query().render()
    }
}

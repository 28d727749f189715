//! Small SELECT AST and its SQL rendering.
//!
//! Only the shapes the planner produces are modelled: one selected column,
//! one anchor table, a list of joins and a predicate tree. Rendering is the
//! last step; nothing downstream inspects the text.

use crate::domain::catalog::ComparisonOp;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column { alias: String, column: String },
    Literal(String),
}

impl Expr {
    pub fn column(alias: &str, column: &str) -> Self {
        Expr::Column {
            alias: alias.to_string(),
            column: column.to_string(),
        }
    }

    pub fn literal(text: &str) -> Self {
        Expr::Literal(text.to_string())
    }

    fn render(&self, out: &mut String) {
        match self {
            Expr::Column { alias, column } => {
                let _ = write!(out, "{}.{}", quote_ident(alias), column);
            }
            Expr::Literal(text) => out.push_str(&quote_literal(text)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Compare {
        left: Expr,
        op: ComparisonOp,
        right: Expr,
    },
    InList {
        expr: Expr,
        values: Vec<String>,
    },
    /// Constant false.
    Never,
}

impl Predicate {
    pub fn compare(left: Expr, op: ComparisonOp, right: Expr) -> Self {
        Predicate::Compare { left, op, right }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Predicate::Compare {
            left,
            op: ComparisonOp::Eq,
            right,
        }
    }

    fn render(&self, out: &mut String, nested: bool) {
        match self {
            Predicate::And(parts) => render_list(out, parts, " AND ", "1 = 1", nested),
            Predicate::Compare { left, op, right } => {
                left.render(out);
                let _ = write!(out, " {} ", op.symbol());
                right.render(out);
            }
            Predicate::InList { expr, values } => {
                if values.is_empty() {
                    out.push_str("1 = 0");
                    return;
                }
                expr.render(out);
                out.push_str(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&quote_literal(value));
                }
                out.push(')');
            }
            Predicate::Never => out.push_str("1 = 0"),
        }
    }
}

fn render_list(out: &mut String, parts: &[Predicate], sep: &str, empty: &str, nested: bool) {
    match parts {
        [] => out.push_str(empty),
        [single] => single.render(out, nested),
        _ => {
            if nested {
                out.push('(');
            }
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(sep);
                }
                part.render(out, true);
            }
            if nested {
                out.push(')');
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub on: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub select: Expr,
    pub select_as: String,
    pub from_table: String,
    pub from_alias: String,
    pub joins: Vec<Join>,
    pub filter: Predicate,
}

impl SelectQuery {
    pub fn render(&self) -> String {
        let mut out = String::from("SELECT ");
        self.select.render(&mut out);
        let _ = write!(
            out,
            " AS {}\nFROM {} {}",
            self.select_as,
            self.from_table,
            quote_ident(&self.from_alias)
        );
        for join in &self.joins {
            let _ = write!(
                out,
                "\n{} {} {} ON ",
                join.kind.keyword(),
                join.table,
                quote_ident(&join.alias)
            );
            join.on.render(&mut out, false);
        }
        out.push_str("\nWHERE ");
        self.filter.render(&mut out, false);
        out
    }
}

/// Double-quoted identifier; aliases start with a digit so they always need it.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

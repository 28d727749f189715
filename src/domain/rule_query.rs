//! Rule query assembly: compile, resolve windows, plan, combine.

use crate::domain::catalog::Catalogs;
use crate::domain::combinator::{CombineMode, combine};
use crate::domain::compiler::{CompiledCondition, ExpressionCompiler};
use crate::domain::date_window::{DateWindow, DateWindowResolver};
use crate::domain::error::ScreenerError;
use crate::domain::planner::{ENTITY_COLUMN, JoinPlanner, QueryPlan};
use crate::domain::prompt::RuleConditions;
use crate::domain::settings::ScreenSettings;
use crate::domain::timeframe::Timeframe;
use crate::domain::value::text_column;
use crate::ports::query_port::QueryPort;
use log::debug;
use std::collections::HashMap;

/// Windows already resolved for one anchor, keyed by timeframe.
pub type ResolvedWindows = HashMap<Timeframe, DateWindow>;

pub struct RuleQueryBuilder<'a, P: QueryPort> {
    port: &'a P,
    catalogs: &'a Catalogs,
    settings: &'a ScreenSettings,
    trading_dates: &'a [String],
    mode: CombineMode,
}

impl<'a, P: QueryPort> RuleQueryBuilder<'a, P> {
    pub fn new(
        port: &'a P,
        catalogs: &'a Catalogs,
        settings: &'a ScreenSettings,
        trading_dates: &'a [String],
    ) -> Self {
        Self {
            port,
            catalogs,
            settings,
            trading_dates,
            mode: CombineMode::Intersect,
        }
    }

    pub fn with_mode(mut self, mode: CombineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Compiles every active timeframe up front so a bad prompt fails before
    /// any query reaches the data store.
    fn compile(
        &self,
        conditions: &RuleConditions,
    ) -> Result<Vec<(Timeframe, Vec<CompiledCondition>)>, ScreenerError> {
        if conditions.is_empty() {
            return Err(ScreenerError::NoActiveConditions);
        }
        let compiler = ExpressionCompiler::new(self.catalogs, self.settings.operator_policy);
        conditions
            .active_timeframes()
            .into_iter()
            .map(|tf| Ok((tf, compiler.compile_all(tf, conditions.for_timeframe(tf))?)))
            .collect()
    }

    /// One plan per active timeframe, hourly/daily/weekly order.
    pub async fn plans(
        &self,
        conditions: &RuleConditions,
        anchor: &str,
        allowlist: Option<&[String]>,
    ) -> Result<Vec<QueryPlan>, ScreenerError> {
        self.plans_with(&mut ResolvedWindows::new(), conditions, anchor, allowlist)
            .await
    }

    /// Like [`plans`](Self::plans), but takes windows from `windows` when
    /// present and records every window it has to resolve. `windows` must
    /// only hold windows for `anchor`.
    pub async fn plans_with(
        &self,
        windows: &mut ResolvedWindows,
        conditions: &RuleConditions,
        anchor: &str,
        allowlist: Option<&[String]>,
    ) -> Result<Vec<QueryPlan>, ScreenerError> {
        let compiled = self.compile(conditions)?;
        let resolver = DateWindowResolver::new(self.port, self.settings, self.trading_dates);
        let mut plans = Vec::with_capacity(compiled.len());
        for (tf, conds) in &compiled {
            let window = match windows.remove(tf) {
                Some(window) => window,
                None => resolver.resolve(*tf, anchor).await?,
            };
            plans.push(JoinPlanner::plan(*tf, conds, &window, allowlist));
            windows.insert(window.timeframe(), window);
        }
        Ok(plans)
    }

    /// Combined query text for the rule at `anchor`.
    pub async fn build(
        &self,
        conditions: &RuleConditions,
        anchor: &str,
        allowlist: Option<&[String]>,
    ) -> Result<String, ScreenerError> {
        self.build_with(&mut ResolvedWindows::new(), conditions, anchor, allowlist)
            .await
    }

    async fn build_with(
        &self,
        windows: &mut ResolvedWindows,
        conditions: &RuleConditions,
        anchor: &str,
        allowlist: Option<&[String]>,
    ) -> Result<String, ScreenerError> {
        let queries: Vec<String> = self
            .plans_with(windows, conditions, anchor, allowlist)
            .await?
            .iter()
            .map(QueryPlan::render)
            .collect();
        Ok(combine(&queries, self.mode))
    }

    /// Sorted, de-duplicated entity ids satisfying the rule at `anchor`.
    pub async fn qualifying_ids(
        &self,
        conditions: &RuleConditions,
        anchor: &str,
        allowlist: Option<&[String]>,
    ) -> Result<Vec<String>, ScreenerError> {
        self.qualifying_ids_with(&mut ResolvedWindows::new(), conditions, anchor, allowlist)
            .await
    }

    /// [`qualifying_ids`](Self::qualifying_ids) sharing resolved windows
    /// across calls for the same anchor.
    pub async fn qualifying_ids_with(
        &self,
        windows: &mut ResolvedWindows,
        conditions: &RuleConditions,
        anchor: &str,
        allowlist: Option<&[String]>,
    ) -> Result<Vec<String>, ScreenerError> {
        let sql = self.build_with(windows, conditions, anchor, allowlist).await?;
        debug!("rule query at {anchor}:\n{sql}");
        let rows = self.port.execute(&sql).await?;
        let mut ids: Vec<String> = rows
            .iter()
            .filter_map(|row| text_column(row, ENTITY_COLUMN))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

//! SELECT execution over an in-memory table
//!
//! A [`SelectExecutor`] holds the parsed select list and WHERE formula. It
//! can be executed repeatedly; every run starts with fresh aggregate state.

use crate::column::ColumnDataGetterFactory;
use crate::column_parser::{SqlFormulaInfo, parse_columns};
use crate::formula_parser::parse_formula;
use crate::statement::OrderTerm;
use crate::tree::Formula;
use itemsql_core::{
    EngineConfig, Error, ItemDataPtr, ItemGroup, ItemGroupPtr, ItemKey, ItemTable, Result,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Counters collected while executing a select
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectStats {
    pub rows_scanned: usize,
    pub rows_selected: usize,
    pub rows_returned: usize,
    pub duplicates_removed: usize,
    pub aggregate: bool,
}

/// Output of a select
#[derive(Debug)]
pub struct SelectResult {
    pub columns: Vec<String>,
    pub table: ItemTable,
    pub stats: SelectStats,
}

impl SelectResult {
    /// Every output value in its text form, row by row
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.table
            .rows()
            .iter()
            .map(|row| row.items().iter().map(|item| item.get_string()).collect())
            .collect()
    }
}

/// A parsed select statement
#[derive(Debug)]
pub struct SelectExecutor {
    columns: Vec<SqlFormulaInfo>,
    where_formula: Option<Formula>,
    distinct: bool,
    config: EngineConfig,
    wildcard_names: Vec<String>,
    order_by: Vec<OrderTerm>,
    limit: Option<usize>,
}

impl SelectExecutor {
    /// Parse the select list and the optional WHERE condition
    pub fn parse(
        columns: &str,
        where_clause: Option<&str>,
        factory: ColumnDataGetterFactory,
        config: &EngineConfig,
    ) -> Result<Self> {
        let (columns, distinct) = parse_columns(columns, Some(factory.clone()))?;

        let aggregate = columns.iter().any(|column| column.has_statistical_func);
        if aggregate && columns.iter().any(SqlFormulaInfo::is_wildcard) {
            return Err(Error::QueryParse(
                "'*' cannot be selected together with aggregate functions".to_string(),
            ));
        }

        let where_formula = match where_clause.map(str::trim) {
            Some(text) if !text.is_empty() => {
                let formula = parse_formula(text, Some(factory))?;
                if formula.has_statistical_func() {
                    return Err(Error::QueryParse(
                        "Aggregate functions are not allowed in WHERE".to_string(),
                    ));
                }
                if formula.is_wildcard() {
                    return Err(Error::QueryParse("'*' is not a condition".to_string()));
                }
                Some(formula)
            }
            _ => None,
        };

        debug!(
            "Parsed select: {} column(s), distinct: {}, where: {}",
            columns.len(),
            distinct,
            where_formula.is_some()
        );

        Ok(Self {
            columns,
            where_formula,
            distinct,
            config: config.clone(),
            wildcard_names: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        })
    }

    /// Names reported for a `*` column
    pub fn with_wildcard_names(mut self, names: Vec<String>) -> Self {
        self.wildcard_names = names;
        self
    }

    /// Sort the output by these columns, first term first
    pub fn with_order_by(mut self, order_by: Vec<OrderTerm>) -> Self {
        self.order_by = order_by;
        self
    }

    /// Keep at most `limit` output rows, applied after sorting
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn columns(&self) -> &[SqlFormulaInfo] {
        &self.columns
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn has_statistical_func(&self) -> bool {
        self.columns.iter().any(|column| column.has_statistical_func)
    }

    /// Output column names: alias or expression, wildcards expanded
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for column in &self.columns {
            if column.is_wildcard() && !self.wildcard_names.is_empty() {
                names.extend(self.wildcard_names.iter().cloned());
            } else {
                names.push(column.name().to_string());
            }
        }
        names
    }

    fn is_selected(&mut self, row: &ItemGroup) -> Result<bool> {
        let Some(formula) = self.where_formula.as_mut() else {
            return Ok(true);
        };
        let result = formula.evaluate(row)?;
        if result.is_null() {
            return Ok(false);
        }
        result.as_bool().ok_or_else(|| {
            Error::QueryExecution(format!(
                "WHERE condition must be Boolean, not {}",
                result.data_type()
            ))
        })
    }

    fn project(&mut self, row: &ItemGroup) -> Result<Vec<ItemDataPtr>> {
        let mut items = Vec::with_capacity(self.columns.len());
        for column in &mut self.columns {
            if column.is_wildcard() {
                items.extend(row.items());
            } else {
                items.push(column.formula.evaluate(row)?);
            }
        }
        Ok(items)
    }

    fn emit(
        &self,
        output: &ItemTable,
        items: Vec<ItemDataPtr>,
        seen: &mut HashSet<Vec<ItemKey>>,
        stats: &mut SelectStats,
    ) -> Result<()> {
        if self.distinct {
            let key: Vec<ItemKey> = items.iter().map(|item| item.key()).collect();
            if !seen.insert(key) {
                stats.duplicates_removed += 1;
                return Ok(());
            }
        }
        if let Some(limit) = self.config.max_result_rows {
            if output.len() >= limit {
                return Err(Error::ResultLimitExceeded { limit });
            }
        }
        let row: ItemGroupPtr = Arc::new(ItemGroup::from_items_with_registry(
            items,
            output.registry().clone(),
        ));
        output.add(row)?;
        stats.rows_returned += 1;
        Ok(())
    }

    /// Output column index an ORDER BY term refers to.
    ///
    /// An exact name or alias wins; otherwise an unqualified term may match
    /// the column part of a single `table.column` name.
    fn order_column(names: &[String], term: &OrderTerm) -> Result<usize> {
        if let Some(index) = names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(&term.column))
        {
            return Ok(index);
        }
        let suffixed: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, name)| {
                name.rsplit_once('.')
                    .is_some_and(|(_, column)| column.eq_ignore_ascii_case(&term.column))
            })
            .map(|(index, _)| index)
            .collect();
        match suffixed.as_slice() {
            [index] => Ok(*index),
            [] => Err(Error::QueryParse(format!(
                "ORDER BY column is not selected: {}",
                term.column
            ))),
            _ => Err(Error::QueryParse(format!(
                "Ambiguous ORDER BY column: {}",
                term.column
            ))),
        }
    }

    fn order_and_limit(&self, output: ItemTable, stats: &mut SelectStats) -> Result<ItemTable> {
        if self.order_by.is_empty() && self.limit.is_none() {
            return Ok(output);
        }
        let names = self.column_names();
        let keys = self
            .order_by
            .iter()
            .map(|term| Ok((Self::order_column(&names, term)?, term.descending)))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = output.rows();
        rows.sort_by(|a, b| {
            for (index, descending) in &keys {
                let ordering = match (a.get_item_at(*index), b.get_item_at(*index)) {
                    (Some(x), Some(y)) => x.sort_cmp(&y),
                    _ => Ordering::Equal,
                };
                let ordering = if *descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        let ordered = ItemTable::with_config(&self.config);
        for row in rows {
            ordered.add(row)?;
        }
        stats.rows_returned = ordered.len();
        Ok(ordered)
    }

    /// Run the select over every row of `source`
    pub fn execute(&mut self, source: &ItemTable) -> Result<SelectResult> {
        for column in &mut self.columns {
            column.formula.reset_statistics();
        }

        let aggregate = self.has_statistical_func();
        let output = ItemTable::with_config(&self.config);
        let mut stats = SelectStats {
            aggregate,
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let mut last_row: Option<ItemGroupPtr> = None;

        for row in source.rows() {
            stats.rows_scanned += 1;
            if !self.is_selected(&row)? {
                continue;
            }
            stats.rows_selected += 1;

            if aggregate {
                for column in &mut self.columns {
                    column.formula.accumulate(&row)?;
                }
                last_row = Some(row);
            } else {
                let items = self.project(&row)?;
                self.emit(&output, items, &mut seen, &mut stats)?;
            }
        }

        if aggregate {
            let mut items = Vec::with_capacity(self.columns.len());
            for column in &self.columns {
                items.push(column.formula.snapshot(last_row.as_deref())?);
            }
            self.emit(&output, items, &mut seen, &mut stats)?;
        }

        let output = self.order_and_limit(output, &mut stats)?;

        info!(
            "Select scanned {} row(s), returned {}",
            stats.rows_scanned, stats.rows_returned
        );

        Ok(SelectResult {
            columns: self.column_names(),
            table: output,
            stats,
        })
    }
}

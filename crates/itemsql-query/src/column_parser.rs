//! SELECT list parser
//!
//! Splits a comma-separated select list into one formula per column. Each
//! column is parsed by its own [`SqlFormulaParser`]; this parser only watches
//! for the commas that end a column, a leading `DISTINCT` and `AS` aliases.

use crate::column::ColumnDataGetterFactory;
use crate::formula_parser::SqlFormulaParser;
use crate::scanner::{SeparatedWordSink, SeparatorChecker};
use crate::tree::Formula;
use itemsql_core::{Error, Result};
use tracing::debug;

/// One parsed select column
#[derive(Debug)]
pub struct SqlFormulaInfo {
    pub formula: Formula,
    /// Source text with whitespace collapsed
    pub expression: String,
    pub alias: Option<String>,
    pub has_statistical_func: bool,
}

impl SqlFormulaInfo {
    /// Name of the column in the output: the alias if given
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.expression)
    }

    pub fn is_wildcard(&self) -> bool {
        self.formula.is_wildcard()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AliasState {
    None,
    Expecting,
    Named(String),
}

/// Parser for a whole select list
pub struct SqlColumnParser {
    current: SqlFormulaParser,
    factory: Option<ColumnDataGetterFactory>,
    columns: Vec<SqlFormulaInfo>,
    expression: String,
    depth: usize,
    alias: AliasState,
    distinct: bool,
    error: Option<String>,
}

impl Default for SqlColumnParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlColumnParser {
    pub fn new() -> Self {
        Self {
            current: SqlFormulaParser::new(),
            factory: None,
            columns: Vec::new(),
            expression: String::new(),
            depth: 0,
            alias: AliasState::None,
            distinct: false,
            error: None,
        }
    }

    pub fn set_column_data_getter_factory(&mut self, factory: ColumnDataGetterFactory) {
        self.current.set_column_data_getter_factory(factory.clone());
        self.factory = Some(factory);
    }

    pub fn columns(&self) -> &[SqlFormulaInfo] {
        &self.columns
    }

    pub fn take_columns(&mut self) -> Vec<SqlFormulaInfo> {
        std::mem::take(&mut self.columns)
    }

    /// True if the list started with `DISTINCT`
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    fn check_error(&self) -> Result<()> {
        match &self.error {
            Some(message) => Err(Error::QueryParse(message.clone())),
            None => Ok(()),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.error.is_none() {
                let message = match e {
                    Error::QueryParse(message) => message.clone(),
                    other => other.to_string(),
                };
                debug!("Column list parse failed: {}", message);
                self.error = Some(message);
            }
        }
        result
    }

    fn at_column_start(&self) -> bool {
        self.expression.trim().is_empty()
    }

    fn after_alias(&self, piece: &str) -> Result<()> {
        match &self.alias {
            AliasState::Named(alias) => Err(Error::QueryParse(format!(
                "Unexpected '{}' after alias {}",
                piece, alias
            ))),
            _ => Ok(()),
        }
    }

    fn add_word(&mut self, word: &str) -> Result<()> {
        if self.current.in_quote() {
            self.expression.push_str(word);
            return self.current.add(word);
        }
        self.after_alias(word)?;

        if self.alias == AliasState::Expecting {
            self.alias = AliasState::Named(word.to_string());
            return Ok(());
        }
        if self.depth == 0 && word.eq_ignore_ascii_case("as") {
            if self.at_column_start() {
                return Err(Error::QueryParse("No expression before AS".to_string()));
            }
            self.alias = AliasState::Expecting;
            return Ok(());
        }
        if self.columns.is_empty()
            && self.at_column_start()
            && !self.distinct
            && word.eq_ignore_ascii_case("distinct")
        {
            self.distinct = true;
            return Ok(());
        }

        self.expression.push_str(word);
        self.current.add(word)
    }

    fn separator(&mut self, separator: char) -> Result<()> {
        if self.current.in_quote() {
            self.expression.push(separator);
            return self.current.on_separator(separator);
        }

        if separator.is_whitespace() {
            if !self.expression.ends_with(' ') {
                self.expression.push(' ');
            }
            return self.current.on_separator(separator);
        }
        if separator == ',' && self.depth == 0 {
            return self.finish_column();
        }
        self.after_alias(&separator.to_string())?;
        if self.alias == AliasState::Expecting {
            return Err(Error::QueryParse(format!(
                "Expected alias name after AS, found '{}'",
                separator
            )));
        }

        match separator {
            '(' => self.depth += 1,
            ')' => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.expression.push(separator);
        self.current.on_separator(separator)
    }

    fn finish_column(&mut self) -> Result<()> {
        if self.at_column_start() {
            return Err(Error::QueryParse("Empty column in select list".to_string()));
        }
        let alias = match std::mem::replace(&mut self.alias, AliasState::None) {
            AliasState::Named(alias) => Some(alias),
            AliasState::Expecting => {
                return Err(Error::QueryParse("Missing alias name after AS".to_string()));
            }
            AliasState::None => None,
        };

        self.current.close()?;
        let mut parser = SqlFormulaParser::new();
        if let Some(factory) = &self.factory {
            parser.set_column_data_getter_factory(factory.clone());
        }
        let mut finished = std::mem::replace(&mut self.current, parser);

        let expression = std::mem::take(&mut self.expression).trim().to_string();
        self.depth = 0;
        self.columns.push(SqlFormulaInfo {
            has_statistical_func: finished.has_statistical_func(),
            formula: finished.take_formula(),
            expression,
            alias,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.current.in_quote() {
            return Err(Error::QueryParse("Quotation is not closed.".to_string()));
        }
        if self.columns.is_empty() && self.at_column_start() {
            return Err(Error::QueryParse("No column is specified".to_string()));
        }
        self.finish_column()
    }
}

impl SeparatedWordSink for SqlColumnParser {
    fn separators(&self) -> &SeparatorChecker {
        self.current.separators()
    }

    fn add(&mut self, word: &str) -> Result<()> {
        self.check_error()?;
        let result = self.add_word(word);
        self.record(result)
    }

    fn on_separator(&mut self, separator: char) -> Result<()> {
        self.check_error()?;
        let result = self.separator(separator);
        self.record(result)
    }

    fn close(&mut self) -> Result<()> {
        self.check_error()?;
        let result = self.finish();
        self.record(result)
    }
}

/// Parse a select list in one go
pub fn parse_columns(
    text: &str,
    factory: Option<ColumnDataGetterFactory>,
) -> Result<(Vec<SqlFormulaInfo>, bool)> {
    let mut parser = SqlColumnParser::new();
    if let Some(factory) = factory {
        parser.set_column_data_getter_factory(factory);
    }
    parser.parse(text)?;
    let distinct = parser.is_distinct();
    Ok((parser.take_columns(), distinct))
}

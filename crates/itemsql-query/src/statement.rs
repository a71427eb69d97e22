//! SELECT statement splitter
//!
//! Cuts a whole `SELECT ... FROM ... [WHERE ...] [ORDER BY ...] [LIMIT n]`
//! statement into its sections. Section keywords are only recognized outside
//! quotes and parentheses, and each section may appear once, in that order.
//! The select list and WHERE text are kept as text for their own parsers.

use crate::from_parser::{TableFormula, parse_from};
use crate::scanner::{Scanned, SeparatorChecker, WordReader};
use itemsql_core::{Error, Result};
use tracing::debug;

const STATEMENT_SEPARATORS: &str = " \t\r\n(),'";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Select,
    From,
    Where,
    GroupBy,
    OrderBy,
    Limit,
}

impl Section {
    fn keyword(&self) -> &'static str {
        match self {
            Section::Select => "SELECT",
            Section::From => "FROM",
            Section::Where => "WHERE",
            Section::GroupBy => "GROUP BY",
            Section::OrderBy => "ORDER BY",
            Section::Limit => "LIMIT",
        }
    }
}

/// One `ORDER BY` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    /// Output column name or alias
    pub column: String,
    pub descending: bool,
}

/// A split SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// Select list text, including a leading `DISTINCT`
    pub columns: String,
    pub from: TableFormula,
    pub where_clause: Option<String>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    /// Statement over an already parsed FROM formula
    pub fn new(columns: impl Into<String>, from: TableFormula) -> Self {
        Self {
            columns: columns.into(),
            from,
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn with_where(mut self, where_clause: Option<&str>) -> Self {
        self.where_clause = where_clause
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        self
    }

    /// Split and parse `query`
    pub fn parse(query: &str) -> Result<Self> {
        let sections = split_sections(query)?;
        let text_of = |wanted: Section| {
            sections
                .iter()
                .find(|(section, _)| *section == wanted)
                .map(|(_, text)| text.as_str())
        };

        if text_of(Section::GroupBy).is_some() {
            return Err(Error::QueryParse("GROUP BY is not supported".to_string()));
        }
        let columns = text_of(Section::Select)
            .ok_or_else(|| Error::QueryParse("Statement must start with SELECT".to_string()))?;
        let from = text_of(Section::From)
            .ok_or_else(|| Error::QueryParse("No table is specified".to_string()))?;

        let mut statement = Self::new(columns, parse_from(from)?).with_where(text_of(Section::Where));
        if let Some(text) = text_of(Section::Where) {
            if text.is_empty() {
                return Err(Error::QueryParse("Empty WHERE clause".to_string()));
            }
        }
        if let Some(text) = text_of(Section::OrderBy) {
            statement.order_by = parse_order_by(text)?;
        }
        if let Some(text) = text_of(Section::Limit) {
            statement.limit = Some(parse_limit(text)?);
        }
        debug!(
            "Split statement: {} table(s), where: {}, order by: {}, limit: {:?}",
            statement.from.tables().len(),
            statement.where_clause.is_some(),
            statement.order_by.len(),
            statement.limit
        );
        Ok(statement)
    }
}

struct SectionSplitter<'a> {
    query: &'a str,
    current: Option<(Section, usize)>,
    sections: Vec<(Section, String)>,
}

impl<'a> SectionSplitter<'a> {
    /// Close the running section at `keyword_start` and start `section` at `content_start`
    fn open(&mut self, section: Section, keyword_start: usize, content_start: usize) -> Result<()> {
        match self.current {
            None if section == Section::Select => {
                if !self.query[..keyword_start].trim().is_empty() {
                    return Err(Error::QueryParse(
                        "Statement must start with SELECT".to_string(),
                    ));
                }
            }
            None => {
                return Err(Error::QueryParse(
                    "Statement must start with SELECT".to_string(),
                ));
            }
            Some((current, start)) => {
                if section <= current {
                    return Err(Error::QueryParse(format!(
                        "Unexpected {} after {}",
                        section.keyword(),
                        current.keyword()
                    )));
                }
                let text = self.query[start..keyword_start].trim().to_string();
                self.sections.push((current, text));
            }
        }
        self.current = Some((section, content_start));
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<(Section, String)>> {
        let Some((current, start)) = self.current.take() else {
            return Err(Error::QueryParse(
                "Statement must start with SELECT".to_string(),
            ));
        };
        let text = self.query[start..].trim().to_string();
        self.sections.push((current, text));
        Ok(self.sections)
    }
}

fn split_sections(query: &str) -> Result<Vec<(Section, String)>> {
    let query = query.trim().trim_end_matches(';');
    let mut checker = SeparatorChecker::new(STATEMENT_SEPARATORS).with_alternative("'");
    let mut reader = WordReader::new(query);
    let mut splitter = SectionSplitter {
        query,
        current: None,
        sections: Vec::new(),
    };
    let mut depth = 0usize;
    let mut quoted = false;
    let mut awaiting_by: Option<(Section, usize)> = None;

    loop {
        let start = reader.position();
        let Some(piece) = reader.next_with(&checker) else {
            break;
        };
        let end = reader.position();
        match piece {
            Scanned::Separator('\'') => {
                quoted = !quoted;
                checker.use_alternative(quoted);
                awaiting_by = None;
            }
            Scanned::Separator(c) if c.is_whitespace() => {}
            Scanned::Separator(c) => {
                match c {
                    '(' => depth += 1,
                    ')' => depth = depth.saturating_sub(1),
                    _ => {}
                }
                awaiting_by = None;
            }
            Scanned::Word(_) if quoted || depth > 0 => awaiting_by = None,
            Scanned::Word(word) => {
                let lower = word.to_ascii_lowercase();
                if let Some((section, keyword_start)) = awaiting_by.take() {
                    if lower == "by" {
                        splitter.open(section, keyword_start, end)?;
                        continue;
                    }
                }
                match lower.as_str() {
                    "select" => splitter.open(Section::Select, start, end)?,
                    "from" => splitter.open(Section::From, start, end)?,
                    "where" => splitter.open(Section::Where, start, end)?,
                    "limit" => splitter.open(Section::Limit, start, end)?,
                    "order" => awaiting_by = Some((Section::OrderBy, start)),
                    "group" => awaiting_by = Some((Section::GroupBy, start)),
                    _ => {}
                }
            }
        }
    }
    if quoted {
        return Err(Error::QueryParse("Quotation is not closed.".to_string()));
    }
    splitter.finish()
}

fn parse_order_by(text: &str) -> Result<Vec<OrderTerm>> {
    text.split(',')
        .map(|term| {
            let words: Vec<&str> = term.split_whitespace().collect();
            let (column, descending) = match words.as_slice() {
                [column] => (*column, false),
                [column, direction] if direction.eq_ignore_ascii_case("asc") => (*column, false),
                [column, direction] if direction.eq_ignore_ascii_case("desc") => (*column, true),
                [] => return Err(Error::QueryParse("Empty ORDER BY term".to_string())),
                _ => {
                    return Err(Error::QueryParse(format!(
                        "Invalid ORDER BY term: {}",
                        term.trim()
                    )));
                }
            };
            Ok(OrderTerm {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

fn parse_limit(text: &str) -> Result<usize> {
    text.parse::<usize>()
        .map_err(|_| Error::QueryParse(format!("Invalid LIMIT: {}", text)))
}

//! FROM clause parser
//!
//! Builds a [`TableFormula`] from the words of a FROM clause. Supported forms:
//!
//! - `t1, t2` cross join
//! - `t1 [AS] a` table variables
//! - `t1 [INNER] JOIN t2 ON t1.x = t2.y`
//! - `LEFT|RIGHT|FULL [OUTER] JOIN ... ON ...` with the same equality condition
//!
//! Joins nest to the left in the order they are written.

use crate::scanner::{SeparatedWordSink, SeparatorChecker};
use itemsql_core::{Error, Result};
use std::fmt;
use tracing::debug;

/// Characters that end a word in a FROM clause
pub const FROM_SEPARATORS: &str = " \t\r\n,=";

/// A table named in FROM, with its optional variable name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub var_name: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_name: None,
        }
    }

    pub fn with_var_name(mut self, var_name: impl Into<String>) -> Self {
        self.var_name = Some(var_name.into());
        self
    }

    /// Name columns are qualified with: the variable name if given
    pub fn label(&self) -> &str {
        self.var_name.as_deref().unwrap_or(&self.name)
    }
}

/// Kind of an equality join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER JOIN"),
            JoinKind::LeftOuter => write!(f, "LEFT OUTER JOIN"),
            JoinKind::RightOuter => write!(f, "RIGHT OUTER JOIN"),
            JoinKind::FullOuter => write!(f, "FULL OUTER JOIN"),
        }
    }
}

/// Tree of tables and joins described by a FROM clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableFormula {
    Table(TableRef),
    CrossJoin {
        left: Box<TableFormula>,
        right: Box<TableFormula>,
    },
    Join {
        kind: JoinKind,
        left: Box<TableFormula>,
        right: Box<TableFormula>,
        left_column: String,
        right_column: String,
    },
}

impl TableFormula {
    /// Cross join of `names` in order
    pub fn cross_join_of<S: AsRef<str>>(names: &[S]) -> Result<TableFormula> {
        let mut tables = names.iter().map(|name| TableFormula::Table(TableRef::new(name.as_ref())));
        let first = tables
            .next()
            .ok_or_else(|| Error::QueryParse("No table is specified".to_string()))?;
        Ok(tables.fold(first, |left, right| TableFormula::CrossJoin {
            left: Box::new(left),
            right: Box::new(right),
        }))
    }

    /// Every table in column order
    pub fn tables(&self) -> Vec<&TableRef> {
        let mut tables = Vec::new();
        self.collect_tables(&mut tables);
        tables
    }

    fn collect_tables<'a>(&'a self, tables: &mut Vec<&'a TableRef>) {
        match self {
            TableFormula::Table(table) => tables.push(table),
            TableFormula::CrossJoin { left, right } | TableFormula::Join { left, right, .. } => {
                left.collect_tables(tables);
                right.collect_tables(tables);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FromState {
    ExpectTable,
    PostTable,
    ExpectVarName,
    PostVarName,
    GotJoinKind,
    GotOuter,
    ExpectOn,
    ExpectLeftField,
    ExpectEqual,
    ExpectRightField,
    Joined,
}

/// Incremental parser for one FROM clause
pub struct SqlFromParser {
    separators: SeparatorChecker,
    state: FromState,
    formula: Option<TableFormula>,
    pending: Option<TableRef>,
    join: Option<JoinKind>,
    left_field: Option<String>,
    error: Option<String>,
}

impl Default for SqlFromParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the text following `FROM`
pub fn parse_from(text: &str) -> Result<TableFormula> {
    let mut parser = SqlFromParser::new();
    parser.parse(text)?;
    parser.take_formula()
}

fn unexpected(piece: &str) -> Error {
    Error::QueryParse(format!("Unexpected '{}' in FROM clause", piece))
}

impl SqlFromParser {
    pub fn new() -> Self {
        Self {
            separators: SeparatorChecker::new(FROM_SEPARATORS),
            state: FromState::ExpectTable,
            formula: None,
            pending: None,
            join: None,
            left_field: None,
            error: None,
        }
    }

    pub fn formula(&self) -> Option<&TableFormula> {
        self.formula.as_ref()
    }

    /// Hand over the parsed formula
    pub fn take_formula(&mut self) -> Result<TableFormula> {
        self.formula
            .take()
            .ok_or_else(|| Error::QueryParse("No table is specified".to_string()))
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
                debug!("FROM clause parse failed: {}", message);
                self.error = Some(message);
            }
        }
        result
    }

    /// Append the pending table to the formula as a cross join
    fn commit_table(&mut self) -> Result<()> {
        let table = self
            .pending
            .take()
            .ok_or_else(|| Error::Internal("No pending table in FROM clause".to_string()))?;
        let right = TableFormula::Table(table);
        self.formula = Some(match self.formula.take() {
            Some(left) => TableFormula::CrossJoin {
                left: Box::new(left),
                right: Box::new(right),
            },
            None => right,
        });
        Ok(())
    }

    fn complete_join(&mut self, right_field: &str) -> Result<()> {
        let (Some(kind), Some(table), Some(left_field), Some(left)) = (
            self.join.take(),
            self.pending.take(),
            self.left_field.take(),
            self.formula.take(),
        ) else {
            return Err(Error::Internal("Incomplete join state".to_string()));
        };
        self.formula = Some(TableFormula::Join {
            kind,
            left: Box::new(left),
            right: Box::new(TableFormula::Table(table)),
            left_column: left_field,
            right_column: right_field.to_string(),
        });
        self.state = FromState::Joined;
        Ok(())
    }

    /// Start a join after a table or a completed join
    fn begin_join(&mut self, kind: JoinKind, lower: &str) -> Result<()> {
        if self.join.is_some() {
            return Err(Error::QueryParse(format!(
                "Expected ON before '{}'",
                lower.to_ascii_uppercase()
            )));
        }
        if self.pending.is_some() {
            self.commit_table()?;
        }
        self.join = Some(kind);
        self.state = if lower == "join" {
            FromState::ExpectTable
        } else {
            FromState::GotJoinKind
        };
        Ok(())
    }

    fn join_keyword(lower: &str) -> Option<JoinKind> {
        match lower {
            "join" | "inner" => Some(JoinKind::Inner),
            "left" => Some(JoinKind::LeftOuter),
            "right" => Some(JoinKind::RightOuter),
            "full" => Some(JoinKind::FullOuter),
            _ => None,
        }
    }

    fn add_word(&mut self, word: &str) -> Result<()> {
        let lower = word.to_ascii_lowercase();
        match self.state {
            FromState::ExpectTable => {
                if Self::join_keyword(&lower).is_some() || lower == "on" || lower == "as" {
                    return Err(unexpected(word));
                }
                self.pending = Some(TableRef::new(word));
                self.state = FromState::PostTable;
                Ok(())
            }
            FromState::PostTable | FromState::PostVarName | FromState::Joined => {
                if let Some(kind) = Self::join_keyword(&lower) {
                    return self.begin_join(kind, &lower);
                }
                match (self.state, lower.as_str()) {
                    (FromState::Joined, _) => Err(unexpected(word)),
                    (_, "on") => {
                        if self.join.is_none() {
                            return Err(Error::QueryParse("ON without JOIN".to_string()));
                        }
                        self.state = FromState::ExpectLeftField;
                        Ok(())
                    }
                    (FromState::PostTable, "as") => {
                        self.state = FromState::ExpectVarName;
                        Ok(())
                    }
                    (FromState::PostTable, _) => self.set_var_name(word),
                    _ => Err(unexpected(word)),
                }
            }
            FromState::ExpectVarName => {
                if Self::join_keyword(&lower).is_some() || lower == "on" {
                    return Err(Error::QueryParse(format!(
                        "Expected a table variable after AS, found '{}'",
                        word
                    )));
                }
                self.set_var_name(word)
            }
            FromState::GotJoinKind => match lower.as_str() {
                "join" => {
                    self.state = FromState::ExpectTable;
                    Ok(())
                }
                "outer" if self.join != Some(JoinKind::Inner) => {
                    self.state = FromState::GotOuter;
                    Ok(())
                }
                _ => Err(Error::QueryParse(format!("Expected JOIN, found '{}'", word))),
            },
            FromState::GotOuter => {
                if lower != "join" {
                    return Err(Error::QueryParse(format!("Expected JOIN, found '{}'", word)));
                }
                self.state = FromState::ExpectTable;
                Ok(())
            }
            FromState::ExpectOn => {
                if lower != "on" {
                    return Err(Error::QueryParse(format!("Expected ON, found '{}'", word)));
                }
                self.state = FromState::ExpectLeftField;
                Ok(())
            }
            FromState::ExpectLeftField => {
                self.left_field = Some(word.to_string());
                self.state = FromState::ExpectEqual;
                Ok(())
            }
            FromState::ExpectEqual => Err(Error::QueryParse(format!(
                "Expected '=' in join condition, found '{}'",
                word
            ))),
            FromState::ExpectRightField => self.complete_join(word),
        }
    }

    fn set_var_name(&mut self, word: &str) -> Result<()> {
        let table = self
            .pending
            .take()
            .ok_or_else(|| Error::Internal("No pending table in FROM clause".to_string()))?;
        self.pending = Some(table.with_var_name(word));
        self.state = if self.join.is_some() {
            FromState::ExpectOn
        } else {
            FromState::PostVarName
        };
        Ok(())
    }

    fn separator(&mut self, separator: char) -> Result<()> {
        match separator {
            ' ' | '\t' | '\r' | '\n' => Ok(()),
            ',' => match self.state {
                FromState::PostTable | FromState::PostVarName if self.join.is_none() => {
                    self.commit_table()?;
                    self.state = FromState::ExpectTable;
                    Ok(())
                }
                FromState::Joined => {
                    self.state = FromState::ExpectTable;
                    Ok(())
                }
                _ => Err(unexpected(",")),
            },
            '=' if self.state == FromState::ExpectEqual => {
                self.state = FromState::ExpectRightField;
                Ok(())
            }
            other => Err(unexpected(&other.to_string())),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self.state {
            FromState::PostTable | FromState::PostVarName if self.join.is_none() => {
                self.commit_table()
            }
            FromState::Joined => Ok(()),
            FromState::ExpectTable if self.formula.is_none() && self.join.is_none() => {
                Err(Error::QueryParse("No table is specified".to_string()))
            }
            FromState::PostTable | FromState::PostVarName | FromState::ExpectOn => {
                Err(Error::QueryParse("Missing ON condition for JOIN".to_string()))
            }
            _ => Err(Error::QueryParse("Incomplete FROM clause".to_string())),
        }
    }
}

impl SeparatedWordSink for SqlFromParser {
    fn separators(&self) -> &SeparatorChecker {
        &self.separators
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

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> Box<TableFormula> {
        Box::new(TableFormula::Table(TableRef::new(name)))
    }

    fn parse_error(text: &str) -> String {
        parse_from(text).unwrap_err().to_string()
    }

    #[test]
    fn test_one_table() {
        assert_eq!(
            parse_from("tab").unwrap(),
            TableFormula::Table(TableRef::new("tab"))
        );
        assert_eq!(
            parse_from("tab t").unwrap(),
            TableFormula::Table(TableRef::new("tab").with_var_name("t"))
        );
        assert_eq!(
            parse_from(" tab AS t ").unwrap(),
            TableFormula::Table(TableRef::new("tab").with_var_name("t"))
        );
    }

    #[test]
    fn test_cross_join_nests_left() {
        let formula = parse_from("tab0 t0, tab1 t1,tab2").unwrap();
        let labels: Vec<&str> = formula.tables().iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["t0", "t1", "tab2"]);

        let TableFormula::CrossJoin { left, right } = formula else {
            panic!("expected a cross join");
        };
        assert_eq!(right, table("tab2"));
        assert!(matches!(*left, TableFormula::CrossJoin { .. }));
    }

    #[test]
    fn test_inner_join() {
        let formula = parse_from("tab0 inner join tab1 on tab0.field0=tab1.field1").unwrap();
        assert_eq!(
            formula,
            TableFormula::Join {
                kind: JoinKind::Inner,
                left: table("tab0"),
                right: table("tab1"),
                left_column: "tab0.field0".to_string(),
                right_column: "tab1.field1".to_string(),
            }
        );
        assert_eq!(
            parse_from("tab0 JOIN tab1 ON tab0.a = tab1.b").unwrap(),
            parse_from("tab0 INNER JOIN tab1 ON tab0.a = tab1.b").unwrap()
        );
    }

    #[test]
    fn test_outer_joins_with_variables() {
        let formula = parse_from("users u LEFT OUTER JOIN users_groups g ON u.userid = g.userid")
            .unwrap();
        let TableFormula::Join {
            kind, left, right, ..
        } = &formula
        else {
            panic!("expected a join");
        };
        assert_eq!(*kind, JoinKind::LeftOuter);
        assert_eq!(left.tables()[0].label(), "u");
        assert_eq!(right.tables()[0].name, "users_groups");

        let kinds: Vec<JoinKind> = ["right join", "full outer join", "left join"]
            .iter()
            .map(|join| match parse_from(&format!("a {} b on a.x = b.y", join)).unwrap() {
                TableFormula::Join { kind, .. } => kind,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![JoinKind::RightOuter, JoinKind::FullOuter, JoinKind::LeftOuter]
        );
    }

    #[test]
    fn test_join_chain_then_cross_join() {
        let formula = parse_from(
            "users u inner join users_groups ug on u.userid = ug.userid \
             inner join usrgrp g on ug.usrgrpid = g.usrgrpid, config",
        )
        .unwrap();
        let labels: Vec<&str> = formula.tables().iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["u", "ug", "g", "config"]);
        assert!(matches!(formula, TableFormula::CrossJoin { .. }));
    }

    #[test]
    fn test_from_errors() {
        assert!(parse_error("").contains("No table is specified"));
        assert!(parse_error("a join b").contains("Missing ON"));
        assert!(parse_error("a join b on a.x").contains("Incomplete FROM"));
        assert!(parse_error("a join b on a.x b.y").contains("Expected '='"));
        assert!(parse_error("a on a.x = a.y").contains("ON without JOIN"));
        assert!(parse_error("a inner outer join b on a.x = b.y").contains("Expected JOIN"));
        assert!(parse_error("a t x").contains("Unexpected 'x'"));
        assert!(parse_error("a, , b").contains("Unexpected ','"));
        assert!(parse_error("a = b").contains("Unexpected '='"));
        assert!(parse_error("a join b, c").contains("Unexpected ','"));
    }

    #[test]
    fn test_cross_join_of_names() {
        let formula = TableFormula::cross_join_of(&["a", "b"]).unwrap();
        assert_eq!(
            formula,
            TableFormula::CrossJoin {
                left: table("a"),
                right: table("b"),
            }
        );
        assert!(TableFormula::cross_join_of::<&str>(&[]).is_err());
    }
}

//! Command line handling for the shell

use crate::store::VirtualDataStore;
use itemsql_core::{EngineConfig, Error, Result};
use itemsql_query::SelectResult;
use serde_json::{Map, Value, json};
use std::fmt;
use std::path::Path;

/// Environment variable naming a JSON configuration file
pub const CONFIG_ENV: &str = "ITEMSQL_CONFIG";

pub const USAGE: &str =
    "Usage: itemsql-shell [--json] <statement> | itemsql-shell [--json] <tables> <columns> [where]";

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// What the command line asks to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellRequest {
    /// A whole `SELECT ... FROM ...` statement
    Statement(String),
    /// Select list and condition over the cross join of comma-separated tables
    Parts {
        tables: String,
        columns: String,
        where_clause: Option<String>,
    },
}

impl fmt::Display for ShellRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellRequest::Statement(statement) => write!(f, "{}", statement),
            ShellRequest::Parts {
                tables,
                columns,
                where_clause,
            } => {
                write!(f, "SELECT {} FROM {}", columns, tables)?;
                if let Some(where_clause) = where_clause {
                    write!(f, " WHERE {}", where_clause)?;
                }
                Ok(())
            }
        }
    }
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub request: ShellRequest,
    pub format: OutputFormat,
}

impl ShellCommand {
    /// Parse the arguments following the program name
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut format = OutputFormat::Text;
        let mut positional = Vec::new();
        for arg in args {
            if arg == "--json" {
                format = OutputFormat::Json;
            } else {
                positional.push(arg);
            }
        }

        let request = match <[String; 1]>::try_from(positional) {
            Ok([statement]) => ShellRequest::Statement(statement),
            Err(positional) => {
                let mut positional = positional.into_iter();
                let (Some(tables), Some(columns)) = (positional.next(), positional.next()) else {
                    return Err(Error::Configuration(USAGE.to_string()));
                };
                let where_clause = positional.next();
                if positional.next().is_some() {
                    return Err(Error::Configuration(USAGE.to_string()));
                }
                ShellRequest::Parts {
                    tables,
                    columns,
                    where_clause,
                }
            }
        };
        Ok(Self { request, format })
    }

    /// Run the request against `store`
    pub fn run(&self, store: &VirtualDataStore) -> Result<SelectResult> {
        match &self.request {
            ShellRequest::Statement(statement) => store.query(statement),
            ShellRequest::Parts {
                tables,
                columns,
                where_clause,
            } => store.select(tables, columns, where_clause.as_deref()),
        }
    }
}

/// Load the configuration file if `path` is given, else the defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Render a result as a tab separated header line followed by rows
pub fn render_text(result: &SelectResult) -> String {
    let mut lines = vec![result.columns.join("\t")];
    lines.extend(result.text_rows().into_iter().map(|row| row.join("\t")));
    lines.join("\n")
}

/// Render a result as a JSON document with the rows as objects
pub fn render_json(result: &SelectResult) -> Result<String> {
    let rows: Vec<Value> = result
        .text_rows()
        .into_iter()
        .map(|row| {
            let object: Map<String, Value> = result
                .columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(Value::String))
                .collect();
            Value::Object(object)
        })
        .collect();
    let document = json!({
        "columns": result.columns,
        "rows": rows,
        "stats": result.stats,
    });
    serde_json::to_string_pretty(&document)
        .map_err(|e| Error::Internal(format!("Failed to render result: {}", e)))
}

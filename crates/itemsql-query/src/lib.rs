//! ItemSQL Query Engine
//!
//! Provides SQL formula parsing and evaluation over ItemSQL tables.
//!
//! # Overview
//!
//! The query engine implements:
//! - Separator-driven scanning of SQL text
//! - Formula trees built by priority insertion
//! - MAX, COUNT and SUM aggregates with resettable state
//! - Column resolution against static table definitions
//! - SELECT list parsing and execution
//! - Statement splitting into SELECT, FROM, WHERE, ORDER BY and LIMIT
//! - FROM clauses with table variables and equality joins

pub mod column;
pub mod column_parser;
pub mod element;
pub mod executor;
pub mod formula_parser;
pub mod from_parser;
pub mod function;
pub mod literal;
pub mod processor;
pub mod scanner;
pub mod schema;
pub mod statement;
pub mod tree;

pub use column::{ColumnDataGetter, ColumnDataGetterFactory, IndexGetter, ItemIdGetter};
pub use column_parser::{SqlColumnParser, SqlFormulaInfo, parse_columns};
pub use element::{BinaryOperator, FormulaElement, FormulaPriority, UnaryOperator};
pub use executor::{SelectExecutor, SelectResult, SelectStats};
pub use formula_parser::{SqlFormulaParser, parse_formula};
pub use from_parser::{JoinKind, SqlFromParser, TableFormula, TableRef, parse_from};
pub use function::{Accumulator, FunctionKind};
pub use literal::{create_as_number, create_as_number_or_string};
pub use processor::{SqlProcessor, TableProvider};
pub use scanner::{SeparatedWordSink, SeparatorChecker};
pub use schema::{ColumnDef, TableDef, column_getter_factory};
pub use statement::{OrderTerm, SelectStatement};
pub use tree::{Formula, FormulaBuilder, NodeId};

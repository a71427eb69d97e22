//! ItemSQL - In-process relational data engine
//!
//! This is the main library crate that re-exports all ItemSQL components.

pub use itemsql_core as core;
pub use itemsql_query as query;

// Re-export commonly used types
pub use itemsql_core::{
    Comparison, EngineConfig, Error, ItemData, ItemDataPtr, ItemDataType, ItemGroup,
    ItemGroupPtr, ItemGroupType, ItemGroupTypeRegistry, ItemId, ItemTable, ItemValue, Result,
};

pub use itemsql_query::{
    Formula, SelectExecutor, SelectResult, SelectStatement, SqlColumnParser, SqlFormulaParser,
    SqlProcessor, TableDef, TableProvider, column_getter_factory, parse_formula,
};

//! ItemSQL Core Library
//!
//! This crate provides the typed values, rows, tables and error handling
//! that the ItemSQL formula engine operates on.
//!
//! # Modules
//!
//! - `item_data` - Typed column values (`ItemData`)
//! - `item_group` - Rows of values (`ItemGroup`)
//! - `item_group_type` - Interned row schemas
//! - `item_table` - Tables of rows and join algorithms
//! - `config` - Engine configuration
//! - `error` - Error types and result aliases

pub mod config;
pub mod error;
pub mod item_data;
pub mod item_group;
pub mod item_group_type;
pub mod item_table;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use item_data::{
    Comparison, ItemData, ItemDataPtr, ItemDataType, ItemId, ItemKey, ItemValue,
    ITEM_ID_ANONYMOUS,
};
pub use item_group::{ItemGroup, ItemGroupPtr};
pub use item_group_type::{ItemGroupType, ItemGroupTypeRegistry};
pub use item_table::{ItemGroupId, ItemTable, ItemTablePtr};

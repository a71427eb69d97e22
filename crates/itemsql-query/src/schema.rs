//! Static table definitions
//!
//! A [`TableDef`] names a table's columns and maps each to the item id and
//! type its values carry. Column names in formulas are resolved against a
//! set of table definitions, optionally qualified as `table.column`.

use crate::column::{ColumnDataGetter, ColumnDataGetterFactory, ItemIdGetter};
use crate::literal::{WordKind, classify};
use itemsql_core::{
    EngineConfig, Error, ItemData, ItemDataPtr, ItemDataType, ItemGroupId, ItemGroupType,
    ItemGroupTypeRegistry, ItemId, ItemTable, ItemValue, Result,
};
use std::sync::Arc;

/// A column of a table
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub item_id: ItemId,
    pub data_type: ItemDataType,
}

/// A table's name, row group id and ordered columns
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub group_id: ItemGroupId,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, group_id: ItemGroupId) -> Self {
        Self {
            name: name.into(),
            group_id,
            columns: Vec::new(),
        }
    }

    /// Append a column definition
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        item_id: ItemId,
        data_type: ItemDataType,
    ) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            item_id,
            data_type,
        });
        self
    }

    /// Splits `table.column` into its parts if qualified by this table
    fn unqualified<'a>(&self, name: &'a str) -> Option<&'a str> {
        match name.split_once('.') {
            Some((table, column)) if table.eq_ignore_ascii_case(&self.name) => Some(column),
            Some(_) => None,
            None => Some(name),
        }
    }

    /// Look up a column by plain or qualified name, ignoring case
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        let column = self.unqualified(name)?;
        self.columns
            .iter()
            .find(|def| def.name.eq_ignore_ascii_case(column))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let column = self.unqualified(name)?;
        self.columns
            .iter()
            .position(|def| def.name.eq_ignore_ascii_case(column))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|def| def.name.clone()).collect()
    }

    /// Interned schema of this table's rows
    pub fn item_group_type(&self, registry: &ItemGroupTypeRegistry) -> Arc<ItemGroupType> {
        registry.intern(ItemGroupType::new(
            self.columns.iter().map(|def| def.data_type).collect(),
        ))
    }

    /// Empty table bound to this definition's schema
    pub fn create_table(&self, config: &EngineConfig) -> Result<ItemTable> {
        let table = ItemTable::with_config(config).with_group_id(self.group_id);
        let group_type = self.item_group_type(table.registry());
        table.set_item_group_type(group_type)?;
        Ok(table)
    }

    /// Value for `column` parsed from its text form
    pub fn create_item(&self, column: &str, text: &str) -> Result<ItemDataPtr> {
        let def = self
            .column(column)
            .ok_or_else(|| Error::ColumnNotFound(column.to_string()))?;
        create_item_data(def, text)
    }
}

/// Parse `text` as a value of the column's type
pub fn create_item_data(def: &ColumnDef, text: &str) -> Result<ItemDataPtr> {
    let invalid = || {
        Error::QueryParse(format!(
            "Invalid {} value for column {}: {}",
            def.data_type, def.name, text
        ))
    };
    let value = match def.data_type {
        ItemDataType::String => ItemValue::String(text.to_string()),
        ItemDataType::Bool => match text {
            "1" | "true" | "TRUE" => ItemValue::Bool(true),
            "0" | "false" | "FALSE" => ItemValue::Bool(false),
            _ => return Err(invalid()),
        },
        ItemDataType::Int => {
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text),
            };
            match classify(digits) {
                WordKind::Number(ItemValue::Int(i)) => ItemValue::Int(if negative { -i } else { i }),
                _ => return Err(invalid()),
            }
        }
        ItemDataType::Uint64 => match classify(text) {
            WordKind::Number(ItemValue::Int(i)) => ItemValue::Uint64(i as u64),
            WordKind::Number(ItemValue::Uint64(u)) => ItemValue::Uint64(u),
            _ => return Err(invalid()),
        },
        ItemDataType::Double => {
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text),
            };
            let magnitude = match classify(digits) {
                WordKind::Number(ItemValue::Double(d)) => d,
                WordKind::Number(ItemValue::Int(i)) => i as f64,
                WordKind::Number(ItemValue::Uint64(u)) => u as f64,
                _ => return Err(invalid()),
            };
            ItemValue::Double(if negative { -magnitude } else { magnitude })
        }
    };
    Ok(Arc::new(ItemData::new(def.item_id, value)))
}

/// Factory resolving column names against `tables`.
///
/// Qualified names pick the named table. Plain names must match exactly one
/// table's column.
pub fn column_getter_factory(tables: &[TableDef]) -> ColumnDataGetterFactory {
    let tables = tables.to_vec();
    Arc::new(move |name: &str| {
        let matches: Vec<&ColumnDef> = tables.iter().filter_map(|table| table.column(name)).collect();
        match matches.as_slice() {
            [def] => Ok(Box::new(ItemIdGetter::new(name, def.item_id)) as Box<dyn ColumnDataGetter>),
            [] => Err(Error::ColumnNotFound(name.to_string())),
            _ => Err(Error::QueryParse(format!("Ambiguous column name: {}", name))),
        }
    })
}

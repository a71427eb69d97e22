//! Column data getters
//!
//! A column reference in a formula resolves, at parse time, to a
//! [`ColumnDataGetter`] produced by a [`ColumnDataGetterFactory`]. At
//! evaluation time the getter pulls the column's value out of the row being
//! evaluated.

use itemsql_core::{Error, ItemDataPtr, ItemGroup, ItemId, Result};
use std::sync::Arc;

/// Extracts one column's value from a row
pub trait ColumnDataGetter: Send + Sync {
    fn get_data(&self, row: &ItemGroup) -> Result<ItemDataPtr>;
}

impl<F> ColumnDataGetter for F
where
    F: Fn(&ItemGroup) -> Result<ItemDataPtr> + Send + Sync,
{
    fn get_data(&self, row: &ItemGroup) -> Result<ItemDataPtr> {
        self(row)
    }
}

/// Maps a column name to its getter
pub type ColumnDataGetterFactory =
    Arc<dyn Fn(&str) -> Result<Box<dyn ColumnDataGetter>> + Send + Sync>;

/// Getter returning the first value with a given item id
#[derive(Debug, Clone)]
pub struct ItemIdGetter {
    name: String,
    item_id: ItemId,
}

impl ItemIdGetter {
    pub fn new(name: impl Into<String>, item_id: ItemId) -> Self {
        Self {
            name: name.into(),
            item_id,
        }
    }
}

impl ColumnDataGetter for ItemIdGetter {
    fn get_data(&self, row: &ItemGroup) -> Result<ItemDataPtr> {
        row.get_item(self.item_id).ok_or_else(|| {
            Error::ColumnNotFound(format!("{} (item id {})", self.name, self.item_id))
        })
    }
}

/// Getter returning the value at a fixed position
#[derive(Debug, Clone)]
pub struct IndexGetter {
    name: String,
    index: usize,
}

impl IndexGetter {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl ColumnDataGetter for IndexGetter {
    fn get_data(&self, row: &ItemGroup) -> Result<ItemDataPtr> {
        row.get_item_at(self.index).ok_or_else(|| {
            Error::ColumnNotFound(format!("{} (index {})", self.name, self.index))
        })
    }
}

/// Factory resolving names from a fixed list of (name, position) pairs
pub fn index_getter_factory(names: &[&str]) -> ColumnDataGetterFactory {
    let names: Vec<String> = names.iter().map(|name| name.to_ascii_lowercase()).collect();
    Arc::new(move |name: &str| {
        let lower = name.to_ascii_lowercase();
        let index = names
            .iter()
            .position(|candidate| *candidate == lower)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        Ok(Box::new(IndexGetter::new(name, index)) as Box<dyn ColumnDataGetter>)
    })
}

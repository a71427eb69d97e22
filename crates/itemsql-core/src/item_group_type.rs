//! Interned row schemas
//!
//! A row schema is the ordered list of native types of its values. Rows with
//! the same signature share one [`ItemGroupType`] handed out by an
//! [`ItemGroupTypeRegistry`].

use crate::item_data::{ItemDataPtr, ItemDataType};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

/// Ordered sequence of column types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemGroupType {
    types: Vec<ItemDataType>,
}

impl ItemGroupType {
    pub fn new(types: Vec<ItemDataType>) -> Self {
        Self { types }
    }

    /// Signature of a list of values
    pub fn from_items(items: &[ItemDataPtr]) -> Self {
        Self::new(items.iter().map(|item| item.data_type()).collect())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Type of the column at `index`
    pub fn get_type(&self, index: usize) -> Option<ItemDataType> {
        self.types.get(index).copied()
    }

    pub fn types(&self) -> &[ItemDataType] {
        &self.types
    }

    /// Schema of a joined row: this schema's columns followed by `other`'s
    pub fn concat(&self, other: &ItemGroupType) -> ItemGroupType {
        let mut types = self.types.clone();
        types.extend_from_slice(&other.types);
        ItemGroupType::new(types)
    }
}

impl fmt::Display for ItemGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.types.iter().map(|t| t.name()).collect();
        write!(f, "({})", names.join(", "))
    }
}

/// Registry handing out one shared instance per distinct type signature
#[derive(Debug, Default)]
pub struct ItemGroupTypeRegistry {
    types: Mutex<HashMap<Vec<ItemDataType>, Arc<ItemGroupType>>>,
}

impl ItemGroupTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by rows created without an explicit one
    pub fn global() -> Arc<ItemGroupTypeRegistry> {
        static GLOBAL: OnceLock<Arc<ItemGroupTypeRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(ItemGroupTypeRegistry::new()))
            .clone()
    }

    /// Returns the shared schema for `group_type`, registering it if needed
    pub fn intern(&self, group_type: ItemGroupType) -> Arc<ItemGroupType> {
        let mut types = self.types.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = types.get(&group_type.types) {
            return existing.clone();
        }
        debug!("Registering item group type {}", group_type);
        let shared = Arc::new(group_type);
        types.insert(shared.types.clone(), shared.clone());
        shared
    }

    /// Number of distinct schemas registered so far
    pub fn len(&self) -> usize {
        self.types.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

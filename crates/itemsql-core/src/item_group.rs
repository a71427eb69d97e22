//! Rows of typed values
//!
//! An [`ItemGroup`] is an ordered list of values. Ids are expected to be
//! unique within a row but this is not enforced; lookups by id return the
//! first match, or every match in insertion order.
//!
//! Freezing a row seals it and binds it to the interned schema of its type
//! signature. A row can also be bound to a schema before it is filled, in
//! which case each appended value is checked against the schema and the row
//! freezes itself once it is complete.

use crate::error::{Error, Result};
use crate::item_data::{ItemDataPtr, ItemId};
use crate::item_group_type::{ItemGroupType, ItemGroupTypeRegistry};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Shared handle to a row
pub type ItemGroupPtr = Arc<ItemGroup>;

#[derive(Debug, Default)]
struct GroupState {
    frozen: bool,
    items: Vec<ItemDataPtr>,
    group_type: Option<Arc<ItemGroupType>>,
}

/// A row of values
#[derive(Debug)]
pub struct ItemGroup {
    registry: Arc<ItemGroupTypeRegistry>,
    state: RwLock<GroupState>,
}

impl Default for ItemGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemGroup {
    /// Create an empty row using the process-wide schema registry
    pub fn new() -> Self {
        Self::with_registry(ItemGroupTypeRegistry::global())
    }

    /// Create an empty row bound to an explicit schema registry
    pub fn with_registry(registry: Arc<ItemGroupTypeRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(GroupState::default()),
        }
    }

    /// Create a frozen row holding `items`
    pub fn from_items(items: Vec<ItemDataPtr>) -> Self {
        Self::from_items_with_registry(items, ItemGroupTypeRegistry::global())
    }

    pub fn from_items_with_registry(
        items: Vec<ItemDataPtr>,
        registry: Arc<ItemGroupTypeRegistry>,
    ) -> Self {
        let group_type = registry.intern(ItemGroupType::from_items(&items));
        Self {
            registry,
            state: RwLock::new(GroupState {
                frozen: true,
                items,
                group_type: Some(group_type),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, GroupState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GroupState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn registry(&self) -> &Arc<ItemGroupTypeRegistry> {
        &self.registry
    }

    /// Append a value
    pub fn add(&self, item: ItemDataPtr) -> Result<()> {
        let mut state = self.write();
        if state.frozen {
            return Err(Error::GroupFrozen);
        }

        let index = state.items.len();
        let bound_len = match &state.group_type {
            Some(group_type) => {
                let expected = group_type.get_type(index).ok_or(Error::GroupFrozen)?;
                if expected != item.data_type() {
                    return Err(Error::TypeMismatch {
                        index,
                        expected,
                        found: item.data_type(),
                    });
                }
                Some(group_type.len())
            }
            None => None,
        };

        state.items.push(item);
        if bound_len == Some(state.items.len()) {
            state.frozen = true;
        }
        Ok(())
    }

    /// First value with the given id
    pub fn get_item(&self, id: ItemId) -> Option<ItemDataPtr> {
        self.read().items.iter().find(|item| item.id() == id).cloned()
    }

    /// Every value with the given id, in insertion order
    pub fn get_items(&self, id: ItemId) -> Vec<ItemDataPtr> {
        self.read()
            .items
            .iter()
            .filter(|item| item.id() == id)
            .cloned()
            .collect()
    }

    pub fn get_item_at(&self, index: usize) -> Option<ItemDataPtr> {
        self.read().items.get(index).cloned()
    }

    /// Snapshot of all values in order
    pub fn items(&self) -> Vec<ItemDataPtr> {
        self.read().items.clone()
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.read().frozen
    }

    pub fn item_group_type(&self) -> Option<Arc<ItemGroupType>> {
        self.read().group_type.clone()
    }

    /// Seal the row and bind it to the schema of its current values.
    ///
    /// Freezing an already frozen row only logs a warning.
    pub fn freeze(&self) -> Arc<ItemGroupType> {
        let mut state = self.write();
        if state.frozen {
            warn!("Item group is already frozen");
            if let Some(group_type) = &state.group_type {
                return group_type.clone();
            }
        }
        let group_type = self.registry.intern(ItemGroupType::from_items(&state.items));
        state.group_type = Some(group_type.clone());
        state.frozen = true;
        group_type
    }

    /// Bind the row to a schema before or while it is being filled
    pub fn set_item_group_type(&self, group_type: Arc<ItemGroupType>) -> Result<()> {
        let mut state = self.write();
        if state.frozen {
            return Err(Error::GroupFrozen);
        }
        if state.items.len() > group_type.len() {
            return Err(Error::Internal(format!(
                "Row has {} items but schema {} has {} columns",
                state.items.len(),
                group_type,
                group_type.len()
            )));
        }
        for (index, item) in state.items.iter().enumerate() {
            if let Some(expected) = group_type.get_type(index) {
                if expected != item.data_type() {
                    return Err(Error::TypeMismatch {
                        index,
                        expected,
                        found: item.data_type(),
                    });
                }
            }
        }
        if state.items.len() == group_type.len() {
            state.frozen = true;
        }
        state.group_type = Some(group_type);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item_data::{ItemData, ItemDataType};

    fn isolated() -> ItemGroup {
        ItemGroup::with_registry(Arc::new(ItemGroupTypeRegistry::new()))
    }

    #[test]
    fn test_duplicate_ids_keep_insertion_order() {
        const A: ItemId = 1;
        const B: ItemId = 2;
        let group = isolated();
        group.add(ItemData::shared(A, 10i64)).unwrap();
        group.add(ItemData::shared(B, 20i64)).unwrap();
        group.add(ItemData::shared(A, 30i64)).unwrap();
        group.add(ItemData::shared(A, 40i64)).unwrap();

        assert_eq!(group.len(), 4);
        assert_eq!(group.get_item(A).unwrap().as_int(), Some(10));
        assert_eq!(group.get_item(B).unwrap().as_int(), Some(20));

        let values: Vec<i64> = group
            .get_items(A)
            .iter()
            .filter_map(|item| item.as_int())
            .collect();
        assert_eq!(values, vec![10, 30, 40]);
        assert!(group.get_item(3).is_none());
        assert!(group.get_items(3).is_empty());
    }

    #[test]
    fn test_add_after_freeze_fails() {
        let group = isolated();
        group.add(ItemData::shared(1, 10i64)).unwrap();
        group.freeze();
        let err = group.add(ItemData::shared(2, "x")).unwrap_err();
        assert!(matches!(err, Error::GroupFrozen));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_freeze_twice_keeps_schema() {
        let group = isolated();
        group.add(ItemData::shared(1, 10i64)).unwrap();
        group.add(ItemData::shared(2, "anri")).unwrap();

        let first = group.freeze();
        let second = group.freeze();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(group.is_frozen());
        assert_eq!(
            first.types(),
            &[ItemDataType::Int, ItemDataType::String][..]
        );
        assert_eq!(group.registry().len(), 1);
    }

    #[test]
    fn test_rows_with_same_signature_share_schema() {
        let registry = Arc::new(ItemGroupTypeRegistry::new());
        let a = ItemGroup::from_items_with_registry(
            vec![ItemData::shared(1, 1i64), ItemData::shared(2, "a")],
            registry.clone(),
        );
        let b = ItemGroup::from_items_with_registry(
            vec![ItemData::shared(1, 2i64), ItemData::shared(2, "b")],
            registry.clone(),
        );
        assert!(Arc::ptr_eq(
            &a.item_group_type().unwrap(),
            &b.item_group_type().unwrap()
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_bound_schema_checks_and_autofreezes() {
        let group = isolated();
        let schema = group.registry().intern(ItemGroupType::new(vec![
            ItemDataType::Int,
            ItemDataType::String,
        ]));
        group.set_item_group_type(schema).unwrap();

        let err = group.add(ItemData::shared(1, "wrong")).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                index: 0,
                expected: ItemDataType::Int,
                found: ItemDataType::String
            }
        ));

        group.add(ItemData::shared(1, 10i64)).unwrap();
        assert!(!group.is_frozen());
        group.add(ItemData::shared(2, "ok")).unwrap();
        assert!(group.is_frozen());
        assert!(group.add(ItemData::shared(3, 1i64)).is_err());
    }

    #[test]
    fn test_set_item_group_type_validates_existing_items() {
        let group = isolated();
        group.add(ItemData::shared(1, "x")).unwrap();
        let schema = group
            .registry()
            .intern(ItemGroupType::new(vec![ItemDataType::Int]));
        assert!(matches!(
            group.set_item_group_type(schema).unwrap_err(),
            Error::TypeMismatch { index: 0, .. }
        ));
        assert!(!group.is_frozen());
    }

    #[test]
    fn test_get_item_at() {
        let group = ItemGroup::from_items(vec![
            ItemData::shared(5, true),
            ItemData::shared(6, 2.5),
        ]);
        assert!(group.is_frozen());
        assert_eq!(group.get_item_at(1).unwrap().as_double(), Some(2.5));
        assert!(group.get_item_at(2).is_none());
    }

    #[test]
    fn test_frozen_row_read_from_many_threads() {
        let group = Arc::new(ItemGroup::from_items(vec![
            ItemData::shared(1, 7i64),
            ItemData::shared(2, "anri"),
            ItemData::shared(1, 9i64),
        ]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let group = group.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(group.get_item(1).unwrap().as_int(), Some(7));
                        assert_eq!(group.get_items(1).len(), 2);
                        assert_eq!(group.get_item_at(1).unwrap().get_string(), "anri");
                        assert!(group.is_frozen());
                    }
                    group.item_group_type().unwrap()
                })
            })
            .collect();

        let schemas: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for schema in &schemas {
            assert!(Arc::ptr_eq(schema, &schemas[0]));
        }
        assert_eq!(group.len(), 3);
    }
}

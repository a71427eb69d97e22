//! Tables of rows and join algorithms
//!
//! An [`ItemTable`] is an ordered list of shared rows. Joins never modify
//! their inputs: every result row is a fresh [`ItemGroup`] whose values are
//! the same shared [`ItemData`] instances as the input rows.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::item_data::{ITEM_ID_ANONYMOUS, ItemData, ItemDataPtr};
use crate::item_group::{ItemGroup, ItemGroupPtr};
use crate::item_group_type::{ItemGroupType, ItemGroupTypeRegistry};
use std::sync::Arc;
use std::sync::RwLock;
use tracing::debug;

/// Identifier of the kind of rows a table holds
pub type ItemGroupId = u64;

/// Shared handle to a table
pub type ItemTablePtr = Arc<ItemTable>;

#[derive(Debug, Default)]
struct TableState {
    rows: Vec<ItemGroupPtr>,
    group_type: Option<Arc<ItemGroupType>>,
}

/// An ordered collection of rows
#[derive(Debug)]
pub struct ItemTable {
    group_id: ItemGroupId,
    max_join_rows: usize,
    registry: Arc<ItemGroupTypeRegistry>,
    state: RwLock<TableState>,
}

impl Default for ItemTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Preserve {
    Neither,
    Left,
    Right,
    Both,
}

impl Preserve {
    fn left(&self) -> bool {
        matches!(self, Preserve::Left | Preserve::Both)
    }

    fn right(&self) -> bool {
        matches!(self, Preserve::Right | Preserve::Both)
    }
}

impl ItemTable {
    /// Create an empty table with the default configuration
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Create an empty table whose joins honor `config`
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            group_id: 0,
            max_join_rows: config.max_join_rows,
            registry: ItemGroupTypeRegistry::global(),
            state: RwLock::new(TableState::default()),
        }
    }

    pub fn with_group_id(mut self, group_id: ItemGroupId) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ItemGroupTypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_max_join_rows(mut self, max_join_rows: usize) -> Self {
        self.max_join_rows = max_join_rows;
        self
    }

    /// Empty table sharing this table's settings
    fn derived(&self) -> ItemTable {
        ItemTable {
            group_id: self.group_id,
            max_join_rows: self.max_join_rows,
            registry: self.registry.clone(),
            state: RwLock::new(TableState::default()),
        }
    }

    pub fn group_id(&self) -> ItemGroupId {
        self.group_id
    }

    pub fn max_join_rows(&self) -> usize {
        self.max_join_rows
    }

    pub fn registry(&self) -> &Arc<ItemGroupTypeRegistry> {
        &self.registry
    }

    /// Append a row. The first frozen row fixes the table's known schema.
    pub fn add(&self, row: ItemGroupPtr) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Internal("Failed to acquire table lock".to_string()))?;
        if state.group_type.is_none() && row.is_frozen() {
            state.group_type = row.item_group_type();
        }
        state.rows.push(row);
        Ok(())
    }

    /// Append a new empty row bound to the table's known schema, if any
    pub fn add_new_group(&self) -> Result<ItemGroupPtr> {
        let row = Arc::new(ItemGroup::with_registry(self.registry.clone()));
        if let Some(group_type) = self.item_group_type() {
            row.set_item_group_type(group_type)?;
        }
        self.add(row.clone())?;
        Ok(row)
    }

    /// Set the schema of rows this table holds
    pub fn set_item_group_type(&self, group_type: Arc<ItemGroupType>) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Internal("Failed to acquire table lock".to_string()))?;
        state.group_type = Some(group_type);
        Ok(())
    }

    /// Known schema: the declared one, else that of the first row if frozen
    pub fn item_group_type(&self) -> Option<Arc<ItemGroupType>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if let Some(group_type) = &state.group_type {
            return Some(group_type.clone());
        }
        state
            .rows
            .first()
            .filter(|row| row.is_frozen())
            .and_then(|row| row.item_group_type())
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns of the table's rows; zero for an empty table
    pub fn number_of_columns(&self) -> usize {
        if let Some(group_type) = self.item_group_type() {
            return group_type.len();
        }
        self.get(0).map(|row| row.len()).unwrap_or(0)
    }

    pub fn get(&self, index: usize) -> Option<ItemGroupPtr> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .get(index)
            .cloned()
    }

    /// Snapshot of the rows in order
    pub fn rows(&self) -> Vec<ItemGroupPtr> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .clone()
    }

    /// Visit rows in order until `f` returns false. Returns false if stopped early.
    pub fn for_each<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&ItemGroupPtr) -> bool,
    {
        for row in self.rows() {
            if !f(&row) {
                return false;
            }
        }
        true
    }

    /// Null values standing in for a missing row of this table
    fn null_padding(&self) -> Vec<ItemDataPtr> {
        if let Some(first) = self.get(0) {
            return first
                .items()
                .iter()
                .map(|item| Arc::new(ItemData::null_of(item.id(), item.data_type())))
                .collect();
        }
        match self.item_group_type() {
            Some(group_type) => group_type
                .types()
                .iter()
                .map(|t| Arc::new(ItemData::null_of(ITEM_ID_ANONYMOUS, *t)))
                .collect(),
            None => Vec::new(),
        }
    }

    fn push_joined(
        &self,
        result: &ItemTable,
        left: Vec<ItemDataPtr>,
        right: Vec<ItemDataPtr>,
    ) -> Result<()> {
        if result.len() >= self.max_join_rows {
            return Err(Error::JoinLimitExceeded {
                limit: self.max_join_rows,
            });
        }
        let mut items = left;
        items.extend(right);
        let row = ItemGroup::from_items_with_registry(items, self.registry.clone());
        result.add(Arc::new(row))
    }

    /// Every pairing of a row of this table with a row of `other`.
    ///
    /// Rows are ordered by this table first; columns are this table's
    /// followed by `other`'s. If either side is empty the result has no rows
    /// and no columns.
    pub fn cross_join(&self, other: &ItemTable) -> Result<ItemTable> {
        let result = self.derived();
        let left_rows = self.rows();
        let right_rows = other.rows();
        if left_rows.is_empty() || right_rows.is_empty() {
            return Ok(result);
        }

        let total = left_rows.len().checked_mul(right_rows.len());
        if total.is_none_or(|total| total > self.max_join_rows) {
            return Err(Error::JoinLimitExceeded {
                limit: self.max_join_rows,
            });
        }

        for left in &left_rows {
            let left_items = left.items();
            for right in &right_rows {
                self.push_joined(&result, left_items.clone(), right.items())?;
            }
        }
        debug!(
            "Cross join of {} x {} rows produced {} rows",
            left_rows.len(),
            right_rows.len(),
            result.len()
        );
        Ok(result)
    }

    /// Pairs of rows whose `left_column` and `right_column` values are equal
    pub fn inner_join(
        &self,
        other: &ItemTable,
        left_column: usize,
        right_column: usize,
    ) -> Result<ItemTable> {
        self.equi_join(other, left_column, right_column, Preserve::Neither)
    }

    /// Inner join plus every unmatched row of this table padded with nulls
    pub fn left_outer_join(
        &self,
        other: &ItemTable,
        left_column: usize,
        right_column: usize,
    ) -> Result<ItemTable> {
        self.equi_join(other, left_column, right_column, Preserve::Left)
    }

    /// Inner join plus every unmatched row of `other` padded with nulls
    pub fn right_outer_join(
        &self,
        other: &ItemTable,
        left_column: usize,
        right_column: usize,
    ) -> Result<ItemTable> {
        self.equi_join(other, left_column, right_column, Preserve::Right)
    }

    /// Inner join plus the unmatched rows of both sides padded with nulls
    pub fn full_outer_join(
        &self,
        other: &ItemTable,
        left_column: usize,
        right_column: usize,
    ) -> Result<ItemTable> {
        self.equi_join(other, left_column, right_column, Preserve::Both)
    }

    fn equi_join(
        &self,
        other: &ItemTable,
        left_column: usize,
        right_column: usize,
        preserve: Preserve,
    ) -> Result<ItemTable> {
        let result = self.derived();
        let left_rows = self.rows();
        let right_rows = other.rows();
        let mut right_matched = vec![false; right_rows.len()];

        let left_padding = self.null_padding();
        let right_padding = other.null_padding();

        for left in &left_rows {
            let left_value = left.get_item_at(left_column).ok_or_else(|| {
                Error::ColumnNotFound(format!("column index {} of left table", left_column))
            })?;
            let left_items = left.items();
            let mut matched = false;

            for (index, right) in right_rows.iter().enumerate() {
                let right_value = right.get_item_at(right_column).ok_or_else(|| {
                    Error::ColumnNotFound(format!("column index {} of right table", right_column))
                })?;
                if left_value.eq_item(&right_value)? {
                    matched = true;
                    right_matched[index] = true;
                    self.push_joined(&result, left_items.clone(), right.items())?;
                }
            }

            if !matched && preserve.left() {
                self.push_joined(&result, left_items, right_padding.clone())?;
            }
        }

        if preserve.right() {
            for (right, matched) in right_rows.iter().zip(&right_matched) {
                if !matched {
                    self.push_joined(&result, left_padding.clone(), right.items())?;
                }
            }
        }

        if let (Some(left_type), Some(right_type)) =
            (self.item_group_type(), other.item_group_type())
        {
            let joined = self.registry.intern(left_type.concat(&right_type));
            result.set_item_group_type(joined)?;
        }

        debug!(
            "{:?} join of {} and {} rows produced {} rows",
            preserve,
            left_rows.len(),
            right_rows.len(),
            result.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item_data::ItemDataType;
    use proptest::prelude::*;

    #[test]
    fn test_people_cross_join_tokyo() {
        let people = ItemTable::new();
        for (age, name) in [(10i64, "anri"), (20, "mai")] {
            let row = ItemGroup::new();
            row.add(ItemData::shared(1, age)).unwrap();
            row.add(ItemData::shared(2, name)).unwrap();
            row.freeze();
            people.add(Arc::new(row)).unwrap();
        }
        let cities = ItemTable::new();
        let row = ItemGroup::new();
        row.add(ItemData::shared(3, "Tokyo")).unwrap();
        row.freeze();
        cities.add(Arc::new(row)).unwrap();

        let joined = people.cross_join(&cities).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.number_of_columns(), 3);
        let rows: Vec<Vec<String>> = joined
            .rows()
            .iter()
            .map(|row| row.items().iter().map(|item| item.get_string()).collect())
            .collect();
        assert_eq!(
            rows,
            vec![vec!["10", "anri", "Tokyo"], vec!["20", "mai", "Tokyo"]]
        );
    }

    fn people() -> ItemTable {
        let table = ItemTable::new();
        for (number, name, color) in [(10, "anri", "red"), (20, "mai", "blue")] {
            let row = ItemGroup::from_items(vec![
                ItemData::shared(1, number as i64),
                ItemData::shared(2, name),
                ItemData::shared(3, color),
            ]);
            table.add(Arc::new(row)).unwrap();
        }
        table
    }

    fn heights() -> ItemTable {
        let table = ItemTable::new();
        for (name, height, nick) in [
            ("anri", 150, "ann"),
            ("nobita", 200, "snake"),
            ("maria", 170, "mai"),
            ("mai", 180, "maimai"),
            ("anri", 250, "tooower"),
        ] {
            let row = ItemGroup::from_items(vec![
                ItemData::shared(101, name),
                ItemData::shared(102, height as i64),
                ItemData::shared(103, nick),
            ]);
            table.add(Arc::new(row)).unwrap();
        }
        table
    }

    fn texts(row: &ItemGroupPtr) -> Vec<String> {
        row.items().iter().map(|item| item.get_string()).collect()
    }

    #[test]
    fn test_cross_join() {
        let joined = people().cross_join(&heights()).unwrap();
        assert_eq!(joined.len(), 10);
        assert_eq!(joined.number_of_columns(), 6);

        let first = joined.get(0).unwrap();
        assert_eq!(texts(&first), vec!["10", "anri", "red", "anri", "150", "ann"]);
        let sixth = joined.get(5).unwrap();
        assert_eq!(texts(&sixth), vec!["20", "mai", "blue", "anri", "150", "ann"]);
        let last = joined.get(9).unwrap();
        assert_eq!(
            texts(&last),
            vec!["20", "mai", "blue", "anri", "250", "tooower"]
        );
    }

    #[test]
    fn test_cross_join_shares_values() {
        let left = people();
        let right = heights();
        let joined = left.cross_join(&right).unwrap();
        let original = left.get(0).unwrap().get_item_at(0).unwrap();
        let shared = joined.get(0).unwrap().get_item_at(0).unwrap();
        assert!(Arc::ptr_eq(&original, &shared));
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 5);
    }

    #[test]
    fn test_cross_join_with_empty_side() {
        let empty = ItemTable::new();
        let joined = people().cross_join(&empty).unwrap();
        assert_eq!(joined.len(), 0);
        assert_eq!(joined.number_of_columns(), 0);

        let joined = empty.cross_join(&people()).unwrap();
        assert!(joined.is_empty());
        assert_eq!(joined.number_of_columns(), 0);
    }

    #[test]
    fn test_inner_join() {
        let joined = people().inner_join(&heights(), 1, 0).unwrap();
        let rows: Vec<Vec<String>> = joined.rows().iter().map(texts).collect();
        assert_eq!(
            rows,
            vec![
                vec!["10", "anri", "red", "anri", "150", "ann"],
                vec!["10", "anri", "red", "anri", "250", "tooower"],
                vec!["20", "mai", "blue", "mai", "180", "maimai"],
            ]
        );
        assert_eq!(joined.number_of_columns(), 6);
    }

    #[test]
    fn test_inner_join_type_error_propagates() {
        let err = people().inner_join(&heights(), 0, 0).unwrap_err();
        assert!(matches!(err, Error::UndefinedOperation { .. }));
    }

    #[test]
    fn test_inner_join_missing_column() {
        let err = people().inner_join(&heights(), 7, 0).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound(_)));
    }

    #[test]
    fn test_left_outer_join_pads_with_nulls() {
        let left = people();
        left.add(Arc::new(ItemGroup::from_items(vec![
            ItemData::shared(1, 30i64),
            ItemData::shared(2, "nobi"),
            ItemData::shared(3, "green"),
        ])))
        .unwrap();

        let joined = left.left_outer_join(&heights(), 1, 0).unwrap();
        assert_eq!(joined.len(), 4);
        let padded = joined.get(3).unwrap();
        assert_eq!(
            texts(&padded),
            vec!["30", "nobi", "green", "NULL", "NULL", "NULL"]
        );
        let null_height = padded.get_item_at(4).unwrap();
        assert!(null_height.is_null());
        assert_eq!(null_height.data_type(), ItemDataType::Int);
        assert_eq!(null_height.id(), 102);
    }

    #[test]
    fn test_right_and_full_outer_join() {
        let joined = people().right_outer_join(&heights(), 1, 0).unwrap();
        assert_eq!(joined.len(), 5);
        let unmatched: Vec<Vec<String>> = joined.rows()[3..].iter().map(texts).collect();
        assert_eq!(
            unmatched,
            vec![
                vec!["NULL", "NULL", "NULL", "nobita", "200", "snake"],
                vec!["NULL", "NULL", "NULL", "maria", "170", "mai"],
            ]
        );

        let left = people();
        left.add(Arc::new(ItemGroup::from_items(vec![
            ItemData::shared(1, 30i64),
            ItemData::shared(2, "nobi"),
            ItemData::shared(3, "green"),
        ])))
        .unwrap();
        let full = left.full_outer_join(&heights(), 1, 0).unwrap();
        let rows: Vec<Vec<String>> = full.rows().iter().map(texts).collect();
        assert_eq!(
            rows,
            vec![
                vec!["10", "anri", "red", "anri", "150", "ann"],
                vec!["10", "anri", "red", "anri", "250", "tooower"],
                vec!["20", "mai", "blue", "mai", "180", "maimai"],
                vec!["30", "nobi", "green", "NULL", "NULL", "NULL"],
                vec!["NULL", "NULL", "NULL", "nobita", "200", "snake"],
                vec!["NULL", "NULL", "NULL", "maria", "170", "mai"],
            ]
        );

        let left_only = full.get(3).unwrap();
        assert!(!left_only.get_item_at(1).unwrap().is_null());
        for index in 3..6 {
            assert!(left_only.get_item_at(index).unwrap().is_null());
        }
        let right_only = full.get(4).unwrap();
        for index in 0..3 {
            assert!(right_only.get_item_at(index).unwrap().is_null());
        }
        assert!(!right_only.get_item_at(3).unwrap().is_null());
        assert_eq!(right_only.get_item_at(0).unwrap().id(), 1);
        assert_eq!(full.number_of_columns(), 6);
    }

    #[test]
    fn test_frozen_table_read_from_many_threads() {
        let joined = Arc::new(people().cross_join(&heights()).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|offset| {
                let joined = joined.clone();
                std::thread::spawn(move || {
                    let mut names = Vec::new();
                    joined.for_each(|row| {
                        names.push(row.get_item_at(1).unwrap().get_string());
                        true
                    });
                    let row = joined.get(offset).unwrap();
                    assert!(row.is_frozen());
                    (names, texts(&row))
                })
            })
            .collect();

        for (offset, handle) in handles.into_iter().enumerate() {
            let (names, row) = handle.join().unwrap();
            assert_eq!(names.len(), 10);
            assert_eq!(names.iter().filter(|name| *name == "anri").count(), 5);
            assert_eq!(row, texts(&joined.get(offset).unwrap()));
        }
    }

    #[test]
    fn test_outer_join_against_unknown_schema() {
        let joined = people().left_outer_join(&ItemTable::new(), 1, 0).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.get(0).unwrap().len(), 3);
    }

    #[test]
    fn test_join_limit() {
        let left = people().with_max_join_rows(4);
        let err = left.cross_join(&heights()).unwrap_err();
        assert!(matches!(err, Error::JoinLimitExceeded { limit: 4 }));

        let left = people().with_max_join_rows(2);
        let err = left.inner_join(&heights(), 1, 0).unwrap_err();
        assert!(matches!(err, Error::JoinLimitExceeded { limit: 2 }));
    }

    #[test]
    fn test_add_new_group_binds_schema() {
        let table = people();
        let row = table.add_new_group().unwrap();
        assert!(row.add(ItemData::shared(1, "wrong")).is_err());
        row.add(ItemData::shared(1, 30i64)).unwrap();
        row.add(ItemData::shared(2, "nobi")).unwrap();
        row.add(ItemData::shared(3, "green")).unwrap();
        assert!(row.is_frozen());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_for_each_stops_early() {
        let table = heights();
        let mut visited = 0;
        let completed = table.for_each(|_| {
            visited += 1;
            visited < 2
        });
        assert!(!completed);
        assert_eq!(visited, 2);
    }

    fn table_of(rows: usize, columns: usize) -> ItemTable {
        let table = ItemTable::new();
        for r in 0..rows {
            let items = (0..columns)
                .map(|c| ItemData::shared(c as u64, (r * columns + c) as i64))
                .collect();
            table.add(Arc::new(ItemGroup::from_items(items))).unwrap();
        }
        table
    }

    proptest! {
        #[test]
        fn prop_cross_join_cardinality(
            n in 0usize..6,
            m in 0usize..6,
            ca in 1usize..4,
            cb in 1usize..4,
        ) {
            let joined = table_of(n, ca).cross_join(&table_of(m, cb)).unwrap();
            prop_assert_eq!(joined.len(), n * m);
            let expected_columns = if n * m == 0 { 0 } else { ca + cb };
            prop_assert_eq!(joined.number_of_columns(), expected_columns);
        }
    }
}

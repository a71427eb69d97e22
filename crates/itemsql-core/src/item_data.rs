//! Typed column values
//!
//! An [`ItemData`] is a single value in a row: an identifier that is unique
//! within its row, one of five native types, the payload and a null flag.
//! Values are shared between rows and join results through [`ItemDataPtr`],
//! so the payload sits behind a read/write lock.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Identifier of a value within a row
pub type ItemId = u64;

/// Identifier given to values computed by operators and functions
pub const ITEM_ID_ANONYMOUS: ItemId = u64::MAX;

/// Shared handle to a value
pub type ItemDataPtr = Arc<ItemData>;

/// Native type of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemDataType {
    Bool,
    Int,
    Uint64,
    Double,
    String,
}

impl ItemDataType {
    /// Human readable type name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ItemDataType::Bool => "Boolean",
            ItemDataType::Int => "Integer",
            ItemDataType::Uint64 => "Unsigned",
            ItemDataType::Double => "Double",
            ItemDataType::String => "String",
        }
    }
}

impl fmt::Display for ItemDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemValue {
    Bool(bool),
    Int(i64),
    Uint64(u64),
    Double(f64),
    String(String),
}

impl ItemValue {
    /// Native type of this payload
    pub fn data_type(&self) -> ItemDataType {
        match self {
            ItemValue::Bool(_) => ItemDataType::Bool,
            ItemValue::Int(_) => ItemDataType::Int,
            ItemValue::Uint64(_) => ItemDataType::Uint64,
            ItemValue::Double(_) => ItemDataType::Double,
            ItemValue::String(_) => ItemDataType::String,
        }
    }

    /// Zero value of the given type, used as the payload of null values
    pub fn zero_of(data_type: ItemDataType) -> Self {
        match data_type {
            ItemDataType::Bool => ItemValue::Bool(false),
            ItemDataType::Int => ItemValue::Int(0),
            ItemDataType::Uint64 => ItemValue::Uint64(0),
            ItemDataType::Double => ItemValue::Double(0.0),
            ItemDataType::String => ItemValue::String(String::new()),
        }
    }

    /// Canonical text form
    pub fn to_text(&self) -> String {
        match self {
            ItemValue::Bool(b) => u8::from(*b).to_string(),
            ItemValue::Int(i) => i.to_string(),
            ItemValue::Uint64(u) => u.to_string(),
            ItemValue::Double(d) => d.to_string(),
            ItemValue::String(s) => s.clone(),
        }
    }
}

impl From<bool> for ItemValue {
    fn from(b: bool) -> Self {
        ItemValue::Bool(b)
    }
}

impl From<i64> for ItemValue {
    fn from(i: i64) -> Self {
        ItemValue::Int(i)
    }
}

impl From<i32> for ItemValue {
    fn from(i: i32) -> Self {
        ItemValue::Int(i as i64)
    }
}

impl From<u64> for ItemValue {
    fn from(u: u64) -> Self {
        ItemValue::Uint64(u)
    }
}

impl From<f64> for ItemValue {
    fn from(d: f64) -> Self {
        ItemValue::Double(d)
    }
}

impl From<String> for ItemValue {
    fn from(s: String) -> Self {
        ItemValue::String(s)
    }
}

impl From<&str> for ItemValue {
    fn from(s: &str) -> Self {
        ItemValue::String(s.to_string())
    }
}

/// Comparison operators over values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }

    /// Applies the operator to an ordering of lhs relative to rhs
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, Comparison::Eq | Comparison::Ne)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
}

impl Arithmetic {
    fn symbol(&self) -> &'static str {
        match self {
            Arithmetic::Add => "+",
            Arithmetic::Sub => "-",
            Arithmetic::Mul => "*",
            Arithmetic::Div => "/",
        }
    }
}

enum Failure {
    Undefined,
    Invalid,
}

fn apply_arithmetic(
    op: Arithmetic,
    lhs: &ItemValue,
    rhs: &ItemValue,
) -> std::result::Result<ItemValue, Failure> {
    match (lhs, rhs) {
        (ItemValue::Int(a), ItemValue::Int(b)) => {
            let result = match op {
                Arithmetic::Add => a.checked_add(*b),
                Arithmetic::Sub => a.checked_sub(*b),
                Arithmetic::Mul => a.checked_mul(*b),
                Arithmetic::Div => a.checked_div(*b),
            };
            result.map(ItemValue::Int).ok_or(Failure::Invalid)
        }
        (ItemValue::Uint64(a), ItemValue::Uint64(b)) => {
            let result = match op {
                Arithmetic::Add => a.checked_add(*b),
                Arithmetic::Sub => a.checked_sub(*b),
                Arithmetic::Mul => a.checked_mul(*b),
                Arithmetic::Div => a.checked_div(*b),
            };
            result.map(ItemValue::Uint64).ok_or(Failure::Invalid)
        }
        (ItemValue::Double(a), ItemValue::Double(b)) => match op {
            Arithmetic::Add => Ok(ItemValue::Double(a + b)),
            Arithmetic::Sub => Ok(ItemValue::Double(a - b)),
            Arithmetic::Mul => Ok(ItemValue::Double(a * b)),
            Arithmetic::Div if *b == 0.0 => Err(Failure::Invalid),
            Arithmetic::Div => Ok(ItemValue::Double(a / b)),
        },
        (ItemValue::String(_), ItemValue::String(_)) => Err(Failure::Invalid),
        _ => Err(Failure::Undefined),
    }
}

/// Hashable identity of a value, used for DISTINCT de-duplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Null,
    Bool(bool),
    Int(i64),
    Uint64(u64),
    Double(u64),
    String(String),
}

/// A typed value within a row
#[derive(Debug)]
pub struct ItemData {
    id: ItemId,
    data_type: ItemDataType,
    null: AtomicBool,
    value: RwLock<ItemValue>,
}

impl ItemData {
    /// Create a non-null value
    pub fn new(id: ItemId, value: impl Into<ItemValue>) -> Self {
        let value = value.into();
        Self {
            id,
            data_type: value.data_type(),
            null: AtomicBool::new(false),
            value: RwLock::new(value),
        }
    }

    /// Create a shared non-null value
    pub fn shared(id: ItemId, value: impl Into<ItemValue>) -> ItemDataPtr {
        Arc::new(Self::new(id, value))
    }

    /// Create a null value of the given type
    pub fn null_of(id: ItemId, data_type: ItemDataType) -> Self {
        let data = Self::new(id, ItemValue::zero_of(data_type));
        data.set_null(true);
        data
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn data_type(&self) -> ItemDataType {
        self.data_type
    }

    pub fn is_null(&self) -> bool {
        self.null.load(AtomicOrdering::Acquire)
    }

    pub fn set_null(&self, null: bool) {
        self.null.store(null, AtomicOrdering::Release);
    }

    fn read(&self) -> RwLockReadGuard<'_, ItemValue> {
        self.value.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ItemValue> {
        self.value.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the payload
    pub fn get(&self) -> ItemValue {
        self.read().clone()
    }

    /// Replace the payload. The new payload must have the same native type.
    pub fn set(&self, value: impl Into<ItemValue>) -> Result<()> {
        let value = value.into();
        if value.data_type() != self.data_type {
            return Err(Error::PayloadTypeMismatch {
                id: self.id,
                expected: self.data_type,
                found: value.data_type(),
            });
        }
        *self.write() = value;
        self.set_null(false);
        Ok(())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self.read() {
            ItemValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self.read() {
            ItemValue::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_uint64(&self) -> Option<u64> {
        match *self.read() {
            ItemValue::Uint64(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match *self.read() {
            ItemValue::Double(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match &*self.read() {
            ItemValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Canonical text form; null values render as `NULL`
    pub fn get_string(&self) -> String {
        if self.is_null() {
            return "NULL".to_string();
        }
        self.read().to_text()
    }

    /// Hashable identity of the current payload
    pub fn key(&self) -> ItemKey {
        if self.is_null() {
            return ItemKey::Null;
        }
        match &*self.read() {
            ItemValue::Bool(b) => ItemKey::Bool(*b),
            ItemValue::Int(i) => ItemKey::Int(*i),
            ItemValue::Uint64(u) => ItemKey::Uint64(*u),
            ItemValue::Double(d) => ItemKey::Double(d.to_bits()),
            ItemValue::String(s) => ItemKey::String(s.clone()),
        }
    }

    /// Total order for sorting rows.
    ///
    /// Nulls come first. Integers of either signedness compare by value and
    /// doubles use their IEEE total order. Values of unrelated types order by
    /// type: Boolean, integers, Double, String.
    pub fn sort_cmp(&self, other: &ItemData) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        fn rank(value: &ItemValue) -> u8 {
            match value {
                ItemValue::Bool(_) => 0,
                ItemValue::Int(_) | ItemValue::Uint64(_) => 1,
                ItemValue::Double(_) => 2,
                ItemValue::String(_) => 3,
            }
        }
        match (self.get(), other.get()) {
            (ItemValue::Bool(a), ItemValue::Bool(b)) => a.cmp(&b),
            (ItemValue::Int(a), ItemValue::Int(b)) => a.cmp(&b),
            (ItemValue::Uint64(a), ItemValue::Uint64(b)) => a.cmp(&b),
            (ItemValue::Int(a), ItemValue::Uint64(b)) => i128::from(a).cmp(&i128::from(b)),
            (ItemValue::Uint64(a), ItemValue::Int(b)) => i128::from(a).cmp(&i128::from(b)),
            (ItemValue::Double(a), ItemValue::Double(b)) => a.total_cmp(&b),
            (ItemValue::String(a), ItemValue::String(b)) => a.cmp(&b),
            (a, b) => rank(&a).cmp(&rank(&b)),
        }
    }

    /// Copy with the given id and the same payload and null flag
    pub fn duplicate(&self, id: ItemId) -> ItemData {
        let data = ItemData::new(id, self.get());
        data.set_null(self.is_null());
        data
    }

    fn undefined(&self, operator: &'static str, rhs: &ItemData) -> Error {
        Error::UndefinedOperation {
            operator,
            lhs: self.data_type,
            rhs: rhs.data_type,
            lhs_id: self.id,
            rhs_id: rhs.id,
        }
    }

    fn invalid(&self, operator: &'static str, rhs: &ItemData) -> Error {
        Error::InvalidOperation {
            operator,
            lhs: self.data_type,
            rhs: rhs.data_type,
            lhs_id: self.id,
            rhs_id: rhs.id,
        }
    }

    /// Compare this value with another.
    ///
    /// Any comparison involving a null value is false.
    pub fn compare(&self, op: Comparison, rhs: &ItemData) -> Result<bool> {
        let lhs_value = self.get();
        let rhs_value = rhs.get();
        let any_null = self.is_null() || rhs.is_null();

        let result = match (&lhs_value, &rhs_value) {
            (ItemValue::Int(a), ItemValue::Int(b)) => op.holds(a.cmp(b)),
            (ItemValue::Uint64(a), ItemValue::Uint64(b)) => op.holds(a.cmp(b)),
            (ItemValue::Double(a), ItemValue::Double(b)) => match a.partial_cmp(b) {
                Some(ordering) => op.holds(ordering),
                None => op == Comparison::Ne,
            },
            (ItemValue::Bool(a), ItemValue::Bool(b)) => {
                if !op.is_equality() {
                    return Err(self.undefined(op.symbol(), rhs));
                }
                op.holds(a.cmp(b))
            }
            (ItemValue::String(a), ItemValue::String(b)) => {
                if !op.is_equality() {
                    return Err(self.invalid(op.symbol(), rhs));
                }
                op.holds(a.cmp(b))
            }
            (ItemValue::Int(a), ItemValue::Uint64(b)) => {
                if *a < 0 {
                    matches!(op, Comparison::Lt | Comparison::Le | Comparison::Ne)
                } else {
                    op.holds((*a as u64).cmp(b))
                }
            }
            (ItemValue::Uint64(a), ItemValue::Int(b)) => {
                if *b < 0 {
                    if !any_null {
                        warn!(
                            "Comparing unsigned item {} with negative integer item {}: {}. The result may be wrong.",
                            self.id, rhs.id, b
                        );
                    }
                    match op {
                        Comparison::Gt | Comparison::Lt | Comparison::Ge | Comparison::Ne => true,
                        Comparison::Le | Comparison::Eq => false,
                    }
                } else {
                    op.holds(a.cmp(&(*b as u64)))
                }
            }
            _ => return Err(self.undefined(op.symbol(), rhs)),
        };

        if any_null {
            return Ok(false);
        }
        Ok(result)
    }

    pub fn eq_item(&self, rhs: &ItemData) -> Result<bool> {
        self.compare(Comparison::Eq, rhs)
    }

    pub fn ne_item(&self, rhs: &ItemData) -> Result<bool> {
        self.compare(Comparison::Ne, rhs)
    }

    pub fn lt(&self, rhs: &ItemData) -> Result<bool> {
        self.compare(Comparison::Lt, rhs)
    }

    pub fn le(&self, rhs: &ItemData) -> Result<bool> {
        self.compare(Comparison::Le, rhs)
    }

    pub fn gt(&self, rhs: &ItemData) -> Result<bool> {
        self.compare(Comparison::Gt, rhs)
    }

    pub fn ge(&self, rhs: &ItemData) -> Result<bool> {
        self.compare(Comparison::Ge, rhs)
    }

    fn arithmetic(&self, op: Arithmetic, rhs: &ItemData) -> Result<ItemDataPtr> {
        let value = apply_arithmetic(op, &self.get(), &rhs.get());
        match value {
            Ok(value) => {
                let data = ItemData::new(ITEM_ID_ANONYMOUS, value);
                data.set_null(self.is_null() || rhs.is_null());
                Ok(Arc::new(data))
            }
            // Null operands propagate null instead of failing on a zero payload.
            Err(Failure::Invalid)
                if (self.is_null() || rhs.is_null())
                    && self.data_type == rhs.data_type
                    && self.data_type != ItemDataType::String =>
            {
                Ok(Arc::new(ItemData::null_of(ITEM_ID_ANONYMOUS, self.data_type)))
            }
            Err(Failure::Invalid) => Err(self.invalid(op.symbol(), rhs)),
            Err(Failure::Undefined) => Err(self.undefined(op.symbol(), rhs)),
        }
    }

    pub fn plus(&self, rhs: &ItemData) -> Result<ItemDataPtr> {
        self.arithmetic(Arithmetic::Add, rhs)
    }

    pub fn minus(&self, rhs: &ItemData) -> Result<ItemDataPtr> {
        self.arithmetic(Arithmetic::Sub, rhs)
    }

    pub fn multiply(&self, rhs: &ItemData) -> Result<ItemDataPtr> {
        self.arithmetic(Arithmetic::Mul, rhs)
    }

    pub fn divide(&self, rhs: &ItemData) -> Result<ItemDataPtr> {
        self.arithmetic(Arithmetic::Div, rhs)
    }

    /// Add `rhs` into this value in place.
    ///
    /// A null `rhs` leaves the value untouched; a null value takes over the
    /// payload of `rhs`.
    pub fn add_assign(&self, rhs: &ItemData) -> Result<()> {
        let rhs_value = rhs.get();
        if rhs_value.data_type() != self.data_type {
            return Err(self.undefined("+=", rhs));
        }
        if rhs.is_null() {
            return Ok(());
        }
        let mut guard = self.write();
        if self.is_null() {
            *guard = rhs_value;
            self.set_null(false);
            return Ok(());
        }
        match apply_arithmetic(Arithmetic::Add, &guard, &rhs_value) {
            Ok(sum) => {
                *guard = sum;
                Ok(())
            }
            Err(Failure::Invalid) => Err(self.invalid("+=", rhs)),
            Err(Failure::Undefined) => Err(self.undefined("+=", rhs)),
        }
    }

    /// Arithmetic negation
    pub fn negate(&self) -> Result<ItemDataPtr> {
        let negated = match self.get() {
            ItemValue::Int(i) => i.checked_neg().map(ItemValue::Int),
            ItemValue::Double(d) => Some(ItemValue::Double(-d)),
            _ => None,
        };
        let value = negated.ok_or(Error::UndefinedUnaryOperation {
            operator: "-",
            operand: self.data_type,
            id: self.id,
        })?;
        let data = ItemData::new(ITEM_ID_ANONYMOUS, value);
        data.set_null(self.is_null());
        Ok(Arc::new(data))
    }

    /// Logical negation of a boolean value
    pub fn logical_not(&self) -> Result<ItemDataPtr> {
        match self.get() {
            ItemValue::Bool(b) => {
                let data = ItemData::new(ITEM_ID_ANONYMOUS, !b);
                data.set_null(self.is_null());
                Ok(Arc::new(data))
            }
            _ => Err(Error::UndefinedUnaryOperation {
                operator: "NOT",
                operand: self.data_type,
                id: self.id,
            }),
        }
    }
}

impl fmt::Display for ItemData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_string())
    }
}

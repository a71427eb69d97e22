//! Aggregate functions and their accumulators
//!
//! Formula nodes for MAX, COUNT and SUM are stateless; the running state of
//! each lives in an [`Accumulator`] owned by the formula, so a formula can be
//! reset and evaluated over a new row stream.

use itemsql_core::{
    Error, ITEM_ID_ANONYMOUS, ItemData, ItemDataPtr, ItemDataType, ItemKey, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Aggregate function kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    Max,
    Count,
    Sum,
}

impl FunctionKind {
    /// Look up a function by name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "max" => Some(FunctionKind::Max),
            "count" => Some(FunctionKind::Count),
            "sum" => Some(FunctionKind::Sum),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FunctionKind::Max => "MAX",
            FunctionKind::Count => "COUNT",
            FunctionKind::Sum => "SUM",
        }
    }

    /// Number of arguments the function takes
    pub fn required_args(&self) -> usize {
        1
    }

    /// Fresh accumulator for this function
    pub fn create_accumulator(&self, distinct: bool) -> Box<dyn Accumulator> {
        match self {
            FunctionKind::Max => Box::new(MaxAccumulator::default()),
            FunctionKind::Count => Box::new(CountAccumulator::new(distinct)),
            FunctionKind::Sum => Box::new(SumAccumulator::default()),
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running state of an aggregate function
pub trait Accumulator: Send + Sync + fmt::Debug {
    /// Forget everything accumulated so far
    fn reset(&mut self);

    /// Fold one value into the state
    fn accumulate(&mut self, value: &ItemData) -> Result<()>;

    /// Result over the values accumulated so far
    fn current(&self) -> ItemDataPtr;
}

fn empty_result() -> ItemDataPtr {
    Arc::new(ItemData::null_of(ITEM_ID_ANONYMOUS, ItemDataType::Int))
}

/// Largest non-null value
#[derive(Debug, Default)]
pub struct MaxAccumulator {
    max: Option<ItemDataPtr>,
}

impl Accumulator for MaxAccumulator {
    fn reset(&mut self) {
        self.max = None;
    }

    fn accumulate(&mut self, value: &ItemData) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        let replace = match &self.max {
            Some(max) => value.gt(max)?,
            None => true,
        };
        if replace {
            self.max = Some(Arc::new(value.duplicate(ITEM_ID_ANONYMOUS)));
        }
        Ok(())
    }

    fn current(&self) -> ItemDataPtr {
        self.max.clone().unwrap_or_else(empty_result)
    }
}

/// Sum of non-null values, added in place into one running value
#[derive(Debug, Default)]
pub struct SumAccumulator {
    sum: Option<ItemData>,
}

impl Accumulator for SumAccumulator {
    fn reset(&mut self) {
        self.sum = None;
    }

    fn accumulate(&mut self, value: &ItemData) -> Result<()> {
        match &self.sum {
            Some(sum) => sum.add_assign(value),
            None => {
                if !matches!(
                    value.data_type(),
                    ItemDataType::Int | ItemDataType::Uint64 | ItemDataType::Double
                ) {
                    return Err(Error::UndefinedUnaryOperation {
                        operator: "SUM",
                        operand: value.data_type(),
                        id: value.id(),
                    });
                }
                self.sum = Some(value.duplicate(ITEM_ID_ANONYMOUS));
                Ok(())
            }
        }
    }

    fn current(&self) -> ItemDataPtr {
        match &self.sum {
            Some(sum) => Arc::new(sum.duplicate(ITEM_ID_ANONYMOUS)),
            None => empty_result(),
        }
    }
}

/// Number of non-null values, optionally counting each distinct value once
#[derive(Debug, Default)]
pub struct CountAccumulator {
    distinct: bool,
    count: u64,
    seen: HashSet<ItemKey>,
}

impl CountAccumulator {
    pub fn new(distinct: bool) -> Self {
        Self {
            distinct,
            ..Default::default()
        }
    }
}

impl Accumulator for CountAccumulator {
    fn reset(&mut self) {
        self.count = 0;
        self.seen.clear();
    }

    fn accumulate(&mut self, value: &ItemData) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        if self.distinct && !self.seen.insert(value.key()) {
            return Ok(());
        }
        self.count += 1;
        Ok(())
    }

    fn current(&self) -> ItemDataPtr {
        Arc::new(ItemData::new(ITEM_ID_ANONYMOUS, self.count))
    }
}

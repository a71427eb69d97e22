//! Formula node kinds and their priorities

use crate::column::ColumnDataGetter;
use crate::function::FunctionKind;
use itemsql_core::{Comparison, ItemDataPtr};
use std::fmt;

/// Binding strength of a node. Lower binds looser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormulaPriority {
    Or,
    And,
    Not,
    Comparison,
    Additive,
    Multiplicative,
    Unary,
    Function,
    Parenthesis,
    Terminal,
}

/// Two-operand operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Compare(Comparison),
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

impl BinaryOperator {
    pub fn priority(&self) -> FormulaPriority {
        match self {
            BinaryOperator::Compare(_) => FormulaPriority::Comparison,
            BinaryOperator::Add | BinaryOperator::Sub => FormulaPriority::Additive,
            BinaryOperator::Mul | BinaryOperator::Div => FormulaPriority::Multiplicative,
            BinaryOperator::And => FormulaPriority::And,
            BinaryOperator::Or => FormulaPriority::Or,
        }
    }

    /// Whether `a op (b op c)` equals `(a op b) op c`
    pub fn is_associative(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add | BinaryOperator::Mul | BinaryOperator::And | BinaryOperator::Or
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Compare(Comparison::Eq) => "=",
            BinaryOperator::Compare(Comparison::Ne) => "<>",
            BinaryOperator::Compare(op) => op.symbol(),
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }
}

/// One-operand prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Minus,
}

impl UnaryOperator {
    pub fn priority(&self) -> FormulaPriority {
        match self {
            UnaryOperator::Not => FormulaPriority::Not,
            UnaryOperator::Minus => FormulaPriority::Unary,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT",
            UnaryOperator::Minus => "-",
        }
    }
}

/// Kind of a formula node
pub enum FormulaElement {
    Column {
        name: String,
        getter: Box<dyn ColumnDataGetter>,
    },
    Value(ItemDataPtr),
    /// `*` as a select column or as the argument of COUNT
    Wildcard,
    Parenthesis,
    Binary(BinaryOperator),
    Unary(UnaryOperator),
    /// `operand BETWEEN low AND high`
    Between {
        low: ItemDataPtr,
        high: ItemDataPtr,
    },
    /// `operand IN (values...)`
    In {
        values: Vec<ItemDataPtr>,
    },
    /// Aggregate function; `accumulator` indexes the formula's accumulators
    Function {
        kind: FunctionKind,
        distinct: bool,
        accumulator: usize,
    },
}

impl FormulaElement {
    pub fn priority(&self) -> FormulaPriority {
        match self {
            FormulaElement::Column { .. } | FormulaElement::Value(_) | FormulaElement::Wildcard => {
                FormulaPriority::Terminal
            }
            FormulaElement::Parenthesis => FormulaPriority::Parenthesis,
            FormulaElement::Binary(op) => op.priority(),
            FormulaElement::Unary(op) => op.priority(),
            FormulaElement::Between { .. } | FormulaElement::In { .. } => {
                FormulaPriority::Comparison
            }
            FormulaElement::Function { .. } => FormulaPriority::Function,
        }
    }

    /// Number of child slots. Functions grow one slot per argument and
    /// report none here.
    pub fn capacity(&self) -> usize {
        match self {
            FormulaElement::Binary(_) => 2,
            FormulaElement::Parenthesis
            | FormulaElement::Unary(_)
            | FormulaElement::Between { .. }
            | FormulaElement::In { .. } => 1,
            _ => 0,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, FormulaElement::Function { .. })
    }

    /// Nodes that take the already parsed operand as their first child
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            FormulaElement::Binary(_) | FormulaElement::Between { .. } | FormulaElement::In { .. }
        )
    }
}

impl fmt::Display for FormulaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaElement::Column { name, .. } => write!(f, "Column: {}", name),
            FormulaElement::Value(value) => {
                write!(f, "Value: {} ({})", value.get_string(), value.data_type())
            }
            FormulaElement::Wildcard => write!(f, "Wildcard"),
            FormulaElement::Parenthesis => write!(f, "Parenthesis"),
            FormulaElement::Binary(op) => write!(f, "Operator: {}", op.symbol()),
            FormulaElement::Unary(op) => write!(f, "Operator: {}", op.symbol()),
            FormulaElement::Between { low, high } => write!(
                f,
                "Between: {} AND {}",
                low.get_string(),
                high.get_string()
            ),
            FormulaElement::In { values } => {
                let values: Vec<String> = values.iter().map(|v| v.get_string()).collect();
                write!(f, "In: ({})", values.join(", "))
            }
            FormulaElement::Function { kind, distinct, .. } => {
                if *distinct {
                    write!(f, "Function: {} DISTINCT", kind)
                } else {
                    write!(f, "Function: {}", kind)
                }
            }
        }
    }
}

impl fmt::Debug for FormulaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

//! Formula trees
//!
//! A [`Formula`] owns its nodes in an arena; children are indices into it.
//! Aggregate state lives beside the nodes in a list of accumulators so that
//! the tree itself stays immutable during evaluation.
//!
//! Trees are grown left to right by a [`FormulaBuilder`]. The builder keeps
//! the path from the root down to the most recently inserted node, and a
//! stack of open parenthesis/function scopes. An operand always fills the
//! free slot of the node at the end of the path. An operator walks up the
//! path, never past the innermost open scope, to the first node that binds
//! looser than itself, and splices in as that node's last child, taking the
//! previous child as its own first operand. If no such node exists it takes
//! over the top of the scope.

use crate::element::{BinaryOperator, FormulaElement, UnaryOperator};
use crate::function::Accumulator;
use itemsql_core::{Error, ITEM_ID_ANONYMOUS, ItemData, ItemDataPtr, ItemDataType, ItemGroup, Result};
use std::fmt::Write;
use std::sync::Arc;

/// Index of a node within its formula
pub type NodeId = usize;

/// A node and its children
#[derive(Debug)]
pub struct FormulaNode {
    pub element: FormulaElement,
    pub children: Vec<NodeId>,
}

/// A parsed formula
#[derive(Debug, Default)]
pub struct Formula {
    nodes: Vec<FormulaNode>,
    root: Option<NodeId>,
    accumulators: Vec<Box<dyn Accumulator>>,
}

fn bool_item(value: bool) -> ItemDataPtr {
    Arc::new(ItemData::new(ITEM_ID_ANONYMOUS, value))
}

fn logic_operand(operator: &'static str, item: &ItemData) -> Result<bool> {
    match item.as_bool() {
        Some(value) => Ok(value && !item.is_null()),
        None => Err(Error::UndefinedUnaryOperation {
            operator,
            operand: item.data_type(),
            id: item.id(),
        }),
    }
}

impl Formula {
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&FormulaNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// True if the formula contains an aggregate function
    pub fn has_statistical_func(&self) -> bool {
        !self.accumulators.is_empty()
    }

    /// True if the whole formula is `*`
    pub fn is_wildcard(&self) -> bool {
        self.root
            .and_then(|root| self.nodes.get(root))
            .is_some_and(|node| matches!(node.element, FormulaElement::Wildcard))
    }

    /// Clear every aggregate's running state
    pub fn reset_statistics(&mut self) {
        for accumulator in &mut self.accumulators {
            accumulator.reset();
        }
    }

    /// Feed `row` to every aggregate, then evaluate the formula on it
    pub fn evaluate(&mut self, row: &ItemGroup) -> Result<ItemDataPtr> {
        self.accumulate(row)?;
        self.snapshot(Some(row))
    }

    /// Feed `row` to every aggregate without evaluating the whole formula
    pub fn accumulate(&mut self, row: &ItemGroup) -> Result<()> {
        let functions: Vec<(usize, Option<NodeId>)> = self
            .nodes
            .iter()
            .filter_map(|node| match node.element {
                FormulaElement::Function { accumulator, .. } => {
                    Some((accumulator, node.children.first().copied()))
                }
                _ => None,
            })
            .collect();

        for (accumulator, argument) in functions {
            let argument = argument
                .ok_or_else(|| Error::Internal("Function node without argument".to_string()))?;
            let value = match self.nodes[argument].element {
                FormulaElement::Wildcard => bool_item(true),
                _ => self.eval_node(argument, Some(row))?,
            };
            let state = self.accumulators.get_mut(accumulator).ok_or_else(|| {
                Error::Internal(format!("Accumulator {} does not exist", accumulator))
            })?;
            state.accumulate(&value)?;
        }
        Ok(())
    }

    /// Evaluate using the aggregates' current state, without feeding them.
    ///
    /// Columns evaluate to NULL when no row is given.
    pub fn snapshot(&self, row: Option<&ItemGroup>) -> Result<ItemDataPtr> {
        let root = self
            .root
            .ok_or_else(|| Error::QueryExecution("Empty formula".to_string()))?;
        self.eval_node(root, row)
    }

    fn child(&self, id: NodeId, index: usize) -> Result<NodeId> {
        self.nodes[id].children.get(index).copied().ok_or_else(|| {
            Error::Internal(format!(
                "Node '{}' has no operand {}",
                self.nodes[id].element, index
            ))
        })
    }

    fn eval_node(&self, id: NodeId, row: Option<&ItemGroup>) -> Result<ItemDataPtr> {
        let node = &self.nodes[id];
        match &node.element {
            FormulaElement::Column { getter, .. } => match row {
                Some(row) => getter.get_data(row),
                None => Ok(Arc::new(ItemData::null_of(
                    ITEM_ID_ANONYMOUS,
                    ItemDataType::String,
                ))),
            },
            FormulaElement::Value(value) => Ok(value.clone()),
            FormulaElement::Wildcard => Err(Error::QueryExecution(
                "'*' cannot be evaluated as a value".to_string(),
            )),
            FormulaElement::Parenthesis => self.eval_node(self.child(id, 0)?, row),
            FormulaElement::Binary(BinaryOperator::And) => {
                let lhs = self.eval_node(self.child(id, 0)?, row)?;
                if !logic_operand("AND", &lhs)? {
                    return Ok(bool_item(false));
                }
                let rhs = self.eval_node(self.child(id, 1)?, row)?;
                Ok(bool_item(logic_operand("AND", &rhs)?))
            }
            FormulaElement::Binary(BinaryOperator::Or) => {
                let lhs = self.eval_node(self.child(id, 0)?, row)?;
                if logic_operand("OR", &lhs)? {
                    return Ok(bool_item(true));
                }
                let rhs = self.eval_node(self.child(id, 1)?, row)?;
                Ok(bool_item(logic_operand("OR", &rhs)?))
            }
            FormulaElement::Binary(op) => {
                let lhs = self.eval_node(self.child(id, 0)?, row)?;
                let rhs = self.eval_node(self.child(id, 1)?, row)?;
                match op {
                    BinaryOperator::Compare(comparison) => {
                        Ok(bool_item(lhs.compare(*comparison, &rhs)?))
                    }
                    BinaryOperator::Add => lhs.plus(&rhs),
                    BinaryOperator::Sub => lhs.minus(&rhs),
                    BinaryOperator::Mul => lhs.multiply(&rhs),
                    BinaryOperator::Div => lhs.divide(&rhs),
                    BinaryOperator::And | BinaryOperator::Or => Err(Error::Internal(
                        "Logical operator reached arithmetic evaluation".to_string(),
                    )),
                }
            }
            FormulaElement::Unary(op) => {
                let operand = self.eval_node(self.child(id, 0)?, row)?;
                match op {
                    UnaryOperator::Not => operand.logical_not(),
                    UnaryOperator::Minus => operand.negate(),
                }
            }
            FormulaElement::Between { low, high } => {
                let operand = self.eval_node(self.child(id, 0)?, row)?;
                Ok(bool_item(operand.ge(low)? && operand.le(high)?))
            }
            FormulaElement::In { values } => {
                let operand = self.eval_node(self.child(id, 0)?, row)?;
                for value in values {
                    if operand.eq_item(value)? {
                        return Ok(bool_item(true));
                    }
                }
                Ok(bool_item(false))
            }
            FormulaElement::Function { accumulator, .. } => self
                .accumulators
                .get(*accumulator)
                .map(|state| state.current())
                .ok_or_else(|| {
                    Error::Internal(format!("Accumulator {} does not exist", accumulator))
                }),
        }
    }

    /// Indented dump of the tree
    pub fn tree_info(&self) -> String {
        let mut info = String::new();
        if let Some(root) = self.root {
            self.write_tree_info(&mut info, root, 0);
        }
        info
    }

    fn write_tree_info(&self, info: &mut String, id: NodeId, depth: usize) {
        let node = &self.nodes[id];
        let _ = writeln!(info, "{}{}", "  ".repeat(depth), node.element);
        for child in &node.children {
            self.write_tree_info(info, *child, depth + 1);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    /// Position of the scope's node in the path
    depth: usize,
    /// A function scope waiting for the operand of its next argument
    awaiting_argument: bool,
}

/// Where an operator joins the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    /// Become the last child of the node at this path position
    Splice(usize),
    /// Replace the node at this path position, the top of the current scope
    TakeOver(usize),
}

/// Incremental formula construction
#[derive(Debug, Default)]
pub struct FormulaBuilder {
    formula: Formula,
    path: Vec<NodeId>,
    scopes: Vec<Scope>,
}

impl FormulaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// Hand over the built formula, leaving the builder empty
    pub fn take_formula(&mut self) -> Formula {
        self.path.clear();
        self.scopes.clear();
        std::mem::take(&mut self.formula)
    }

    pub fn open_scopes(&self) -> usize {
        self.scopes.len()
    }

    /// Element of the innermost open scope
    pub fn scope_element(&self) -> Option<&FormulaElement> {
        let scope = self.scopes.last()?;
        Some(&self.formula.nodes[self.path[scope.depth]].element)
    }

    /// True if any open scope is an aggregate function
    pub fn in_function_scope(&self) -> bool {
        self.scopes
            .iter()
            .any(|scope| self.formula.nodes[self.path[scope.depth]].element.is_function())
    }

    /// True if the next piece must be an operand rather than an operator
    pub fn expecting_operand(&self) -> bool {
        let Some(&cursor) = self.path.last() else {
            return true;
        };
        let node = &self.formula.nodes[cursor];
        if node.element.is_function() {
            return self
                .scopes
                .last()
                .is_some_and(|scope| scope.depth + 1 == self.path.len() && scope.awaiting_argument);
        }
        node.children.len() < node.element.capacity()
    }

    /// Register an aggregate's state and return its index
    pub fn add_accumulator(&mut self, accumulator: Box<dyn Accumulator>) -> usize {
        self.formula.accumulators.push(accumulator);
        self.formula.accumulators.len() - 1
    }

    fn add_node(&mut self, element: FormulaElement) -> NodeId {
        self.formula.nodes.push(FormulaNode {
            element,
            children: Vec::new(),
        });
        self.formula.nodes.len() - 1
    }

    fn replace_last_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let slot = self.formula.nodes[parent]
            .children
            .last_mut()
            .ok_or_else(|| Error::Internal("Splice target has no child".to_string()))?;
        *slot = child;
        Ok(())
    }

    /// Fill the free slot at the cursor with an operand
    pub fn push_operand(&mut self, element: FormulaElement) -> Result<NodeId> {
        if !self.expecting_operand() {
            return Err(Error::Internal(format!(
                "Both hands are occupied, cannot insert '{}'",
                element
            )));
        }
        let id = self.add_node(element);
        match self.path.last().copied() {
            None => self.formula.root = Some(id),
            Some(parent) => {
                self.formula.nodes[parent].children.push(id);
                if let Some(scope) = self.scopes.last_mut() {
                    if scope.depth + 1 == self.path.len() {
                        scope.awaiting_argument = false;
                    }
                }
            }
        }
        self.path.push(id);
        Ok(id)
    }

    /// Where an operator of this kind would be inserted
    pub fn find_insert_point(&self, element: &FormulaElement) -> InsertPoint {
        let bound = self.scopes.last().map_or(0, |scope| scope.depth + 1);
        let priority = element.priority();
        let cursor = self.path.len().saturating_sub(1);

        for position in (bound..cursor).rev() {
            let existing = &self.formula.nodes[self.path[position]].element;
            if existing.priority() < priority {
                return InsertPoint::Splice(position);
            }
            if let (FormulaElement::Binary(a), FormulaElement::Binary(b)) = (existing, element) {
                if a == b && a.is_associative() {
                    return InsertPoint::Splice(position);
                }
            }
        }
        InsertPoint::TakeOver(bound)
    }

    /// Insert an operator taking the preceding operand as its first child
    pub fn push_operator(&mut self, element: FormulaElement) -> Result<NodeId> {
        if self.formula.root.is_none() {
            return Err(Error::Internal(format!(
                "No left hand side for '{}'",
                element
            )));
        }
        if self.expecting_operand() {
            return Err(Error::Internal(format!(
                "Operator '{}' inserted where an operand is expected",
                element
            )));
        }

        let point = self.find_insert_point(&element);
        let id = self.add_node(element);
        match point {
            InsertPoint::Splice(position) => {
                let parent = self.path[position];
                let previous = self.path[position + 1];
                self.replace_last_child(parent, id)?;
                self.formula.nodes[id].children.push(previous);
                self.path.truncate(position + 1);
            }
            InsertPoint::TakeOver(position) => {
                let previous = self.path[position];
                if position == 0 {
                    self.formula.root = Some(id);
                } else {
                    self.replace_last_child(self.path[position - 1], id)?;
                }
                self.formula.nodes[id].children.push(previous);
                self.path.truncate(position);
            }
        }
        self.path.push(id);
        Ok(id)
    }

    /// Insert a parenthesis or function node as an operand and open its scope
    pub fn open_scope(&mut self, element: FormulaElement) -> Result<NodeId> {
        let awaiting_argument = element.is_function();
        let id = self.push_operand(element)?;
        self.scopes.push(Scope {
            depth: self.path.len() - 1,
            awaiting_argument,
        });
        Ok(id)
    }

    /// Start the next argument of the innermost function scope
    pub fn next_argument(&mut self) -> Result<()> {
        let scope = *self
            .scopes
            .last()
            .ok_or_else(|| Error::QueryParse("',' outside of a function".to_string()))?;
        if !self.formula.nodes[self.path[scope.depth]].element.is_function() {
            return Err(Error::QueryParse("',' outside of a function".to_string()));
        }
        if self.expecting_operand() {
            return Err(Error::QueryParse("Missing argument before ','".to_string()));
        }
        self.path.truncate(scope.depth + 1);
        if let Some(scope) = self.scopes.last_mut() {
            scope.awaiting_argument = true;
        }
        Ok(())
    }

    /// Close the innermost scope, leaving its node as the cursor
    pub fn close_scope(&mut self) -> Result<NodeId> {
        let scope = *self
            .scopes
            .last()
            .ok_or_else(|| Error::QueryParse("Parenthesis is not open.".to_string()))?;
        let id = self.path[scope.depth];
        let at_scope_node = self.path.len() == scope.depth + 1;
        let node = &self.formula.nodes[id];

        match &node.element {
            FormulaElement::Function { kind, .. } => {
                if self.expecting_operand() && !(at_scope_node && node.children.is_empty()) {
                    return Err(Error::QueryParse(format!(
                        "Missing argument in {}",
                        kind
                    )));
                }
                if node.children.len() < kind.required_args() {
                    return Err(Error::QueryParse(format!(
                        "Number of argument is short: {} needs {}",
                        kind,
                        kind.required_args()
                    )));
                }
                if node.children.len() > kind.required_args() {
                    return Err(Error::QueryParse(format!(
                        "Too many arguments: {} takes {}",
                        kind,
                        kind.required_args()
                    )));
                }
            }
            _ => {
                if at_scope_node && node.children.is_empty() {
                    return Err(Error::QueryParse("Empty parenthesis".to_string()));
                }
                if self.expecting_operand() {
                    return Err(Error::QueryParse(
                        "Incomplete expression before ')'".to_string(),
                    ));
                }
            }
        }

        self.scopes.pop();
        self.path.truncate(scope.depth + 1);
        Ok(id)
    }

    /// Mutable access to the element of a node, for clause completion
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut FormulaElement> {
        self.formula.nodes.get_mut(id).map(|node| &mut node.element)
    }

    /// Replace an aggregate's state, e.g. to switch COUNT to DISTINCT mode
    pub fn replace_accumulator(
        &mut self,
        index: usize,
        accumulator: Box<dyn Accumulator>,
    ) -> Result<()> {
        let slot = self
            .formula
            .accumulators
            .get_mut(index)
            .ok_or_else(|| Error::Internal(format!("Accumulator {} does not exist", index)))?;
        *slot = accumulator;
        Ok(())
    }

    /// Node of the innermost open scope
    pub fn scope_node(&self) -> Option<NodeId> {
        self.scopes.last().map(|scope| self.path[scope.depth])
    }

    /// True if the cursor is the innermost scope's own node
    pub fn at_scope_node(&self) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.depth + 1 == self.path.len())
    }

    /// Check that the formula is complete
    pub fn validate(&self) -> Result<()> {
        if !self.scopes.is_empty() {
            return Err(Error::QueryParse("Parenthesis is not closed.".to_string()));
        }
        if self.formula.root.is_some() && self.expecting_operand() {
            return Err(Error::QueryParse("Incomplete expression".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionKind;
    use itemsql_core::Comparison;

    fn value(v: i64) -> FormulaElement {
        FormulaElement::Value(Arc::new(ItemData::new(ITEM_ID_ANONYMOUS, v)))
    }

    fn op(op: BinaryOperator) -> FormulaElement {
        FormulaElement::Binary(op)
    }

    fn eval(builder: &mut FormulaBuilder) -> i64 {
        builder.validate().unwrap();
        let formula = builder.take_formula();
        formula.snapshot(None).unwrap().as_int().unwrap()
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        let mut builder = FormulaBuilder::new();
        builder.push_operand(value(1)).unwrap();
        builder.push_operator(op(BinaryOperator::Add)).unwrap();
        builder.push_operand(value(2)).unwrap();
        assert_eq!(
            builder.find_insert_point(&op(BinaryOperator::Mul)),
            InsertPoint::Splice(0)
        );
        builder.push_operator(op(BinaryOperator::Mul)).unwrap();
        builder.push_operand(value(3)).unwrap();
        assert_eq!(eval(&mut builder), 7);

        builder.push_operand(value(2)).unwrap();
        builder.push_operator(op(BinaryOperator::Mul)).unwrap();
        builder.push_operand(value(3)).unwrap();
        assert_eq!(
            builder.find_insert_point(&op(BinaryOperator::Add)),
            InsertPoint::TakeOver(0)
        );
        builder.push_operator(op(BinaryOperator::Add)).unwrap();
        builder.push_operand(value(1)).unwrap();
        assert_eq!(eval(&mut builder), 7);
    }

    #[test]
    fn test_non_associative_operators_group_left() {
        let mut builder = FormulaBuilder::new();
        builder.push_operand(value(10)).unwrap();
        builder.push_operator(op(BinaryOperator::Sub)).unwrap();
        builder.push_operand(value(4)).unwrap();
        builder.push_operator(op(BinaryOperator::Sub)).unwrap();
        builder.push_operand(value(3)).unwrap();
        assert_eq!(eval(&mut builder), 3);

        builder.push_operand(value(100)).unwrap();
        builder.push_operator(op(BinaryOperator::Div)).unwrap();
        builder.push_operand(value(10)).unwrap();
        builder.push_operator(op(BinaryOperator::Div)).unwrap();
        builder.push_operand(value(5)).unwrap();
        assert_eq!(eval(&mut builder), 2);

        builder.push_operand(value(10)).unwrap();
        builder.push_operator(op(BinaryOperator::Sub)).unwrap();
        builder.push_operand(value(4)).unwrap();
        builder.push_operator(op(BinaryOperator::Add)).unwrap();
        builder.push_operand(value(3)).unwrap();
        assert_eq!(eval(&mut builder), 9);
    }

    #[test]
    fn test_associative_operator_splices_at_right_hand() {
        let mut builder = FormulaBuilder::new();
        builder.push_operand(value(1)).unwrap();
        builder.push_operator(op(BinaryOperator::Add)).unwrap();
        builder.push_operand(value(2)).unwrap();
        assert_eq!(
            builder.find_insert_point(&op(BinaryOperator::Add)),
            InsertPoint::Splice(0)
        );
        builder.push_operator(op(BinaryOperator::Add)).unwrap();
        builder.push_operand(value(3)).unwrap();

        let formula = builder.formula();
        let root = formula.node(formula.root().unwrap()).unwrap();
        let right = formula.node(root.children[1]).unwrap();
        assert!(matches!(right.element, FormulaElement::Binary(BinaryOperator::Add)));
        assert_eq!(eval(&mut builder), 6);
    }

    #[test]
    fn test_parenthesis_scope() {
        let mut builder = FormulaBuilder::new();
        builder.open_scope(FormulaElement::Parenthesis).unwrap();
        builder.push_operand(value(1)).unwrap();
        builder.push_operator(op(BinaryOperator::Add)).unwrap();
        builder.push_operand(value(2)).unwrap();
        builder.close_scope().unwrap();
        builder.push_operator(op(BinaryOperator::Mul)).unwrap();
        builder.push_operand(value(3)).unwrap();
        assert_eq!(eval(&mut builder), 9);
    }

    #[test]
    fn test_close_without_open_scope() {
        let mut builder = FormulaBuilder::new();
        builder.push_operand(value(1)).unwrap();
        let err = builder.close_scope().unwrap_err();
        assert_eq!(err.to_string(), "Query parse error: Parenthesis is not open.");
    }

    #[test]
    fn test_unclosed_scope_is_incomplete() {
        let mut builder = FormulaBuilder::new();
        builder.open_scope(FormulaElement::Parenthesis).unwrap();
        builder.push_operand(value(1)).unwrap();
        assert!(builder.validate().unwrap_err().is_parse_error());
    }

    #[test]
    fn test_function_arity() {
        let mut builder = FormulaBuilder::new();
        let accumulator = builder.add_accumulator(FunctionKind::Max.create_accumulator(false));
        builder
            .open_scope(FormulaElement::Function {
                kind: FunctionKind::Max,
                distinct: false,
                accumulator,
            })
            .unwrap();
        builder.push_operand(value(1)).unwrap();
        builder.next_argument().unwrap();
        builder.push_operand(value(2)).unwrap();
        let err = builder.close_scope().unwrap_err();
        assert!(err.is_parse_error());

        let mut builder = FormulaBuilder::new();
        let accumulator = builder.add_accumulator(FunctionKind::Sum.create_accumulator(false));
        builder
            .open_scope(FormulaElement::Function {
                kind: FunctionKind::Sum,
                distinct: false,
                accumulator,
            })
            .unwrap();
        let err = builder.close_scope().unwrap_err();
        assert!(err.to_string().contains("Number of argument is short"));
    }

    #[test]
    fn test_both_hands_occupied_is_internal() {
        let mut builder = FormulaBuilder::new();
        builder.push_operand(value(1)).unwrap();
        let err = builder.push_operand(value(2)).unwrap_err();
        assert!(err.is_internal());

        let mut builder = FormulaBuilder::new();
        let err = builder.push_operator(op(BinaryOperator::Add)).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let mut builder = FormulaBuilder::new();
        builder
            .push_operand(FormulaElement::Unary(UnaryOperator::Not))
            .unwrap();
        builder.push_operand(value(1)).unwrap();
        builder
            .push_operator(op(BinaryOperator::Compare(Comparison::Eq)))
            .unwrap();
        builder.push_operand(value(2)).unwrap();
        builder.validate().unwrap();

        let formula = builder.take_formula();
        assert_eq!(formula.snapshot(None).unwrap().as_bool(), Some(true));
        assert_eq!(
            formula.tree_info(),
            "Operator: NOT\n  Operator: =\n    Value: 1 (Integer)\n    Value: 2 (Integer)\n"
        );
    }
}

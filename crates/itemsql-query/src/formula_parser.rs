//! SQL formula parser
//!
//! Turns the text of a WHERE clause or a single select column into a
//! [`Formula`]. The text arrives as words and separator characters from the
//! scanner. A bare word is held back until the next piece shows whether it is
//! a function name (followed by `(`) or an operand.
//!
//! Supported syntax:
//! - column names (optionally `table.column`), numbers and quoted strings
//! - exponents with a sign, such as `1e-3`, which the scanner splits at the sign
//! - `+ - * /`, unary minus
//! - `= <> != < <= > >=`
//! - `AND`, `OR`, `NOT`, `BETWEEN low AND high`, `IN (v1, v2, ...)`
//! - `MAX(x)`, `SUM(x)`, `COUNT(x)`, `COUNT(DISTINCT x)`, `COUNT(*)`
//! - parenthesis groups
//!
//! The first error is sticky: every later call reports it again.

use crate::column::ColumnDataGetterFactory;
use crate::element::{BinaryOperator, FormulaElement, UnaryOperator};
use crate::function::FunctionKind;
use crate::literal::{WordKind, classify};
use crate::scanner::{SeparatedWordSink, SeparatorChecker};
use crate::tree::{Formula, FormulaBuilder};
use itemsql_core::{Comparison, Error, ITEM_ID_ANONYMOUS, ItemData, ItemDataPtr, Result};
use std::sync::Arc;
use tracing::debug;

/// Characters that end a word outside of quotes
pub const FORMULA_SEPARATORS: &str = " \t\r\n()',+-*/=<>!";

/// Characters that end a word inside quotes
pub const QUOTE_SEPARATORS: &str = "'";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    None,
    BetweenLow,
    BetweenAnd,
    BetweenHigh,
    InOpen,
    InValues { expecting_value: bool },
}

/// Incremental parser for one formula
pub struct SqlFormulaParser {
    separators: SeparatorChecker,
    builder: FormulaBuilder,
    factory: Option<ColumnDataGetterFactory>,
    pending_word: Option<String>,
    last_word: String,
    quote: Option<String>,
    pending_comparator: Option<char>,
    clause: Clause,
    clause_values: Vec<ItemDataPtr>,
    clause_negative: bool,
    error: Option<String>,
}

impl Default for SqlFormulaParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `text` into a formula in one go
pub fn parse_formula(text: &str, factory: Option<ColumnDataGetterFactory>) -> Result<Formula> {
    let mut parser = SqlFormulaParser::new();
    if let Some(factory) = factory {
        parser.set_column_data_getter_factory(factory);
    }
    parser.parse(text)?;
    Ok(parser.take_formula())
}

/// True for a number cut off right after its exponent marker, like `1.5e`
fn awaits_exponent(word: &str) -> bool {
    word.strip_suffix(['e', 'E'])
        .is_some_and(|mantissa| matches!(classify(mantissa), WordKind::Number(_)))
}

fn consecutive(previous: &str, word: &str) -> Error {
    Error::QueryParse(format!("Invalid consecutive words: {}, {}.", previous, word))
}

impl SqlFormulaParser {
    pub fn new() -> Self {
        Self {
            separators: SeparatorChecker::new(FORMULA_SEPARATORS)
                .with_alternative(QUOTE_SEPARATORS),
            builder: FormulaBuilder::new(),
            factory: None,
            pending_word: None,
            last_word: String::new(),
            quote: None,
            pending_comparator: None,
            clause: Clause::None,
            clause_values: Vec::new(),
            clause_negative: false,
            error: None,
        }
    }

    /// Resolver used for column names met from now on
    pub fn set_column_data_getter_factory(&mut self, factory: ColumnDataGetterFactory) {
        self.factory = Some(factory);
    }

    pub fn formula(&self) -> &Formula {
        self.builder.formula()
    }

    /// Hand over the parsed formula
    pub fn take_formula(&mut self) -> Formula {
        self.builder.take_formula()
    }

    pub fn has_statistical_func(&self) -> bool {
        self.builder.formula().has_statistical_func()
    }

    /// True while inside a quoted string
    pub fn in_quote(&self) -> bool {
        self.quote.is_some()
    }

    /// Resolve any held-back word or comparator
    pub fn flush(&mut self) -> Result<()> {
        self.check_error()?;
        let result = self.flush_comparator().and_then(|_| self.flush_pending());
        self.record(result)
    }

    fn check_error(&self) -> Result<()> {
        match &self.error {
            Some(message) => Err(Error::QueryParse(message.clone())),
            None => Ok(()),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.error.is_none() {
                let message = match e {
                    Error::QueryParse(message) => message.clone(),
                    other => other.to_string(),
                };
                debug!("Formula parse failed: {}", message);
                self.error = Some(message);
            }
        }
        result
    }

    fn add_word(&mut self, word: &str) -> Result<()> {
        if let Some(quoted) = &mut self.quote {
            quoted.push_str(word);
            return Ok(());
        }
        self.flush_comparator()?;

        let lower = word.to_ascii_lowercase();
        match lower.as_str() {
            "and" | "or" | "not" | "between" | "in" | "distinct" => {
                self.flush_pending()?;
                self.keyword(&lower, word)
            }
            _ => {
                if let Some(mut previous) = self.pending_word.take() {
                    if previous.ends_with(['+', '-']) {
                        previous.push_str(word);
                        self.pending_word = Some(previous);
                        return Ok(());
                    }
                    return Err(consecutive(&previous, word));
                }
                if self.clause == Clause::InOpen {
                    return Err(Error::QueryParse(format!(
                        "Expected '(' after IN, found '{}'",
                        word
                    )));
                }
                self.pending_word = Some(word.to_string());
                Ok(())
            }
        }
    }

    fn keyword(&mut self, lower: &str, word: &str) -> Result<()> {
        if self.clause == Clause::BetweenAnd && lower == "and" {
            self.clause = Clause::BetweenHigh;
            return Ok(());
        }
        if self.clause != Clause::None {
            return Err(Error::QueryParse(format!(
                "Unexpected keyword '{}' in BETWEEN or IN clause",
                word
            )));
        }

        match lower {
            "and" => self.push_binary(BinaryOperator::And, word),
            "or" => self.push_binary(BinaryOperator::Or, word),
            "not" => {
                self.ensure_operand_position(word)?;
                self.builder
                    .push_operand(FormulaElement::Unary(UnaryOperator::Not))?;
                self.last_word = word.to_string();
                Ok(())
            }
            "between" => {
                self.ensure_left_hand(word)?;
                self.clause = Clause::BetweenLow;
                Ok(())
            }
            "in" => {
                self.ensure_left_hand(word)?;
                self.clause = Clause::InOpen;
                Ok(())
            }
            _ => self.distinct_in_count(),
        }
    }

    fn ensure_operand_position(&self, word: &str) -> Result<()> {
        if self.builder.expecting_operand() {
            Ok(())
        } else {
            Err(consecutive(&self.last_word, word))
        }
    }

    fn ensure_left_hand(&self, operator: &str) -> Result<()> {
        if self.builder.expecting_operand() {
            return Err(Error::QueryParse(format!(
                "No left hand side of '{}' operator.",
                operator
            )));
        }
        Ok(())
    }

    fn push_binary(&mut self, op: BinaryOperator, text: &str) -> Result<()> {
        if self.clause != Clause::None {
            return Err(Error::QueryParse(format!(
                "Unexpected '{}' in BETWEEN or IN clause",
                text
            )));
        }
        self.ensure_left_hand(text)?;
        self.builder.push_operator(FormulaElement::Binary(op))?;
        self.last_word = text.to_string();
        Ok(())
    }

    fn flush_comparator(&mut self) -> Result<()> {
        match self.pending_comparator.take() {
            Some('<') => self.push_binary(BinaryOperator::Compare(Comparison::Lt), "<"),
            Some('>') => self.push_binary(BinaryOperator::Compare(Comparison::Gt), ">"),
            Some(other) => Err(Error::QueryParse(format!("Invalid operator '{}'", other))),
            None => Ok(()),
        }
    }

    fn flush_pending(&mut self) -> Result<()> {
        match self.pending_word.take() {
            Some(word) => self.process_word(word),
            None => Ok(()),
        }
    }

    fn process_word(&mut self, word: String) -> Result<()> {
        match classify(&word) {
            WordKind::Number(value) => {
                let value = Arc::new(ItemData::new(ITEM_ID_ANONYMOUS, value));
                self.push_value(value, &word)
            }
            WordKind::Malformed => Err(Error::QueryParse(format!("Invalid number: {}", word))),
            WordKind::NotNumber => {
                if self.clause != Clause::None {
                    return Err(Error::QueryParse(format!(
                        "Expected a constant value, found '{}'",
                        word
                    )));
                }
                self.ensure_operand_position(&word)?;
                let factory = self.factory.as_ref().ok_or_else(|| {
                    Error::QueryParse(format!(
                        "No column data getter factory to resolve '{}'",
                        word
                    ))
                })?;
                let getter = factory(&word)?;
                self.builder.push_operand(FormulaElement::Column {
                    name: word.clone(),
                    getter,
                })?;
                self.last_word = word;
                Ok(())
            }
        }
    }

    fn signed(&mut self, value: ItemDataPtr) -> Result<ItemDataPtr> {
        if std::mem::take(&mut self.clause_negative) {
            value.negate()
        } else {
            Ok(value)
        }
    }

    fn push_value(&mut self, value: ItemDataPtr, text: &str) -> Result<()> {
        match self.clause {
            Clause::None => {
                self.ensure_operand_position(text)?;
                self.builder.push_operand(FormulaElement::Value(value))?;
                self.last_word = text.to_string();
                Ok(())
            }
            Clause::BetweenLow => {
                let value = self.signed(value)?;
                self.clause_values.push(value);
                self.clause = Clause::BetweenAnd;
                Ok(())
            }
            Clause::BetweenHigh => {
                let value = self.signed(value)?;
                self.clause_values.push(value);
                self.complete_between()
            }
            Clause::InValues {
                expecting_value: true,
            } => {
                let value = self.signed(value)?;
                self.clause_values.push(value);
                self.clause = Clause::InValues {
                    expecting_value: false,
                };
                Ok(())
            }
            Clause::InValues {
                expecting_value: false,
            } => Err(Error::QueryParse(format!(
                "Missing ',' before '{}' in IN list",
                text
            ))),
            Clause::BetweenAnd => Err(Error::QueryParse(format!(
                "Expected AND in BETWEEN clause, found '{}'",
                text
            ))),
            Clause::InOpen => Err(Error::QueryParse(format!(
                "Expected '(' after IN, found '{}'",
                text
            ))),
        }
    }

    fn complete_between(&mut self) -> Result<()> {
        let mut values = std::mem::take(&mut self.clause_values).into_iter();
        let (Some(low), Some(high)) = (values.next(), values.next()) else {
            return Err(Error::Internal("BETWEEN clause lost its bounds".to_string()));
        };
        self.clause = Clause::None;
        self.builder
            .push_operator(FormulaElement::Between { low, high })?;
        self.last_word = "BETWEEN".to_string();
        Ok(())
    }

    fn complete_in(&mut self, expecting_value: bool) -> Result<()> {
        if expecting_value {
            return Err(Error::QueryParse("Missing value in IN list".to_string()));
        }
        let values = std::mem::take(&mut self.clause_values);
        self.clause = Clause::None;
        self.builder.push_operator(FormulaElement::In { values })?;
        self.last_word = ")".to_string();
        Ok(())
    }

    fn open_parenthesis(&mut self) -> Result<()> {
        if let Some(word) = self.pending_word.take() {
            if let Some(kind) = FunctionKind::from_name(&word) {
                return self.open_function(kind, word);
            }
            self.process_word(word)?;
        }

        match self.clause {
            Clause::InOpen => {
                self.clause = Clause::InValues {
                    expecting_value: true,
                };
                return Ok(());
            }
            Clause::None => {}
            _ => {
                return Err(Error::QueryParse(
                    "Unexpected '(' in BETWEEN or IN clause".to_string(),
                ));
            }
        }

        self.ensure_operand_position("(")?;
        self.builder.open_scope(FormulaElement::Parenthesis)?;
        self.last_word = "(".to_string();
        Ok(())
    }

    fn open_function(&mut self, kind: FunctionKind, word: String) -> Result<()> {
        if self.clause != Clause::None {
            return Err(Error::QueryParse(format!(
                "Unexpected function '{}' in BETWEEN or IN clause",
                word
            )));
        }
        self.ensure_operand_position(&word)?;
        if self.builder.in_function_scope() {
            return Err(Error::QueryParse(format!(
                "Nested aggregate function: {}",
                word
            )));
        }
        let accumulator = self.builder.add_accumulator(kind.create_accumulator(false));
        self.builder.open_scope(FormulaElement::Function {
            kind,
            distinct: false,
            accumulator,
        })?;
        self.last_word = word;
        Ok(())
    }

    fn close_parenthesis(&mut self) -> Result<()> {
        self.flush_pending()?;
        match self.clause {
            Clause::InValues { expecting_value } => return self.complete_in(expecting_value),
            Clause::None => {}
            _ => {
                return Err(Error::QueryParse(
                    "Unexpected ')' in BETWEEN or IN clause".to_string(),
                ));
            }
        }

        let id = self.builder.close_scope()?;
        let formula = self.builder.formula();
        if let Some(node) = formula.node(id) {
            if let FormulaElement::Function { kind, distinct, .. } = node.element {
                let star = node.children.iter().any(|child| {
                    formula
                        .node(*child)
                        .is_some_and(|arg| matches!(arg.element, FormulaElement::Wildcard))
                });
                if star && kind != FunctionKind::Count {
                    return Err(Error::QueryParse(format!(
                        "'*' is only allowed in COUNT, not in {}",
                        kind
                    )));
                }
                if star && distinct {
                    return Err(Error::QueryParse(
                        "COUNT(DISTINCT *) is not supported".to_string(),
                    ));
                }
            }
        }
        self.last_word = ")".to_string();
        Ok(())
    }

    fn comma(&mut self) -> Result<()> {
        self.flush_pending()?;
        match self.clause {
            Clause::InValues {
                expecting_value: false,
            } => {
                self.clause = Clause::InValues {
                    expecting_value: true,
                };
                Ok(())
            }
            Clause::None => {
                if self
                    .builder
                    .scope_element()
                    .is_some_and(|element| element.is_function())
                {
                    self.builder.next_argument()?;
                    self.last_word = ",".to_string();
                    Ok(())
                } else {
                    Err(Error::QueryParse("Unexpected ','".to_string()))
                }
            }
            _ => Err(Error::QueryParse(
                "Unexpected ',' in BETWEEN or IN clause".to_string(),
            )),
        }
    }

    fn minus(&mut self) -> Result<()> {
        let awaiting_clause_value = matches!(
            self.clause,
            Clause::BetweenLow
                | Clause::BetweenHigh
                | Clause::InValues {
                    expecting_value: true
                }
        );
        if awaiting_clause_value {
            self.clause_negative = !self.clause_negative;
            return Ok(());
        }
        if self.clause == Clause::None && self.builder.expecting_operand() {
            self.builder
                .push_operand(FormulaElement::Unary(UnaryOperator::Minus))?;
            self.last_word = "-".to_string();
            return Ok(());
        }
        self.push_binary(BinaryOperator::Sub, "-")
    }

    fn asterisk(&mut self) -> Result<()> {
        if self.clause == Clause::None && self.builder.expecting_operand() {
            let whole_formula = self.builder.formula().is_empty();
            let function_argument = self.builder.at_scope_node()
                && self
                    .builder
                    .scope_element()
                    .is_some_and(|element| element.is_function());
            if !whole_formula && !function_argument {
                return Err(Error::QueryParse(format!(
                    "Unexpected '*' after '{}'",
                    self.last_word
                )));
            }
            self.builder.push_operand(FormulaElement::Wildcard)?;
            self.last_word = "*".to_string();
            return Ok(());
        }
        self.push_binary(BinaryOperator::Mul, "*")
    }

    fn distinct_in_count(&mut self) -> Result<()> {
        let scope = self.builder.scope_node();
        let allowed = self.builder.at_scope_node()
            && scope
                .and_then(|id| self.builder.formula().node(id))
                .is_some_and(|node| {
                    node.children.is_empty()
                        && matches!(
                            node.element,
                            FormulaElement::Function {
                                kind: FunctionKind::Count,
                                distinct: false,
                                ..
                            }
                        )
                });
        let Some(id) = scope.filter(|_| allowed) else {
            return Err(Error::QueryParse(
                "DISTINCT is only allowed at the start of COUNT()".to_string(),
            ));
        };

        let mut accumulator_index = None;
        if let Some(FormulaElement::Function {
            distinct,
            accumulator,
            ..
        }) = self.builder.element_mut(id)
        {
            *distinct = true;
            accumulator_index = Some(*accumulator);
        }
        let index = accumulator_index
            .ok_or_else(|| Error::Internal("COUNT node disappeared".to_string()))?;
        self.builder
            .replace_accumulator(index, FunctionKind::Count.create_accumulator(true))
    }

    fn separator(&mut self, separator: char) -> Result<()> {
        if let Some(quoted) = &mut self.quote {
            if separator != '\'' {
                quoted.push(separator);
                return Ok(());
            }
            let text = std::mem::take(quoted);
            self.quote = None;
            self.separators.use_alternative(false);
            let display = format!("'{}'", text);
            let value = Arc::new(ItemData::new(ITEM_ID_ANONYMOUS, text));
            return self.push_value(value, &display);
        }

        if let Some(first) = self.pending_comparator.take() {
            let combined = match (first, separator) {
                ('<', '=') => Some(Comparison::Le),
                ('>', '=') => Some(Comparison::Ge),
                ('<', '>') | ('!', '=') => Some(Comparison::Ne),
                _ => None,
            };
            if let Some(comparison) = combined {
                let text = format!("{}{}", first, separator);
                return self.push_binary(BinaryOperator::Compare(comparison), &text);
            }
            self.pending_comparator = Some(first);
            self.flush_comparator()?;
        }

        match separator {
            ' ' | '\t' | '\r' | '\n' => {
                if self
                    .pending_word
                    .as_deref()
                    .is_some_and(|word| word.ends_with(['+', '-']))
                {
                    return self.flush_pending();
                }
                Ok(())
            }
            '(' => self.open_parenthesis(),
            ')' => self.close_parenthesis(),
            '\'' => {
                self.flush_pending()?;
                self.quote = Some(String::new());
                self.separators.use_alternative(true);
                Ok(())
            }
            ',' => self.comma(),
            '+' | '-' if self.pending_word.as_deref().is_some_and(awaits_exponent) => {
                if let Some(word) = &mut self.pending_word {
                    word.push(separator);
                }
                Ok(())
            }
            '+' => {
                self.flush_pending()?;
                self.push_binary(BinaryOperator::Add, "+")
            }
            '/' => {
                self.flush_pending()?;
                self.push_binary(BinaryOperator::Div, "/")
            }
            '-' => {
                self.flush_pending()?;
                self.minus()
            }
            '*' => {
                self.flush_pending()?;
                self.asterisk()
            }
            '=' => {
                self.flush_pending()?;
                self.push_binary(BinaryOperator::Compare(Comparison::Eq), "=")
            }
            '<' | '>' | '!' => {
                self.flush_pending()?;
                self.pending_comparator = Some(separator);
                Ok(())
            }
            other => Err(Error::Internal(format!(
                "Unhandled separator '{}'",
                other
            ))),
        }
    }

    fn finish(&mut self) -> Result<()> {
        if self.quote.is_some() {
            return Err(Error::QueryParse("Quotation is not closed.".to_string()));
        }
        self.flush_comparator()?;
        self.flush_pending()?;
        if self.clause != Clause::None {
            return Err(Error::QueryParse(
                "Incomplete BETWEEN or IN clause".to_string(),
            ));
        }
        self.builder.validate()
    }
}

impl SeparatedWordSink for SqlFormulaParser {
    fn separators(&self) -> &SeparatorChecker {
        &self.separators
    }

    fn add(&mut self, word: &str) -> Result<()> {
        self.check_error()?;
        let result = self.add_word(word);
        self.record(result)
    }

    fn on_separator(&mut self, separator: char) -> Result<()> {
        self.check_error()?;
        let result = self.separator(separator);
        self.record(result)
    }

    fn close(&mut self) -> Result<()> {
        self.check_error()?;
        let result = self.finish();
        self.record(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::index_getter_factory;
    use itemsql_core::{ItemDataType, ItemGroup, ItemValue};
    use proptest::prelude::*;

    fn constant(text: &str) -> ItemDataPtr {
        let formula = parse_formula(text, None).unwrap();
        formula.snapshot(None).unwrap()
    }

    fn parse_error(text: &str) -> String {
        match parse_formula(text, Some(index_getter_factory(&["a", "b", "c", "x"]))) {
            Ok(_) => panic!("'{}' should not parse", text),
            Err(e) => e.to_string(),
        }
    }

    fn bools(a: bool, b: bool, c: bool) -> ItemGroup {
        ItemGroup::from_items(vec![
            ItemData::shared(1, a),
            ItemData::shared(2, b),
            ItemData::shared(3, c),
        ])
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(constant("1 + 2 * 3").as_int(), Some(7));
        assert_eq!(constant("(1 + 2) * 3").as_int(), Some(9));
        assert_eq!(constant("10 - 4 - 3").as_int(), Some(3));
        assert_eq!(constant("100/10/5").as_int(), Some(2));
        assert_eq!(constant("-5 + 2").as_int(), Some(-3));
        assert_eq!(constant("2 * -3").as_int(), Some(-6));
        assert_eq!(constant("1.5 * 2.0").as_double(), Some(3.0));
    }

    #[test]
    fn test_comparators() {
        assert_eq!(constant("3 >= 2").as_bool(), Some(true));
        assert_eq!(constant("3<=2").as_bool(), Some(false));
        assert_eq!(constant("3 <> 2").as_bool(), Some(true));
        assert_eq!(constant("3 != 3").as_bool(), Some(false));
        assert_eq!(constant("2 < 3").as_bool(), Some(true));
        assert_eq!(constant("2>3").as_bool(), Some(false));
        assert_eq!(constant("'anri' = 'anri'").as_bool(), Some(true));
        assert_eq!(constant("1 + 1 = 2").as_bool(), Some(true));
    }

    #[test]
    fn test_quoted_strings() {
        let value = constant("'hello (world), 1+1'");
        assert_eq!(value.data_type(), ItemDataType::String);
        assert_eq!(value.get_string(), "hello (world), 1+1");
        assert_eq!(constant("''").get_string(), "");
    }

    #[test]
    fn test_separators_fed_inside_quotes() {
        let mut parser = SqlFormulaParser::new();
        parser.on_separator('\'').unwrap();
        parser.add("hello").unwrap();
        parser.on_separator(' ').unwrap();
        assert!(parser.in_quote());
        parser.add("big").unwrap();
        parser.on_separator('\t').unwrap();
        parser.on_separator('(').unwrap();
        parser.add("world").unwrap();
        parser.on_separator(')').unwrap();
        parser.on_separator('\'').unwrap();
        assert!(!parser.in_quote());
        parser.close().unwrap();

        let value = parser.take_formula().snapshot(None).unwrap();
        assert_eq!(value.get_string(), "hello big\t(world)");
    }

    #[test]
    fn test_signed_exponent() {
        assert_eq!(constant("1e-3").as_double(), Some(0.001));
        assert_eq!(constant("2.5E+2").as_double(), Some(250.0));
        assert_eq!(constant("1e-3 * 2.0").as_double(), Some(0.002));
        assert_eq!(constant("4.0 - 1e2").as_double(), Some(-96.0));
        assert!(parse_error("1e- 3").contains("Invalid number: 1e-"));
        assert!(parse_error("1e-x").contains("Invalid number: 1e-x"));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let factory = index_getter_factory(&["a", "b", "c"]);
        let mut formula = parse_formula("a AND b OR c", Some(factory)).unwrap();

        let root = formula.node(formula.root().unwrap()).unwrap();
        assert!(matches!(root.element, FormulaElement::Binary(BinaryOperator::Or)));

        for a in [false, true] {
            for b in [false, true] {
                for c in [false, true] {
                    let result = formula.evaluate(&bools(a, b, c)).unwrap();
                    assert_eq!(result.as_bool(), Some((a && b) || c));
                }
            }
        }
    }

    #[test]
    fn test_or_then_and() {
        let factory = index_getter_factory(&["a", "b", "c"]);
        let mut formula = parse_formula("a or b and c", Some(factory)).unwrap();
        for a in [false, true] {
            for b in [false, true] {
                for c in [false, true] {
                    let result = formula.evaluate(&bools(a, b, c)).unwrap();
                    assert_eq!(result.as_bool(), Some(a || (b && c)));
                }
            }
        }
    }

    #[test]
    fn test_not() {
        assert_eq!(constant("NOT 1 = 2").as_bool(), Some(true));
        assert_eq!(constant("NOT 1 = 1 OR 2 = 2").as_bool(), Some(true));
        assert_eq!(constant("NOT (1 = 1 OR 2 = 2)").as_bool(), Some(false));
    }

    #[test]
    fn test_between() {
        let factory = index_getter_factory(&["x"]);
        let mut formula =
            parse_formula("x BETWEEN -1 AND 3 AND x <> 2", Some(factory)).unwrap();
        let check = |formula: &mut Formula, x: i64| {
            let row = ItemGroup::from_items(vec![ItemData::shared(1, x)]);
            formula.evaluate(&row).unwrap().as_bool().unwrap()
        };
        assert!(check(&mut formula, -1));
        assert!(check(&mut formula, 3));
        assert!(!check(&mut formula, 2));
        assert!(!check(&mut formula, 4));
        assert!(!check(&mut formula, -2));
    }

    #[test]
    fn test_in() {
        assert_eq!(constant("2 IN (1, 2, 3)").as_bool(), Some(true));
        assert_eq!(constant("5 in (1,2,3)").as_bool(), Some(false));
        assert_eq!(constant("-2 IN (-2)").as_bool(), Some(true));
        assert_eq!(constant("'mai' IN ('anri', 'mai')").as_bool(), Some(true));
        assert_eq!(constant("1 IN (1) AND 2 IN (3)").as_bool(), Some(false));
    }

    #[test]
    fn test_sum_streaming() {
        let factory = index_getter_factory(&["v"]);
        let mut formula = parse_formula("SUM(v)", Some(factory)).unwrap();
        assert!(formula.has_statistical_func());

        let row = |v: i64| ItemGroup::from_items(vec![ItemData::shared(1, v)]);
        assert_eq!(formula.evaluate(&row(10)).unwrap().as_int(), Some(10));
        assert_eq!(formula.evaluate(&row(20)).unwrap().as_int(), Some(30));
        assert_eq!(formula.evaluate(&row(5)).unwrap().as_int(), Some(35));

        formula.reset_statistics();
        assert_eq!(formula.evaluate(&row(7)).unwrap().as_int(), Some(7));
    }

    #[test]
    fn test_function_expression() {
        let factory = index_getter_factory(&["v"]);
        let mut formula = parse_formula("max(v * 2) + 1", Some(factory)).unwrap();
        let row = |v: i64| ItemGroup::from_items(vec![ItemData::shared(1, v)]);
        formula.evaluate(&row(3)).unwrap();
        formula.evaluate(&row(8)).unwrap();
        assert_eq!(formula.evaluate(&row(1)).unwrap().as_int(), Some(17));
    }

    #[test]
    fn test_count_variants() {
        let factory = index_getter_factory(&["name"]);
        let mut star = parse_formula("COUNT(*)", Some(factory.clone())).unwrap();
        let mut distinct = parse_formula("count(DISTINCT name)", Some(factory.clone())).unwrap();
        let mut plain = parse_formula("count( name )", Some(factory)).unwrap();

        for name in ["anri", "mai", "anri"] {
            let row = ItemGroup::from_items(vec![ItemData::shared(1, name)]);
            star.evaluate(&row).unwrap();
            distinct.evaluate(&row).unwrap();
            plain.evaluate(&row).unwrap();
        }
        assert_eq!(
            star.snapshot(None).unwrap().get(),
            ItemValue::Uint64(3)
        );
        assert_eq!(distinct.snapshot(None).unwrap().as_uint64(), Some(2));
        assert_eq!(plain.snapshot(None).unwrap().as_uint64(), Some(3));
    }

    #[test]
    fn test_function_arity_errors() {
        assert!(parse_error("MAX(a, b)").contains("Too many arguments"));
        assert!(parse_error("sum()").contains("Number of argument is short"));
        assert!(parse_error("max(a,)").contains("Missing argument"));
        assert!(parse_error("max(*)").contains("only allowed in COUNT"));
        assert!(parse_error("count(distinct *)").contains("DISTINCT *"));
        assert!(parse_error("sum(max(a))").contains("Nested aggregate"));
        assert!(parse_error("a + distinct b").contains("DISTINCT"));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(
            parse_error("a b"),
            "Query parse error: Invalid consecutive words: a, b."
        );
        assert_eq!(
            parse_error("a)"),
            "Query parse error: Parenthesis is not open."
        );
        assert_eq!(
            parse_error("+ 1"),
            "Query parse error: No left hand side of '+' operator."
        );
        assert!(parse_error("(a").contains("Parenthesis is not closed."));
        assert!(parse_error("'abc").contains("Quotation is not closed."));
        assert!(parse_error("12abc").contains("Invalid number"));
        assert!(parse_error("a +").contains("Incomplete expression"));
        assert!(parse_error("a, b").contains("Unexpected ','"));
        assert!(parse_error("a ! b").contains("Invalid operator"));
        assert!(parse_error("a IN 1").contains("Expected '('"));
        assert!(parse_error("a BETWEEN 1 OR 2").contains("BETWEEN"));
        assert!(parse_error("(a) b").contains("Invalid consecutive words: ), b."));
        assert!(parse_error("()").contains("Empty parenthesis"));
        assert!(parse_error("a * * b").contains("Unexpected '*'"));
    }

    #[test]
    fn test_unknown_column() {
        let err = parse_formula("missing = 1", Some(index_getter_factory(&["a"]))).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound(_)));

        let err = parse_formula("a = 1", None).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_error_is_sticky() {
        let mut parser = SqlFormulaParser::new();
        assert!(parser.on_separator(')').is_err());
        let err = parser.add("1").unwrap_err();
        assert_eq!(err.to_string(), "Query parse error: Parenthesis is not open.");
        assert!(parser.close().is_err());
    }

    #[test]
    fn test_incremental_feeding() {
        let mut parser = SqlFormulaParser::new();
        parser.add("max").unwrap();
        parser.on_separator(' ').unwrap();
        parser.on_separator('(').unwrap();
        parser.add("4").unwrap();
        parser.on_separator(')').unwrap();
        parser.close().unwrap();
        assert!(parser.has_statistical_func());

        let formula = parser.take_formula();
        assert!(formula.tree_info().starts_with("Function: MAX\n"));
    }

    #[test]
    fn test_wildcard_formula() {
        let formula = parse_formula("*", None).unwrap();
        assert!(formula.is_wildcard());
        assert!(formula.snapshot(None).is_err());
    }

    proptest! {
        #[test]
        fn prop_arithmetic_follows_precedence(
            a in -1000i64..1000,
            b in -1000i64..1000,
            c in -1000i64..1000,
        ) {
            let text = format!("{} + {} * {} - {}", a, b, c, a);
            prop_assert_eq!(constant(&text).as_int(), Some(a + b * c - a));

            let text = format!("({} - {}) - {}", a, b, c);
            prop_assert_eq!(constant(&text).as_int(), Some(a - b - c));
        }

        #[test]
        fn prop_logic_follows_precedence(a: bool, b: bool, c: bool, d: bool) {
            let factory = index_getter_factory(&["a", "b", "c", "d"]);
            let mut formula =
                parse_formula("a OR b AND NOT c OR d", Some(factory)).unwrap();
            let row = ItemGroup::from_items(vec![
                ItemData::shared(1, a),
                ItemData::shared(2, b),
                ItemData::shared(3, c),
                ItemData::shared(4, d),
            ]);
            let result = formula.evaluate(&row).unwrap();
            prop_assert_eq!(result.as_bool(), Some(a || (b && !c) || d));
        }
    }
}

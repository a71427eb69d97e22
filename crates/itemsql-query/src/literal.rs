//! Numeric literal recognition using logos

use itemsql_core::{ITEM_ID_ANONYMOUS, ItemData, ItemDataPtr, ItemValue};
use logos::Logos;
use std::sync::Arc;

#[derive(Logos, Debug, Clone, PartialEq)]
enum NumericToken {
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Integer(u64),

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
}

/// What a bare word in a formula denotes
#[derive(Debug, Clone, PartialEq)]
pub enum WordKind {
    /// A complete numeric literal
    Number(ItemValue),
    /// Not numeric at all, so a column name or keyword
    NotNumber,
    /// Starts like a number but is not one, e.g. `12abc` or `1.2.3`
    Malformed,
}

/// Classify a word. Integers beyond the signed range become unsigned values.
pub fn classify(word: &str) -> WordKind {
    if !word.starts_with(|c: char| c.is_ascii_digit()) {
        return WordKind::NotNumber;
    }

    let mut lexer = NumericToken::lexer(word);
    let token = lexer.next();
    let whole = lexer.span().end == word.len();
    match token {
        Some(Ok(NumericToken::Integer(value))) if whole => match i64::try_from(value) {
            Ok(signed) => WordKind::Number(ItemValue::Int(signed)),
            Err(_) => WordKind::Number(ItemValue::Uint64(value)),
        },
        Some(Ok(NumericToken::Float(value))) if whole => WordKind::Number(ItemValue::Double(value)),
        _ => WordKind::Malformed,
    }
}

/// Value for a numeric word, or None if the word is not a number
pub fn create_as_number(word: &str) -> Option<ItemDataPtr> {
    match classify(word) {
        WordKind::Number(value) => Some(Arc::new(ItemData::new(ITEM_ID_ANONYMOUS, value))),
        _ => None,
    }
}

/// Value for a numeric word, falling back to a string value
pub fn create_as_number_or_string(word: &str) -> ItemDataPtr {
    create_as_number(word)
        .unwrap_or_else(|| Arc::new(ItemData::new(ITEM_ID_ANONYMOUS, word)))
}

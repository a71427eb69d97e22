//! Separator-driven text scanner
//!
//! SQL text is split into words and single separator characters. The set of
//! separators can be switched to an alternative set while scanning, which is
//! how quoted strings keep their spaces and operators.

use itemsql_core::Result;

/// A set of separator characters with an optional alternative set
#[derive(Debug, Clone)]
pub struct SeparatorChecker {
    separators: Vec<char>,
    alternative: Vec<char>,
    use_alternative: bool,
}

impl SeparatorChecker {
    pub fn new(separators: &str) -> Self {
        Self {
            separators: separators.chars().collect(),
            alternative: Vec::new(),
            use_alternative: false,
        }
    }

    /// Set the characters that separate words while the alternative set is active
    pub fn with_alternative(mut self, separators: &str) -> Self {
        self.alternative = separators.chars().collect();
        self
    }

    pub fn use_alternative(&mut self, on: bool) {
        self.use_alternative = on;
    }

    pub fn is_alternative(&self) -> bool {
        self.use_alternative
    }

    pub fn is_separator(&self, c: char) -> bool {
        if self.use_alternative {
            self.alternative.contains(&c)
        } else {
            self.separators.contains(&c)
        }
    }
}

/// A piece of scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scanned<'a> {
    Word(&'a str),
    Separator(char),
}

/// Cursor over text yielding words and separators
#[derive(Debug)]
pub struct WordReader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> WordReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Byte offset of the next piece
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Next word or separator according to `checker`'s current state
    pub fn next_with(&mut self, checker: &SeparatorChecker) -> Option<Scanned<'a>> {
        let rest = &self.text[self.pos..];
        let first = rest.chars().next()?;
        if checker.is_separator(first) {
            self.pos += first.len_utf8();
            return Some(Scanned::Separator(first));
        }
        let end = rest
            .char_indices()
            .find(|(_, c)| checker.is_separator(*c))
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        self.pos += end;
        Some(Scanned::Word(&rest[..end]))
    }
}

/// Receiver of scanned words and separators
pub trait SeparatedWordSink {
    /// Separator state consulted before every scanned piece
    fn separators(&self) -> &SeparatorChecker;

    fn add(&mut self, word: &str) -> Result<()>;

    fn on_separator(&mut self, separator: char) -> Result<()>;

    /// Called once the whole text has been fed
    fn close(&mut self) -> Result<()>;

    /// Feed `text` piece by piece, then close
    fn parse(&mut self, text: &str) -> Result<()> {
        let mut reader = WordReader::new(text);
        while let Some(scanned) = reader.next_with(self.separators()) {
            match scanned {
                Scanned::Word(word) => self.add(word)?,
                Scanned::Separator(separator) => self.on_separator(separator)?,
            }
        }
        self.close()
    }
}

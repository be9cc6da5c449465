//! Buffered character source with row/column tracking.
//!
//! Recognizers look ahead an arbitrary number of characters before deciding
//! whether they match, so characters are pulled from the underlying iterator
//! into a lookahead buffer on demand and only leave it when consumed.

use std::collections::VecDeque;
use std::str::Chars;

use crate::span::Position;

pub struct CharStream<'src> {
    source: Chars<'src>,
    buffer: VecDeque<char>,
    row: u32,
    column: u32,
}

impl<'src> CharStream<'src> {
    pub fn new(source: &'src str) -> Self {
        CharStream::starting_at(source, Position::START)
    }

    /// Stream whose first character is reported at `start`.
    pub fn starting_at(source: &'src str, start: Position) -> Self {
        CharStream {
            source: source.chars(),
            buffer: VecDeque::new(),
            row: start.row,
            column: start.column,
        }
    }

    /// Buffers up to `count` characters and returns how many are available.
    pub fn available(&mut self, count: usize) -> usize {
        while self.buffer.len() < count {
            match self.source.next() {
                Some(ch) => self.buffer.push_back(ch),
                None => break,
            }
        }
        self.buffer.len().min(count)
    }

    /// Character `index` positions ahead of the cursor.
    pub fn peek(&mut self, index: usize) -> Option<char> {
        if self.available(index + 1) == index + 1 {
            self.buffer.get(index).copied()
        } else {
            None
        }
    }

    pub fn starts_with(&mut self, text: &str) -> bool {
        let len = text.chars().count();
        self.available(len) == len && text.chars().zip(self.buffer.iter()).all(|(a, b)| a == *b)
    }

    pub fn is_at_end(&mut self) -> bool {
        self.available(1) == 0
    }

    /// Drops up to `count` characters, updating the position.
    pub fn consume(&mut self, count: usize) {
        let count = self.available(count);
        for ch in self.buffer.drain(..count) {
            if ch == '\n' {
                self.row += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    /// Reads and consumes up to `count` characters.
    pub fn take(&mut self, count: usize) -> String {
        let count = self.available(count);
        let text: String = self.buffer.iter().take(count).collect();
        self.consume(count);
        text
    }

    pub fn position(&self) -> Position {
        Position::new(self.row, self.column)
    }
}

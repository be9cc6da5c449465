//! Tokenizer dispatch.
//!
//! The lexer does not know the language it tokenizes. A host registers an
//! ordered list of [`Recognizer`]s on a [`Lexicon`]; every recognizer gets a
//! [`TokenClass`] that identifies the tokens it produces. On top of that the
//! lexicon maintains a table of custom literal symbols (keywords, brackets,
//! multi-character operators) that is always consulted first.

use std::fmt;
use std::rc::Rc;

use crate::span::Position;
use crate::stream::CharStream;

/// Identity of the recognizer that produced a token.
///
/// Token classes distinguish tokens whose content overlaps, e.g. the
/// string literal `"if"` and the keyword `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenClass(usize);

impl TokenClass {
    /// Class of tokens matched from the custom-symbol table.
    pub const CUSTOM: TokenClass = TokenClass(0);
}

/// A single lexical unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub content: Rc<str>,
    pub class: TokenClass,
    pub row: u32,
    pub column: u32,
}

impl Token {
    pub fn new(content: &str, class: TokenClass, position: Position) -> Self {
        Token {
            content: Rc::from(content),
            class,
            row: position.row,
            column: position.column,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.row, self.column)
    }

    /// Same content produced by the same recognizer; positions are ignored.
    pub fn matches(&self, other: &Token) -> bool {
        self.class == other.class && self.content == other.content
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// A pluggable token recognizer.
#[derive(Debug, Clone)]
pub enum Recognizer {
    /// Longest non-empty run of characters satisfying the predicate.
    Predicate(fn(char) -> bool),
    /// The first listed literal the input starts with.
    Match(Vec<String>),
    /// Quoted text; the token content is the unquoted, unescaped text.
    Quote { open: char, close: char, escape: char },
    /// A line break followed by the indentation of the next non-blank
    /// line. The token content is the indentation itself.
    Indentation,
}

impl Recognizer {
    pub fn recognize(&self, stream: &mut CharStream<'_>) -> Option<String> {
        match self {
            Recognizer::Predicate(predicate) => {
                let mut count = 0;
                while stream.peek(count).is_some_and(predicate) {
                    count += 1;
                }
                (count > 0).then(|| stream.take(count))
            }
            Recognizer::Match(symbols) => {
                let symbol = symbols.iter().find(|symbol| stream.starts_with(symbol))?;
                stream.consume(symbol.chars().count());
                Some(symbol.clone())
            }
            Recognizer::Quote {
                open,
                close,
                escape,
            } => {
                if stream.peek(0) != Some(*open) {
                    return None;
                }
                let mut text = String::new();
                let mut index = 1;
                while let Some(ch) = stream.peek(index) {
                    if ch == *close {
                        break;
                    }
                    if ch == *escape {
                        index += 1;
                        match stream.peek(index) {
                            Some(escaped) => text.push(escaped),
                            None => break,
                        }
                    } else {
                        text.push(ch);
                    }
                    index += 1;
                }
                // Unterminated quotes run to the end of the input.
                stream.consume(index + 1);
                Some(text)
            }
            Recognizer::Indentation => {
                if stream.peek(0) != Some('\n') {
                    return None;
                }
                loop {
                    let mut index = 1;
                    while matches!(stream.peek(index), Some(' ' | '\t')) {
                        index += 1;
                    }
                    match stream.peek(index) {
                        // Blank line: drop it and look at the next one.
                        Some('\n') => stream.consume(index),
                        Some(_) => {
                            let text = stream.take(index);
                            return Some(text[1..].to_string());
                        }
                        None => {
                            stream.consume(index);
                            return None;
                        }
                    }
                }
            }
        }
    }
}

/// Skips whitespace between tokens. Line breaks are only skipped when no
/// run of other whitespace precedes them, so that trailing blanks never hide
/// a line break from an indentation recognizer.
fn skip_whitespace(stream: &mut CharStream<'_>) -> bool {
    let mut count = 0;
    while stream
        .peek(count)
        .is_some_and(|ch| ch.is_whitespace() && ch != '\n')
    {
        count += 1;
    }
    if count > 0 {
        stream.consume(count);
        return true;
    }
    if stream.peek(0).is_some_and(char::is_whitespace) {
        stream.consume(1);
        return true;
    }
    false
}

/// Recognizer list plus the custom-symbol table.
///
/// The lexicon is only mutated while a host configures its grammar; after
/// that it is shared read-only by every [`TokenStream`].
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    recognizers: Vec<Recognizer>,
    /// Sorted by descending length so the longest literal wins.
    symbols: Vec<String>,
}

impl Lexicon {
    pub fn new() -> Self {
        Lexicon::default()
    }

    /// Appends a recognizer; recognizers are consulted in registration order.
    pub fn add(&mut self, recognizer: Recognizer) -> TokenClass {
        self.recognizers.push(recognizer);
        TokenClass(self.recognizers.len())
    }

    /// Returns the token for `literal`, registering it as a custom symbol
    /// when the existing recognizers do not already produce it as a single
    /// token.
    pub fn token(&mut self, literal: &str) -> Token {
        let mut stream = self.tokenize(literal);
        if let Some(token) = stream.next_token() {
            if stream.next_token().is_none() && stream.is_at_end() {
                return Token::new(literal, token.class, Position::START);
            }
        }

        tracing::debug!(symbol = literal, "registering custom symbol");
        self.symbols.push(literal.to_string());
        self.symbols
            .sort_by_key(|symbol| std::cmp::Reverse(symbol.chars().count()));
        Token::new(literal, TokenClass::CUSTOM, Position::START)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn tokenize<'a>(&'a self, source: &'a str) -> TokenStream<'a> {
        self.tokenize_at(source, Position::START)
    }

    /// Like [`Lexicon::tokenize`], with positions counted from `start`.
    pub fn tokenize_at<'a>(&'a self, source: &'a str, start: Position) -> TokenStream<'a> {
        TokenStream {
            lexicon: self,
            stream: CharStream::starting_at(source, start),
        }
    }

    fn match_symbol(&self, stream: &mut CharStream<'_>) -> Option<String> {
        let symbol = self.symbols.iter().find(|symbol| stream.starts_with(symbol))?;
        stream.consume(symbol.chars().count());
        Some(symbol.clone())
    }
}

/// Lazy sequence of tokens over one source text.
///
/// `next_token` returns `None` both at the end of the input and when no
/// recognizer matches; callers tell the two apart with [`is_at_end`].
///
/// [`is_at_end`]: TokenStream::is_at_end
pub struct TokenStream<'a> {
    lexicon: &'a Lexicon,
    stream: CharStream<'a>,
}

impl<'a> TokenStream<'a> {
    pub fn next_token(&mut self) -> Option<Token> {
        if self.stream.is_at_end() {
            return None;
        }
        loop {
            let position = self.stream.position();
            if let Some(content) = self.lexicon.match_symbol(&mut self.stream) {
                return Some(Token::new(&content, TokenClass::CUSTOM, position));
            }
            for (index, recognizer) in self.lexicon.recognizers.iter().enumerate() {
                if let Some(content) = recognizer.recognize(&mut self.stream) {
                    return Some(Token::new(&content, TokenClass(index + 1), position));
                }
                // Indentation swallows trailing line breaks.
                if self.stream.is_at_end() {
                    return None;
                }
            }
            if !skip_whitespace(&mut self.stream) {
                return None;
            }
        }
    }

    pub fn is_at_end(&mut self) -> bool {
        self.stream.is_at_end()
    }

    pub fn position(&self) -> Position {
        self.stream.position()
    }

    /// The next unread character, used to report unrecognized input.
    pub fn peek_char(&mut self) -> Option<char> {
        self.stream.peek(0)
    }
}

impl Iterator for TokenStream<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

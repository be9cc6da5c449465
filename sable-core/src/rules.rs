//! Grammar rule descriptors.
//!
//! A grammar is two ordered tables: prefix rules, tried in order at the
//! start of every expression, and weighted infix rules, tried in order after
//! an expression whenever their weight exceeds the current minimum. The
//! first rule that accepts wins, so rule order is the disambiguation policy
//! of the language.
//!
//! Rules are plain data; [`crate::parser`] interprets them.

use std::rc::Rc;

use crate::lexer::{Token, TokenClass};

/// How the analyzer turns a parse node into a typed expression.
///
/// Each builder expects the arguments listed below, in this order. Infix
/// builders additionally receive the left operand as their first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builder {
    /// list of expressions
    Sequence,
    /// type name, expression
    CheckedCast,
    /// parameter declarations, body
    Function,
    /// generic declarations, parameter declarations, body
    GenericFunction,
    /// name, expression
    Assign,
    /// expression
    Identity,
    /// text
    StringLiteral,
    /// text
    IntLiteral,
    True,
    False,
    /// condition, then, optional else
    If,
    This,
    /// operator text, operand
    PrefixOperator,
    /// name
    Variable,
    /// (left), member name
    Member,
    /// (left), type names
    Specialize,
    /// (left), operator text, right operand
    InfixOperator,
    /// (left), right operand
    And,
    /// (left), right operand
    Or,
    /// (left), argument expressions
    Call,
}

/// Syntax of a type name: a symbol optionally followed by a delimited list
/// of nested type names, e.g. `fun{tuple{int}, bool}`.
#[derive(Debug, Clone)]
pub struct TypeNameSyntax {
    pub symbol: TokenClass,
    pub open: Token,
    pub separator: Token,
    pub close: Token,
}

/// Parser combinators.
///
/// A pattern either does not apply (nothing consumed), applies and yields a
/// [`crate::ast::Parsed`] value, or fails with a syntax error once it has
/// committed by consuming its leading token.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exactly this token.
    Literal(Token),
    /// Any token of the class; yields its text.
    Class(TokenClass),
    /// A full expression.
    Expression,
    /// An expression containing only infix rules heavier than the weight.
    Weighted(u32),
    /// The token, then the pattern.
    Prefix(Token, Box<Pattern>),
    /// The pattern, then the (required) token.
    Suffix(Box<Pattern>, Token),
    /// `open item (separator item)* close`, or `open close`.
    List {
        open: Token,
        item: Box<Pattern>,
        separator: Token,
        close: Token,
    },
    /// Items separated by one repeated indentation token of `indent` class.
    /// The first indentation token fixes the level of the block.
    Block { indent: TokenClass, item: Box<Pattern> },
    /// Both patterns in sequence; the second is required.
    Pair(Box<Pattern>, Box<Pattern>),
    TypeName(Rc<TypeNameSyntax>),
}

impl Pattern {
    pub fn prefix(token: Token, pattern: Pattern) -> Self {
        Pattern::Prefix(token, Box::new(pattern))
    }

    pub fn suffix(pattern: Pattern, token: Token) -> Self {
        Pattern::Suffix(Box::new(pattern), token)
    }

    pub fn list(open: Token, item: Pattern, separator: Token, close: Token) -> Self {
        Pattern::List {
            open,
            item: Box::new(item),
            separator,
            close,
        }
    }

    pub fn block(indent: TokenClass, item: Pattern) -> Self {
        Pattern::Block {
            indent,
            item: Box::new(item),
        }
    }

    pub fn pair(first: Pattern, second: Pattern) -> Self {
        Pattern::Pair(Box::new(first), Box::new(second))
    }
}

/// A rule that starts an expression.
///
/// The first part decides whether the rule applies; the remaining parts are
/// parsed unconditionally and may come back absent.
#[derive(Debug, Clone)]
pub struct PrefixRule {
    pub builder: Builder,
    pub parts: Vec<Pattern>,
}

impl PrefixRule {
    pub fn new(builder: Builder, parts: Vec<Pattern>) -> Self {
        PrefixRule { builder, parts }
    }
}

/// A rule that continues an expression; higher weight binds tighter.
#[derive(Debug, Clone)]
pub struct InfixRule {
    pub builder: Builder,
    pub weight: u32,
    pub parts: Vec<Pattern>,
}

impl InfixRule {
    pub fn new(builder: Builder, weight: u32, parts: Vec<Pattern>) -> Self {
        InfixRule {
            builder,
            weight,
            parts,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Grammar {
    pub prefix: Vec<PrefixRule>,
    pub infix: Vec<InfixRule>,
}

//! Parse nodes.
//!
//! The parser does not build a typed tree. Each node only records which
//! builder to run, the token it started on and the raw results of the
//! rule's parts; the analyzer gives them meaning later, with the expected
//! type of the surrounding construct at hand.

use std::rc::Rc;

use crate::error::CompileError;
use crate::lexer::Token;
use crate::rules::Builder;

/// A type written in source, e.g. `int` or `fun{tuple{int}, bool}`.
#[derive(Debug, Clone)]
pub struct TypeName {
    pub name: Rc<str>,
    pub token: Token,
    /// `None` when no `{...}` argument list was written.
    pub arguments: Option<Vec<TypeName>>,
}

/// Result of one grammar pattern.
#[derive(Debug, Clone)]
pub enum Parsed {
    Token(Token),
    Text(Rc<str>),
    Node(Rc<Node>),
    Type(TypeName),
    Pair(Box<Parsed>, Box<Parsed>),
    List(Vec<Parsed>),
}

#[derive(Debug)]
pub struct Node {
    pub builder: Builder,
    /// First token of the construct; errors about the node point here.
    pub token: Token,
    /// One entry per rule part. Infix nodes carry their left operand first.
    pub args: Vec<Option<Parsed>>,
}

impl Node {
    fn arg(&self, index: usize) -> Option<&Parsed> {
        self.args.get(index).and_then(Option::as_ref)
    }

    fn mismatch(&self, index: usize, expected: &str) -> CompileError {
        CompileError::Grammar(format!(
            "{:?} rule needs {expected} as argument {index}",
            self.builder
        ))
    }

    pub fn node(&self, index: usize) -> Result<Rc<Node>, CompileError> {
        self.optional_node(index)?
            .ok_or_else(|| self.mismatch(index, "an expression"))
    }

    pub fn optional_node(&self, index: usize) -> Result<Option<Rc<Node>>, CompileError> {
        match self.arg(index) {
            None => Ok(None),
            Some(Parsed::Node(node)) => Ok(Some(Rc::clone(node))),
            Some(_) => Err(self.mismatch(index, "an expression")),
        }
    }

    pub fn text(&self, index: usize) -> Result<Rc<str>, CompileError> {
        match self.arg(index) {
            Some(Parsed::Text(text)) => Ok(Rc::clone(text)),
            Some(Parsed::Token(token)) => Ok(Rc::clone(&token.content)),
            _ => Err(self.mismatch(index, "a token")),
        }
    }

    pub fn type_name(&self, index: usize) -> Result<TypeName, CompileError> {
        match self.arg(index) {
            Some(Parsed::Type(name)) => Ok(name.clone()),
            _ => Err(self.mismatch(index, "a type name")),
        }
    }

    fn list(&self, index: usize, expected: &str) -> Result<&[Parsed], CompileError> {
        match self.arg(index) {
            Some(Parsed::List(items)) => Ok(items),
            _ => Err(self.mismatch(index, expected)),
        }
    }

    pub fn nodes(&self, index: usize) -> Result<Vec<Rc<Node>>, CompileError> {
        self.list(index, "a list of expressions")?
            .iter()
            .map(|item| match item {
                Parsed::Node(node) => Ok(Rc::clone(node)),
                _ => Err(self.mismatch(index, "a list of expressions")),
            })
            .collect()
    }

    pub fn type_names(&self, index: usize) -> Result<Vec<TypeName>, CompileError> {
        self.list(index, "a list of type names")?
            .iter()
            .map(|item| match item {
                Parsed::Type(name) => Ok(name.clone()),
                _ => Err(self.mismatch(index, "a list of type names")),
            })
            .collect()
    }

    /// `[name type, ...]` declarations.
    pub fn declarations(&self, index: usize) -> Result<Vec<(Rc<str>, TypeName)>, CompileError> {
        let expected = "a list of name/type pairs";
        self.list(index, expected)?
            .iter()
            .map(|item| match item {
                Parsed::Pair(name, ty) => match (name.as_ref(), ty.as_ref()) {
                    (Parsed::Text(name), Parsed::Type(ty)) => Ok((Rc::clone(name), ty.clone())),
                    _ => Err(self.mismatch(index, expected)),
                },
                _ => Err(self.mismatch(index, expected)),
            })
            .collect()
    }
}

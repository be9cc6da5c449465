use std::io;

use thiserror::Error;

use crate::lexer::Token;
use crate::span::Position;

/// Failure detected while turning source text into bytecode.
///
/// Compilation is fail-fast: the first error aborts the whole run and no
/// bytecode is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("syntax error at {position}: {message}: {token}")]
    Syntax {
        position: Position,
        token: String,
        message: String,
    },
    #[error("type error{}: {message}", location(.position, .token))]
    Type {
        position: Option<Position>,
        token: Option<String>,
        message: String,
    },
    #[error("grammar error: {0}")]
    Grammar(String),
}

fn location(position: &Option<Position>, token: &Option<String>) -> String {
    match (position, token) {
        (Some(position), Some(token)) => format!(" at {position} `{token}`"),
        (Some(position), None) => format!(" at {position}"),
        _ => String::new(),
    }
}

impl CompileError {
    pub fn syntax(token: &Token, message: impl Into<String>) -> Self {
        CompileError::Syntax {
            position: token.position(),
            token: token.content.to_string(),
            message: message.into(),
        }
    }

    /// Type error that is not (yet) tied to a source location.
    pub fn type_error(message: impl Into<String>) -> Self {
        CompileError::Type {
            position: None,
            token: None,
            message: message.into(),
        }
    }

    pub fn type_at(token: &Token, message: impl Into<String>) -> Self {
        CompileError::Type {
            position: Some(token.position()),
            token: Some(token.content.to_string()),
            message: message.into(),
        }
    }

    /// Attaches `token`'s position to a type error raised without one.
    pub fn or_at(self, token: &Token) -> Self {
        match self {
            CompileError::Type {
                position: None,
                message,
                ..
            } => CompileError::type_at(token, message),
            other => other,
        }
    }

    /// Error for a lazily resolved value that was needed while it was still
    /// being computed.
    pub fn recursive_reference() -> Self {
        CompileError::type_error("recursive reference before its type is known")
    }
}

/// Fatal condition raised by the virtual machine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("call stack underflow")]
    CallStackUnderflow,
    #[error("no active context")]
    NoActiveFrame,
    #[error("slot {index} is out of range for a context of {size} slots")]
    SlotOutOfRange { index: usize, size: usize },
    #[error("slot {0} was read before it was assigned")]
    UninitializedSlot(usize),
    #[error("expected {expected} value, found {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("context has no member `{0}`")]
    UnknownMember(String),
    #[error("invalid {kind} reference {index}")]
    InvalidReference { kind: &'static str, index: i64 },
    #[error("failed to write program output: {0}")]
    Output(#[from] io::Error),
}

/// Top-level error of the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] io::Error),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("invalid host registration: {0}")]
    Registration(String),
}

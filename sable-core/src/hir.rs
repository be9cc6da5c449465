//! Typed expressions produced by the analyzer.
//!
//! An [`Expr`] pairs a (possibly lazy) type with the recipe used to emit its
//! bytecode. Both halves are lazy so that function literals can be referenced
//! before their bodies have been analyzed; by the time code is emitted every
//! lazy part has been forced.
//!
//! 型とコードの両方を遅延させることで、再帰関数や相互再帰を扱う。

use std::rc::Rc;

use crate::bytecode::Opcode;
use crate::lazy::Lazy;
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct Expr {
    pub ty: Lazy<Type>,
    pub code: Lazy<Rc<Code>>,
    /// Constant expressions are inlined wherever a variable bound to them
    /// is read.
    pub constant: bool,
}

impl Expr {
    pub fn new(ty: Type, code: Code) -> Self {
        Expr {
            ty: Lazy::ready(ty),
            code: Lazy::ready(Rc::new(code)),
            constant: false,
        }
    }

    pub fn constant(ty: Type, code: Code) -> Self {
        Expr {
            constant: true,
            ..Expr::new(ty, code)
        }
    }

    pub fn void() -> Self {
        Expr::new(Type::void(), Code::Void)
    }
}

/// Emission recipe of an expression.
///
/// Every recipe leaves exactly one value on the operand stack.
#[derive(Debug)]
pub enum Code {
    Void,
    /// Integers and booleans (`1` / `0`).
    Int(i64),
    /// String literal, interned in the symbol pool.
    Symbol(Rc<str>),
    /// Evaluates every expression; only the last value is kept.
    Sequence(Vec<Expr>),
    Call {
        callee: Expr,
        args: Vec<Expr>,
    },
    /// A closure over the current frame. `layout` names the slots of the
    /// function's frame, starting with the base slot.
    Function {
        arity: usize,
        layout: Vec<Rc<str>>,
        body: Expr,
    },
    /// Body of a host function: reads the arguments and runs one opcode.
    Native {
        op: Opcode,
        arity: usize,
    },
    If {
        condition: Expr,
        then: Expr,
        otherwise: Expr,
    },
    And(Expr, Expr),
    Or(Expr, Expr),
    /// Reads a variable through its address: one base step per crossed
    /// scope, then the slot index.
    Read(Vec<usize>),
    /// Stores `value` at the address and yields void.
    Write {
        path: Vec<usize>,
        value: Expr,
    },
    /// Reads the named slot of a frame value.
    Member {
        target: Expr,
        name: Rc<str>,
    },
    /// The current frame.
    This,
}

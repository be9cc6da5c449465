//! Host-provided native functions.
//!
//! A native function binds a language-level name and signature to a single
//! VM opcode. It does not run any host code itself: the compiler turns each
//! descriptor into an ordinary function literal whose body reads the
//! arguments from its frame and executes the opcode, so natives are called,
//! stored and passed around exactly like user functions.

use std::rc::Rc;

use crate::bytecode::Opcode;
use crate::error::CoreError;
use crate::hir::{Code, Expr};
use crate::scope::BASE;
use crate::types::Type;

/// Metadata about a single native function.
#[derive(Debug, Clone)]
pub struct NativeFunction {
    /// Name of the function at the language level (e.g. `print` or `+`).
    pub name: Rc<str>,
    pub op: Opcode,
    pub ret: Type,
    pub params: Vec<Type>,
}

impl NativeFunction {
    /// Fails when the parameter count differs from the number of values the
    /// opcode consumes.
    pub fn new(name: &str, op: Opcode, ret: Type, params: Vec<Type>) -> Result<Self, CoreError> {
        if params.len() != op.arity() {
            return Err(CoreError::Registration(format!(
                "{name}: {op} takes {} argument(s), {} declared",
                op.arity(),
                params.len()
            )));
        }
        Ok(NativeFunction {
            name: Rc::from(name),
            op,
            ret,
            params,
        })
    }

    pub fn ty(&self) -> Type {
        Type::function(Type::tuple(self.params.clone()), self.ret.clone())
    }

    /// Function literal whose frame holds the base slot and one slot per
    /// argument (`arg1`, `arg2`, ...).
    pub fn expr(&self) -> Expr {
        let arity = self.params.len();
        let layout = std::iter::once(Rc::from(BASE))
            .chain((1..=arity).map(|index| Rc::from(format!("arg{index}"))))
            .collect();
        let body = Expr::new(
            self.ret.clone(),
            Code::Native {
                op: self.op,
                arity,
            },
        );
        Expr::new(
            self.ty(),
            Code::Function {
                arity,
                layout,
                body,
            },
        )
    }
}

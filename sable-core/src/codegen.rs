//! Bytecode emission for analyzed expressions.
//!
//! Emission only reads resolved [`Code`]; every lazy part of the tree has
//! been forced by [`crate::typecheck::Analyzer::finish`] beforehand. Each
//! expression leaves exactly one value on the operand stack.

use crate::bytecode::{BytecodeWriter, Opcode};
use crate::error::CompileError;
use crate::hir::{Code, Expr};

fn slot(index: usize) -> i64 {
    index as i64
}

pub fn emit(expr: &Expr, writer: &mut BytecodeWriter) -> Result<(), CompileError> {
    let Some(code) = expr.code.get() else {
        return Err(CompileError::type_error(
            "expression was not resolved before code generation",
        ));
    };

    match code.as_ref() {
        Code::Void => writer.write_op(Opcode::PushVoid),
        Code::Int(value) => writer.write(Opcode::PushInt, *value),
        Code::Symbol(text) => {
            let index = writer.write_symbol(text);
            writer.write(Opcode::PushSymbol, slot(index));
        }
        Code::Sequence(exprs) => {
            for (index, expr) in exprs.iter().enumerate() {
                if index > 0 {
                    writer.write_op(Opcode::Pop);
                }
                emit(expr, writer)?;
            }
            if exprs.is_empty() {
                writer.write_op(Opcode::PushVoid);
            }
        }
        Code::Call { callee, args } => {
            for arg in args {
                emit(arg, writer)?;
            }
            emit(callee, writer)?;
            writer.write_op(Opcode::FunctionCall);
        }
        Code::Function {
            arity,
            layout,
            body,
        } => {
            let block = writer.write_function(layout.clone(), |w| {
                // The caller pushed the arguments, then the call pushed the
                // closure's base frame.
                w.write_op(Opcode::CurrentContext);
                w.write(Opcode::AssignContextVariable, 0);
                for index in (1..=*arity).rev() {
                    w.write_op(Opcode::CurrentContext);
                    w.write(Opcode::AssignContextVariable, slot(index));
                }
                emit(body, w)?;
                w.write_op(Opcode::FunctionReturn);
                Ok(())
            })?;
            writer.write(Opcode::DefineFunction, slot(block));
        }
        Code::Native { op, arity } => {
            for index in (1..=*arity).rev() {
                writer.write_op(Opcode::CurrentContext);
                writer.write(Opcode::ReadContextVariable, slot(index));
            }
            writer.write_op(*op);
        }
        Code::If {
            condition,
            then,
            otherwise,
        } => {
            emit(condition, writer)?;
            let to_then = writer.write_jump(Opcode::JumpIf);
            emit(otherwise, writer)?;
            let to_end = writer.write_jump(Opcode::Jump);
            writer.patch(to_then);
            emit(then, writer)?;
            writer.patch(to_end);
        }
        Code::And(left, right) => {
            emit(left, writer)?;
            let to_right = writer.write_jump(Opcode::JumpIf);
            writer.write(Opcode::PushInt, 0);
            let to_end = writer.write_jump(Opcode::Jump);
            writer.patch(to_right);
            emit(right, writer)?;
            writer.patch(to_end);
        }
        Code::Or(left, right) => {
            emit(left, writer)?;
            let to_true = writer.write_jump(Opcode::JumpIf);
            emit(right, writer)?;
            let to_end = writer.write_jump(Opcode::Jump);
            writer.patch(to_true);
            writer.write(Opcode::PushInt, 1);
            writer.patch(to_end);
        }
        Code::Read(path) => {
            writer.write_op(Opcode::CurrentContext);
            for index in path {
                writer.write(Opcode::ReadContextVariable, slot(*index));
            }
        }
        Code::Write { path, value } => {
            let Some((last, steps)) = path.split_last() else {
                return Err(CompileError::type_error("empty variable address"));
            };
            emit(value, writer)?;
            writer.write_op(Opcode::CurrentContext);
            for index in steps {
                writer.write(Opcode::ReadContextVariable, slot(*index));
            }
            writer.write(Opcode::AssignContextVariable, slot(*last));
            writer.write_op(Opcode::PushVoid);
        }
        Code::Member { target, name } => {
            emit(target, writer)?;
            let symbol = writer.write_symbol(name);
            writer.write(Opcode::ReadMember, slot(symbol));
        }
        Code::This => writer.write_op(Opcode::CurrentContext),
    }
    Ok(())
}

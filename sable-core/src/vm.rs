//! Stack-based virtual machine.
//!
//! The machine state is an operand stack, a call stack of return points, a
//! stack of activation records (frames) and the instruction pointer into the
//! current block. Every opcode maps to one handler in a flat dispatch table.
//! A program ends when the current block runs past its last instruction.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::bytecode::{Opcode, Program};
use crate::error::RuntimeError;

/// Activation record: one slot per name in its block's layout.
pub struct Frame {
    block: usize,
    slots: RefCell<Vec<Option<Value>>>,
}

impl Frame {
    fn new(block: usize, size: usize) -> Self {
        Frame {
            block,
            slots: RefCell::new(vec![None; size]),
        }
    }

    fn get(&self, index: usize) -> Result<Value, RuntimeError> {
        let slots = self.slots.borrow();
        match slots.get(index) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(RuntimeError::UninitializedSlot(index)),
            None => Err(RuntimeError::SlotOutOfRange {
                index,
                size: slots.len(),
            }),
        }
    }

    fn set(&self, index: usize, value: Value) -> Result<(), RuntimeError> {
        let mut slots = self.slots.borrow_mut();
        let size = slots.len();
        match slots.get_mut(index) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(RuntimeError::SlotOutOfRange { index, size }),
        }
    }
}

// Frames reach themselves through the closures stored in their slots.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(block {}, {} slots)", self.block, self.slots.borrow().len())
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    /// Integers and booleans.
    Int(i64),
    Str(Rc<str>),
    Closure { block: usize, base: Rc<Frame> },
    Frame(Rc<Frame>),
    Void,
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Closure { .. } => "function",
            Value::Frame(_) => "context",
            Value::Void => "void",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Str(text) => f.write_str(text),
            Value::Closure { block, .. } => write!(f, "<function {block}>"),
            Value::Frame(frame) => write!(f, "<context {}>", frame.block),
            Value::Void => f.write_str("void"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Return {
    block: usize,
    address: usize,
}

type Operation<'p, W> = fn(&mut Vm<'p, W>, i64) -> Result<(), RuntimeError>;

pub struct Vm<'p, W: Write> {
    program: &'p Program,
    out: W,
    stack: Vec<Value>,
    calls: Vec<Return>,
    frames: Vec<Rc<Frame>>,
    block: usize,
    ip: usize,
}

/// Runs `program`, writing its output to `out`.
pub fn run<W: Write>(program: &Program, out: W) -> Result<(), RuntimeError> {
    Vm::new(program, out).run()
}

impl<'p, W: Write> Vm<'p, W> {
    /// Handlers indexed by opcode discriminant.
    const DISPATCH: [Operation<'p, W>; Opcode::COUNT] = [
        Self::function_call,
        Self::current_context,
        Self::assign_context_variable,
        Self::read_context_variable,
        Self::push_int,
        Self::print,
        Self::function_return,
        Self::define_function,
        Self::push_symbol,
        Self::pop,
        Self::jump_if,
        Self::jump,
        Self::less_than,
        Self::add,
        Self::subtract,
        Self::multiply,
        Self::divide,
        Self::not,
        Self::equal,
        Self::push_void,
        Self::read_member,
        Self::greater_than,
        Self::modulo,
        Self::concat,
    ];

    pub fn new(program: &'p Program, out: W) -> Self {
        Vm {
            program,
            out,
            stack: Vec::new(),
            calls: Vec::new(),
            frames: Vec::new(),
            block: 0,
            ip: 0,
        }
    }

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let entry = self.new_frame(0)?;
        self.frames.push(entry);
        loop {
            let Some(instruction) = self.program.blocks[self.block].code.get(self.ip).copied() else {
                break;
            };
            self.ip += 1;
            Self::DISPATCH[instruction.op.index()](self, instruction.operand)?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn new_frame(&self, block: usize) -> Result<Rc<Frame>, RuntimeError> {
        let size = self
            .program
            .blocks
            .get(block)
            .map(|block| block.layout.len())
            .ok_or(RuntimeError::InvalidReference {
                kind: "block",
                index: block as i64,
            })?;
        Ok(Rc::new(Frame::new(block, size)))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop_value(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn pop_int(&mut self) -> Result<i64, RuntimeError> {
        match self.pop_value()? {
            Value::Int(value) => Ok(value),
            other => Err(mismatch("int", &other)),
        }
    }

    fn pop_str(&mut self) -> Result<Rc<str>, RuntimeError> {
        match self.pop_value()? {
            Value::Str(text) => Ok(text),
            other => Err(mismatch("string", &other)),
        }
    }

    fn pop_frame(&mut self) -> Result<Rc<Frame>, RuntimeError> {
        match self.pop_value()? {
            Value::Frame(frame) => Ok(frame),
            other => Err(mismatch("context", &other)),
        }
    }

    fn current_frame(&self) -> Result<Rc<Frame>, RuntimeError> {
        self.frames.last().cloned().ok_or(RuntimeError::NoActiveFrame)
    }

    fn binary(&mut self, op: impl FnOnce(i64, i64) -> Result<i64, RuntimeError>) -> Result<(), RuntimeError> {
        let left = self.pop_int()?;
        let right = self.pop_int()?;
        let result = op(left, right)?;
        self.push(Value::Int(result));
        Ok(())
    }

    fn function_call(&mut self, _: i64) -> Result<(), RuntimeError> {
        let (block, base) = match self.pop_value()? {
            Value::Closure { block, base } => (block, base),
            other => return Err(mismatch("function", &other)),
        };
        let frame = self.new_frame(block)?;
        self.calls.push(Return {
            block: self.block,
            address: self.ip,
        });
        tracing::trace!(block, depth = self.calls.len(), "call");
        self.push(Value::Frame(base));
        self.block = block;
        self.ip = 0;
        self.frames.push(frame);
        Ok(())
    }

    fn current_context(&mut self, _: i64) -> Result<(), RuntimeError> {
        let frame = self.current_frame()?;
        self.push(Value::Frame(frame));
        Ok(())
    }

    fn assign_context_variable(&mut self, operand: i64) -> Result<(), RuntimeError> {
        let index = index("slot", operand)?;
        let frame = self.pop_frame()?;
        let value = self.pop_value()?;
        frame.set(index, value)
    }

    fn read_context_variable(&mut self, operand: i64) -> Result<(), RuntimeError> {
        let index = index("slot", operand)?;
        let frame = self.pop_frame()?;
        let value = frame.get(index)?;
        self.push(value);
        Ok(())
    }

    fn push_int(&mut self, operand: i64) -> Result<(), RuntimeError> {
        self.push(Value::Int(operand));
        Ok(())
    }

    fn print(&mut self, _: i64) -> Result<(), RuntimeError> {
        let value = self.pop_value()?;
        writeln!(self.out, "{value}")?;
        self.push(Value::Void);
        Ok(())
    }

    fn function_return(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.frames.pop().ok_or(RuntimeError::NoActiveFrame)?;
        let back = self.calls.pop().ok_or(RuntimeError::CallStackUnderflow)?;
        self.block = back.block;
        self.ip = back.address;
        Ok(())
    }

    fn define_function(&mut self, operand: i64) -> Result<(), RuntimeError> {
        let block = index("block", operand)?;
        if block >= self.program.blocks.len() {
            return Err(RuntimeError::InvalidReference {
                kind: "block",
                index: operand,
            });
        }
        let base = self.current_frame()?;
        self.push(Value::Closure { block, base });
        Ok(())
    }

    fn symbol(&self, operand: i64) -> Result<Rc<str>, RuntimeError> {
        index("symbol", operand)
            .ok()
            .and_then(|index| self.program.symbols.get(index))
            .cloned()
            .ok_or(RuntimeError::InvalidReference {
                kind: "symbol",
                index: operand,
            })
    }

    fn push_symbol(&mut self, operand: i64) -> Result<(), RuntimeError> {
        let text = self.symbol(operand)?;
        self.push(Value::Str(text));
        Ok(())
    }

    fn pop(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.pop_value().map(drop)
    }

    fn jump_if(&mut self, operand: i64) -> Result<(), RuntimeError> {
        let target = index("jump target", operand)?;
        if self.pop_int()? != 0 {
            self.ip = target;
        }
        Ok(())
    }

    fn jump(&mut self, operand: i64) -> Result<(), RuntimeError> {
        self.ip = index("jump target", operand)?;
        Ok(())
    }

    fn less_than(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.binary(|a, b| Ok(i64::from(a < b)))
    }

    fn greater_than(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.binary(|a, b| Ok(i64::from(a > b)))
    }

    fn add(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.binary(|a, b| Ok(a.wrapping_add(b)))
    }

    fn subtract(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.binary(|a, b| Ok(a.wrapping_sub(b)))
    }

    fn multiply(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.binary(|a, b| Ok(a.wrapping_mul(b)))
    }

    fn divide(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.binary(|a, b| {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(a.wrapping_div(b))
        })
    }

    fn modulo(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.binary(|a, b| {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(a.wrapping_rem(b))
        })
    }

    fn equal(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.binary(|a, b| Ok(i64::from(a == b)))
    }

    fn not(&mut self, _: i64) -> Result<(), RuntimeError> {
        let value = self.pop_int()?;
        self.push(Value::Int(i64::from(value == 0)));
        Ok(())
    }

    fn push_void(&mut self, _: i64) -> Result<(), RuntimeError> {
        self.push(Value::Void);
        Ok(())
    }

    fn read_member(&mut self, operand: i64) -> Result<(), RuntimeError> {
        let name = self.symbol(operand)?;
        let frame = self.pop_frame()?;
        let layout = &self.program.blocks[frame.block].layout;
        // Slot 0 of a function frame links to the enclosing frame.
        let skip = usize::from(frame.block != 0);
        let index = layout
            .iter()
            .enumerate()
            .skip(skip)
            .find(|(_, slot)| **slot == name)
            .map(|(index, _)| index)
            .ok_or_else(|| RuntimeError::UnknownMember(name.to_string()))?;
        let value = frame.get(index)?;
        self.push(value);
        Ok(())
    }

    fn concat(&mut self, _: i64) -> Result<(), RuntimeError> {
        let left = self.pop_str()?;
        let right = self.pop_str()?;
        self.push(Value::Str(Rc::from(format!("{left}{right}"))));
        Ok(())
    }
}

fn mismatch(expected: &'static str, found: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected,
        found: found.kind().to_string(),
    }
}

fn index(kind: &'static str, operand: i64) -> Result<usize, RuntimeError> {
    usize::try_from(operand).map_err(|_| RuntimeError::InvalidReference {
        kind,
        index: operand,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Block, Instruction};

    fn block(code: &[(Opcode, i64)], layout: &[&str]) -> Block {
        Block {
            code: code
                .iter()
                .map(|&(op, operand)| Instruction { op, operand })
                .collect(),
            layout: layout.iter().map(|name| Rc::from(*name)).collect(),
        }
    }

    fn execute(program: &Program) -> Result<String, RuntimeError> {
        let mut out = Vec::new();
        run(program, &mut out)?;
        Ok(String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn native_operations_take_the_first_operand_from_the_top() {
        let program = Program {
            blocks: vec![block(
                &[
                    (Opcode::PushInt, 3),
                    (Opcode::PushInt, 10),
                    (Opcode::Subtract, 0),
                    (Opcode::Print, 0),
                ],
                &[],
            )],
            symbols: Vec::new(),
        };
        assert_eq!(execute(&program).expect("run"), "7\n");
    }

    #[test]
    fn calls_switch_blocks_and_return() {
        // block 1: `[a int] a * 2`
        let double = block(
            &[
                (Opcode::CurrentContext, 0),
                (Opcode::AssignContextVariable, 0),
                (Opcode::CurrentContext, 0),
                (Opcode::AssignContextVariable, 1),
                (Opcode::PushInt, 2),
                (Opcode::CurrentContext, 0),
                (Opcode::ReadContextVariable, 1),
                (Opcode::Multiply, 0),
                (Opcode::FunctionReturn, 0),
            ],
            &["base", "a"],
        );
        let main = block(
            &[
                (Opcode::PushInt, 21),
                (Opcode::DefineFunction, 1),
                (Opcode::FunctionCall, 0),
                (Opcode::Print, 0),
            ],
            &[],
        );
        let program = Program {
            blocks: vec![main, double],
            symbols: Vec::new(),
        };
        assert_eq!(execute(&program).expect("run"), "42\n");
    }

    #[test]
    fn reads_members_by_name() {
        let program = Program {
            blocks: vec![block(
                &[
                    (Opcode::PushInt, 5),
                    (Opcode::CurrentContext, 0),
                    (Opcode::AssignContextVariable, 1),
                    (Opcode::CurrentContext, 0),
                    (Opcode::ReadMember, 0),
                    (Opcode::Print, 0),
                ],
                &["x", "y"],
            )],
            symbols: vec![Rc::from("y")],
        };
        assert_eq!(execute(&program).expect("run"), "5\n");
    }

    #[test]
    fn members_resolve_to_the_first_slot_after_base() {
        // block 1: a function whose frame declares `x` twice and returns it
        let shadowed = block(
            &[
                (Opcode::CurrentContext, 0),
                (Opcode::AssignContextVariable, 0),
                (Opcode::PushInt, 1),
                (Opcode::CurrentContext, 0),
                (Opcode::AssignContextVariable, 1),
                (Opcode::PushInt, 2),
                (Opcode::CurrentContext, 0),
                (Opcode::AssignContextVariable, 2),
                (Opcode::CurrentContext, 0),
                (Opcode::FunctionReturn, 0),
            ],
            &["base", "x", "x"],
        );
        let main = |member: i64| {
            block(
                &[
                    (Opcode::DefineFunction, 1),
                    (Opcode::FunctionCall, 0),
                    (Opcode::ReadMember, member),
                    (Opcode::Print, 0),
                ],
                &[],
            )
        };
        let program = Program {
            blocks: vec![main(0), shadowed.clone()],
            symbols: vec![Rc::from("x"), Rc::from("base")],
        };
        assert_eq!(execute(&program).expect("run"), "1\n");

        let program = Program {
            blocks: vec![main(1), shadowed],
            symbols: vec![Rc::from("x"), Rc::from("base")],
        };
        assert!(matches!(
            execute(&program),
            Err(RuntimeError::UnknownMember(ref name)) if name == "base"
        ));
    }

    #[test]
    fn concatenates_strings() {
        let program = Program {
            blocks: vec![block(
                &[
                    (Opcode::PushSymbol, 1),
                    (Opcode::PushSymbol, 0),
                    (Opcode::Concat, 0),
                    (Opcode::Print, 0),
                ],
                &[],
            )],
            symbols: vec![Rc::from("ab"), Rc::from("cd")],
        };
        assert_eq!(execute(&program).expect("run"), "abcd\n");
    }

    #[test]
    fn fatal_conditions_abort() {
        let underflow = Program {
            blocks: vec![block(&[(Opcode::Pop, 0)], &[])],
            symbols: Vec::new(),
        };
        assert!(matches!(execute(&underflow), Err(RuntimeError::StackUnderflow)));

        let out_of_range = Program {
            blocks: vec![block(
                &[(Opcode::CurrentContext, 0), (Opcode::ReadContextVariable, 3)],
                &["x"],
            )],
            symbols: Vec::new(),
        };
        assert!(matches!(
            execute(&out_of_range),
            Err(RuntimeError::SlotOutOfRange { index: 3, size: 1 })
        ));

        let uninitialized = Program {
            blocks: vec![block(
                &[(Opcode::CurrentContext, 0), (Opcode::ReadContextVariable, 0)],
                &["x"],
            )],
            symbols: Vec::new(),
        };
        assert!(matches!(
            execute(&uninitialized),
            Err(RuntimeError::UninitializedSlot(0))
        ));

        let division = Program {
            blocks: vec![block(
                &[(Opcode::PushInt, 0), (Opcode::PushInt, 1), (Opcode::Divide, 0)],
                &[],
            )],
            symbols: Vec::new(),
        };
        assert!(matches!(execute(&division), Err(RuntimeError::DivisionByZero)));

        let wrong_shape = Program {
            blocks: vec![block(&[(Opcode::PushInt, 1), (Opcode::FunctionCall, 0)], &[])],
            symbols: Vec::new(),
        };
        assert!(matches!(
            execute(&wrong_shape),
            Err(RuntimeError::TypeMismatch { expected: "function", .. })
        ));

        let stray_return = Program {
            blocks: vec![block(&[(Opcode::FunctionReturn, 0)], &[])],
            symbols: Vec::new(),
        };
        assert!(matches!(
            execute(&stray_return),
            Err(RuntimeError::CallStackUnderflow)
        ));
    }
}

//! Bytecode blocks and the writer that assembles them.
//!
//! A [`Program`] is a list of blocks plus a pool of interned string
//! literals. Block 0 is the entry point; every function literal gets a block
//! of its own. Instructions carry a single integer operand whose meaning
//! depends on the opcode (slot index, block index, symbol index, jump
//! target or literal).

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    FunctionCall,
    CurrentContext,
    AssignContextVariable,
    ReadContextVariable,
    PushInt,
    Print,
    FunctionReturn,
    DefineFunction,
    PushSymbol,
    Pop,
    JumpIf,
    Jump,
    LessThan,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Equal,
    PushVoid,
    ReadMember,
    GreaterThan,
    Modulo,
    Concat,
}

impl Opcode {
    pub const COUNT: usize = 24;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Number of values a native operation pops. Host functions bound to an
    /// opcode must declare exactly this many parameters.
    pub fn arity(self) -> usize {
        match self {
            Opcode::Print | Opcode::Not => 1,
            Opcode::LessThan
            | Opcode::GreaterThan
            | Opcode::Add
            | Opcode::Subtract
            | Opcode::Multiply
            | Opcode::Divide
            | Opcode::Modulo
            | Opcode::Equal
            | Opcode::Concat => 2,
            _ => 0,
        }
    }

    pub fn has_operand(self) -> bool {
        matches!(
            self,
            Opcode::AssignContextVariable
                | Opcode::ReadContextVariable
                | Opcode::PushInt
                | Opcode::DefineFunction
                | Opcode::PushSymbol
                | Opcode::JumpIf
                | Opcode::Jump
                | Opcode::ReadMember
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Opcode,
    pub operand: i64,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op.has_operand() {
            write!(f, "{} {}", self.op, self.operand)
        } else {
            write!(f, "{}", self.op)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub code: Vec<Instruction>,
    /// Slot names of the frames that run this block.
    pub layout: Vec<Rc<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub blocks: Vec<Block>,
    pub symbols: Vec<Rc<str>>,
}

impl Program {
    /// Whether `block` contains an instruction with this opcode and operand.
    pub fn contains(&self, block: usize, op: Opcode, operand: i64) -> bool {
        self.blocks.get(block).is_some_and(|block| {
            block
                .code
                .iter()
                .any(|instruction| instruction.op == op && instruction.operand == operand)
        })
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, block) in self.blocks.iter().enumerate() {
            let layout: Vec<&str> = block.layout.iter().map(|name| name.as_ref()).collect();
            writeln!(f, "block {index} [{}]:", layout.join(", "))?;
            for (address, instruction) in block.code.iter().enumerate() {
                writeln!(f, "  {address:04} {instruction}")?;
            }
        }
        if !self.symbols.is_empty() {
            writeln!(f, "symbols:")?;
            for (index, symbol) in self.symbols.iter().enumerate() {
                writeln!(f, "  {index} {symbol:?}")?;
            }
        }
        Ok(())
    }
}

/// Placeholder left by [`BytecodeWriter::write_jump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a jump must be patched once its target is known"]
pub struct JumpPatch {
    block: usize,
    at: usize,
}

#[derive(Debug)]
pub struct BytecodeWriter {
    blocks: Vec<Block>,
    symbols: Vec<Rc<str>>,
    current: usize,
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        BytecodeWriter::new()
    }
}

impl BytecodeWriter {
    pub fn new() -> Self {
        BytecodeWriter {
            blocks: vec![Block::default()],
            symbols: Vec::new(),
            current: 0,
        }
    }

    pub fn current_block(&self) -> usize {
        self.current
    }

    /// Address of the next instruction in the current block.
    pub fn position(&self) -> usize {
        self.blocks[self.current].code.len()
    }

    pub fn write(&mut self, op: Opcode, operand: i64) {
        self.blocks[self.current].code.push(Instruction { op, operand });
    }

    pub fn write_op(&mut self, op: Opcode) {
        self.write(op, 0);
    }

    /// Interns a string literal; identical literals share one index.
    pub fn write_symbol(&mut self, text: &str) -> usize {
        if let Some(index) = self.symbols.iter().position(|symbol| symbol.as_ref() == text) {
            return index;
        }
        self.symbols.push(Rc::from(text));
        self.symbols.len() - 1
    }

    /// Allocates a new block, lets `body` write into it and returns its
    /// index. The previously current block is current again afterwards.
    pub fn write_function<E>(
        &mut self,
        layout: Vec<Rc<str>>,
        body: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<usize, E> {
        let block = self.blocks.len();
        tracing::debug!(block, slots = layout.len(), "allocating function block");
        self.blocks.push(Block {
            code: Vec::new(),
            layout,
        });
        let caller = std::mem::replace(&mut self.current, block);
        let outcome = body(self);
        self.current = caller;
        outcome.map(|()| block)
    }

    /// Writes a jump with a placeholder target.
    pub fn write_jump(&mut self, op: Opcode) -> JumpPatch {
        let at = self.position();
        self.write(op, 0);
        JumpPatch {
            block: self.current,
            at,
        }
    }

    /// Points the jump at the next instruction of its block.
    pub fn patch(&mut self, jump: JumpPatch) {
        let block = &mut self.blocks[jump.block];
        let target = block.code.len() as i64;
        block.code[jump.at].operand = target;
    }

    pub fn set_layout(&mut self, block: usize, layout: Vec<Rc<str>>) {
        if let Some(block) = self.blocks.get_mut(block) {
            block.layout = layout;
        }
    }

    pub fn finish(self) -> Program {
        Program {
            blocks: self.blocks,
            symbols: self.symbols,
        }
    }
}

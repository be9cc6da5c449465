//! Host registration and the compile/run entry points.
//!
//! A host describes its language with a [`CompilerBuilder`]: recognizers and
//! literal tokens for the lexer, the two rule tables for the parser, named
//! primitive types and native functions. [`CompilerBuilder::build`] freezes
//! the configuration into a [`Compiler`], which turns whole source texts into
//! bytecode [`Program`]s and runs them.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use crate::ast::Node;
use crate::builtins::NativeFunction;
use crate::bytecode::{BytecodeWriter, Opcode, Program};
use crate::codegen::emit;
use crate::error::{CompileError, CoreError};
use crate::hir::{Code, Expr};
use crate::lazy::Lazy;
use crate::lexer::{Lexicon, Recognizer, Token, TokenClass};
use crate::parser::Parser;
use crate::rules::{Grammar, InfixRule, PrefixRule};
use crate::scope::{Scope, Variable};
use crate::span::Position;
use crate::typecheck::Analyzer;
use crate::types::Type;
use crate::vm;

#[derive(Debug, Default)]
pub struct CompilerBuilder {
    lexicon: Lexicon,
    grammar: Grammar,
    types: Vec<(Rc<str>, Type)>,
    functions: Vec<NativeFunction>,
}

impl CompilerBuilder {
    pub fn new() -> Self {
        CompilerBuilder::default()
    }

    /// Registers a recognizer and returns the class of the tokens it makes.
    pub fn recognizer(&mut self, recognizer: Recognizer) -> TokenClass {
        self.lexicon.add(recognizer)
    }

    /// Token used to match `literal` in grammar rules.
    ///
    /// Literals that the recognizers registered so far do not produce as a
    /// single token become custom symbols, so register recognizers first.
    pub fn token(&mut self, literal: &str) -> Token {
        self.lexicon.token(literal)
    }

    pub fn set_rules(&mut self, rules: Vec<PrefixRule>) -> &mut Self {
        self.grammar.prefix = rules;
        self
    }

    pub fn set_infix_rules(&mut self, rules: Vec<InfixRule>) -> &mut Self {
        self.grammar.infix = rules;
        self
    }

    pub fn add_type(&mut self, name: &str, ty: Type) -> &mut Self {
        self.types.push((Rc::from(name), ty));
        self
    }

    /// Binds `name` to a function running `op` on its arguments.
    pub fn add_function(
        &mut self,
        name: &str,
        op: Opcode,
        ret: Type,
        params: Vec<Type>,
    ) -> Result<&mut Self, CoreError> {
        self.functions.push(NativeFunction::new(name, op, ret, params)?);
        Ok(self)
    }

    pub fn build(self) -> Compiler {
        tracing::debug!(
            symbols = self.lexicon.symbols().len(),
            prefix_rules = self.grammar.prefix.len(),
            infix_rules = self.grammar.infix.len(),
            types = self.types.len(),
            functions = self.functions.len(),
            "compiler configured"
        );
        Compiler {
            lexicon: self.lexicon,
            grammar: self.grammar,
            types: self.types,
            functions: self.functions,
        }
    }
}

/// A frozen host configuration.
#[derive(Debug)]
pub struct Compiler {
    lexicon: Lexicon,
    grammar: Grammar,
    types: Vec<(Rc<str>, Type)>,
    functions: Vec<NativeFunction>,
}

impl Compiler {
    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Parses a whole source text as one indentation-delimited sequence.
    pub fn parse(&self, source: &str) -> Result<Rc<Node>, CompileError> {
        let source = normalize(source);
        // Row 0 is the implied line break.
        let tokens = self.lexicon.tokenize_at(&source, Position::new(0, 1));
        let mut parser = Parser::new(tokens, &self.grammar)?;
        parser.parse_program()
    }

    pub fn compile(&self, source: &str) -> Result<Program, CompileError> {
        tracing::debug!(bytes = source.len(), "compiling");
        let node = self.parse(source)?;

        let scope = Scope::root();
        for (name, ty) in &self.types {
            scope.define_type(name, Lazy::ready(ty.clone()));
        }
        let mut items = Vec::with_capacity(self.functions.len() + 1);
        for function in &self.functions {
            let variable = scope.declare(Variable::new(&function.name, Lazy::ready(function.ty())));
            let path = scope.address(&variable)?;
            items.push(Expr::new(
                Type::void(),
                Code::Write {
                    path,
                    value: function.expr(),
                },
            ));
        }

        let analyzer = Analyzer::new(scope.clone());
        let program = analyzer.analyze(&node, None)?;
        analyzer.finish()?;
        let ty = program.ty.force()?;
        items.push(program);

        let mut writer = BytecodeWriter::new();
        emit(&Expr::new(ty, Code::Sequence(items)), &mut writer)?;
        writer.set_layout(0, scope.layout());
        let program = writer.finish();
        tracing::debug!(
            blocks = program.blocks.len(),
            symbols = program.symbols.len(),
            "compiled"
        );
        Ok(program)
    }

    /// Compiles and runs `source`, writing program output to `out`.
    /// Nothing runs when compilation fails.
    pub fn run<W: Write>(&self, source: &str, out: W) -> Result<(), CoreError> {
        let program = self.compile(source)?;
        vm::run(&program, out)?;
        Ok(())
    }

    pub fn run_file<W: Write>(&self, path: impl AsRef<Path>, out: W) -> Result<(), CoreError> {
        let source = fs::read_to_string(path)?;
        self.run(&source, out)
    }
}

/// The leading line break opens the top-level block.
fn normalize(source: &str) -> String {
    let mut text = String::with_capacity(source.len() + 1);
    text.push('\n');
    text.push_str(&source.replace("\r\n", "\n"));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::standard;

    fn compiler() -> Compiler {
        standard().expect("standard compiler")
    }

    fn run(source: &str) -> Result<String, CoreError> {
        let mut out = Vec::new();
        compiler().run(source, &mut out)?;
        Ok(String::from_utf8(out).expect("utf8 output"))
    }

    fn output(source: &str) -> String {
        run(source).expect("program runs")
    }

    fn slot_of(program: &Program, name: &str) -> i64 {
        program.blocks[0]
            .layout
            .iter()
            .position(|slot| slot.as_ref() == name)
            .expect("slot") as i64
    }

    #[test]
    fn precedence_follows_rule_weights() {
        assert_eq!(output("print(1 + 2 * 3)"), "7\n");
        assert_eq!(output("print(1 * 2 + 3)"), "5\n");
        assert_eq!(output("print(10 - 4 - 3)"), "3\n");
        assert_eq!(output("print((1 + 2) * 3)"), "9\n");
    }

    #[test]
    fn scenario_let_and_print() {
        assert_eq!(output("let x = 5\nprint(x)"), "5\n");
    }

    #[test]
    fn scenario_if_else() {
        assert_eq!(output("if true print(1) else print(0)"), "1\n");
        assert_eq!(output("if 2 < 1 print(1) else print(0)"), "0\n");
        assert_eq!(output("if false print(1)"), "");
    }

    #[test]
    fn scenario_function_call() {
        let source = "let add = [a int, b int] a + b\nprint(add(2,3))";
        assert_eq!(output(source), "5\n");
    }

    #[test]
    fn scenario_unresolved_operator_is_a_type_error() {
        let err = compiler().compile("print(\"a\" + 1)").unwrap_err();
        assert!(matches!(err, CompileError::Type { ref message, .. } if message.contains('+')));

        let mut out = Vec::new();
        let err = compiler().run("print(1)\nprint(\"a\" + 1)", &mut out).unwrap_err();
        assert!(matches!(err, CoreError::Compile(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn scenario_recursion_through_a_declared_return_type() {
        let source = "\
let fact = [n int] -> int
  if n < 2 1 else n * fact(n - 1)
print(fact(5))";
        assert_eq!(output(source), "120\n");
    }

    #[test]
    fn scenario_structural_aliases() {
        let source = "\
let point = [x int, y int] this
let sum = [p point] p.x + p.y
print(sum(point(3, 4)))";
        assert_eq!(output(source), "7\n");
    }

    #[test]
    fn wider_contexts_are_read_by_member_name() {
        let source = "\
let small = []
  let x = 1
  this
let big = []
  let y = \"wide\"
  let x = 41
  this
let getx = [p small] p.x + 1
print(getx(big()))
print(big().y + \"!\")";
        assert_eq!(output(source), "42\nwide!\n");
    }

    #[test]
    fn repeated_member_names_resolve_to_the_first_slot() {
        let shadowed = "\
let mk = []
  let x = 1
  let x = \"s\"
  this
";
        assert_eq!(output(&format!("{shadowed}print(mk().x + 1)")), "2\n");

        let err = compiler()
            .compile(&format!("{shadowed}print(mk().x + \"!\")"))
            .unwrap_err();
        assert!(matches!(err, CompileError::Type { .. }));

        let source = "\
let mk = []
  let x = [] 1
  let x = \"s\"
  this
let s = -> string mk().x
print(s + \"!\")";
        let err = compiler().compile(source).unwrap_err();
        assert!(matches!(err, CompileError::Type { .. }));
    }

    #[test]
    fn deep_nesting_is_a_compile_error() {
        let nested = format!("print({}1{})", "(".repeat(2000), ")".repeat(2000));
        let err = compiler().compile(&nested).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { ref message, .. }
            if message == "nesting too deep"));

        let chain = format!("print(1{})", " + 1".repeat(300));
        let err = compiler().compile(&chain).unwrap_err();
        assert!(matches!(err, CompileError::Type { ref message, .. }
            if message == "nesting too deep"));

        let chain = format!("print(1{})", " + 1".repeat(40));
        assert_eq!(output(&chain), "41\n");
    }

    #[test]
    fn self_reference_without_a_return_type_is_reported() {
        let source = "let spin = [n int] spin(n)\nprint(spin(1))";
        let err = compiler().compile(source).unwrap_err();
        assert!(matches!(err, CompileError::Type { ref message, .. }
            if message == "recursive reference before its type is known"));
    }

    #[test]
    fn closures_capture_their_defining_frame() {
        assert_eq!(output("let f = [a int] a + 1\nprint(f(4))"), "5\n");

        let source = "\
let y = 10
let outer = [a int]
  let inner = [b int] a + b + y
  inner(1)
print(outer(5))";
        assert_eq!(output(source), "16\n");

        let source = "\
let adder = [n int] [m int] n + m
let add2 = adder(2)
print(add2(40))";
        assert_eq!(output(source), "42\n");
    }

    #[test]
    fn constants_are_inlined() {
        let program = compiler().compile("let x = 3\nprint(x + 1)").expect("compile");
        let x = slot_of(&program, "x");
        assert!(program.contains(0, Opcode::AssignContextVariable, x));
        assert!(!program.contains(0, Opcode::ReadContextVariable, x));
        assert!(program.contains(0, Opcode::PushInt, 3));
    }

    #[test]
    fn boolean_operators_short_circuit() {
        let loud = "let loud = [] -> bool\n  print(1)\n  true\n";
        assert_eq!(output(&format!("{loud}false and loud()")), "");
        assert_eq!(output(&format!("{loud}true or loud()")), "");
        assert_eq!(output(&format!("{loud}print(true and loud())")), "1\n1\n");
        assert_eq!(output("print(true and 1 < 2)"), "1\n");
        assert_eq!(output("print(false or 2 < 1)"), "0\n");
    }

    #[test]
    fn strings_and_overloads() {
        assert_eq!(output("print(\"ab\" + \"cd\")"), "abcd\n");
        assert_eq!(output("print(7 % 3 == 1)"), "1\n");
        assert_eq!(output("print(!(1 == 2))"), "1\n");
        assert_eq!(output("print(3 > 2 == true)"), "1\n");
    }

    #[test]
    fn mutual_recursion_resolves_lazily() {
        let source = "\
let even = [n int] -> bool if n == 0 true else odd(n - 1)
let odd = [n int] -> bool if n == 0 false else even(n - 1)
print(even(10))
print(odd(7))";
        assert_eq!(output(source), "1\n1\n");
    }

    #[test]
    fn generic_functions_are_specialized_explicitly() {
        let source = "\
let id = {T any}[x T] x
print(id{int}(5))
print(id{string}(\"s\"))";
        assert_eq!(output(source), "5\ns\n");

        let err = compiler().compile("let id = {T int}[x T] x\nid{string}").unwrap_err();
        assert!(matches!(err, CompileError::Type { ref message, .. } if message.contains("bound")));
    }

    #[test]
    fn checked_casts_reject_mismatches() {
        let err = compiler().compile("-> int \"text\"").unwrap_err();
        assert!(matches!(err, CompileError::Type { ref message, .. }
            if message == "unexpected type string, expected int"));
    }

    #[test]
    fn reports_unknown_names_with_their_position() {
        let err = compiler().compile("let a = 1\nprint(b)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "type error at (2,7) `b`: no such variable: b"
        );
    }

    #[test]
    fn runtime_errors_surface_after_output() {
        let mut out = Vec::new();
        let err = compiler().run("print(1)\nprint(1 / 0)", &mut out).unwrap_err();
        assert!(matches!(err, CoreError::Runtime(crate::error::RuntimeError::DivisionByZero)));
        assert_eq!(out, b"1\n");
    }

    #[test]
    fn runs_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("main.sb");
        fs::write(&path, "let x = 2\r\nprint(x * 21)\r\n").expect("write source");
        let mut out = Vec::new();
        compiler().run_file(&path, &mut out).expect("run file");
        assert_eq!(out, b"42\n");

        let missing = compiler().run_file(dir.path().join("missing.sb"), Vec::new());
        assert!(matches!(missing, Err(CoreError::SourceIo(_))));
    }

    #[test]
    fn registration_checks_native_arity() {
        let mut builder = CompilerBuilder::new();
        let err = builder
            .add_function("print", Opcode::Print, Type::void(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Registration(_)));
    }
}

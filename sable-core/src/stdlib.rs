//! The standard host language.
//!
//! Wires recognizers, grammar rules, primitive type names and native
//! functions into a [`Compiler`]. Registration order matters twice: the
//! recognizers decide which literal tokens become custom symbols, and the
//! rule order is the disambiguation policy of the grammar.

use std::rc::Rc;

use crate::bytecode::Opcode;
use crate::compiler::{Compiler, CompilerBuilder};
use crate::error::CoreError;
use crate::lexer::Recognizer;
use crate::rules::{Builder, InfixRule, Pattern, PrefixRule, TypeNameSyntax};
use crate::types::Type;

pub fn standard() -> Result<Compiler, CoreError> {
    let mut builder = CompilerBuilder::new();

    let indentation = builder.recognizer(Recognizer::Indentation);
    let additive = builder.recognizer(Recognizer::Predicate(|c| "&|+-".contains(c)));
    let multiplicative = builder.recognizer(Recognizer::Predicate(|c| "*/%".contains(c)));
    let prefix_operator = builder.recognizer(Recognizer::Match(vec!["!".to_string()]));
    let comparison = builder.recognizer(Recognizer::Predicate(|c| "=<>".contains(c)));
    let string = builder.recognizer(Recognizer::Quote {
        open: '"',
        close: '"',
        escape: '\\',
    });
    let integer = builder.recognizer(Recognizer::Predicate(|c| c.is_ascii_digit()));
    let symbol = builder.recognizer(Recognizer::Predicate(char::is_alphanumeric));

    let mut token = |literal: &str| builder.token(literal);
    let arrow = token("->");
    let open_brace = token("{");
    let comma = token(",");
    let close_brace = token("}");
    let open_bracket = token("[");
    let close_bracket = token("]");
    let let_keyword = token("let");
    let assign = token("=");
    let open_paren = token("(");
    let close_paren = token(")");
    let true_keyword = token("true");
    let false_keyword = token("false");
    let if_keyword = token("if");
    let else_keyword = token("else");
    let this_keyword = token("this");
    let dot = token(".");
    let and_keyword = token("and");
    let or_keyword = token("or");

    let type_name = Pattern::TypeName(Rc::new(TypeNameSyntax {
        symbol,
        open: open_brace.clone(),
        separator: comma.clone(),
        close: close_brace.clone(),
    }));
    let declaration = Pattern::pair(Pattern::Class(symbol), type_name.clone());

    builder.set_rules(vec![
        PrefixRule::new(
            Builder::CheckedCast,
            vec![Pattern::prefix(arrow, type_name.clone()), Pattern::Expression],
        ),
        PrefixRule::new(
            Builder::Sequence,
            vec![Pattern::block(indentation, Pattern::Expression)],
        ),
        PrefixRule::new(
            Builder::Function,
            vec![
                Pattern::list(
                    open_bracket.clone(),
                    declaration.clone(),
                    comma.clone(),
                    close_bracket.clone(),
                ),
                Pattern::Expression,
            ],
        ),
        PrefixRule::new(
            Builder::GenericFunction,
            vec![
                Pattern::list(
                    open_brace.clone(),
                    declaration.clone(),
                    comma.clone(),
                    close_brace.clone(),
                ),
                Pattern::list(open_bracket, declaration, comma.clone(), close_bracket),
                Pattern::Expression,
            ],
        ),
        PrefixRule::new(
            Builder::Assign,
            vec![
                Pattern::prefix(let_keyword, Pattern::suffix(Pattern::Class(symbol), assign)),
                Pattern::Expression,
            ],
        ),
        PrefixRule::new(
            Builder::Identity,
            vec![Pattern::prefix(
                open_paren.clone(),
                Pattern::suffix(Pattern::Expression, close_paren.clone()),
            )],
        ),
        PrefixRule::new(Builder::StringLiteral, vec![Pattern::Class(string)]),
        PrefixRule::new(Builder::IntLiteral, vec![Pattern::Class(integer)]),
        PrefixRule::new(Builder::True, vec![Pattern::Literal(true_keyword)]),
        PrefixRule::new(Builder::False, vec![Pattern::Literal(false_keyword)]),
        PrefixRule::new(
            Builder::If,
            vec![
                Pattern::prefix(if_keyword, Pattern::Expression),
                Pattern::Expression,
                Pattern::prefix(else_keyword, Pattern::Expression),
            ],
        ),
        PrefixRule::new(Builder::This, vec![Pattern::Literal(this_keyword)]),
        PrefixRule::new(
            Builder::PrefixOperator,
            vec![Pattern::Class(prefix_operator), Pattern::Expression],
        ),
        PrefixRule::new(Builder::Variable, vec![Pattern::Class(symbol)]),
    ]);

    builder.set_infix_rules(vec![
        InfixRule::new(
            Builder::Member,
            6,
            vec![Pattern::prefix(dot, Pattern::Class(symbol))],
        ),
        InfixRule::new(
            Builder::Specialize,
            5,
            vec![Pattern::list(open_brace, type_name, comma.clone(), close_brace)],
        ),
        InfixRule::new(
            Builder::InfixOperator,
            4,
            vec![Pattern::Class(multiplicative), Pattern::Weighted(4)],
        ),
        InfixRule::new(
            Builder::InfixOperator,
            3,
            vec![Pattern::Class(additive), Pattern::Weighted(3)],
        ),
        InfixRule::new(
            Builder::InfixOperator,
            2,
            vec![Pattern::Class(comparison), Pattern::Weighted(2)],
        ),
        InfixRule::new(
            Builder::And,
            1,
            vec![Pattern::prefix(and_keyword, Pattern::Weighted(1))],
        ),
        InfixRule::new(
            Builder::Or,
            1,
            vec![Pattern::prefix(or_keyword, Pattern::Weighted(1))],
        ),
        InfixRule::new(
            Builder::Call,
            6,
            vec![Pattern::list(open_paren, Pattern::Expression, comma, close_paren)],
        ),
    ]);

    let (int, boolean, text) = (Type::integer(), Type::boolean(), Type::string());
    builder
        .add_type("int", int.clone())
        .add_type("bool", boolean.clone())
        .add_type("string", text.clone())
        .add_type("fun", Type::function(Type::tuple(Vec::new()), Type::void()))
        .add_type("tuple", Type::tuple(Vec::new()))
        .add_type("union", Type::union(Vec::new()))
        .add_type("any", Type::any())
        .add_type("void", Type::void());

    let ints = || vec![Type::integer(), Type::integer()];
    builder
        .add_function("print", Opcode::Print, Type::void(), vec![Type::any()])?
        .add_function("<", Opcode::LessThan, boolean.clone(), ints())?
        .add_function(">", Opcode::GreaterThan, boolean.clone(), ints())?
        .add_function("+", Opcode::Add, int.clone(), ints())?
        .add_function("-", Opcode::Subtract, int.clone(), ints())?
        .add_function("*", Opcode::Multiply, int.clone(), ints())?
        .add_function("/", Opcode::Divide, int.clone(), ints())?
        .add_function("%", Opcode::Modulo, int, ints())?
        .add_function("+", Opcode::Concat, text.clone(), vec![text.clone(), text])?
        .add_function("!", Opcode::Not, boolean.clone(), vec![boolean.clone()])?
        .add_function(
            "==",
            Opcode::Equal,
            boolean.clone(),
            vec![boolean.clone(), boolean.clone()],
        )?
        .add_function("==", Opcode::Equal, boolean, ints())?;

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_reuse_recognizer_classes() {
        let compiler = standard().expect("standard compiler");
        let symbols = compiler.lexicon().symbols();
        for custom in ["->", "{", "}", ",", "[", "]", "(", ")", "."] {
            assert!(symbols.iter().any(|symbol| symbol == custom), "{custom}");
        }
        for keyword in ["let", "if", "else", "and", "=", "true"] {
            assert!(!symbols.iter().any(|symbol| symbol == keyword), "{keyword}");
        }
        assert_eq!(symbols[0], "->");
    }

    #[test]
    fn string_literals_are_not_keywords() {
        let mut out = Vec::new();
        standard()
            .expect("standard compiler")
            .run("let s = \"if\"\nprint(s + \"else\")", &mut out)
            .expect("run");
        assert_eq!(out, b"ifelse\n");
    }

    #[test]
    fn type_names_take_arguments() {
        let mut out = Vec::new();
        let source = "\
let twice = [f fun{tuple{int}, int}, x int] f(f(x))
print(twice([n int] n * 3, 2))";
        standard()
            .expect("standard compiler")
            .run(source, &mut out)
            .expect("run");
        assert_eq!(out, b"18\n");
    }
}

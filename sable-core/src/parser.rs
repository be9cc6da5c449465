//! Precedence-climbing parser driven by a [`Grammar`].
//!
//! `parse(min)` parses one prefix construct and then keeps extending it with
//! infix rules heavier than `min`. An infix rule parses its right operand
//! with its own weight as the new minimum, which makes operators of equal
//! weight left associative.

use std::rc::Rc;

use crate::ast::{Node, Parsed, TypeName};
use crate::error::CompileError;
use crate::lexer::{Token, TokenClass, TokenStream};
use crate::rules::{Grammar, Pattern, TypeNameSyntax};

/// Deepest nesting of expressions or type names accepted by the front-end.
pub const MAX_NESTING: usize = 128;

pub struct Parser<'a> {
    tokens: TokenStream<'a>,
    current: Option<Token>,
    grammar: &'a Grammar,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: TokenStream<'a>, grammar: &'a Grammar) -> Result<Self, CompileError> {
        let mut parser = Parser {
            tokens,
            current: None,
            grammar,
            depth: 0,
        };
        parser.advance()?;
        Ok(parser)
    }

    /// Parses the whole input as one expression.
    pub fn parse_program(&mut self) -> Result<Rc<Node>, CompileError> {
        let node = self.parse(0)?;
        match &self.current {
            Some(token) => Err(CompileError::syntax(token, "unexpected symbol")),
            None => Ok(node),
        }
    }

    pub fn parse(&mut self, min_weight: u32) -> Result<Rc<Node>, CompileError> {
        if self.current.is_none() {
            return Err(self.end_of_input("unexpected end of input"));
        }
        self.nested(|parser| {
            let left = parser.parse_prefix()?;
            parser.parse_infix(left, min_weight)
        })
    }

    fn nested<T>(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(match &self.current {
                Some(token) => CompileError::syntax(token, "nesting too deep"),
                None => self.end_of_input("nesting too deep"),
            });
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn parse_prefix(&mut self) -> Result<Rc<Node>, CompileError> {
        let grammar = self.grammar;
        let Some(start) = self.current.clone() else {
            return Err(self.end_of_input("unexpected end of input"));
        };
        for rule in &grammar.prefix {
            let Some((first, rest)) = rule.parts.split_first() else {
                continue;
            };
            if let Some(value) = self.apply(first)? {
                let mut args = vec![Some(value)];
                for part in rest {
                    args.push(self.apply(part)?);
                }
                return Ok(Rc::new(Node {
                    builder: rule.builder,
                    token: start,
                    args,
                }));
            }
        }
        Err(CompileError::syntax(&start, "unexpected symbol"))
    }

    fn parse_infix(&mut self, mut left: Rc<Node>, min_weight: u32) -> Result<Rc<Node>, CompileError> {
        let grammar = self.grammar;
        'climb: loop {
            let Some(start) = self.current.clone() else {
                return Ok(left);
            };
            for rule in grammar.infix.iter().filter(|rule| rule.weight > min_weight) {
                let Some((first, rest)) = rule.parts.split_first() else {
                    continue;
                };
                if let Some(value) = self.apply(first)? {
                    let mut args = vec![Some(Parsed::Node(left)), Some(value)];
                    for part in rest {
                        args.push(self.apply(part)?);
                    }
                    left = Rc::new(Node {
                        builder: rule.builder,
                        token: start,
                        args,
                    });
                    continue 'climb;
                }
            }
            return Ok(left);
        }
    }

    /// Runs one pattern. `Ok(None)` means the pattern does not apply and
    /// nothing was consumed.
    fn apply(&mut self, pattern: &Pattern) -> Result<Option<Parsed>, CompileError> {
        match pattern {
            Pattern::Literal(token) => Ok(self.try_consume(token)?.map(Parsed::Token)),
            Pattern::Class(class) => Ok(self
                .try_consume_class(*class)?
                .map(|token| Parsed::Text(token.content))),
            Pattern::Expression => Ok(Some(Parsed::Node(self.parse(0)?))),
            Pattern::Weighted(weight) => Ok(Some(Parsed::Node(self.parse(*weight)?))),
            Pattern::Prefix(token, inner) => {
                if self.try_consume(token)?.is_none() {
                    return Ok(None);
                }
                self.require(inner, &token.content).map(Some)
            }
            Pattern::Suffix(inner, token) => match self.apply(inner)? {
                Some(value) => {
                    self.consume(token)?;
                    Ok(Some(value))
                }
                None => Ok(None),
            },
            Pattern::List {
                open,
                item,
                separator,
                close,
            } => {
                if self.try_consume(open)?.is_none() {
                    return Ok(None);
                }
                let mut items = Vec::new();
                if self.try_consume(close)?.is_some() {
                    return Ok(Some(Parsed::List(items)));
                }
                loop {
                    items.push(self.require(item, &close.content)?);
                    if self.try_consume(separator)?.is_none() {
                        break;
                    }
                }
                self.consume(close)?;
                Ok(Some(Parsed::List(items)))
            }
            Pattern::Block { indent, item } => {
                let Some(level) = self.try_consume_class(*indent)? else {
                    return Ok(None);
                };
                let mut items = Vec::new();
                loop {
                    while self.try_consume(&level)?.is_some() {}
                    items.push(self.require(item, "expression")?);
                    if self.try_consume(&level)?.is_none() {
                        break;
                    }
                }
                Ok(Some(Parsed::List(items)))
            }
            Pattern::Pair(first, second) => match self.apply(first)? {
                Some(value) => {
                    let other = self.require(second, "pair element")?;
                    Ok(Some(Parsed::Pair(Box::new(value), Box::new(other))))
                }
                None => Ok(None),
            },
            Pattern::TypeName(syntax) => Ok(self.type_name(syntax)?.map(Parsed::Type)),
        }
    }

    fn require(&mut self, pattern: &Pattern, expected: &str) -> Result<Parsed, CompileError> {
        match self.apply(pattern)? {
            Some(value) => Ok(value),
            None => Err(self.unexpected(expected)),
        }
    }

    fn type_name(&mut self, syntax: &Rc<TypeNameSyntax>) -> Result<Option<TypeName>, CompileError> {
        let Some(token) = self.try_consume_class(syntax.symbol)? else {
            return Ok(None);
        };
        let arguments = if self.try_consume(&syntax.open)?.is_some() {
            let mut arguments = Vec::new();
            if self.try_consume(&syntax.close)?.is_none() {
                loop {
                    match self.nested(|parser| parser.type_name(syntax))? {
                        Some(argument) => arguments.push(argument),
                        None => return Err(self.unexpected("type name")),
                    }
                    if self.try_consume(&syntax.separator)?.is_none() {
                        break;
                    }
                }
                self.consume(&syntax.close)?;
            }
            Some(arguments)
        } else {
            None
        };
        Ok(Some(TypeName {
            name: Rc::clone(&token.content),
            token,
            arguments,
        }))
    }

    fn advance(&mut self) -> Result<(), CompileError> {
        self.current = self.tokens.next_token();
        if self.current.is_none() && !self.tokens.is_at_end() {
            let position = self.tokens.position();
            let found = self.tokens.peek_char().map(String::from).unwrap_or_default();
            return Err(CompileError::Syntax {
                position,
                token: found,
                message: "unexpected character".to_string(),
            });
        }
        Ok(())
    }

    fn take(&mut self) -> Result<Option<Token>, CompileError> {
        let token = self.current.take();
        self.advance()?;
        Ok(token)
    }

    fn try_consume(&mut self, expected: &Token) -> Result<Option<Token>, CompileError> {
        if self.current.as_ref().is_some_and(|token| token.matches(expected)) {
            self.take()
        } else {
            Ok(None)
        }
    }

    fn try_consume_class(&mut self, class: TokenClass) -> Result<Option<Token>, CompileError> {
        if self.current.as_ref().is_some_and(|token| token.class == class) {
            self.take()
        } else {
            Ok(None)
        }
    }

    fn consume(&mut self, expected: &Token) -> Result<Token, CompileError> {
        match self.try_consume(expected)? {
            Some(token) => Ok(token),
            None => Err(self.unexpected(&expected.content)),
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        match &self.current {
            Some(token) => CompileError::syntax(token, format!("unexpected symbol, expected: {expected}")),
            None => self.end_of_input(&format!("unexpected end of input, expected: {expected}")),
        }
    }

    fn end_of_input(&self, message: &str) -> CompileError {
        CompileError::Syntax {
            position: self.tokens.position(),
            token: String::new(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Lexicon, Recognizer};
    use crate::rules::{Builder, InfixRule, PrefixRule};

    struct Fixture {
        lexicon: Lexicon,
        grammar: Grammar,
    }

    /// Arithmetic with calls, parentheses, `let` and indentation blocks.
    fn fixture() -> Fixture {
        let mut lexicon = Lexicon::new();
        let indentation = lexicon.add(Recognizer::Indentation);
        let additive = lexicon.add(Recognizer::Predicate(|c| "+-".contains(c)));
        let multiplicative = lexicon.add(Recognizer::Predicate(|c| "*/".contains(c)));
        let integer = lexicon.add(Recognizer::Predicate(|c| c.is_ascii_digit()));
        let symbol = lexicon.add(Recognizer::Predicate(char::is_alphanumeric));

        let open = lexicon.token("(");
        let close = lexicon.token(")");
        let comma = lexicon.token(",");
        let let_token = lexicon.token("let");
        let equals = lexicon.token("=");

        let grammar = Grammar {
            prefix: vec![
                PrefixRule::new(Builder::Sequence, vec![Pattern::block(indentation, Pattern::Expression)]),
                PrefixRule::new(
                    Builder::Assign,
                    vec![
                        Pattern::prefix(let_token, Pattern::suffix(Pattern::Class(symbol), equals)),
                        Pattern::Expression,
                    ],
                ),
                PrefixRule::new(
                    Builder::Identity,
                    vec![Pattern::prefix(open.clone(), Pattern::suffix(Pattern::Expression, close.clone()))],
                ),
                PrefixRule::new(Builder::IntLiteral, vec![Pattern::Class(integer)]),
                PrefixRule::new(Builder::Variable, vec![Pattern::Class(symbol)]),
            ],
            infix: vec![
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
                    Builder::Call,
                    6,
                    vec![Pattern::list(open, Pattern::Expression, comma, close)],
                ),
            ],
        };
        Fixture { lexicon, grammar }
    }

    fn parse(fixture: &Fixture, source: &str) -> Result<Rc<Node>, CompileError> {
        let mut parser = Parser::new(fixture.lexicon.tokenize(source), &fixture.grammar)?;
        parser.parse_program()
    }

    /// Renders a node tree in prefix notation for easy comparison.
    fn render(node: &Node) -> String {
        match node.builder {
            Builder::IntLiteral | Builder::Variable => node.text(0).expect("text").to_string(),
            Builder::InfixOperator => format!(
                "({} {} {})",
                node.text(1).expect("operator"),
                render(&node.node(0).expect("left")),
                render(&node.node(2).expect("right"))
            ),
            Builder::Identity => render(&node.node(0).expect("inner")),
            Builder::Call => {
                let args: Vec<String> = node
                    .nodes(1)
                    .expect("arguments")
                    .iter()
                    .map(|arg| render(arg))
                    .collect();
                format!("{}[{}]", render(&node.node(0).expect("callee")), args.join(" "))
            }
            Builder::Assign => format!(
                "let {} {}",
                node.text(0).expect("name"),
                render(&node.node(1).expect("value"))
            ),
            Builder::Sequence => {
                let items: Vec<String> = node
                    .nodes(0)
                    .expect("items")
                    .iter()
                    .map(|item| render(item))
                    .collect();
                format!("{{{}}}", items.join("; "))
            }
            other => panic!("unexpected builder {other:?}"),
        }
    }

    #[test]
    fn heavier_operators_bind_tighter() {
        let fixture = fixture();
        let tree = parse(&fixture, "1 + 2 * 3").expect("parse");
        assert_eq!(render(&tree), "(+ 1 (* 2 3))");
        let tree = parse(&fixture, "1 * 2 + 3").expect("parse");
        assert_eq!(render(&tree), "(+ (* 1 2) 3)");
    }

    #[test]
    fn equal_weights_associate_left() {
        let fixture = fixture();
        let tree = parse(&fixture, "1 - 2 - 3").expect("parse");
        assert_eq!(render(&tree), "(- (- 1 2) 3)");
    }

    #[test]
    fn calls_and_parentheses() {
        let fixture = fixture();
        let tree = parse(&fixture, "f(1, (2 + 3) * 4)(x)").expect("parse");
        assert_eq!(render(&tree), "f[1 (* (+ 2 3) 4)][x]");
        let tree = parse(&fixture, "g()").expect("parse");
        assert_eq!(render(&tree), "g[]");
    }

    #[test]
    fn nodes_remember_their_first_token() {
        let fixture = fixture();
        let tree = parse(&fixture, "a +\n b").expect("parse");
        assert_eq!(tree.token.content.as_ref(), "+");
        assert_eq!(tree.token.position(), crate::span::Position::new(1, 3));
    }

    #[test]
    fn blocks_follow_indentation() {
        let fixture = fixture();
        let source = "\nlet x = 1\nlet f =\n  x\n  f(x)\nf";
        let tree = parse(&fixture, source).expect("parse");
        assert_eq!(render(&tree), "{let x 1; let f {x; f[x]}; f}");
    }

    #[test]
    fn reports_missing_tokens_with_position() {
        let fixture = fixture();
        let err = parse(&fixture, "f(1 2)").unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                position: crate::span::Position::new(1, 5),
                token: "2".to_string(),
                message: "unexpected symbol, expected: )".to_string(),
            }
        );
    }

    #[test]
    fn limits_nesting_depth() {
        let fixture = fixture();
        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(render(&parse(&fixture, &shallow).expect("parse")), "1");

        let deep = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
        let err = parse(&fixture, &deep).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { ref token, ref message, .. }
            if token == "(" && message == "nesting too deep"));
    }

    #[test]
    fn reports_end_of_input() {
        let fixture = fixture();
        let err = parse(&fixture, "1 +").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { ref message, .. } if message == "unexpected end of input"));
    }

    #[test]
    fn reports_unexpected_characters_and_trailing_input() {
        let fixture = fixture();
        let err = parse(&fixture, "1 + $").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { ref token, ref message, .. }
            if token == "$" && message == "unexpected character"));

        let err = parse(&fixture, "1 2").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { ref token, .. } if token == "2"));

        let err = parse(&fixture, ")").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { ref message, .. } if message == "unexpected symbol"));
    }
}

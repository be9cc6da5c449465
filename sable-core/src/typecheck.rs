//! Semantic analysis: parse nodes to typed expressions.
//!
//! The analyzer walks parse nodes with an optional expected type. The
//! expected type filters identifier lookups, which is how overloads are
//! chosen: an operator or a call resolves the first visible variable of the
//! right name whose function type accepts the argument types.
//!
//! Function literals are analyzed lazily. Their signature and body are
//! thunks forced on first use, or at the latest by [`Analyzer::finish`];
//! a body that names its own function therefore sees the function's type as
//! soon as the signature is known.
//!
//! 関数リテラルは遅延評価される。戻り値型が `->` で宣言されていれば、本体を
//! 解析する前にシグネチャが確定するため再帰呼び出しが解決できる。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ast::{Node, TypeName};
use crate::error::CompileError;
use crate::hir::{Code, Expr};
use crate::lazy::Lazy;
use crate::lexer::Token;
use crate::parser::MAX_NESTING;
use crate::rules::Builder;
use crate::scope::{Scope, Variable};
use crate::types::{self, GenericId, GenericParam, Slot, Type};

/// State shared by every analyzer of one compilation.
#[derive(Debug, Default)]
pub struct Session {
    /// Function literals whose type or body may still be unresolved.
    pending: RefCell<Vec<Expr>>,
    next_generic: Cell<u32>,
    /// Nodes being analyzed, including ones reached by forcing lazy values.
    depth: Cell<usize>,
}

/// Leaves one level of analysis nesting when dropped.
struct Nesting<'s>(&'s Session);

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        self.0.depth.set(self.0.depth.get() - 1);
    }
}

impl Session {
    fn issue_generic_id(&self) -> GenericId {
        let id = self.next_generic.get();
        self.next_generic.set(id + 1);
        GenericId(id)
    }

    fn defer(&self, expr: &Expr) {
        self.pending.borrow_mut().push(expr.clone());
    }

    fn enter(&self, token: &Token) -> Result<Nesting<'_>, CompileError> {
        let depth = self.depth.get();
        if depth >= MAX_NESTING {
            return Err(CompileError::type_at(token, "nesting too deep"));
        }
        self.depth.set(depth + 1);
        Ok(Nesting(self))
    }
}

/// Signature of a function literal, resolved on first use.
#[derive(Debug, Clone)]
struct Header {
    analyzer: Analyzer,
    arity: usize,
    arg: Type,
    generics: Vec<GenericParam>,
    /// Return type written as a `->` cast around the body.
    declared: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    scope: Scope,
    expected: Option<Type>,
    session: Rc<Session>,
}

impl Analyzer {
    pub fn new(scope: Scope) -> Self {
        Analyzer {
            scope,
            expected: None,
            session: Rc::new(Session::default()),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Analyzer for a fresh child scope.
    pub fn sub_scope(&self) -> Analyzer {
        Analyzer {
            scope: self.scope.child(),
            expected: None,
            session: Rc::clone(&self.session),
        }
    }

    fn with_expected(&self, expected: Option<Type>) -> Analyzer {
        Analyzer {
            scope: self.scope.clone(),
            expected,
            session: Rc::clone(&self.session),
        }
    }

    /// Builds `node` and checks the result against `expected`.
    pub fn analyze(&self, node: &Node, expected: Option<&Type>) -> Result<Expr, CompileError> {
        let _nesting = self.session.enter(&node.token)?;
        let expr = self
            .with_expected(expected.cloned())
            .build(node)
            .map_err(|err| err.or_at(&node.token))?;
        if let Some(expected) = expected {
            let ty = expr.ty.force().map_err(|err| err.or_at(&node.token))?;
            if !expected.assignable_from(&ty) {
                return Err(CompileError::type_at(
                    &node.token,
                    format!("unexpected type {ty}, expected {expected}"),
                ));
            }
        }
        Ok(expr)
    }

    /// Resolves every deferred function literal, including the ones found
    /// while resolving others.
    pub fn finish(&self) -> Result<(), CompileError> {
        loop {
            let next = self.session.pending.borrow_mut().pop();
            let Some(expr) = next else {
                return Ok(());
            };
            expr.ty.force()?;
            expr.code.force()?;
        }
    }

    pub fn resolve_type(&self, name: &TypeName) -> Result<Type, CompileError> {
        let ty = match self.scope.lookup_type(&name.name) {
            Some(ty) => ty.force().map_err(|err| err.or_at(&name.token))?,
            None => {
                return Err(CompileError::type_at(
                    &name.token,
                    format!("unknown type: {}", name.name),
                ));
            }
        };
        match &name.arguments {
            None => Ok(ty),
            Some(arguments) => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.resolve_type(argument))
                    .collect::<Result<Vec<_>, _>>()?;
                ty.create_generic_type(arguments)
                    .map_err(|err| err.or_at(&name.token))
            }
        }
    }

    fn build(&self, node: &Node) -> Result<Expr, CompileError> {
        match node.builder {
            Builder::Sequence => self.sequence(&node.nodes(0)?),
            Builder::CheckedCast => {
                let ty = self.resolve_type(&node.type_name(0)?)?;
                let inner = self.analyze(&*node.node(1)?, Some(&ty))?;
                Ok(Expr {
                    ty: Lazy::ready(ty),
                    ..inner
                })
            }
            Builder::Function => self.function(Vec::new(), node.declarations(0)?, node.node(1)?),
            Builder::GenericFunction => {
                self.function(node.declarations(0)?, node.declarations(1)?, node.node(2)?)
            }
            Builder::Assign => self.assign(&node.text(0)?, &*node.node(1)?),
            Builder::Identity => self.analyze(&*node.node(0)?, self.expected.as_ref()),
            Builder::StringLiteral => Ok(Expr::constant(
                Type::string(),
                Code::Symbol(node.text(0)?),
            )),
            Builder::IntLiteral => {
                let value = node
                    .text(0)?
                    .parse::<i64>()
                    .map_err(|_| CompileError::syntax(&node.token, "integer literal out of range"))?;
                Ok(Expr::constant(Type::integer(), Code::Int(value)))
            }
            Builder::True => Ok(Expr::constant(Type::boolean(), Code::Int(1))),
            Builder::False => Ok(Expr::constant(Type::boolean(), Code::Int(0))),
            Builder::If => self.conditional(node),
            Builder::This => Ok(Expr::new(self.scope.context_type(), Code::This)),
            Builder::PrefixOperator => self.call_by_name(&node.text(0)?, &[node.node(1)?]),
            Builder::Variable => self.variable(&node.text(0)?),
            Builder::Member => self.member(&*node.node(0)?, node.text(1)?),
            Builder::Specialize => self.specialize(&*node.node(0)?, &node.type_names(1)?),
            Builder::InfixOperator => {
                self.call_by_name(&node.text(1)?, &[node.node(0)?, node.node(2)?])
            }
            Builder::And | Builder::Or => {
                let boolean = Type::boolean();
                let left = self.analyze(&*node.node(0)?, Some(&boolean))?;
                let right = self.analyze(&*node.node(1)?, Some(&boolean))?;
                let code = if node.builder == Builder::And {
                    Code::And(left, right)
                } else {
                    Code::Or(left, right)
                };
                Ok(Expr::new(boolean, code))
            }
            Builder::Call => {
                let callee = node.node(0)?;
                self.call(&node.nodes(1)?, |expected| {
                    self.analyze(&*callee, Some(&expected))
                })
            }
        }
    }

    fn sequence(&self, nodes: &[Rc<Node>]) -> Result<Expr, CompileError> {
        let Some((last, init)) = nodes.split_last() else {
            return Ok(Expr::void());
        };
        let mut exprs = init
            .iter()
            .map(|node| self.analyze(node, None))
            .collect::<Result<Vec<_>, _>>()?;
        let last = self.analyze(last, self.expected.as_ref())?;
        let ty = last.ty.clone();
        exprs.push(last);
        Ok(Expr {
            ty,
            code: Lazy::ready(Rc::new(Code::Sequence(exprs))),
            constant: false,
        })
    }

    fn function(
        &self,
        generics: Vec<(Rc<str>, TypeName)>,
        params: Vec<(Rc<str>, TypeName)>,
        body: Rc<Node>,
    ) -> Result<Expr, CompileError> {
        let outer = self.clone();
        let signature_body = Rc::clone(&body);
        let header: Lazy<Header> = Lazy::new(move || {
            let analyzer = outer.sub_scope();
            let scope = analyzer.scope.clone();

            // Type parameters are visible to the parameter types.
            let mut generic_params = Vec::with_capacity(generics.len());
            for (name, bound) in &generics {
                let param = GenericParam {
                    id: analyzer.session.issue_generic_id(),
                    name: Rc::clone(name),
                    bound: analyzer.resolve_type(bound)?,
                };
                scope.define_type(name, Lazy::ready(Type::generic(param.clone())));
                generic_params.push(param);
            }

            let mut arg_types = Vec::with_capacity(params.len());
            for (name, ty) in &params {
                let ty = analyzer.resolve_type(ty)?;
                scope.declare(Variable::new(name, Lazy::ready(ty.clone())));
                arg_types.push(ty);
            }

            let declared = if signature_body.builder == Builder::CheckedCast {
                Some(analyzer.resolve_type(&signature_body.type_name(0)?)?)
            } else {
                None
            };

            Ok(Header {
                analyzer,
                arity: params.len(),
                arg: Type::tuple(arg_types),
                generics: generic_params,
                declared,
            })
        });

        let body_header = header.clone();
        let analyzed: Lazy<Expr> = Lazy::new(move || {
            let header = body_header.force()?;
            tracing::trace!(arity = header.arity, "analyzing function body");
            header.analyzer.analyze(&body, None)
        });

        let type_header = header.clone();
        let type_body = analyzed.clone();
        let ty = Lazy::new(move || {
            let header = type_header.force()?;
            let ret = match header.declared {
                Some(ret) => ret,
                None => type_body.force()?.ty.force()?,
            };
            let function = Type::function(header.arg, ret);
            Ok(if header.generics.is_empty() {
                function
            } else {
                Type::generic_context(function, header.generics)
            })
        });

        let code = Lazy::new(move || {
            let header = header.force()?;
            let body = analyzed.force()?;
            body.ty.force()?;
            Ok(Rc::new(Code::Function {
                arity: header.arity,
                layout: header.analyzer.scope.layout(),
                body,
            }))
        });

        let expr = Expr {
            ty,
            code,
            constant: false,
        };
        self.session.defer(&expr);
        Ok(expr)
    }

    fn assign(&self, name: &str, value: &Node) -> Result<Expr, CompileError> {
        let value = self.analyze(value, None)?;
        let variable = self.scope.declare(Variable {
            name: Rc::from(name),
            ty: value.ty.clone(),
            constant: value.constant.then(|| value.clone()),
        });

        // `name` also names the return type of the function it is bound to.
        let aliased = Rc::clone(&variable);
        self.scope.define_type(
            name,
            Lazy::new(move || {
                let ty = aliased.ty.force()?;
                let Some((_, ret)) = ty.as_function() else {
                    return Err(CompileError::type_error(format!(
                        "not a type: {}",
                        aliased.name
                    )));
                };
                let generics = ty.generic_parameters();
                Ok(if generics.is_empty() {
                    ret
                } else {
                    Type::generic_context(ret, generics.to_vec())
                })
            }),
        );

        let path = self.scope.address(&variable)?;
        Ok(Expr::new(Type::void(), Code::Write { path, value }))
    }

    fn conditional(&self, node: &Node) -> Result<Expr, CompileError> {
        let condition = self.analyze(&*node.node(0)?, Some(&Type::boolean()))?;
        let then = self.analyze(&*node.node(1)?, None)?;
        let otherwise = match node.optional_node(2)? {
            Some(otherwise) => self.analyze(&*otherwise, None)?,
            None => Expr::void(),
        };

        let (then_ty, otherwise_ty) = (then.ty.clone(), otherwise.ty.clone());
        Ok(Expr {
            ty: Lazy::new(move || Ok(Type::union(vec![then_ty.force()?, otherwise_ty.force()?]))),
            code: Lazy::ready(Rc::new(Code::If {
                condition,
                then,
                otherwise,
            })),
            constant: false,
        })
    }

    fn variable(&self, name: &str) -> Result<Expr, CompileError> {
        let accepted_by = self.expected.clone().unwrap_or_else(Type::any);
        let Some(variable) = self.scope.lookup(name, &accepted_by)? else {
            return Err(CompileError::type_error(match &self.expected {
                Some(expected) => format!("no such variable: {name} of type {expected}"),
                None => format!("no such variable: {name}"),
            }));
        };
        if let Some(constant) = &variable.constant {
            return Ok(constant.clone());
        }
        let path = self.scope.address(&variable)?;
        Ok(Expr {
            ty: variable.ty.clone(),
            code: Lazy::ready(Rc::new(Code::Read(path))),
            constant: false,
        })
    }

    fn member(&self, target: &Node, name: Rc<str>) -> Result<Expr, CompileError> {
        let wanted = self.expected.clone().unwrap_or_else(Type::any);
        let shape = Type::context(vec![Slot {
            name: Rc::clone(&name),
            ty: Lazy::ready(wanted.clone()),
        }]);
        let target = self.analyze(target, Some(&shape))?;
        let target_ty = target.ty.force()?;
        let slots = target_ty
            .as_context()
            .ok_or_else(|| CompileError::type_error(format!("not a context: {target_ty}")))?;

        // The first slot of that name is the one read at runtime.
        let Some(slot) = slots.iter().find(|slot| slot.name == name) else {
            return Err(CompileError::type_error(format!(
                "unknown context variable: {name}"
            )));
        };
        let ty = slot.ty.force()?;
        if !wanted.assignable_from(&ty) {
            return Err(CompileError::type_error(format!(
                "context variable {name} has type {ty}, expected {wanted}"
            )));
        }
        Ok(Expr::new(ty, Code::Member { target, name }))
    }

    fn specialize(&self, target: &Node, arguments: &[TypeName]) -> Result<Expr, CompileError> {
        let target = self.analyze(target, None)?;
        let ty = target.ty.force()?;
        let arguments = arguments
            .iter()
            .map(|argument| self.resolve_type(argument))
            .collect::<Result<Vec<_>, _>>()?;
        let substitution = types::substitution(ty.generic_parameters(), arguments)?;
        Ok(Expr {
            ty: Lazy::ready(ty.convert_generic(&substitution)),
            ..target
        })
    }

    fn call_by_name(&self, name: &str, operands: &[Rc<Node>]) -> Result<Expr, CompileError> {
        self.call(operands, |expected| {
            self.with_expected(Some(expected)).variable(name)
        })
    }

    /// Analyzes the arguments, then resolves the callee against a function
    /// type built from their types.
    fn call(
        &self,
        arguments: &[Rc<Node>],
        resolve_callee: impl FnOnce(Type) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let args = arguments
            .iter()
            .map(|argument| self.analyze(argument, None))
            .collect::<Result<Vec<_>, _>>()?;
        let arg_types = args
            .iter()
            .map(|arg| arg.ty.force())
            .collect::<Result<Vec<_>, _>>()?;
        let ret = self.expected.clone().unwrap_or_else(Type::any);

        let callee = resolve_callee(Type::function(Type::tuple(arg_types), ret))?;
        let callee_ty = callee.ty.force()?;
        let Some((_, ret)) = callee_ty.as_function() else {
            return Err(CompileError::type_error(format!(
                "not a function: {callee_ty}"
            )));
        };
        Ok(Expr::new(ret, Code::Call { callee, args }))
    }
}

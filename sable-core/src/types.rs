//! Structural type algebra.
//!
//! Types are immutable values behind an `Rc`, compared structurally except
//! for generics, which compare by the id issued when they were declared.
//! The central operation is [`Type::assignable_from`]: `a.assignable_from(b)`
//! holds when a value of type `b` may be used where `a` is expected.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::CompileError;
use crate::lazy::Lazy;

/// Identity of a generic type parameter, issued by the analysis session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericId(pub u32);

/// A declared type parameter: `{T any}` declares `T` with bound `any`.
#[derive(Debug, Clone)]
pub struct GenericParam {
    pub id: GenericId,
    pub name: Rc<str>,
    pub bound: Type,
}

/// Named member of a context type.
///
/// The slot type is lazy because it usually belongs to a variable whose
/// type is only known once its initializer has been analyzed.
#[derive(Debug, Clone)]
pub struct Slot {
    pub name: Rc<str>,
    pub ty: Lazy<Type>,
}

impl Slot {
    pub fn new(name: &str, ty: Type) -> Self {
        Slot {
            name: Rc::from(name),
            ty: Lazy::ready(ty),
        }
    }
}

#[derive(Debug)]
pub enum TypeKind {
    Any,
    Void,
    Boolean,
    Integer,
    String,
    /// Argument type (a tuple for multi-parameter functions) and return type.
    Function { arg: Type, ret: Type },
    Tuple(Vec<Type>),
    /// Non-exhaustive union; the members are kept as written.
    Union(Vec<Type>),
    Generic(GenericParam),
    /// A type that still abstracts over `params`.
    GenericContext { wrapped: Type, params: Vec<GenericParam> },
    /// Row type of an activation record: named, typed slots.
    Context(Vec<Slot>),
}

#[derive(Clone)]
pub struct Type(Rc<TypeKind>);

impl Type {
    fn of(kind: TypeKind) -> Self {
        Type(Rc::new(kind))
    }

    pub fn any() -> Self {
        Type::of(TypeKind::Any)
    }

    pub fn void() -> Self {
        Type::of(TypeKind::Void)
    }

    pub fn boolean() -> Self {
        Type::of(TypeKind::Boolean)
    }

    pub fn integer() -> Self {
        Type::of(TypeKind::Integer)
    }

    pub fn string() -> Self {
        Type::of(TypeKind::String)
    }

    pub fn function(arg: Type, ret: Type) -> Self {
        Type::of(TypeKind::Function { arg, ret })
    }

    pub fn tuple(elements: Vec<Type>) -> Self {
        Type::of(TypeKind::Tuple(elements))
    }

    /// Builds a union, dropping members that match an earlier one.
    ///
    /// A single remaining member still yields a union so that the result
    /// keeps describing every branch it was built from.
    pub fn union(members: Vec<Type>) -> Self {
        let mut unique: Vec<Type> = Vec::with_capacity(members.len());
        for member in members {
            if !unique.iter().any(|known| known.matches(&member)) {
                unique.push(member);
            }
        }
        Type::of(TypeKind::Union(unique))
    }

    pub fn generic(param: GenericParam) -> Self {
        Type::of(TypeKind::Generic(param))
    }

    pub fn generic_context(wrapped: Type, params: Vec<GenericParam>) -> Self {
        Type::of(TypeKind::GenericContext { wrapped, params })
    }

    pub fn context(slots: Vec<Slot>) -> Self {
        Type::of(TypeKind::Context(slots))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Type) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Unwraps generics to their bounds and generic contexts to the type
    /// they wrap, until neither is left.
    pub fn concrete(&self) -> Type {
        let mut current = self.clone();
        loop {
            let next = match current.kind() {
                TypeKind::Generic(param) => param.bound.clone(),
                TypeKind::GenericContext { wrapped, .. } => wrapped.clone(),
                _ => return current,
            };
            current = next;
        }
    }

    /// `(argument, return)` of the concrete type, if it is a function.
    pub fn as_function(&self) -> Option<(Type, Type)> {
        match self.concrete().kind() {
            TypeKind::Function { arg, ret } => Some((arg.clone(), ret.clone())),
            _ => None,
        }
    }

    /// Slots of the concrete type, if it is a context.
    pub fn as_context(&self) -> Option<Vec<Slot>> {
        match self.concrete().kind() {
            TypeKind::Context(slots) => Some(slots.clone()),
            _ => None,
        }
    }

    pub fn generic_parameters(&self) -> &[GenericParam] {
        match self.kind() {
            TypeKind::GenericContext { params, .. } => params,
            _ => &[],
        }
    }

    /// Whether a value of type `candidate` may be used where `self` is
    /// expected.
    pub fn assignable_from(&self, candidate: &Type) -> bool {
        if self.ptr_eq(candidate) {
            return true;
        }
        match self.kind() {
            TypeKind::Generic(param) => return param.bound.assignable_from(&candidate.concrete()),
            TypeKind::GenericContext { wrapped, .. } => {
                return wrapped.assignable_from(&candidate.concrete());
            }
            _ => {}
        }

        let candidate = candidate.concrete();
        if let TypeKind::Union(members) = candidate.kind() {
            if !matches!(self.kind(), TypeKind::Any) {
                return members.iter().all(|member| self.assignable_from(member));
            }
        }

        match (self.kind(), candidate.kind()) {
            (TypeKind::Any, _) => true,
            (TypeKind::Void, TypeKind::Void)
            | (TypeKind::Boolean, TypeKind::Boolean)
            | (TypeKind::Integer, TypeKind::Integer)
            | (TypeKind::String, TypeKind::String) => true,
            (
                TypeKind::Function { arg, ret },
                TypeKind::Function {
                    arg: other_arg,
                    ret: other_ret,
                },
            ) => other_arg.assignable_from(arg) && ret.assignable_from(other_ret),
            (TypeKind::Tuple(elements), TypeKind::Tuple(others)) => {
                elements.len() == others.len()
                    && elements
                        .iter()
                        .zip(others)
                        .all(|(element, other)| element.assignable_from(other))
            }
            (TypeKind::Union(members), _) => {
                members.iter().any(|member| member.assignable_from(&candidate))
            }
            (TypeKind::Context(slots), TypeKind::Context(others)) => {
                slots.iter().all(|slot| accepts_slot(slot, others))
            }
            _ => false,
        }
    }

    /// Mutual assignability.
    pub fn matches(&self, other: &Type) -> bool {
        self.ptr_eq(other) || (self.assignable_from(other) && other.assignable_from(self))
    }

    /// Rewrites nested types, replacing the generics found in `substitution`.
    /// Generics without an entry are kept; generic contexts are unwrapped.
    pub fn convert_generic(&self, substitution: &HashMap<GenericId, Type>) -> Type {
        match self.kind() {
            TypeKind::Any
            | TypeKind::Void
            | TypeKind::Boolean
            | TypeKind::Integer
            | TypeKind::String => self.clone(),
            TypeKind::Generic(param) => substitution
                .get(&param.id)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeKind::GenericContext { wrapped, .. } => wrapped.convert_generic(substitution),
            TypeKind::Function { arg, ret } => Type::function(
                arg.convert_generic(substitution),
                ret.convert_generic(substitution),
            ),
            TypeKind::Tuple(elements) => Type::tuple(
                elements
                    .iter()
                    .map(|element| element.convert_generic(substitution))
                    .collect(),
            ),
            TypeKind::Union(members) => Type::of(TypeKind::Union(
                members
                    .iter()
                    .map(|member| member.convert_generic(substitution))
                    .collect(),
            )),
            TypeKind::Context(slots) => Type::context(
                slots
                    .iter()
                    .map(|slot| {
                        let ty = slot.ty.clone();
                        let substitution = substitution.clone();
                        Slot {
                            name: Rc::clone(&slot.name),
                            ty: Lazy::new(move || Ok(ty.force()?.convert_generic(&substitution))),
                        }
                    })
                    .collect(),
            ),
        }
    }

    /// Applies type arguments written as `name{A, B}`.
    pub fn create_generic_type(&self, arguments: Vec<Type>) -> Result<Type, CompileError> {
        match self.kind() {
            TypeKind::Tuple(_) => Ok(Type::tuple(arguments)),
            TypeKind::Union(_) => Ok(Type::union(arguments)),
            TypeKind::Function { .. } => {
                let mut arguments = arguments.into_iter();
                let arg = arguments.next();
                let ret = arguments.next().unwrap_or_else(Type::void);
                match (arg, arguments.next()) {
                    (Some(arg), None) => Ok(Type::function(arg, ret)),
                    _ => Err(CompileError::type_error(
                        "unsupported number of generic parameters",
                    )),
                }
            }
            TypeKind::GenericContext { wrapped, params } => {
                Ok(wrapped.convert_generic(&substitution(params, arguments)?))
            }
            _ => Err(CompileError::type_error(format!(
                "generics not supported on type {self}"
            ))),
        }
    }
}

fn accepts_slot(slot: &Slot, candidates: &[Slot]) -> bool {
    // A slot whose type cannot be resolved never matches.
    let Ok(expected) = slot.ty.force() else {
        return false;
    };
    // Members are read by name at runtime, which finds the first slot.
    candidates
        .iter()
        .find(|candidate| candidate.name == slot.name)
        .is_some_and(|candidate| {
            candidate
                .ty
                .force()
                .is_ok_and(|ty| expected.assignable_from(&ty))
        })
}

/// Pairs generic parameters with explicit type arguments, checking arity
/// and bounds.
pub fn substitution(
    params: &[GenericParam],
    arguments: Vec<Type>,
) -> Result<HashMap<GenericId, Type>, CompileError> {
    if arguments.len() < params.len() {
        return Err(CompileError::type_error("too few generic arguments"));
    }
    if arguments.len() > params.len() {
        return Err(CompileError::type_error("too many generic arguments"));
    }
    let mut map = HashMap::with_capacity(params.len());
    for (param, argument) in params.iter().zip(arguments) {
        if !param.bound.assignable_from(&argument) {
            return Err(CompileError::type_error(format!(
                "type {argument} does not satisfy the bound {} of {}",
                param.bound, param.name
            )));
        }
        map.insert(param.id, argument);
    }
    Ok(map)
}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[Type]) -> fmt::Result {
    for (index, ty) in types.iter().enumerate() {
        if index > 0 {
            f.write_str(",")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Any => f.write_str("any"),
            TypeKind::Void => f.write_str("void"),
            TypeKind::Boolean => f.write_str("bool"),
            TypeKind::Integer => f.write_str("int"),
            TypeKind::String => f.write_str("string"),
            TypeKind::Function { arg, ret } => write!(f, "fun{{{arg},{ret}}}"),
            TypeKind::Tuple(elements) => {
                f.write_str("tuple{")?;
                write_list(f, elements)?;
                f.write_str("}")
            }
            TypeKind::Union(members) => {
                f.write_str("union{")?;
                write_list(f, members)?;
                f.write_str("}")
            }
            TypeKind::Generic(param) => f.write_str(&param.name),
            TypeKind::GenericContext { wrapped, params } => {
                f.write_str("{")?;
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(&param.name)?;
                }
                write!(f, "}}{wrapped}")
            }
            TypeKind::Context(slots) => {
                f.write_str("(")?;
                for (index, slot) in slots.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    // Nested contexts print as `obj` to keep the output finite.
                    match slot.ty.get() {
                        Some(ty) if matches!(ty.kind(), TypeKind::Context(_)) => {
                            write!(f, "{} obj", slot.name)?
                        }
                        Some(ty) => write!(f, "{} {ty}", slot.name)?,
                        None => write!(f, "{} ?", slot.name)?,
                    }
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({self})")
    }
}

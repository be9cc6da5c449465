//! Lexical scopes used during analysis.
//!
//! Each function body gets its own [`Scope`] whose parent is the scope the
//! function literal appears in. Variables are numbered by declaration order;
//! in every non-root scope slot 0 is the synthetic `base` variable that links
//! the runtime frame to the frame of the enclosing scope.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::CompileError;
use crate::hir::Expr;
use crate::lazy::Lazy;
use crate::types::{Slot, Type};

/// Name of the slot linking a frame to its enclosing frame.
pub const BASE: &str = "base";

#[derive(Debug)]
pub struct Variable {
    pub name: Rc<str>,
    pub ty: Lazy<Type>,
    /// Replaces every read of the variable when set.
    pub constant: Option<Expr>,
}

impl Variable {
    pub fn new(name: &str, ty: Lazy<Type>) -> Self {
        Variable {
            name: Rc::from(name),
            ty,
            constant: None,
        }
    }
}

#[derive(Debug, Default)]
struct ScopeData {
    parent: Option<Scope>,
    variables: RefCell<Vec<Rc<Variable>>>,
    types: RefCell<Vec<(Rc<str>, Lazy<Type>)>>,
}

#[derive(Debug, Clone)]
pub struct Scope(Rc<ScopeData>);

impl Scope {
    pub fn root() -> Self {
        Scope(Rc::new(ScopeData::default()))
    }

    /// Creates a scope nested in `self`, with its base slot declared.
    pub fn child(&self) -> Self {
        let scope = Scope(Rc::new(ScopeData {
            parent: Some(self.clone()),
            ..ScopeData::default()
        }));
        let parent = self.clone();
        scope.declare(Variable::new(
            BASE,
            Lazy::new(move || Ok(parent.context_type())),
        ));
        scope
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.0.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn declare(&self, variable: Variable) -> Rc<Variable> {
        let variable = Rc::new(variable);
        self.0.variables.borrow_mut().push(Rc::clone(&variable));
        variable
    }

    pub fn define_type(&self, name: &str, ty: Lazy<Type>) {
        self.0.types.borrow_mut().push((Rc::from(name), ty));
    }

    /// Finds the closest type binding named `name`.
    pub fn lookup_type(&self, name: &str) -> Option<Lazy<Type>> {
        let found = self
            .0
            .types
            .borrow()
            .iter()
            .find(|(bound, _)| bound.as_ref() == name)
            .map(|(_, ty)| ty.clone());
        match found {
            Some(ty) => Some(ty),
            None => self.parent()?.lookup_type(name),
        }
    }

    /// Finds the closest variable named `name` whose type `accepted_by`
    /// accepts. Within one scope the earliest declaration wins.
    pub fn lookup(&self, name: &str, accepted_by: &Type) -> Result<Option<Rc<Variable>>, CompileError> {
        // Forcing a type may analyze a function body, which declares
        // variables in other scopes; iterate over a snapshot.
        let variables = self.0.variables.borrow().clone();
        for variable in variables.iter().filter(|v| v.name.as_ref() == name) {
            if accepted_by.assignable_from(&variable.ty.force()?) {
                return Ok(Some(Rc::clone(variable)));
            }
        }
        match self.parent() {
            Some(parent) => parent.lookup(name, accepted_by),
            None => Ok(None),
        }
    }

    /// Address of `variable` seen from this scope: a `0` (base slot) for
    /// every scope crossed, then the variable's slot index.
    pub fn address(&self, variable: &Rc<Variable>) -> Result<Vec<usize>, CompileError> {
        let mut path = Vec::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            let index = current
                .0
                .variables
                .borrow()
                .iter()
                .position(|candidate| Rc::ptr_eq(candidate, variable));
            match index {
                Some(index) => {
                    path.push(index);
                    return Ok(path);
                }
                None => path.push(0),
            }
            scope = current.parent();
        }
        Err(CompileError::type_error(format!(
            "variable does not belong to the scope: {}",
            variable.name
        )))
    }

    /// Context type of the variables declared so far, without the base slot.
    pub fn context_type(&self) -> Type {
        let skip = usize::from(!self.is_root());
        let slots = self
            .0
            .variables
            .borrow()
            .iter()
            .skip(skip)
            .map(|variable| Slot {
                name: Rc::clone(&variable.name),
                ty: variable.ty.clone(),
            })
            .collect();
        Type::context(slots)
    }

    /// Slot names of the scope's frame, in slot order.
    pub fn layout(&self) -> Vec<Rc<str>> {
        self.0
            .variables
            .borrow()
            .iter()
            .map(|variable| Rc::clone(&variable.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_variable(name: &str) -> Variable {
        Variable::new(name, Lazy::ready(Type::integer()))
    }

    #[test]
    fn child_scopes_reserve_the_base_slot() {
        let root = Scope::root();
        root.declare(int_variable("x"));
        let child = root.child();
        let y = child.declare(int_variable("y"));

        assert_eq!(child.layout(), vec![Rc::from(BASE), Rc::from("y")]);
        assert_eq!(child.address(&y).expect("address"), vec![1]);
        assert_eq!(root.layout(), vec![Rc::from("x")]);
    }

    #[test]
    fn addresses_step_through_base_slots() {
        let root = Scope::root();
        let _a = root.declare(int_variable("a"));
        let x = root.declare(int_variable("x"));
        let inner = root.child().child();
        assert_eq!(inner.address(&x).expect("address"), vec![0, 0, 1]);

        let stranger = Rc::new(int_variable("z"));
        assert!(root.address(&stranger).is_err());
    }

    #[test]
    fn lookup_filters_by_expected_type_and_walks_outward() {
        let root = Scope::root();
        let as_int = root.declare(int_variable("v"));
        let as_string = root.declare(Variable::new("v", Lazy::ready(Type::string())));
        let child = root.child();

        let found = child.lookup("v", &Type::string()).expect("lookup").expect("found");
        assert!(Rc::ptr_eq(&found, &as_string));
        let found = child.lookup("v", &Type::any()).expect("lookup").expect("found");
        assert!(Rc::ptr_eq(&found, &as_int));
        assert!(child.lookup("v", &Type::boolean()).expect("lookup").is_none());
    }

    #[test]
    fn closer_declarations_shadow_outer_ones() {
        let root = Scope::root();
        root.declare(int_variable("x"));
        let child = root.child();
        let inner = child.declare(int_variable("x"));
        let found = child.lookup("x", &Type::any()).expect("lookup").expect("found");
        assert!(Rc::ptr_eq(&found, &inner));
    }

    #[test]
    fn type_bindings_resolve_outward() {
        let root = Scope::root();
        root.define_type("int", Lazy::ready(Type::integer()));
        let child = root.child();
        child.define_type("int", Lazy::ready(Type::string()));

        let ty = child.lookup_type("int").expect("bound").force().expect("type");
        assert_eq!(ty.to_string(), "string");
        let ty = root.child().lookup_type("int").expect("bound").force().expect("type");
        assert_eq!(ty.to_string(), "int");
        assert!(root.lookup_type("nope").is_none());
    }

    #[test]
    fn context_types_skip_the_base_slot() {
        let root = Scope::root();
        root.declare(int_variable("g"));
        let child = root.child();
        child.declare(int_variable("x"));
        child.declare(Variable::new("y", Lazy::ready(Type::string())));

        assert_eq!(child.context_type().to_string(), "(x int, y string)");
        assert_eq!(root.context_type().to_string(), "(g int)");
    }
}

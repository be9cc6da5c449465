//! Memoizing thunks for forward and recursive references.
//!
//! A [`Lazy`] holds either an unevaluated producer or its cached outcome.
//! It can be referenced (cloned) before the values it depends on exist, as
//! long as nobody forces it before they are populated. Forcing a thunk that
//! is currently being forced reports a recursive reference instead of
//! recursing forever.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::CompileError;

type Producer<T> = Box<dyn FnOnce() -> Result<T, CompileError>>;

enum State<T> {
    Pending(Producer<T>),
    Forcing,
    Ready(T),
    Failed(CompileError),
}

/// Shared, evaluate-at-most-once cell.
pub struct Lazy<T>(Rc<RefCell<State<T>>>);

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Lazy(Rc::clone(&self.0))
    }
}

impl<T: Clone> Lazy<T> {
    pub fn new(producer: impl FnOnce() -> Result<T, CompileError> + 'static) -> Self {
        Lazy(Rc::new(RefCell::new(State::Pending(Box::new(producer)))))
    }

    pub fn ready(value: T) -> Self {
        Lazy(Rc::new(RefCell::new(State::Ready(value))))
    }

    /// Evaluates the producer on first use and returns the cached outcome
    /// afterwards.
    pub fn force(&self) -> Result<T, CompileError> {
        let producer = {
            let mut state = self.0.borrow_mut();
            match std::mem::replace(&mut *state, State::Forcing) {
                State::Pending(producer) => producer,
                State::Forcing => return Err(CompileError::recursive_reference()),
                settled => {
                    let outcome = match &settled {
                        State::Ready(value) => Ok(value.clone()),
                        State::Failed(err) => Err(err.clone()),
                        State::Pending(_) | State::Forcing => Err(CompileError::recursive_reference()),
                    };
                    *state = settled;
                    return outcome;
                }
            }
        };

        // The borrow is released here: the producer may force other thunks.
        let outcome = producer();
        *self.0.borrow_mut() = match &outcome {
            Ok(value) => State::Ready(value.clone()),
            Err(err) => State::Failed(err.clone()),
        };
        outcome
    }

    /// Returns the value if it has already been computed.
    pub fn get(&self) -> Option<T> {
        match &*self.0.borrow() {
            State::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(state) => match &*state {
                State::Pending(_) => f.write_str("Lazy(<pending>)"),
                State::Forcing => f.write_str("Lazy(<forcing>)"),
                State::Ready(value) => f.debug_tuple("Lazy").field(value).finish(),
                State::Failed(err) => f.debug_tuple("Lazy").field(err).finish(),
            },
            Err(_) => f.write_str("Lazy(<borrowed>)"),
        }
    }
}

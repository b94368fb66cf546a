//! Exception handler mapping.
//!
//! Exception handlers turn a failed dispatch into a response. They are keyed
//! either by HTTP status code or by a concrete error type, declared on any
//! ownership layer, and merged from the root down to the handler so the
//! innermost declaration for a key wins.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use http::StatusCode;

use gantry_core::{Connection, NativeResponse};

use crate::error::DispatchError;

/// Converts a dispatch failure into a response.
pub type ExceptionHandler =
    Arc<dyn Fn(&dyn Connection, &DispatchError) -> NativeResponse + Send + Sync>;

// =============================================================================
// ExceptionKey
// =============================================================================

/// What an exception handler is registered for.
#[derive(Clone, Copy)]
pub enum ExceptionKey {
    Status(StatusCode),
    Error {
        type_id: TypeId,
        name: &'static str,
        matches: fn(&(dyn StdError + 'static)) -> bool,
    },
}

fn is_type<E: StdError + 'static>(err: &(dyn StdError + 'static)) -> bool {
    err.is::<E>()
}

impl ExceptionKey {
    pub fn status(status: StatusCode) -> Self {
        Self::Status(status)
    }

    /// Keys a handler by the concrete error type `E`.
    pub fn error<E: StdError + 'static>() -> Self {
        Self::Error {
            type_id: TypeId::of::<E>(),
            name: type_name::<E>(),
            matches: is_type::<E>,
        }
    }
}

impl PartialEq for ExceptionKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Status(a), Self::Status(b)) => a == b,
            (Self::Error { type_id: a, .. }, Self::Error { type_id: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for ExceptionKey {}

impl Hash for ExceptionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Status(status) => {
                0_u8.hash(state);
                status.hash(state);
            }
            Self::Error { type_id, .. } => {
                1_u8.hash(state);
                type_id.hash(state);
            }
        }
    }
}

impl fmt::Debug for ExceptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => f.debug_tuple("Status").field(status).finish(),
            Self::Error { name, .. } => f.debug_tuple("Error").field(name).finish(),
        }
    }
}

impl From<StatusCode> for ExceptionKey {
    fn from(status: StatusCode) -> Self {
        Self::Status(status)
    }
}

// =============================================================================
// ExceptionHandlers
// =============================================================================

/// A set of exception handlers.
#[derive(Clone, Default)]
pub struct ExceptionHandlers {
    handlers: HashMap<ExceptionKey, ExceptionHandler>,
}

impl ExceptionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&mut self, key: impl Into<ExceptionKey>, handler: F)
    where
        F: Fn(&dyn Connection, &DispatchError) -> NativeResponse + Send + Sync + 'static,
    {
        self.handlers.insert(key.into(), Arc::new(handler));
    }

    pub fn insert_arc(&mut self, key: ExceptionKey, handler: ExceptionHandler) {
        self.handlers.insert(key, handler);
    }

    /// Adds every handler of `other`, replacing handlers with the same key.
    pub fn extend(&mut self, other: &ExceptionHandlers) {
        for (key, handler) in &other.handlers {
            self.handlers.insert(*key, Arc::clone(handler));
        }
    }

    pub fn get(&self, key: &ExceptionKey) -> Option<&ExceptionHandler> {
        self.handlers.get(key)
    }

    /// Finds the handler for a failure.
    ///
    /// Error-type handlers are tried first, walking the error's source chain
    /// from the most specific error outwards; status handlers come last.
    pub fn lookup(&self, err: &DispatchError) -> Option<&ExceptionHandler> {
        let type_handlers: Vec<_> = self
            .handlers
            .iter()
            .filter_map(|(key, handler)| match key {
                ExceptionKey::Error { matches, .. } => Some((*matches, handler)),
                ExceptionKey::Status(_) => None,
            })
            .collect();

        if !type_handlers.is_empty() {
            let chain = std::iter::successors(Some(err.exception()), |e| (*e).source())
                .chain(std::iter::once(err as &(dyn StdError + 'static)));
            for candidate in chain {
                if let Some((_, handler)) = type_handlers.iter().find(|(m, _)| m(candidate)) {
                    return Some(*handler);
                }
            }
        }

        self.handlers.get(&ExceptionKey::Status(err.status_code()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for ExceptionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

//! Permission checks.
//!
//! Layers and handlers declare [`PermissionClass`]es: factories producing a
//! fresh [`Permission`] for every check. Permissions therefore never carry
//! state from one connection to the next.
//!
//! ```rust,ignore
//! struct IsAdmin;
//!
//! #[async_trait]
//! impl Permission for IsAdmin {
//!     async fn has_permission(&self, connection: &dyn Connection, _: &RouteHandler) -> bool {
//!         connection.header("x-role") == Some("admin")
//!     }
//! }
//!
//! let admin = Layer::group("admin").permission(PermissionClass::of(|| IsAdmin));
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use gantry_core::Connection;

use crate::error::PermissionDenied;
use crate::handler::RouteHandler;
use crate::sync::Callable;

// =============================================================================
// Permission
// =============================================================================

/// A check bound to one connection.
#[async_trait]
pub trait Permission: Send + Sync {
    async fn has_permission(&self, connection: &dyn Connection, handler: &RouteHandler) -> bool;

    /// Name reported when the check denies a connection.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Optional detail reported with a denial.
    fn message(&self) -> Option<String> {
        None
    }

    /// Decides whether dispatch continues after the check ran.
    fn continue_or_raise(&self, allowed: bool) -> Result<(), PermissionDenied> {
        if allowed {
            Ok(())
        } else {
            Err(PermissionDenied {
                permission: self.name().to_string(),
                detail: self.message(),
            })
        }
    }
}

// =============================================================================
// PermissionClass
// =============================================================================

/// Builds a fresh [`Permission`] for each check.
#[derive(Clone)]
pub struct PermissionClass {
    name: String,
    factory: Callable<(), Arc<dyn Permission>>,
}

impl PermissionClass {
    /// Uses `factory` to construct the permission.
    pub fn of<P, F>(factory: F) -> Self
    where
        P: Permission + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self {
            name: type_name::<P>().to_string(),
            factory: Callable::from_sync(move |()| Arc::new(factory()) as Arc<dyn Permission>),
        }
    }

    /// Uses an asynchronous factory to construct the permission.
    pub fn of_async<P, F, Fut>(factory: F) -> Self
    where
        P: Permission + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = P> + Send + 'static,
    {
        let factory = Arc::new(factory);
        Self {
            name: type_name::<P>().to_string(),
            factory: Callable::from_async(move |()| {
                let fut = factory();
                async move { Arc::new(fut.await) as Arc<dyn Permission> }
            }),
        }
    }

    /// A permission defined by a predicate.
    pub fn from_fn<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&dyn Connection, &RouteHandler) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        let check: Arc<FnCheck> = Arc::new(check);
        let permission_name = name.clone();
        Self {
            name,
            factory: Callable::from_sync(move |()| {
                Arc::new(FnPermission {
                    name: permission_name.clone(),
                    check: Arc::clone(&check),
                }) as Arc<dyn Permission>
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_async(&self) -> bool {
        self.factory.is_async()
    }

    /// Returns a copy whose factory can always be awaited.
    pub fn into_async(self) -> Self {
        Self {
            name: self.name,
            factory: self.factory.into_async(),
        }
    }

    /// Constructs the permission for one check.
    pub async fn instantiate(&self) -> Arc<dyn Permission> {
        self.factory.call(()).await
    }
}

impl fmt::Debug for PermissionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionClass")
            .field("name", &self.name)
            .field("is_async", &self.is_async())
            .finish()
    }
}

// =============================================================================
// Built-in permissions
// =============================================================================

/// Allows every connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAny;

#[async_trait]
impl Permission for AllowAny {
    async fn has_permission(&self, _connection: &dyn Connection, _handler: &RouteHandler) -> bool {
        true
    }

    fn name(&self) -> &str {
        "AllowAny"
    }
}

/// Denies every connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl Permission for DenyAll {
    async fn has_permission(&self, _connection: &dyn Connection, _handler: &RouteHandler) -> bool {
        false
    }

    fn name(&self) -> &str {
        "DenyAll"
    }

    fn message(&self) -> Option<String> {
        Some("You do not have permission to perform this action.".to_string())
    }
}

type FnCheck = dyn Fn(&dyn Connection, &RouteHandler) -> bool + Send + Sync;

struct FnPermission {
    name: String,
    check: Arc<FnCheck>,
}

#[async_trait]
impl Permission for FnPermission {
    async fn has_permission(&self, connection: &dyn Connection, handler: &RouteHandler) -> bool {
        (self.check)(connection, handler)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

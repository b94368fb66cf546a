//! Dependency providers.
//!
//! An [`Inject`] wraps a provider function. Layers bind injectors to keys in
//! their [`Dependencies`]; a handler (or another provider) asks for the value
//! by declaring a [`Param::dependency`] with that key.
//!
//! Providers receive the validated [`Kwargs`] of their own parameters, so a
//! provider may depend on query values, headers or other dependencies:
//!
//! ```rust,ignore
//! let db = Inject::new(|_| async { Ok::<_, BoxError>(Pool::connect().await?) });
//! let user = Inject::new(|kwargs: Kwargs| async move {
//!     let db = kwargs.dependency::<Pool>("db")?;
//!     let token = kwargs.get::<String>("x_token")?;
//!     Ok::<_, BoxError>(db.user_for(&token).await?)
//! })
//! .param(Param::dependency("db"))
//! .param(Param::header("x_token", ParamType::String));
//! ```

use std::any::{Any, type_name};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use once_cell::sync::OnceCell;
use tower::BoxError;
use tracing::trace;

use crate::error::ConfigurationError;
use crate::kwargs::{Injected, Kwargs};
use crate::signature::{Param, SignatureModel};
use crate::sync::{Callable, same_callable};

/// The type-erased provider function stored by an [`Inject`].
pub type ProviderFn = Callable<Kwargs, Result<Injected, BoxError>>;

// =============================================================================
// Inject
// =============================================================================

/// A dependency provider.
///
/// Equality is provider identity: clones of one `Inject` compare equal,
/// separately constructed injectors never do.
#[derive(Clone)]
pub struct Inject {
    inner: Arc<InjectInner>,
}

struct InjectInner {
    name: String,
    provider: ProviderFn,
    params: Vec<Param>,
    signature_model: OnceCell<Arc<SignatureModel>>,
}

impl Inject {
    fn from_provider(name: String, provider: ProviderFn, params: Vec<Param>) -> Self {
        Self {
            inner: Arc::new(InjectInner {
                name,
                provider,
                params,
                signature_model: OnceCell::new(),
            }),
        }
    }

    /// Wraps an asynchronous provider.
    pub fn new<F, Fut, T, E>(f: F) -> Self
    where
        F: Fn(Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        let provider: ProviderFn = Callable::from_async(move |kwargs| {
            f(kwargs).map(|result| match result {
                Ok(value) => Ok(Arc::new(value) as Injected),
                Err(err) => Err(err.into()),
            })
        });
        Self::from_provider(type_name::<F>().to_string(), provider, Vec::new())
    }

    /// Wraps a synchronous provider.
    pub fn sync<F, T, E>(f: F) -> Self
    where
        F: Fn(Kwargs) -> Result<T, E> + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        let provider: ProviderFn = Callable::from_sync(move |kwargs| match f(kwargs) {
            Ok(value) => Ok(Arc::new(value) as Injected),
            Err(err) => Err(err.into()),
        });
        Self::from_provider(type_name::<F>().to_string(), provider, Vec::new())
    }

    /// Provides the same shared value to every request.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        let value: Injected = Arc::new(value);
        let provider: ProviderFn = Callable::from_sync(move |_| Ok(Arc::clone(&value)));
        Self::from_provider(type_name::<T>().to_string(), provider, Vec::new())
    }

    /// Declares a parameter of the provider.
    pub fn param(self, param: Param) -> Self {
        let mut params = self.inner.params.clone();
        params.push(param);
        Self::from_provider(self.inner.name.clone(), self.inner.provider.clone(), params)
    }

    /// Overrides the name used in logs.
    pub fn named(self, name: impl Into<String>) -> Self {
        Self::from_provider(
            name.into(),
            self.inner.provider.clone(),
            self.inner.params.clone(),
        )
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn params(&self) -> &[Param] {
        &self.inner.params
    }

    pub fn is_async(&self) -> bool {
        self.inner.provider.is_async()
    }

    /// Returns the provider's signature model, building it on first use.
    pub fn signature_model(
        &self,
        dependency_names: &BTreeSet<String>,
    ) -> Result<Arc<SignatureModel>, ConfigurationError> {
        self.inner
            .signature_model
            .get_or_try_init(|| {
                trace!(provider = %self.inner.name, "Building provider signature model");
                SignatureModel::create(&self.inner.name, &self.inner.params, dependency_names)
                    .map(Arc::new)
            })
            .cloned()
    }

    /// Runs the provider.
    pub async fn call(&self, kwargs: Kwargs) -> Result<Injected, BoxError> {
        self.inner.provider.call(kwargs).await
    }

    /// Returns the downcast result of running the provider.
    pub async fn resolve<T: Send + Sync + 'static>(
        &self,
        kwargs: Kwargs,
    ) -> Result<Arc<T>, BoxError> {
        let value: Arc<dyn Any + Send + Sync> = self.call(kwargs).await?;
        value.downcast::<T>().map_err(|_| {
            format!(
                "provider '{}' did not produce a {}",
                self.inner.name,
                type_name::<T>()
            )
            .into()
        })
    }
}

impl PartialEq for Inject {
    fn eq(&self, other: &Self) -> bool {
        same_callable(&self.inner.provider, &other.inner.provider)
    }
}

impl Eq for Inject {}

impl fmt::Debug for Inject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inject")
            .field("name", &self.inner.name)
            .field("params", &self.inner.params.len())
            .field("is_async", &self.is_async())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Dependencies
// =============================================================================

/// Injectors bound to keys, in binding order.
///
/// Rebinding a key replaces its injector in place.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    entries: Vec<(String, Inject)>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, inject: Inject) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = inject,
            None => self.entries.push((key, inject)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, inject: Inject) -> Self {
        self.insert(key, inject);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Inject> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the key an equal injector is bound under, if any.
    pub fn key_of(&self, inject: &Inject) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| v == inject)
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Inject)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::ParamType;

    #[test]
    fn test_equality_is_provider_identity() {
        let db = Inject::value(7_u32);
        assert_eq!(db, db.clone());
        assert_eq!(db, db.clone().param(Param::query("x", ParamType::String)));
        assert_ne!(db, Inject::value(7_u32));
    }

    #[test]
    fn test_rebinding_key_replaces_in_place() {
        let first = Inject::value("a");
        let second = Inject::value("b");
        let mut deps = Dependencies::new()
            .with("one", first.clone())
            .with("two", Inject::value(2_u8));
        deps.insert("one", second.clone());

        assert_eq!(deps.keys().collect::<Vec<_>>(), vec!["one", "two"]);
        assert_eq!(deps.get("one"), Some(&second));
        assert_eq!(deps.key_of(&second), Some("one"));
        assert_eq!(deps.key_of(&first), None);
    }

    #[tokio::test]
    async fn test_sync_and_async_providers_resolve() {
        let sync = Inject::sync(|_| Ok::<_, BoxError>(String::from("sync")));
        let async_provider = Inject::new(|_| async { Ok::<_, BoxError>(41_i64 + 1) });

        assert!(!sync.is_async());
        assert!(async_provider.is_async());
        assert_eq!(*sync.resolve::<String>(Kwargs::default()).await.unwrap(), "sync");
        assert_eq!(*async_provider.resolve::<i64>(Kwargs::default()).await.unwrap(), 42);
        assert!(sync.resolve::<i64>(Kwargs::default()).await.is_err());
    }

    #[test]
    fn test_signature_model_is_built_once() {
        let inject = Inject::value(1_u8).param(Param::query("page", ParamType::Integer));
        let first = inject.signature_model(&BTreeSet::new()).unwrap();
        let second = inject.signature_model(&BTreeSet::new()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}

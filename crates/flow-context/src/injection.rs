//! `inject` / `retrieve` on top of [`ContextStore`]

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{ContextError, ContextResult};
use crate::frame::Frame;
use crate::store::{ContextStore, Scoped};

impl ContextStore {
    /// Bind `value` to `id` for every flow started through the returned wrapper.
    ///
    /// The new frame extends whatever is visible at the call site. Fails with
    /// [`ContextError::DuplicateBinding`] when `id` is already visible here.
    pub fn inject<F, T>(&self, id: impl Into<String>, func: F, value: T) -> ContextResult<Injected<F>>
    where
        T: Any + Send + Sync,
    {
        self.inject_arc(id, func, Arc::new(value))
    }

    /// Like [`inject`](Self::inject), binding an `Arc` the caller keeps a handle to.
    pub fn inject_arc<F, T>(
        &self,
        id: impl Into<String>,
        func: F,
        value: Arc<T>,
    ) -> ContextResult<Injected<F>>
    where
        T: Any + Send + Sync,
    {
        let id = id.into();
        let visible = self.current().unwrap_or_default();

        let frame = visible.with_binding(id.clone(), value).map_err(|e| {
            tracing::debug!(store = %self.name(), id = %id, "rejected duplicate context binding");
            e
        })?;

        tracing::debug!(
            store = %self.name(),
            id = %id,
            bindings = frame.len(),
            "context injected"
        );

        Ok(Injected {
            store: self.clone(),
            frame,
            func,
        })
    }

    /// Look up the value bound to `id` in the current flow.
    pub fn retrieve<T>(&self, id: &str) -> ContextResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let Some(frame) = self.current() else {
            tracing::trace!(store = %self.name(), id, "retrieve outside any context flow");
            return Err(ContextError::NoActiveFlow { id: id.to_string() });
        };

        let Some(binding) = frame.get(id) else {
            tracing::trace!(store = %self.name(), id, "retrieve of unbound context");
            return Err(ContextError::UnboundIdentifier { id: id.to_string() });
        };

        Arc::clone(binding)
            .downcast::<T>()
            .map_err(|_| ContextError::TypeMismatch {
                id: id.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Non-failing [`retrieve`](Self::retrieve)
    pub fn try_retrieve<T>(&self, id: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.retrieve(id).ok()
    }

    /// Whether `id` is bound in the current flow
    pub fn contains(&self, id: &str) -> bool {
        self.current().is_some_and(|frame| frame.contains(id))
    }
}

/// A function wrapped by [`ContextStore::inject`].
///
/// Every call starts a new flow from the same frame. Flows started by
/// different calls share only that immutable frame.
pub struct Injected<F> {
    store: ContextStore,
    frame: Frame,
    func: F,
}

impl<F> Injected<F> {
    /// Frame each invocation starts from
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn call<R>(&self) -> R
    where
        F: Fn() -> R,
    {
        self.store.run(self.frame.clone(), || (self.func)())
    }

    /// Call with an argument. Functions of several arguments take a tuple.
    pub fn call_with<A, R>(&self, args: A) -> R
    where
        F: Fn(A) -> R,
    {
        self.store.run(self.frame.clone(), || (self.func)(args))
    }

    /// Call an async function. The frame stays visible across every
    /// suspension of the returned future.
    pub fn call_async<Fut>(&self) -> Scoped<Fut>
    where
        F: Fn() -> Fut,
        Fut: Future,
    {
        let future = self.call();
        self.store.scope(self.frame.clone(), future)
    }

    pub fn call_async_with<A, Fut>(&self, args: A) -> Scoped<Fut>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        let future = self.call_with(args);
        self.store.scope(self.frame.clone(), future)
    }

    pub fn into_inner(self) -> F {
        self.func
    }
}

impl<F> fmt::Debug for Injected<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injected")
            .field("store", &self.store)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

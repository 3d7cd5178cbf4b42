//! Process-wide default store and free-function entry points

use std::any::Any;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::ContextResult;
use crate::injection::Injected;
use crate::store::ContextStore;

static GLOBAL_STORE: Lazy<ContextStore> = Lazy::new(|| ContextStore::builder().name("global").build());

/// The store behind the free functions of this crate
pub fn global() -> &'static ContextStore {
    &GLOBAL_STORE
}

/// [`ContextStore::inject`] on the global store
pub fn inject<F, T>(id: impl Into<String>, func: F, value: T) -> ContextResult<Injected<F>>
where
    T: Any + Send + Sync,
{
    global().inject(id, func, value)
}

/// [`ContextStore::inject_arc`] on the global store
pub fn inject_arc<F, T>(id: impl Into<String>, func: F, value: Arc<T>) -> ContextResult<Injected<F>>
where
    T: Any + Send + Sync,
{
    global().inject_arc(id, func, value)
}

/// [`ContextStore::retrieve`] on the global store
pub fn retrieve<T>(id: &str) -> ContextResult<Arc<T>>
where
    T: Any + Send + Sync,
{
    global().retrieve(id)
}

pub fn try_retrieve<T>(id: &str) -> Option<Arc<T>>
where
    T: Any + Send + Sync,
{
    global().try_retrieve(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_a_single_store() {
        assert_eq!(global().id(), global().id());
        assert_eq!(global().name(), "global");
    }

    #[test]
    fn test_global_isolated_from_local_stores() {
        let local = ContextStore::new();
        let wrapped = inject("global-only", || local.contains("global-only"), 1u8).unwrap();
        assert!(!wrapped.call());
    }
}

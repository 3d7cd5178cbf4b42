//! Immutable identifier -> value snapshots
//!
//! A `Frame` is what a flow sees: every binding established by the `inject`
//! calls enclosing it. Frames are never modified in place; adding a binding
//! produces a new frame that shares the old bindings.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ContextError, ContextResult};

/// Type-erased context value as held by a frame.
pub type Binding = Arc<dyn Any + Send + Sync>;

/// Snapshot of the bindings visible at one point of an execution flow.
#[derive(Clone, Default)]
pub struct Frame {
    bindings: Arc<HashMap<String, Binding>>,
}

impl Frame {
    /// Create a frame without bindings
    pub fn empty() -> Self {
        Self::default()
    }

    /// Return a new frame holding all bindings of `self` plus `id -> value`.
    ///
    /// Fails with [`ContextError::DuplicateBinding`] when `id` is already bound.
    pub fn with_binding(&self, id: impl Into<String>, value: Binding) -> ContextResult<Frame> {
        let id = id.into();
        if self.bindings.contains_key(&id) {
            return Err(ContextError::DuplicateBinding { id });
        }

        let mut bindings = HashMap::with_capacity(self.bindings.len() + 1);
        bindings.extend(
            self.bindings
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v))),
        );
        bindings.insert(id, value);

        Ok(Self {
            bindings: Arc::new(bindings),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Binding> {
        self.bindings.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bindings.contains_key(id)
    }

    /// Identifiers bound in this frame, in no particular order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// True when both handles point at the same snapshot.
    pub fn same_snapshot(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.bindings, &other.bindings)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.ids().collect();
        ids.sort_unstable();
        f.debug_struct("Frame").field("ids", &ids).finish()
    }
}

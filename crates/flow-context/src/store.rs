//! Flow-scoped frame storage
//!
//! The store tracks which [`Frame`] is visible to the code currently running.
//! The visible frame lives in a thread-local slot keyed by store, installed by
//! an RAII guard for the duration of a closure call or a single `poll`.
//! Futures carry their frame with them ([`Scoped`]) and re-install it around
//! every poll, so a flow keeps its frame across suspension points, across
//! worker threads, and while other flows interleave on the same worker.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::frame::Frame;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Frame visible on this thread, per store.
    static ACTIVE_FRAMES: RefCell<HashMap<StoreId, Frame>> = RefCell::new(HashMap::new());
}

/// Unique identity of a [`ContextStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for a context store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Label used in log records and `Debug` output
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
        }
    }
}

struct StoreInner {
    id: StoreId,
    config: StoreConfig,
}

/// Scoped context store.
///
/// Independent instances never observe each other's frames. Clones are
/// handles to the same store.
#[derive(Clone)]
pub struct ContextStore {
    inner: Arc<StoreInner>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: StoreId::next(),
                config,
            }),
        }
    }

    pub fn builder() -> ContextStoreBuilder {
        ContextStoreBuilder::new()
    }

    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Frame visible at the call site, `None` outside any flow.
    pub fn current(&self) -> Option<Frame> {
        let id = self.id();
        ACTIVE_FRAMES
            .try_with(|frames| frames.borrow().get(&id).cloned())
            .ok()
            .flatten()
    }

    /// Run `f` with `frame` visible for its whole dynamic extent.
    ///
    /// The previously visible frame is restored when `f` returns or unwinds.
    pub fn run<R>(&self, frame: Frame, f: impl FnOnce() -> R) -> R {
        let _guard = FrameGuard::enter(self.id(), Some(frame));
        f()
    }

    /// Wrap `future` so that `frame` is visible during every poll of it.
    pub fn scope<F: Future>(&self, frame: Frame, future: F) -> Scoped<F> {
        Scoped::new(self.id(), Some(frame), future)
    }

    /// Wrap `future` with whatever is visible at the call site.
    ///
    /// Outside any flow the future runs without a frame, even when it is
    /// later polled from inside another flow.
    pub fn bind_current<F: Future>(&self, future: F) -> Scoped<F> {
        Scoped::new(self.id(), self.current(), future)
    }

    /// Capture the visible frame into a closure that re-enters it when called.
    ///
    /// Useful for work handed to other threads, e.g. `spawn_blocking`.
    pub fn bind_fn<F, R>(&self, f: F) -> impl FnOnce() -> R
    where
        F: FnOnce() -> R,
    {
        let id = self.id();
        let frame = self.current();
        move || {
            let _guard = FrameGuard::enter(id, frame);
            f()
        }
    }

    /// Spawn `future` on the current tokio runtime as a new flow that starts
    /// from a snapshot of the caller's frame.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let scoped = self.bind_current(future);
        tracing::trace!(
            store = %self.name(),
            bindings = scoped.frame().map(Frame::len).unwrap_or(0),
            "spawning task in context flow"
        );
        tokio::spawn(scoped)
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStore")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .finish()
    }
}

pub struct ContextStoreBuilder {
    config: StoreConfig,
}

impl ContextStoreBuilder {
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn build(self) -> ContextStore {
        ContextStore::with_config(self.config)
    }
}

impl Default for ContextStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs a frame (or hides any frame, for `None`) and restores the
/// displaced one on drop.
struct FrameGuard {
    store: StoreId,
    previous: Option<Frame>,
}

impl FrameGuard {
    fn enter(store: StoreId, frame: Option<Frame>) -> Self {
        let previous = ACTIVE_FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            match frame {
                Some(frame) => frames.insert(store, frame),
                None => frames.remove(&store),
            }
        });
        Self { store, previous }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let store = self.store;
        let previous = self.previous.take();
        // The displaced frame is dropped outside the borrow: dropping a
        // context value may itself look at the store.
        let _displaced = ACTIVE_FRAMES.try_with(|frames| {
            let mut frames = frames.borrow_mut();
            match previous {
                Some(frame) => frames.insert(store, frame),
                None => frames.remove(&store),
            }
        });
    }
}

/// Future running inside a fixed frame.
///
/// Returned by [`ContextStore::scope`], [`ContextStore::bind_current`] and the
/// async entry points of `Injected`.
pub struct Scoped<F> {
    store: StoreId,
    frame: Option<Frame>,
    future: Pin<Box<F>>,
}

impl<F> Scoped<F> {
    fn new(store: StoreId, frame: Option<Frame>, future: F) -> Self {
        Self {
            store,
            frame,
            future: Box::pin(future),
        }
    }

    /// Frame visible while this future is polled
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _guard = FrameGuard::enter(this.store, this.frame.clone());
        this.future.as_mut().poll(cx)
    }
}

impl<F> fmt::Debug for Scoped<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("store", &self.store)
            .field("frame", &self.frame)
            .finish()
    }
}

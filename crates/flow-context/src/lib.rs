//! Scoped, async-flow-aware context injection
//!
//! `inject` wraps a function so that every call to it runs in a new flow
//! where a named context value is visible. Anything that flow reaches, now or
//! after an `.await`, can `retrieve` the value by name without it being passed
//! down explicitly. Concurrent calls of the same wrapped function each see
//! their own frame.
//!
//! ```
//! use flow_context::{inject, retrieve};
//!
//! struct Config {
//!     greeting: String,
//! }
//!
//! fn greet() -> String {
//!     retrieve::<Config>("config").unwrap().greeting.clone()
//! }
//!
//! let hello = inject("config", greet, Config { greeting: "hello".into() }).unwrap();
//! assert_eq!(hello.call(), "hello");
//! ```

pub mod error;
pub mod frame;
pub mod global;
pub mod injection;
pub mod store;

pub use error::{ContextError, ContextResult};
pub use frame::{Binding, Frame};
pub use global::{global, inject, inject_arc, retrieve, try_retrieve};
pub use injection::Injected;
pub use store::{ContextStore, ContextStoreBuilder, Scoped, StoreConfig, StoreId};

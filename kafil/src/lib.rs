//! # Kafil: scoped service resolution for Rust
//!
//! A thread-safe container that builds services from registrations and
//! manages their lifetimes: one instance per root (Singleton), one per
//! scope (Scoped) or a new one per request (Transient). Scopes tear down
//! everything they own, in a deterministic order, when disposed or dropped.
//!
//! ```rust
//! use std::sync::Arc;
//! use kafil::prelude::*;
//!
//! struct Greeter;
//!
//! let container = Container::new(vec![Registration::bind::<Greeter>(
//!     Lifetime::Singleton,
//!     Implementation::of::<Greeter>().constructor([], |_| Ok(Greeter)),
//! )])
//! .unwrap();
//!
//! let scope = container.create_scope().unwrap();
//! let a = scope.resolve_required::<Greeter>().unwrap();
//! let b = container.resolve_required::<Greeter>().unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! ```

pub use kafil_container::*;
pub use kafil_support::*;

//! Core container implementation for Kafil.

mod activation;
pub mod cache;
pub mod container;
pub mod dispose;
pub mod error;
pub mod graph;
pub mod instance;
pub mod key;
pub mod lifetime;
pub mod options;
pub mod registration;

pub use container::{Container, ScopeState, prelude};
pub use dispose::{DisposalReport, Dispose};
pub use error::{KafilError, Result};
pub use key::{Generic, TypeKey};
pub use lifetime::Lifetime;
pub use options::ContainerOptions;
pub use registration::{Implementation, Parameter, Registration};

//! Service lifetimes.
//!
//! A lifetime decides how long an activated instance is reused:
//! - [`Lifetime::Singleton`]: one instance per root container
//! - [`Lifetime::Scoped`]: one instance per child scope
//! - [`Lifetime::Transient`]: a new instance on every resolution
//!
//! # Ordering
//! Lifetimes are ordered by how long they live:
//! `Singleton > Scoped > Transient`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reuse policy of a registration.
///
/// # Examples
/// ```
/// use kafil_container::lifetime::Lifetime;
///
/// assert!(Lifetime::Singleton > Lifetime::Scoped);
/// assert!(Lifetime::Scoped > Lifetime::Transient);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// Shared by the root and every scope created from it.
    ///
    /// Cached in the root's singleton cache and disposed when the root is.
    Singleton,

    /// One instance per child scope, e.g. per unit of work.
    ///
    /// Cannot be resolved from the root.
    Scoped,

    /// Never cached.
    ///
    /// Disposable transients are still tracked by the scope that created
    /// them and released with it.
    Transient,
}

impl Lifetime {
    /// Returns `true` for lifetimes backed by an instance cache.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Lifetime::Singleton | Lifetime::Scoped)
    }

    #[inline]
    fn rank(&self) -> u8 {
        match self {
            Lifetime::Singleton => 2,
            Lifetime::Scoped => 1,
            Lifetime::Transient => 0,
        }
    }
}

impl PartialOrd for Lifetime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Lifetime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Singleton => write!(f, "Singleton"),
            Lifetime::Scoped => write!(f, "Scoped"),
            Lifetime::Transient => write!(f, "Transient"),
        }
    }
}

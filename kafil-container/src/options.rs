//! Container configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a root [`Container`](crate::container::Container).
///
/// Every field has a default, so a partial config deserializes:
///
/// ```rust
/// use kafil_container::options::ContainerOptions;
///
/// let options = ContainerOptions::default()
///     .with_max_depth(32)
///     .with_strict_lifetimes(true);
/// assert!(options.validate);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// Longest resolution chain before [`ResolutionTooDeep`](crate::error::KafilError::ResolutionTooDeep).
    pub max_depth: usize,
    /// Validate the dependency graph when the container is built.
    pub validate: bool,
    /// Treat a longer-lived service depending on a shorter-lived one as an
    /// error instead of a warning.
    pub strict_lifetimes: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            max_depth: 64,
            validate: true,
            strict_lifetimes: false,
        }
    }
}

impl ContainerOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Enable or disable graph validation at build time.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_strict_lifetimes(mut self, strict: bool) -> Self {
        self.strict_lifetimes = strict;
        self
    }
}

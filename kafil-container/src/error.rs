//! Error types for Kafil container operations.
//!
//! "Not registered" is not an error for plain resolution: it comes back as
//! `Ok(None)`. Everything here means the container cannot be used the way
//! it was asked to, and is raised at the offending call.

use std::fmt;

use kafil_support::rendering::{render_chain, shorten_type_name};

use crate::key::TypeKey;
use crate::lifetime::Lifetime;

/// Main error type for all Kafil operations.
#[derive(Debug, thiserror::Error)]
pub enum KafilError {
    /// A registration cannot be activated as declared.
    #[error("{}", .0)]
    Configuration(ConfigurationError),

    /// A Scoped service was requested from the root container.
    #[error(
        "Cannot resolve scoped service {service} from the root container\n  Hint: Resolve it from a scope created with .create_scope()"
    )]
    LifetimeMisuse { service: TypeKey },

    /// The container (or the root it belongs to) has been disposed.
    #[error("Cannot use a disposed container (requested: {})", requested_name(.service))]
    Disposed { service: Option<TypeKey> },

    /// Resolution re-entered a service that is still being built.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// Resolution chain grew past the configured depth.
    #[error("Resolution of {key} exceeded the maximum depth of {depth}\n  Hint: Raise ContainerOptions::max_depth or flatten the dependency graph")]
    ResolutionTooDeep { key: TypeKey, depth: usize },

    /// A longer-lived service depends on a shorter-lived one.
    #[error("{}", .0)]
    ScopeMismatch(ScopeMismatchError),

    /// A required service has no registration.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// A factory or constructor failed, or returned the wrong type.
    #[error("Failed to construct {key}: {source}")]
    ConstructionFailed {
        key: TypeKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn requested_name(service: &Option<TypeKey>) -> &'static str {
    service.as_ref().map_or("<scope>", TypeKey::type_name)
}

impl KafilError {
    pub(crate) fn construction(key: &TypeKey, reason: impl Into<String>) -> Self {
        KafilError::ConstructionFailed {
            key: key.clone(),
            source: reason.into().into(),
        }
    }
}

/// Why a registration could not be activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationIssue {
    /// Implementation is an interface/abstract type, or missing entirely.
    NotConstructible,
    /// Implementation declares no public constructor.
    NoPublicConstructor,
    /// Open generic implementation has no closing for these arguments.
    MissingClosing { arguments: Vec<TypeKey> },
}

/// Error when a registration points at something that cannot be built.
#[derive(Debug)]
pub struct ConfigurationError {
    pub service: TypeKey,
    pub implementation: Option<TypeKey>,
    pub issue: ConfigurationIssue,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let implementation = self
            .implementation
            .as_ref()
            .map_or("<none>", |k| k.type_name());

        match &self.issue {
            ConfigurationIssue::NotConstructible => {
                write!(
                    f,
                    "Invalid service registration: {} -> {implementation} is not constructible",
                    self.service
                )?;
                write!(
                    f,
                    "\n  Hint: Register a concrete implementation, an instance or a factory"
                )
            }
            ConfigurationIssue::NoPublicConstructor => {
                write!(
                    f,
                    "Service {} has no public constructor ({implementation})",
                    self.service
                )?;
                write!(f, "\n  Hint: Add one with Implementation::constructor()")
            }
            ConfigurationIssue::MissingClosing { arguments } => {
                let args: Vec<String> = arguments
                    .iter()
                    .map(|k| shorten_type_name(k.type_name()))
                    .collect();
                write!(
                    f,
                    "Open generic {implementation} cannot be closed over <{}> for {}",
                    args.join(", "),
                    self.service
                )?;
                write!(f, "\n  Hint: Add a closing with OpenGeneric::close()")
            }
        }
    }
}

/// Error when a circular dependency is detected.
///
/// Shows the full resolution chain so you can see WHERE the cycle is.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Keys from the first occurrence of the repeated service to its
    /// re-entry, e.g. `[A, B, C, A]`.
    pub chain: Vec<TypeKey>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.chain.iter().map(|k| k.type_name()).collect();
        write!(f, "Circular dependency detected:\n  {}", render_chain(&names))?;
        write!(
            f,
            "\n  Hint: Break the cycle with a factory that resolves lazily, or restructure the services"
        )
    }
}

/// Error when a consumer would capture a dependency that dies sooner.
#[derive(Debug)]
pub struct ScopeMismatchError {
    pub dependency: TypeKey,
    pub dependency_lifetime: Lifetime,
    pub consumer: TypeKey,
    pub consumer_lifetime: Lifetime,
}

impl fmt::Display for ScopeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scope mismatch: {} ({}) depends on {} ({})",
            self.consumer, self.consumer_lifetime, self.dependency, self.dependency_lifetime,
        )?;
        write!(
            f,
            "\n  A {} service would keep a {} instance alive past its scope",
            self.consumer_lifetime, self.dependency_lifetime,
        )?;
        write!(
            f,
            "\n  Hint: Change {} to {} or wider",
            self.dependency, self.consumer_lifetime,
        )
    }
}

/// Error when a required service was never registered.
#[derive(Debug)]
pub struct NotRegisteredError {
    pub requested: TypeKey,
    /// Registered names that look like the requested one.
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service not registered: {}", self.requested)?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Did you forget a Registration for {}?",
            shorten_type_name(self.requested.type_name())
        )
    }
}

/// Convenient Result type for Kafil operations.
pub type Result<T> = std::result::Result<T, KafilError>;

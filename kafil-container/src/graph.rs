//! Dependency graph validation.
//!
//! Validates the registrations when a root container is built:
//! - Detects circular dependencies between constructors
//! - Reports dependencies that nothing provides
//! - Reports longer-lived services capturing shorter-lived ones
//!
//! Only circular dependencies (and, under strict lifetimes, captive
//! dependencies) fail the build. Missing dependencies are passed as absent
//! at activation time, so they are only logged.
//!
//! Factories are opaque: their dependencies are only discovered, and cycles
//! through them only detected, when they run.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use crate::activation::select_constructor;
use crate::error::{CircularDependencyError, KafilError, Result, ScopeMismatchError};
use crate::key::TypeKey;
use crate::lifetime::Lifetime;
use crate::options::ContainerOptions;
use crate::registration::Registration;

/// Validates `registrations` the way building a container does, returning
/// what was only logged.
///
/// Useful in an application's own tests to assert a clean graph.
///
/// ```rust
/// use kafil_container::graph;
/// use kafil_container::prelude::*;
///
/// struct Clock;
///
/// let registrations = vec![Registration::bind::<Clock>(
///     Lifetime::Singleton,
///     Implementation::of::<Clock>().constructor([], |_| Ok(Clock)),
/// )];
/// let findings = graph::validate(&registrations, &ContainerOptions::default()).unwrap();
/// assert!(findings.is_empty());
/// ```
pub fn validate(registrations: &[Registration], options: &ContainerOptions) -> Result<Vec<Finding>> {
    let mut validator = GraphValidator::new(registrations, options.strict_lifetimes);
    validator.validate()?;
    Ok(validator.findings)
}

/// Something suspicious the validator logged without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// `consumer` needs `dependency` and nothing provides it.
    Missing { consumer: TypeKey, dependency: TypeKey },
    /// `consumer` outlives the `dependency` it captures.
    Captive {
        consumer: TypeKey,
        consumer_lifetime: Lifetime,
        dependency: TypeKey,
        dependency_lifetime: Lifetime,
    },
}

#[derive(Debug, Clone)]
struct Edge {
    key: TypeKey,
    has_default: bool,
}

#[derive(Debug, Clone)]
struct Node {
    lifetime: Lifetime,
    /// Parameters of the constructor activation would pick.
    dependencies: Vec<Edge>,
}

/// Validates the dependency graph for correctness.
///
/// # Algorithm
/// Depth-first search from every registered service in registration
/// order. The current path doubles as the cycle report.
pub(crate) struct GraphValidator {
    /// Effective registration per service (the last one wins)
    nodes: HashMap<TypeKey, Node>,
    /// Services in first-registration order
    order: Vec<TypeKey>,
    strict_lifetimes: bool,
    visiting: HashSet<TypeKey>,
    validated: HashSet<TypeKey>,
    path: Vec<TypeKey>,
    findings: Vec<Finding>,
}

impl GraphValidator {
    pub fn new(registrations: &[Registration], strict_lifetimes: bool) -> Self {
        let mut nodes = HashMap::new();
        let mut order = Vec::new();

        for registration in registrations {
            let node = Node {
                lifetime: registration.lifetime(),
                dependencies: edges_of(registration),
            };
            if nodes.insert(registration.service().clone(), node).is_none() {
                order.push(registration.service().clone());
            }
        }

        Self {
            nodes,
            order,
            strict_lifetimes,
            visiting: HashSet::new(),
            validated: HashSet::new(),
            path: Vec::new(),
            findings: Vec::new(),
        }
    }

    /// Validates the entire graph.
    ///
    /// # Errors
    /// - [`KafilError::CircularDependency`]: cycle detected
    /// - [`KafilError::ScopeMismatch`]: captive dependency under strict lifetimes
    #[instrument(skip(self), name = "graph_validation")]
    pub fn validate(&mut self) -> Result<()> {
        debug!(
            service_count = self.order.len(),
            "Starting dependency graph validation"
        );

        for key in self.order.clone() {
            if !self.validated.contains(&key) {
                self.validate_key(&key)?;
            }
        }

        debug!(
            findings = self.findings.len(),
            "Dependency graph validation passed ✓"
        );
        Ok(())
    }

    #[cfg(test)]
    fn findings(&self) -> &[Finding] {
        &self.findings
    }

    fn validate_key(&mut self, key: &TypeKey) -> Result<()> {
        if self.validated.contains(key) {
            return Ok(());
        }

        if self.visiting.contains(key) {
            let cycle_start = self.path.iter().position(|k| k == key).unwrap_or(0);
            let mut chain: Vec<TypeKey> = self.path[cycle_start..].to_vec();
            chain.push(key.clone());

            warn!(cycle = ?chain, "Circular dependency detected!");
            return Err(KafilError::CircularDependency(CircularDependencyError {
                chain,
            }));
        }

        let Some(node) = self.nodes.get(key).cloned() else {
            return Ok(());
        };

        self.visiting.insert(key.clone());
        self.path.push(key.clone());

        for edge in &node.dependencies {
            match self.provider_of(&edge.key) {
                Some((target, lifetime)) => {
                    self.check_lifetimes(key, node.lifetime, &edge.key, lifetime)?;
                    self.validate_key(&target)?;
                }
                // an empty collection is a valid collection
                None if edge.has_default || edge.key.element().is_some() => {}
                None => {
                    warn!(
                        consumer = %key,
                        dependency = %edge.key,
                        "Dependency is not registered, it will be passed as absent"
                    );
                    self.findings.push(Finding::Missing {
                        consumer: key.clone(),
                        dependency: edge.key.clone(),
                    });
                }
            }
        }

        self.path.pop();
        self.visiting.remove(key);
        self.validated.insert(key.clone());

        Ok(())
    }

    /// The node resolution of `key` lands on, mirroring registration lookup.
    fn provider_of(&self, key: &TypeKey) -> Option<(TypeKey, Lifetime)> {
        let direct = |k: &TypeKey| self.nodes.get(k).map(|node| (k.clone(), node.lifetime));

        direct(key)
            .or_else(|| key.definition().and_then(direct))
            .or_else(|| {
                let element = key.element()?;
                direct(element).or_else(|| element.definition().and_then(direct))
            })
    }

    /// A dependency must not die before its consumer.
    ///
    /// Singleton > Scoped > Transient
    fn check_lifetimes(
        &mut self,
        consumer: &TypeKey,
        consumer_lifetime: Lifetime,
        dependency: &TypeKey,
        dependency_lifetime: Lifetime,
    ) -> Result<()> {
        if consumer_lifetime <= dependency_lifetime {
            return Ok(());
        }

        warn!(
            consumer = %consumer,
            consumer_lifetime = %consumer_lifetime,
            dependency = %dependency,
            dependency_lifetime = %dependency_lifetime,
            "Scope mismatch detected"
        );

        if self.strict_lifetimes {
            return Err(KafilError::ScopeMismatch(ScopeMismatchError {
                dependency: dependency.clone(),
                dependency_lifetime,
                consumer: consumer.clone(),
                consumer_lifetime,
            }));
        }

        self.findings.push(Finding::Captive {
            consumer: consumer.clone(),
            consumer_lifetime,
            dependency: dependency.clone(),
            dependency_lifetime,
        });
        Ok(())
    }
}

fn edges_of(registration: &Registration) -> Vec<Edge> {
    registration
        .implementation()
        .and_then(|implementation| select_constructor(implementation.constructors()))
        .map(|constructor| {
            constructor
                .parameters()
                .iter()
                .map(|parameter| Edge {
                    key: parameter.key().clone(),
                    has_default: parameter.has_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

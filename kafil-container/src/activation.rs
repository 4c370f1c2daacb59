//! Activation engine: turns a registration into an instance.
//!
//! Rules, in priority order:
//! 1. a pre-built instance is returned unchanged;
//! 2. a factory is invoked with the resolving scope;
//! 3. otherwise the implementation descriptor is closed (open generics),
//!    its constructor is selected, every parameter is resolved through the
//!    same scope and the constructor is invoked.
//!
//! The selected constructor is cached per implementation type in the
//! root-owned [`PlanCache`], so later activations only redo dependency
//! resolution.

use std::cell::RefCell;
use std::marker::PhantomData;

use dashmap::DashMap;
use tracing::{trace, warn};

use crate::container::Container;
use crate::error::{CircularDependencyError, ConfigurationIssue, KafilError, Result};
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::registration::{Arguments, Constructor, Implementation, Registration, Source};

// ═══════════════════════════════════════════
// Re-entrancy guard
// ═══════════════════════════════════════════

thread_local! {
    static CHAIN: RefCell<Vec<TypeKey>> = const { RefCell::new(Vec::new()) };
}

/// Marks `key` as being resolved on this thread until dropped.
///
/// Resolution is synchronous, so a key showing up twice in the same
/// thread's chain is a dependency cycle.
pub(crate) struct ResolutionGuard {
    // must be dropped on the thread that created it
    _not_send: PhantomData<*const ()>,
}

impl ResolutionGuard {
    pub fn enter(key: &TypeKey, max_depth: usize) -> Result<Self> {
        CHAIN.with(|chain| {
            let mut chain = chain.borrow_mut();

            if let Some(start) = chain.iter().position(|k| k == key) {
                let mut cycle = chain[start..].to_vec();
                cycle.push(key.clone());
                warn!(cycle = ?cycle, "Circular dependency detected");
                return Err(KafilError::CircularDependency(CircularDependencyError {
                    chain: cycle,
                }));
            }

            if chain.len() >= max_depth {
                return Err(KafilError::ResolutionTooDeep {
                    key: key.clone(),
                    depth: max_depth,
                });
            }

            chain.push(key.clone());
            Ok(ResolutionGuard {
                _not_send: PhantomData,
            })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        CHAIN.with(|chain| {
            chain.borrow_mut().pop();
        });
    }
}

// ═══════════════════════════════════════════
// Plan cache
// ═══════════════════════════════════════════

/// Selected constructor per implementation type.
pub(crate) struct PlanCache {
    plans: DashMap<TypeKey, Constructor>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self {
            plans: DashMap::new(),
        }
    }

    /// Returns the cached plan for `implementation`, selecting one on a miss.
    ///
    /// Concurrent misses may both select; the first published plan wins.
    pub fn plan_for(&self, requested: &TypeKey, implementation: &Implementation) -> Result<Constructor> {
        if let Some(plan) = self.plans.get(implementation.key()) {
            return Ok(plan.value().clone());
        }

        let selected = select_constructor(implementation.constructors())
            .ok_or_else(|| implementation.configuration(requested, ConfigurationIssue::NoPublicConstructor))?;

        trace!(
            implementation = %implementation.key(),
            arity = selected.arity(),
            "Cached activation plan"
        );
        Ok(self
            .plans
            .entry(implementation.key().clone())
            .or_insert(selected)
            .value()
            .clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.plans.len()
    }
}

/// Fewest parameters wins; the first declared wins ties.
// TODO: pick the constructor whose parameters are all resolvable once
// registrations can be queried without activating them.
pub(crate) fn select_constructor(constructors: &[Constructor]) -> Option<Constructor> {
    constructors.iter().min_by_key(|c| c.arity()).cloned()
}

// ═══════════════════════════════════════════
// Activator
// ═══════════════════════════════════════════

/// Activates registrations on behalf of one scope.
pub(crate) struct Activator<'a> {
    scope: &'a Container,
    plans: &'a PlanCache,
}

impl<'a> Activator<'a> {
    pub fn new(scope: &'a Container, plans: &'a PlanCache) -> Self {
        Self { scope, plans }
    }

    pub fn activate(&self, requested: &TypeKey, registration: &Registration) -> Result<Instance> {
        match registration.source() {
            Source::Instance(instance) => Ok(instance.clone()),
            Source::Factory { build, .. } => {
                trace!(service = %requested, "Invoking factory");
                build(self.scope)
            }
            Source::Implementation(implementation) => self.construct(requested, implementation),
        }
    }

    fn construct(&self, requested: &TypeKey, implementation: &Implementation) -> Result<Instance> {
        let implementation = implementation.close_for(requested)?;
        let plan = self.plans.plan_for(requested, implementation)?;

        let mut values = Vec::with_capacity(plan.arity());
        for parameter in plan.parameters() {
            let value = match self.scope.resolve_type(parameter.key())? {
                Some(value) => Some(value),
                None => {
                    let fallback = parameter.default_value();
                    if fallback.is_none() {
                        trace!(
                            implementation = %implementation.key(),
                            parameter = %parameter.key(),
                            "Passing absent argument"
                        );
                    }
                    fallback
                }
            };
            values.push(value);
        }

        let arguments = Arguments::new(implementation.key().clone(), values);
        let instance = plan.invoke(&arguments)?;
        implementation.expose(requested, instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::Parameter;

    struct A;
    struct B;
    struct Wide;

    #[test]
    fn guard_detects_reentry() {
        let _a = ResolutionGuard::enter(&TypeKey::of::<A>(), 16).unwrap();
        let _b = ResolutionGuard::enter(&TypeKey::of::<B>(), 16).unwrap();

        match ResolutionGuard::enter(&TypeKey::of::<A>(), 16) {
            Err(KafilError::CircularDependency(err)) => {
                assert_eq!(err.chain.len(), 3);
                assert_eq!(err.chain[0], TypeKey::of::<A>());
                assert_eq!(err.chain[2], TypeKey::of::<A>());
            }
            Err(other) => panic!("Expected CircularDependency, got: {other:?}"),
            Ok(_) => panic!("Expected CircularDependency"),
        }
    }

    #[test]
    fn guard_pops_on_drop() {
        {
            let _a = ResolutionGuard::enter(&TypeKey::of::<A>(), 16).unwrap();
        }
        assert!(ResolutionGuard::enter(&TypeKey::of::<A>(), 16).is_ok());
    }

    #[test]
    fn guard_enforces_depth() {
        let _a = ResolutionGuard::enter(&TypeKey::of::<A>(), 1).unwrap();
        assert!(matches!(
            ResolutionGuard::enter(&TypeKey::of::<B>(), 1),
            Err(KafilError::ResolutionTooDeep { depth: 1, .. })
        ));
    }

    fn wide() -> Implementation {
        Implementation::of::<Wide>()
            .constructor([Parameter::of::<A>(), Parameter::of::<B>()], |_| Ok(Wide))
            .constructor([Parameter::of::<B>()], |_| Ok(Wide))
            .constructor([Parameter::of::<A>()], |_| Ok(Wide))
            .into()
    }

    #[test]
    fn fewest_parameters_first_declared() {
        let implementation = wide();
        let chosen = select_constructor(implementation.constructors()).unwrap();
        assert_eq!(chosen.arity(), 1);
        assert_eq!(chosen.parameters()[0].key(), &TypeKey::of::<B>());
    }

    #[test]
    fn plan_is_cached_per_implementation() {
        let plans = PlanCache::new();
        let implementation = wide();
        let requested = TypeKey::of::<Wide>();

        plans.plan_for(&requested, &implementation).unwrap();
        plans.plan_for(&requested, &implementation).unwrap();
        assert_eq!(plans.len(), 1);
    }

    #[test]
    fn no_constructor_is_configuration_error() {
        let plans = PlanCache::new();
        let implementation: Implementation = Implementation::of::<Wide>().into();

        match plans.plan_for(&TypeKey::of::<Wide>(), &implementation) {
            Err(KafilError::Configuration(err)) => {
                assert_eq!(err.issue, ConfigurationIssue::NoPublicConstructor);
            }
            Err(other) => panic!("Expected Configuration, got: {other:?}"),
            Ok(_) => panic!("Expected Configuration"),
        }
    }
}

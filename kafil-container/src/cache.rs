//! Instance caches for Singleton and Scoped lifetimes.
//!
//! Entries are keyed by [`CacheKey`] so one service type registered with
//! several implementations caches each of them separately.
//!
//! Insertion is compute-then-publish: no lock is held while an instance is
//! activated (activation recurses into the container), and when two
//! threads race on the same key both may activate, but only the first
//! published instance is kept and handed to every caller. The losing
//! instance is dropped without being disposed, so registrable types must not
//! acquire anything beyond memory before the container owns them.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::dispose::DisposalReport;
use crate::error::{KafilError, Result};
use crate::instance::Instance;
use crate::key::TypeKey;

/// Identifies a cached instance: requested service + implementation.
///
/// Factories have no implementation type of their own, so each factory
/// registration is told apart by the id it received when it was created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    service: TypeKey,
    implementation: TypeKey,
    factory: Option<u64>,
}

impl CacheKey {
    pub fn new(service: TypeKey, implementation: TypeKey) -> Self {
        Self {
            service,
            implementation,
            factory: None,
        }
    }

    pub fn for_factory(service: TypeKey, factory: u64) -> Self {
        Self {
            implementation: service.clone(),
            service,
            factory: Some(factory),
        }
    }

    pub fn service(&self) -> &TypeKey {
        &self.service
    }

    pub fn implementation(&self) -> &TypeKey {
        &self.implementation
    }

    pub fn factory(&self) -> Option<u64> {
        self.factory
    }
}

/// Thread-safe get-or-create map that can be closed for teardown.
pub(crate) struct InstanceCache {
    entries: DashMap<CacheKey, Instance>,
    closed: AtomicBool,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the cached instance for `key`, activating it with `create`
    /// on a miss.
    ///
    /// # Errors
    /// [`KafilError::Disposed`] once the cache is closed; errors from
    /// `create` are passed through and nothing is cached.
    pub fn get_or_create(
        &self,
        key: CacheKey,
        create: impl FnOnce() -> Result<Instance>,
    ) -> Result<Instance> {
        if self.is_closed() {
            return Err(disposed(&key));
        }

        if let Some(hit) = self.entries.get(&key) {
            trace!(service = %key.service, "Cache hit");
            return Ok(hit.value().clone());
        }

        let created = create()?;
        let winner = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| created.clone())
            .value()
            .clone();

        if !winner.same_as(&created) {
            debug!(
                service = %key.service,
                implementation = %key.implementation,
                "Lost activation race, discarding duplicate instance"
            );
        }

        // Teardown may have drained the map between our miss and insert.
        if self.is_closed() {
            if let Some((_, orphan)) = self.entries.remove(&key) {
                let mut report = DisposalReport::default();
                report.release(&orphan);
            }
            return Err(disposed(&key));
        }

        Ok(winner)
    }

    /// Closes the cache and removes every entry, returning what it held.
    pub fn close_and_drain(&self) -> Vec<Instance> {
        self.closed.store(true, Ordering::Release);

        let keys: Vec<CacheKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|(_, instance)| instance))
            .collect()
    }
}

fn disposed(key: &CacheKey) -> KafilError {
    KafilError::Disposed {
        service: Some(key.service.clone()),
    }
}

//! # The Container: heart of Kafil
//!
//! A root container is built once from an ordered list of registrations.
//! Scopes are created from the root (or from another scope) and share its
//! registrations, its singleton cache and its activation plans.
//!
//! # Architecture
//! ```text
//! Vec<Registration>  ──Container::new()──>  root Container
//!                                              │  singletons, plans (shared)
//!                                        create_scope()
//!                                              │
//!                                              ▼
//!                                        scope Container
//!                                           scoped cache, transients (owned)
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use kafil_container::prelude::*;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str);
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) { println!("{msg}"); }
//! }
//!
//! struct UnitOfWork;
//!
//! let container = Container::new(vec![
//!     Registration::factory::<dyn Logger, _>(Lifetime::Singleton, |_| {
//!         Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>)
//!     }),
//!     Registration::bind::<UnitOfWork>(
//!         Lifetime::Scoped,
//!         Implementation::of::<UnitOfWork>().constructor([], |_| Ok(UnitOfWork)),
//!     ),
//! ])
//! .expect("Failed to build container");
//!
//! let scope = container.create_scope().unwrap();
//! let logger = scope.resolve_required::<dyn Logger>().unwrap();
//! logger.log("hello");
//!
//! let first = scope.resolve::<UnitOfWork>().unwrap().unwrap();
//! let second = scope.resolve::<UnitOfWork>().unwrap().unwrap();
//! assert!(Arc::ptr_eq(&first, &second));
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use kafil_support::rendering::suggest_similar;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace};

use crate::activation::{Activator, PlanCache, ResolutionGuard};
use crate::cache::InstanceCache;
use crate::dispose::DisposalReport;
use crate::error::{KafilError, NotRegisteredError, Result};
use crate::graph;
use crate::instance::Instance;
use crate::key::{Generic, TypeKey};
use crate::lifetime::Lifetime;
use crate::options::ContainerOptions;
use crate::registration::Registration;

const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

/// Where a container is in its teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Active,
    Disposing,
    Disposed,
}

// ═══════════════════════════════════════════
// Root state
// ═══════════════════════════════════════════

/// State owned by a root and shared with every scope derived from it.
struct RootState {
    registrations: Arc<[Registration]>,
    singletons: InstanceCache,
    plans: PlanCache,
    options: ContainerOptions,
    /// Registered service names, computed on the first failed required lookup.
    service_names: OnceCell<Vec<&'static str>>,
    next_scope_id: AtomicU64,
}

#[derive(Default)]
struct TransientBag {
    items: Vec<Instance>,
    closed: bool,
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Thread-safe service container: either a root or a scope.
///
/// Dropping a container disposes it.
pub struct Container {
    root: Arc<RootState>,
    id: u64,
    /// `None` on the root.
    scoped: Option<InstanceCache>,
    transients: Mutex<TransientBag>,
    state: AtomicU8,
    teardown: Mutex<()>,
}

impl Container {
    /// Build a root container with default options.
    pub fn new(registrations: Vec<Registration>) -> Result<Self> {
        Self::with_options(registrations, ContainerOptions::default())
    }

    /// Build a root container.
    ///
    /// With [`ContainerOptions::validate`] set, the dependency graph is
    /// checked first: cycles fail the build, captive lifetimes fail it under
    /// [`ContainerOptions::strict_lifetimes`] and are logged otherwise.
    #[instrument(skip_all, name = "container_build")]
    pub fn with_options(registrations: Vec<Registration>, options: ContainerOptions) -> Result<Self> {
        info!(registered = registrations.len(), "Building container");

        if options.validate {
            graph::validate(&registrations, &options)?;
        }

        let root = Arc::new(RootState {
            registrations: registrations.into(),
            singletons: InstanceCache::new(),
            plans: PlanCache::new(),
            options,
            service_names: OnceCell::new(),
            next_scope_id: AtomicU64::new(1),
        });

        info!("Container built successfully ✓");
        Ok(Self::attach(root, 0, None))
    }

    fn attach(root: Arc<RootState>, id: u64, scoped: Option<InstanceCache>) -> Self {
        Self {
            root,
            id,
            scoped,
            transients: Mutex::new(TransientBag::default()),
            state: AtomicU8::new(ACTIVE),
            teardown: Mutex::new(()),
        }
    }

    // ── Resolution ──

    /// Resolve the service registered for `key`.
    ///
    /// Returns `Ok(None)` when nothing is registered for it. Sequence keys
    /// with no registration of their own resolve to every registration of
    /// the element type, in registration order.
    ///
    /// # Errors
    /// Misuse (disposed container, Scoped service on the root), invalid
    /// registrations, cycles and failing constructors.
    pub fn resolve_type(&self, key: &TypeKey) -> Result<Option<Instance>> {
        self.ensure_active(Some(key))?;
        let _guard = ResolutionGuard::enter(key, self.root.options.max_depth)?;
        trace!(service = %key, scope = self.id, "Resolving");

        if let Some(registration) = self.lookup(key) {
            return self.resolve_registration(key, registration).map(Some);
        }

        if let Some(element) = key.element() {
            return self.resolve_sequence(key, element).map(Some);
        }

        Ok(None)
    }

    /// Resolve `T`, `Ok(None)` when it is not registered.
    ///
    /// ```rust,ignore
    /// let db: Option<Arc<dyn Database>> = container.resolve::<dyn Database>()?;
    /// ```
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        self.resolve_as::<T>(&TypeKey::of::<T>())
    }

    /// Resolve closed generic `T`, falling back to the registration of its
    /// open definition.
    pub fn resolve_generic<T: ?Sized + Generic + Send + Sync>(&self) -> Result<Option<Arc<T>>> {
        self.resolve_as::<T>(&TypeKey::closed::<T>())
    }

    /// Resolve every registration of `T`.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.collect_as::<T>(&TypeKey::sequence::<T>())
    }

    /// Resolve every registration of closed generic `T`, including the open
    /// registrations of its definition.
    pub fn resolve_all_generic<T: ?Sized + Generic + Send + Sync>(&self) -> Result<Vec<Arc<T>>> {
        self.collect_as::<T>(&TypeKey::closed_sequence::<T>())
    }

    /// Resolve `T`, treating a missing registration as an error.
    ///
    /// # Errors
    /// [`KafilError::NotRegistered`] with similarly named services, plus
    /// everything [`resolve_type`](Self::resolve_type) can return.
    pub fn resolve_required<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        self.resolve_as::<T>(&key)?
            .ok_or_else(|| self.not_registered(key))
    }

    fn resolve_as<T: ?Sized + Send + Sync + 'static>(&self, key: &TypeKey) -> Result<Option<Arc<T>>> {
        let Some(instance) = self.resolve_type(key)? else {
            return Ok(None);
        };

        instance.downcast::<T>().map(Some).ok_or_else(|| {
            KafilError::construction(
                key,
                format!(
                    "Type mismatch: expected {}, resolved {}",
                    type_name::<T>(),
                    instance.type_name()
                ),
            )
        })
    }

    fn collect_as<T: ?Sized + Send + Sync + 'static>(&self, key: &TypeKey) -> Result<Vec<Arc<T>>> {
        Ok(self
            .resolve_as::<Vec<Arc<T>>>(key)?
            .map(|items| (*items).clone())
            .unwrap_or_default())
    }

    /// Last registration for `key`, else the last one for its open definition.
    fn lookup(&self, key: &TypeKey) -> Option<&Registration> {
        let registrations = &self.root.registrations;
        registrations
            .iter()
            .rev()
            .find(|r| r.service() == key)
            .or_else(|| {
                let definition = key.definition()?;
                registrations.iter().rev().find(|r| r.service() == definition)
            })
    }

    fn resolve_registration(&self, requested: &TypeKey, registration: &Registration) -> Result<Instance> {
        let activator = Activator::new(self, &self.root.plans);

        // Pre-built instances belong to the caller: never cached or tracked.
        if registration.is_instance() {
            return activator.activate(requested, registration);
        }

        let lifetime = registration.lifetime();
        if !lifetime.is_cached() {
            let instance = activator.activate(requested, registration)?;
            if instance.is_disposable() {
                self.track(requested, &instance)?;
            }
            return Ok(instance);
        }

        let cache = match (lifetime, self.scoped.as_ref()) {
            (Lifetime::Singleton, _) => &self.root.singletons,
            (_, Some(scoped)) => scoped,
            (_, None) => {
                return Err(KafilError::LifetimeMisuse {
                    service: requested.clone(),
                });
            }
        };
        cache.get_or_create(registration.cache_key(requested), || {
            activator.activate(requested, registration)
        })
    }

    fn resolve_sequence(&self, key: &TypeKey, element: &TypeKey) -> Result<Instance> {
        let definition = element.definition();
        let mut items = Vec::new();

        for registration in self.root.registrations.iter() {
            let service = registration.service();
            if service == element || Some(service) == definition {
                items.push(self.resolve_registration(element, registration)?);
            }
        }

        trace!(service = %element, count = items.len(), "Resolved collection");
        match key.collector() {
            Some(collect) => Ok(collect(&items)),
            None => Err(KafilError::construction(key, "not a sequence type")),
        }
    }

    /// Hands a disposable transient to this container for teardown.
    fn track(&self, requested: &TypeKey, instance: &Instance) -> Result<()> {
        let mut bag = self.transients.lock();
        if bag.closed {
            drop(bag);
            let mut report = DisposalReport::default();
            report.release(instance);
            return Err(KafilError::Disposed {
                service: Some(requested.clone()),
            });
        }
        bag.items.push(instance.clone());
        Ok(())
    }

    fn not_registered(&self, requested: TypeKey) -> KafilError {
        let names = self.root.service_names.get_or_init(|| {
            self.root
                .registrations
                .iter()
                .map(|r| r.service().type_name())
                .collect()
        });

        KafilError::NotRegistered(NotRegisteredError {
            suggestions: suggest_similar(requested.type_name(), names.iter().copied(), 3),
            requested,
        })
    }

    // ── Scopes ──

    /// Create a child scope sharing this container's root.
    ///
    /// Scopes created from a scope are siblings of it: all of them hang off
    /// the same root and own their own scoped cache.
    ///
    /// # Errors
    /// [`KafilError::Disposed`] if this container or its root is disposed.
    pub fn create_scope(&self) -> Result<Container> {
        self.ensure_active(None)?;
        if self.root.singletons.is_closed() {
            return Err(KafilError::Disposed { service: None });
        }

        let id = self.root.next_scope_id.fetch_add(1, Ordering::Relaxed);
        debug!(scope = id, parent = self.id, "Creating new scope");
        Ok(Self::attach(self.root.clone(), id, Some(InstanceCache::new())))
    }

    // ── Teardown ──

    /// Dispose this container.
    ///
    /// The root releases every singleton and its own transients; a scope
    /// releases its scoped instances and its transients. Every release hook
    /// runs even when some fail. Only the first call does anything; later
    /// and concurrent calls return an empty report once it has finished.
    pub fn dispose(&self) -> DisposalReport {
        let _teardown = self.teardown.lock();
        let mut report = DisposalReport::default();

        if self.state() != ScopeState::Active {
            return report;
        }
        self.state.store(DISPOSING, Ordering::Release);

        let cached = match &self.scoped {
            Some(scoped) => scoped.close_and_drain(),
            None => self.root.singletons.close_and_drain(),
        };
        for instance in &cached {
            report.release(instance);
        }

        let transients = {
            let mut bag = self.transients.lock();
            bag.closed = true;
            std::mem::take(&mut bag.items)
        };
        for instance in transients.iter().rev() {
            report.release(instance);
        }

        self.state.store(DISPOSED, Ordering::Release);
        debug!(
            scope = self.id,
            root = self.is_root(),
            released = report.released(),
            failures = report.failures().len(),
            "Container disposed"
        );
        report
    }

    fn ensure_active(&self, service: Option<&TypeKey>) -> Result<()> {
        match self.state() {
            ScopeState::Active => Ok(()),
            _ => Err(KafilError::Disposed {
                service: service.cloned(),
            }),
        }
    }

    // ── Introspection ──

    pub fn is_root(&self) -> bool {
        self.scoped.is_none()
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == ScopeState::Disposed
    }

    pub fn state(&self) -> ScopeState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => ScopeState::Active,
            DISPOSING => ScopeState::Disposing,
            _ => ScopeState::Disposed,
        }
    }

    /// Registrations in registration order.
    pub fn registrations(&self) -> &[Registration] {
        &self.root.registrations
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.root.options
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = match &self.scoped {
            Some(scoped) => scoped.len(),
            None => self.root.singletons.len(),
        };
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("root", &self.is_root())
            .field("state", &self.state())
            .field("registered", &self.root.registrations.len())
            .field("cached", &cached)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ScopeState};
    pub use crate::dispose::{DisposalReport, Dispose, DisposeError};
    pub use crate::error::{KafilError, Result};
    pub use crate::instance::Instance;
    pub use crate::key::{Generic, TypeKey};
    pub use crate::lifetime::Lifetime;
    pub use crate::options::ContainerOptions;
    pub use crate::registration::{
        Arguments, Implementation, Injectable, OpenGeneric, Parameter, Registration,
    };
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

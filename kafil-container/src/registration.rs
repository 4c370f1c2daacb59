//! Registration records and implementation descriptors.
//!
//! A [`Registration`] maps a service type to the way its instances are
//! produced: a pre-built [`Instance`], a factory closure, or an
//! [`Implementation`] descriptor. Descriptors are the container's
//! constructor table: each concrete implementation lists its public
//! constructors as typed closures built once at registration time, so
//! activation never needs to inspect types at run time.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use kafil_container::prelude::*;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct FixedClock(u64);
//! impl Clock for FixedClock {
//!     fn now(&self) -> u64 { self.0 }
//! }
//!
//! struct Audit {
//!     clock: Option<Arc<dyn Clock>>,
//! }
//!
//! let registrations = vec![
//!     Registration::instance::<dyn Clock>(Arc::new(FixedClock(7))),
//!     Registration::bind::<Audit>(
//!         Lifetime::Transient,
//!         Implementation::of::<Audit>()
//!             .constructor([Parameter::of::<dyn Clock>()], |args| {
//!                 Ok(Audit { clock: args.get::<dyn Clock>(0) })
//!             }),
//!     ),
//! ];
//!
//! let container = Container::new(registrations).unwrap();
//! let audit = container.resolve::<Audit>().unwrap().unwrap();
//! assert_eq!(audit.clock.as_ref().unwrap().now(), 7);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::CacheKey;
use crate::container::Container;
use crate::dispose::Dispose;
use crate::error::{ConfigurationError, ConfigurationIssue, KafilError, Result};
use crate::instance::Instance;
use crate::key::{Generic, TypeKey};
use crate::lifetime::Lifetime;

/// Factory closure: receives the scope the resolution runs in.
pub type FactoryFn = Arc<dyn Fn(&Container) -> Result<Instance> + Send + Sync>;

type InvokeFn = Arc<dyn Fn(&Arguments) -> Result<Instance> + Send + Sync>;
type ExposeFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;
type DefaultFn = Arc<dyn Fn() -> Instance + Send + Sync>;

/// Types that describe their own implementation.
///
/// Lets [`Registration::of`] register a type as its own implementation.
pub trait Injectable: Send + Sync + Sized + 'static {
    fn implementation() -> Implementation;
}

// ───────────────────────────────────────────
// Parameters & arguments
// ───────────────────────────────────────────

/// One constructor parameter: the type to resolve and an optional default.
#[derive(Clone)]
pub struct Parameter {
    key: TypeKey,
    default: Option<DefaultFn>,
}

impl Parameter {
    /// A parameter resolved as `T`.
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::keyed(TypeKey::of::<T>())
    }

    /// A parameter of a closed generic type, so open registrations apply.
    pub fn closed<T: ?Sized + Generic + Send + Sync>() -> Self {
        Self::keyed(TypeKey::closed::<T>())
    }

    /// A parameter receiving every registration of `T`.
    pub fn sequence<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::keyed(TypeKey::sequence::<T>())
    }

    /// A parameter of type `T` that falls back to `default` when nothing is
    /// registered for it.
    pub fn with_default<T, F>(default: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<T>(),
            default: Some(Arc::new(move || Instance::new(Arc::new(default())))),
        }
    }

    fn keyed(key: TypeKey) -> Self {
        Self { key, default: None }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub(crate) fn default_value(&self) -> Option<Instance> {
        self.default.as_ref().map(|default| default())
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("key", &self.key)
            .field("has_default", &self.has_default())
            .finish()
    }
}

/// Resolved constructor arguments, positionally matching the parameters.
///
/// A parameter whose type is not registered and has no default is passed
/// as absent; the constructor decides whether that is acceptable.
pub struct Arguments {
    implementation: TypeKey,
    values: Vec<Option<Instance>>,
}

impl Arguments {
    pub(crate) fn new(implementation: TypeKey, values: Vec<Option<Instance>>) -> Self {
        Self {
            implementation,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether argument `index` was resolved (or defaulted).
    pub fn is_present(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(Some(_)))
    }

    /// Argument `index` as `Arc<T>`, `None` when absent or of another type.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Option<Arc<T>> {
        self.values.get(index)?.as_ref()?.downcast::<T>()
    }

    /// Argument `index`, failing construction when it is absent.
    pub fn required<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        self.get::<T>(index).ok_or_else(|| {
            KafilError::construction(
                &self.implementation,
                format!(
                    "argument {index} ({}) is missing",
                    std::any::type_name::<T>()
                ),
            )
        })
    }

    /// Argument `index` declared with [`Parameter::sequence`].
    pub fn all<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Vec<Arc<T>> {
        self.get::<Vec<Arc<T>>>(index)
            .map(|items| (*items).clone())
            .unwrap_or_default()
    }
}

// ───────────────────────────────────────────
// Constructors & implementations
// ───────────────────────────────────────────

/// A public constructor: its parameters and the closure that runs it.
#[derive(Clone)]
pub struct Constructor {
    parameters: Arc<[Parameter]>,
    invoke: InvokeFn,
}

impl Constructor {
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub(crate) fn invoke(&self, arguments: &Arguments) -> Result<Instance> {
        (self.invoke)(arguments)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[derive(Clone)]
enum Kind {
    Abstract,
    Concrete(Vec<Constructor>),
    Open(Arc<HashMap<Vec<TypeKey>, Implementation>>),
}

/// Describes how to construct an implementation type.
#[derive(Clone)]
pub struct Implementation {
    key: TypeKey,
    kind: Kind,
    expose: Option<ExposeFn>,
}

impl Implementation {
    /// Starts describing concrete type `I`.
    pub fn of<I: Send + Sync + 'static>() -> Concrete<I> {
        Concrete::new(Instance::new::<I>)
    }

    /// Starts describing concrete type `I` whose instances the container
    /// disposes at teardown.
    pub fn disposable<I: Dispose + 'static>() -> Concrete<I> {
        Concrete::new(Instance::disposable::<I>)
    }

    /// An interface or abstract type: registering it as an implementation
    /// is a configuration error surfaced at activation.
    pub fn abstract_type<T: ?Sized + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            kind: Kind::Abstract,
            expose: None,
        }
    }

    /// Starts describing an open generic implementation named by marker `D`.
    pub fn open<D: ?Sized + 'static>() -> OpenGeneric {
        OpenGeneric {
            key: TypeKey::of::<D>(),
            closings: HashMap::new(),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn is_open(&self) -> bool {
        matches!(self.kind, Kind::Open(_))
    }

    /// Public constructors of a concrete implementation.
    pub fn constructors(&self) -> &[Constructor] {
        match &self.kind {
            Kind::Concrete(constructors) => constructors,
            _ => &[],
        }
    }

    /// The concrete implementation to build for `requested`.
    ///
    /// Open generics are closed with the requested type's arguments.
    pub(crate) fn close_for(&self, requested: &TypeKey) -> Result<&Implementation> {
        match &self.kind {
            Kind::Concrete(_) => Ok(self),
            Kind::Abstract => Err(self.configuration(requested, ConfigurationIssue::NotConstructible)),
            Kind::Open(closings) => match closings.get(requested.arguments()) {
                Some(closed) => closed.close_for(requested),
                None => Err(self.configuration(
                    requested,
                    ConfigurationIssue::MissingClosing {
                        arguments: requested.arguments().to_vec(),
                    },
                )),
            },
        }
    }

    /// Key the activated instance is cached under, next to the service key.
    pub(crate) fn cache_identity(&self, requested: &TypeKey) -> TypeKey {
        self.close_for(requested)
            .map(|closed| closed.key.clone())
            .unwrap_or_else(|_| self.key.clone())
    }

    /// Converts a freshly built instance to the service type.
    pub(crate) fn expose(&self, requested: &TypeKey, instance: Instance) -> Result<Instance> {
        match &self.expose {
            None => Ok(instance),
            Some(expose) => expose(&instance).ok_or_else(|| {
                KafilError::construction(
                    requested,
                    format!(
                        "{} produced {}, which it cannot expose",
                        self.key,
                        instance.type_name()
                    ),
                )
            }),
        }
    }

    pub(crate) fn configuration(&self, requested: &TypeKey, issue: ConfigurationIssue) -> KafilError {
        KafilError::Configuration(ConfigurationError {
            service: requested.clone(),
            implementation: Some(self.key.clone()),
            issue,
        })
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Abstract => "abstract".to_string(),
            Kind::Concrete(constructors) => format!("{} constructor(s)", constructors.len()),
            Kind::Open(closings) => format!("open, {} closing(s)", closings.len()),
        };
        f.debug_struct("Implementation")
            .field("key", &self.key)
            .field("kind", &kind)
            .finish()
    }
}

/// Typed builder for a concrete implementation `I`.
pub struct Concrete<I> {
    constructors: Vec<Constructor>,
    wrap: fn(Arc<I>) -> Instance,
    _marker: PhantomData<fn() -> I>,
}

impl<I: Send + Sync + 'static> Concrete<I> {
    fn new(wrap: fn(Arc<I>) -> Instance) -> Self {
        Self {
            constructors: Vec::new(),
            wrap,
            _marker: PhantomData,
        }
    }

    /// Adds a public constructor.
    ///
    /// When several are declared, activation uses the one with the fewest
    /// parameters; ties go to the one declared first.
    pub fn constructor<P, F>(mut self, parameters: P, build: F) -> Self
    where
        P: IntoIterator<Item = Parameter>,
        F: Fn(&Arguments) -> Result<I> + Send + Sync + 'static,
    {
        let wrap = self.wrap;
        self.constructors.push(Constructor {
            parameters: parameters.into_iter().collect(),
            invoke: Arc::new(move |arguments: &Arguments| {
                build(arguments).map(|value| wrap(Arc::new(value)))
            }),
        });
        self
    }

    /// Exposes instances of `I` as service type `S`, typically a trait
    /// object: `.exposed_as::<dyn Store>(|store| store)`.
    pub fn exposed_as<S: ?Sized + Send + Sync + 'static>(self, cast: fn(Arc<I>) -> Arc<S>) -> Implementation {
        let mut implementation = self.finish();
        implementation.expose = Some(Arc::new(move |instance: &Instance| {
            instance
                .downcast::<I>()
                .map(|concrete| instance.retarget(cast(concrete)))
        }));
        implementation
    }

    fn finish(self) -> Implementation {
        Implementation {
            key: TypeKey::of::<I>(),
            kind: Kind::Concrete(self.constructors),
            expose: None,
        }
    }
}

impl<I: Send + Sync + 'static> From<Concrete<I>> for Implementation {
    fn from(concrete: Concrete<I>) -> Self {
        concrete.finish()
    }
}

/// Builder for an open generic implementation.
///
/// Each closing maps the type arguments of a requested service to the
/// concrete implementation built for them.
pub struct OpenGeneric {
    key: TypeKey,
    closings: HashMap<Vec<TypeKey>, Implementation>,
}

impl OpenGeneric {
    /// Adds the implementation used when closed generic service `S` is
    /// requested.
    pub fn close<S: ?Sized + Generic>(mut self, implementation: impl Into<Implementation>) -> Self {
        self.closings.insert(S::arguments(), implementation.into());
        self
    }
}

impl From<OpenGeneric> for Implementation {
    fn from(open: OpenGeneric) -> Self {
        Implementation {
            key: open.key,
            kind: Kind::Open(Arc::new(open.closings)),
            expose: None,
        }
    }
}

// ───────────────────────────────────────────
// Registration
// ───────────────────────────────────────────

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub(crate) enum Source {
    Instance(Instance),
    Factory { id: u64, build: FactoryFn },
    Implementation(Implementation),
}

/// An immutable registration record.
#[derive(Clone)]
pub struct Registration {
    service: TypeKey,
    lifetime: Lifetime,
    source: Source,
}

impl Registration {
    /// Registers `implementation` for `service`.
    pub fn new(service: TypeKey, lifetime: Lifetime, implementation: impl Into<Implementation>) -> Self {
        Self {
            service,
            lifetime,
            source: Source::Implementation(implementation.into()),
        }
    }

    /// Registers `T` as its own implementation.
    pub fn of<T: Injectable>(lifetime: Lifetime) -> Self {
        Self::new(TypeKey::of::<T>(), lifetime, T::implementation())
    }

    pub fn singleton<T: Injectable>() -> Self {
        Self::of::<T>(Lifetime::Singleton)
    }

    pub fn scoped<T: Injectable>() -> Self {
        Self::of::<T>(Lifetime::Scoped)
    }

    pub fn transient<T: Injectable>() -> Self {
        Self::of::<T>(Lifetime::Transient)
    }

    /// Registers `implementation` for service type `S`.
    pub fn bind<S: ?Sized + Send + Sync + 'static>(
        lifetime: Lifetime,
        implementation: impl Into<Implementation>,
    ) -> Self {
        Self::new(TypeKey::of::<S>(), lifetime, implementation)
    }

    /// Registers an open generic implementation for the open service
    /// definition `D`.
    pub fn open<D: ?Sized + 'static>(lifetime: Lifetime, implementation: OpenGeneric) -> Self {
        Self::new(TypeKey::of::<D>(), lifetime, implementation)
    }

    /// Registers a pre-built value.
    ///
    /// The value is returned as-is whatever the lifetime, and the caller
    /// keeps ownership: the container never disposes it.
    pub fn instance<S: ?Sized + Send + Sync + 'static>(value: Arc<S>) -> Self {
        Self {
            service: TypeKey::of::<S>(),
            lifetime: Lifetime::Singleton,
            source: Source::Instance(Instance::new(value)),
        }
    }

    /// Registers a factory producing `S`.
    pub fn factory<S, F>(lifetime: Lifetime, factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Self::raw_factory(TypeKey::of::<S>(), lifetime, move |scope: &Container| {
            factory(scope).map(Instance::new)
        })
    }

    /// Registers a factory producing a disposable `S`.
    pub fn disposable_factory<S, F>(lifetime: Lifetime, factory: F) -> Self
    where
        S: Dispose + 'static,
        F: Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Self::raw_factory(TypeKey::of::<S>(), lifetime, move |scope: &Container| {
            factory(scope).map(Instance::disposable)
        })
    }

    /// Registers a factory returning type-erased instances for `service`.
    pub fn raw_factory<F>(service: TypeKey, lifetime: Lifetime, factory: F) -> Self
    where
        F: Fn(&Container) -> Result<Instance> + Send + Sync + 'static,
    {
        Self {
            source: Source::Factory {
                id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
                build: Arc::new(factory),
            },
            service,
            lifetime,
        }
    }

    pub fn service(&self) -> &TypeKey {
        &self.service
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn implementation(&self) -> Option<&Implementation> {
        match &self.source {
            Source::Implementation(implementation) => Some(implementation),
            _ => None,
        }
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.source, Source::Instance(_))
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.source, Source::Factory { .. })
    }

    pub(crate) fn source(&self) -> &Source {
        &self.source
    }

    /// Cache slot of this registration when it serves `requested`.
    pub(crate) fn cache_key(&self, requested: &TypeKey) -> CacheKey {
        match &self.source {
            Source::Instance(instance) => CacheKey::new(requested.clone(), instance.type_key().clone()),
            Source::Factory { id, .. } => CacheKey::for_factory(requested.clone(), *id),
            Source::Implementation(implementation) => {
                CacheKey::new(requested.clone(), implementation.cache_identity(requested))
            }
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Instance(instance) => format!("instance of {}", instance.type_name()),
            Source::Factory { id, .. } => format!("factory #{id}"),
            Source::Implementation(implementation) => format!("{implementation:?}"),
        };
        f.debug_struct("Registration")
            .field("service", &self.service)
            .field("lifetime", &self.lifetime)
            .field("source", &source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock;

    impl Injectable for Clock {
        fn implementation() -> Implementation {
            Implementation::of::<Clock>().constructor([], |_| Ok(Clock)).into()
        }
    }

    trait Store: Send + Sync {}
    struct MemoryStore;
    impl Store for MemoryStore {}

    struct AnyStore;
    struct AnyMemoryStore;

    impl Generic for dyn Store {
        type Definition = AnyStore;
        fn arguments() -> Vec<TypeKey> {
            vec![TypeKey::of::<u8>()]
        }
    }

    #[test]
    fn injectable_registers_itself() {
        let registration = Registration::scoped::<Clock>();
        assert_eq!(registration.service(), &TypeKey::of::<Clock>());
        assert_eq!(registration.lifetime(), Lifetime::Scoped);
        assert_eq!(
            registration.implementation().map(|i| i.constructors().len()),
            Some(1)
        );
        assert!(!registration.is_instance());
        assert!(!registration.is_factory());
    }

    #[test]
    fn parameter_default_is_built_on_demand() {
        let parameter = Parameter::with_default(|| 3u16);
        assert!(parameter.has_default());
        let value = parameter.default_value().unwrap();
        assert_eq!(*value.downcast::<u16>().unwrap(), 3);
        assert!(!Parameter::of::<u16>().has_default());
    }

    #[test]
    fn required_argument_reports_the_implementation() {
        let arguments = Arguments::new(TypeKey::of::<Clock>(), vec![None]);
        assert!(!arguments.is_present(0));
        assert!(arguments.get::<u8>(0).is_none());

        match arguments.required::<u8>(0) {
            Err(KafilError::ConstructionFailed { key, source }) => {
                assert_eq!(key, TypeKey::of::<Clock>());
                assert!(source.to_string().contains("argument 0"));
            }
            other => panic!("Expected ConstructionFailed, got: {other:?}"),
        }
    }

    #[test]
    fn sequence_argument_defaults_to_empty() {
        let arguments = Arguments::new(TypeKey::of::<Clock>(), vec![None]);
        assert!(arguments.all::<dyn Store>(0).is_empty());
    }

    #[test]
    fn open_generic_closes_over_arguments() {
        let open: Implementation = Implementation::open::<AnyMemoryStore>()
            .close::<dyn Store>(
                Implementation::of::<MemoryStore>()
                    .constructor([], |_| Ok(MemoryStore))
                    .exposed_as::<dyn Store>(|store| store),
            )
            .into();
        let requested = TypeKey::closed::<dyn Store>();

        assert!(open.is_open());
        assert!(open.constructors().is_empty());
        let closed = open.close_for(&requested).unwrap();
        assert_eq!(closed.key(), &TypeKey::of::<MemoryStore>());
        assert_eq!(open.cache_identity(&requested), TypeKey::of::<MemoryStore>());

        // a plain key carries no arguments to close over
        assert!(matches!(
            open.close_for(&TypeKey::of::<dyn Store>()),
            Err(KafilError::Configuration(ConfigurationError {
                issue: ConfigurationIssue::MissingClosing { .. },
                ..
            }))
        ));
    }

    #[test]
    fn expose_rejects_foreign_instances() {
        let implementation = Implementation::of::<MemoryStore>()
            .constructor([], |_| Ok(MemoryStore))
            .exposed_as::<dyn Store>(|store| store);
        let requested = TypeKey::of::<dyn Store>();

        let exposed = implementation
            .expose(&requested, Instance::new(Arc::new(MemoryStore)))
            .unwrap();
        assert!(exposed.downcast::<dyn Store>().is_some());

        assert!(matches!(
            implementation.expose(&requested, Instance::new(Arc::new(1u8))),
            Err(KafilError::ConstructionFailed { .. })
        ));
    }

    #[test]
    fn abstract_implementation_is_not_constructible() {
        let implementation = Implementation::abstract_type::<dyn Store>();
        let err = implementation
            .close_for(&TypeKey::of::<dyn Store>())
            .unwrap_err();
        assert!(err.to_string().contains("not constructible"));
    }

    #[test]
    fn instance_registration_is_a_singleton() {
        let registration = Registration::instance::<dyn Store>(Arc::new(MemoryStore));
        assert!(registration.is_instance());
        assert_eq!(registration.lifetime(), Lifetime::Singleton);
        assert_eq!(
            registration.cache_key(&TypeKey::of::<dyn Store>()).implementation(),
            &TypeKey::of::<dyn Store>()
        );
    }

    #[test]
    fn each_factory_registration_has_its_own_cache_key() {
        fn memory() -> Registration {
            Registration::factory::<dyn Store, _>(Lifetime::Singleton, |_| {
                Ok(Arc::new(MemoryStore) as Arc<dyn Store>)
            })
        }

        let first = memory();
        let second = memory();
        let requested = TypeKey::of::<dyn Store>();

        assert!(first.is_factory());
        assert_ne!(first.cache_key(&requested), second.cache_key(&requested));
        // clones are the same registration
        assert_eq!(first.clone().cache_key(&requested), first.cache_key(&requested));
    }
}

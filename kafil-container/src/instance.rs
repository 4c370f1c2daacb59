//! Type-erased service instances.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::dispose::{Dispose, DisposeError};
use crate::key::TypeKey;

/// A resolved service value.
///
/// Holds an `Arc<T>` behind `dyn Any`, so trait-object services
/// (`T = dyn Trait`) are stored the same way as concrete ones. Cloning an
/// `Instance` clones the handle, never the service.
///
/// The container only learns whether a value can be released through the
/// instance: values built with [`Instance::disposable`] or
/// [`Instance::with_disposer`] are disposed by the scope that owns them.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_key: TypeKey,
    disposer: Option<Arc<dyn Dispose>>,
}

impl Instance {
    /// Wraps a value the container never needs to release.
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            type_key: TypeKey::of::<T>(),
            disposer: None,
        }
    }

    /// Wraps a value whose [`Dispose`] implementation runs at teardown.
    pub fn disposable<T: Dispose + 'static>(value: Arc<T>) -> Self {
        let disposer: Arc<dyn Dispose> = value.clone();
        Self::with_disposer(value, disposer)
    }

    /// Wraps a value with an explicit release hook.
    ///
    /// Useful for trait-object services, where the concrete type's
    /// [`Dispose`] impl is no longer reachable from `Arc<dyn Trait>`.
    pub fn with_disposer<T: ?Sized + Send + Sync + 'static>(
        value: Arc<T>,
        disposer: Arc<dyn Dispose>,
    ) -> Self {
        Self {
            value: Arc::new(value),
            type_key: TypeKey::of::<T>(),
            disposer: Some(disposer),
        }
    }

    /// Returns the service as `Arc<T>` if it was stored as `T`.
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Re-exposes the same underlying object as another type, keeping its
    /// release hook.
    pub(crate) fn retarget<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            type_key: TypeKey::of::<T>(),
            disposer: self.disposer.clone(),
        }
    }

    /// The type the value is stored as.
    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    pub fn type_name(&self) -> &'static str {
        self.type_key.type_name()
    }

    /// Whether the container has to release this value at teardown.
    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    /// Identity comparison: both handles came from the same activation.
    pub fn same_as(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn release(&self) -> Result<(), DisposeError> {
        match &self.disposer {
            Some(disposer) => crate::dispose::guarded(disposer.as_ref()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_key.type_name())
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

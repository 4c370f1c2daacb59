//! Service type identification.
//!
//! [`TypeKey`] identifies a service or implementation type within the
//! container. It combines a [`TypeId`] with the type's name and an optional
//! *shape*: a closed generic remembers its open definition and type
//! arguments, a sequence remembers its element type.
//!
//! Equality and hashing only look at the [`TypeId`]; the shape is metadata
//! the lookup uses to fall back to open generics or collection resolution.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::instance::Instance;

/// Implemented by closed generic service types so the container can fall
/// back to a registration made for their open definition.
///
/// Rust has no runtime notion of an unbound generic, so the open form is
/// named by a marker type.
///
/// # Examples
/// ```
/// use kafil_container::key::{Generic, TypeKey};
///
/// trait Repository<E>: Send + Sync {}
///
/// /// Open form of `dyn Repository<_>`.
/// struct AnyRepository;
///
/// struct User;
///
/// impl Generic for dyn Repository<User> {
///     type Definition = AnyRepository;
///     fn arguments() -> Vec<TypeKey> {
///         vec![TypeKey::of::<User>()]
///     }
/// }
///
/// let key = TypeKey::closed::<dyn Repository<User>>();
/// assert_eq!(key.definition(), Some(&TypeKey::of::<AnyRepository>()));
/// ```
pub trait Generic: 'static {
    /// Marker type standing for the unbound generic.
    type Definition: ?Sized + 'static;

    /// The type arguments this type was closed with, in declaration order.
    fn arguments() -> Vec<TypeKey>;
}

/// Collects resolved elements into the value a sequence key stands for.
pub(crate) type CollectFn = fn(&[Instance]) -> Instance;

#[derive(Clone)]
enum Shape {
    Plain,
    Closed {
        definition: Arc<TypeKey>,
        arguments: Arc<[TypeKey]>,
    },
    Sequence {
        element: Arc<TypeKey>,
        collect: CollectFn,
    },
}

/// Uniquely identifies a type known to the container.
///
/// # Examples
/// ```
/// use kafil_container::key::TypeKey;
///
/// let key = TypeKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert!(key.element().is_none());
///
/// let many = TypeKey::sequence::<String>();
/// assert_eq!(many.element(), Some(&key));
/// ```
#[derive(Clone)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
    shape: Shape,
}

impl TypeKey {
    /// Creates a plain key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            shape: Shape::Plain,
        }
    }

    /// Creates a key for a closed generic type.
    ///
    /// Equal to [`TypeKey::of::<T>()`](TypeKey::of), but lookups that find no
    /// exact registration retry with `T::Definition`.
    pub fn closed<T: ?Sized + Generic>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            shape: Shape::Closed {
                definition: Arc::new(Self::of::<T::Definition>()),
                arguments: T::arguments().into(),
            },
        }
    }

    /// Creates a key for "a sequence of `T`", resolved as `Vec<Arc<T>>`.
    pub fn sequence<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::sequence_over::<T>(Self::of::<T>())
    }

    /// Creates a key for "a sequence of `T`" where `T` is a closed generic.
    pub fn closed_sequence<T: ?Sized + Generic + Send + Sync>() -> Self {
        Self::sequence_over::<T>(Self::closed::<T>())
    }

    fn sequence_over<T: ?Sized + Send + Sync + 'static>(element: TypeKey) -> Self {
        Self {
            type_id: TypeId::of::<Vec<Arc<T>>>(),
            type_name: type_name::<Vec<Arc<T>>>(),
            shape: Shape::Sequence {
                element: Arc::new(element),
                collect: collect_sequence::<T>,
            },
        }
    }

    /// Returns the [`TypeId`] of this type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Open definition of a closed generic key.
    pub fn definition(&self) -> Option<&TypeKey> {
        match &self.shape {
            Shape::Closed { definition, .. } => Some(&**definition),
            _ => None,
        }
    }

    /// Type arguments of a closed generic key; empty otherwise.
    pub fn arguments(&self) -> &[TypeKey] {
        match &self.shape {
            Shape::Closed { arguments, .. } => &arguments[..],
            _ => &[],
        }
    }

    /// Element type of a sequence key.
    pub fn element(&self) -> Option<&TypeKey> {
        match &self.shape {
            Shape::Sequence { element, .. } => Some(&**element),
            _ => None,
        }
    }

    pub(crate) fn collector(&self) -> Option<CollectFn> {
        match &self.shape {
            Shape::Sequence { collect, .. } => Some(*collect),
            _ => None,
        }
    }
}

fn collect_sequence<T: ?Sized + Send + Sync + 'static>(items: &[Instance]) -> Instance {
    let collected: Vec<Arc<T>> = items
        .iter()
        .filter_map(|item| {
            let value = item.downcast::<T>();
            if value.is_none() {
                tracing::warn!(
                    element = std::any::type_name::<T>(),
                    actual = item.type_name(),
                    "Dropping sequence element of unexpected type"
                );
            }
            value
        })
        .collect();
    Instance::new(Arc::new(collected))
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.type_name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

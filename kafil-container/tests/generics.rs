//! Open generic registrations closed at resolution time.

use std::marker::PhantomData;
use std::sync::Arc;

use kafil_container::error::ConfigurationIssue;
use kafil_container::prelude::*;

trait Repository<E>: Send + Sync {
    fn entity(&self) -> &'static str;
}

/// Open form of `dyn Repository<_>`.
struct AnyRepository;

/// Open form of the `SqlRepository<_>` implementation.
struct AnySqlRepository;

struct SqlRepository<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E: 'static> Repository<E> for SqlRepository<E> {
    fn entity(&self) -> &'static str {
        std::any::type_name::<E>()
    }
}

struct User;
struct Order;
struct Invoice;

macro_rules! closed_repository {
    ($($entity:ty),*) => {$(
        impl Generic for dyn Repository<$entity> {
            type Definition = AnyRepository;
            fn arguments() -> Vec<TypeKey> {
                vec![TypeKey::of::<$entity>()]
            }
        }
    )*};
}

closed_repository!(User, Order, Invoice);

fn sql<E: Send + Sync + 'static>() -> Implementation {
    Implementation::of::<SqlRepository<E>>()
        .constructor([], |_| {
            Ok(SqlRepository {
                _entity: PhantomData,
            })
        })
        .exposed_as::<dyn Repository<E>>(|repo| repo)
}

fn open_repositories(lifetime: Lifetime) -> Registration {
    Registration::open::<AnyRepository>(
        lifetime,
        Implementation::open::<AnySqlRepository>()
            .close::<dyn Repository<User>>(sql::<User>())
            .close::<dyn Repository<Order>>(sql::<Order>()),
    )
}

#[test]
fn open_registration_serves_closed_requests() {
    let container = Container::new(vec![open_repositories(Lifetime::Singleton)]).unwrap();

    let users = container.resolve_generic::<dyn Repository<User>>().unwrap().unwrap();
    let orders = container.resolve_generic::<dyn Repository<Order>>().unwrap().unwrap();

    assert!(users.entity().ends_with("User"));
    assert!(orders.entity().ends_with("Order"));
}

#[test]
fn closed_singleton_is_shared_across_scopes() {
    let container = Container::new(vec![open_repositories(Lifetime::Singleton)]).unwrap();
    let scope = container.create_scope().unwrap();

    let a = container.resolve_generic::<dyn Repository<User>>().unwrap().unwrap();
    let b = scope.resolve_generic::<dyn Repository<User>>().unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn scoped_open_registration_is_per_scope() {
    let container = Container::new(vec![open_repositories(Lifetime::Scoped)]).unwrap();
    let left = container.create_scope().unwrap();
    let right = container.create_scope().unwrap();

    let l1 = left.resolve_generic::<dyn Repository<User>>().unwrap().unwrap();
    let l2 = left.resolve_generic::<dyn Repository<User>>().unwrap().unwrap();
    let r1 = right.resolve_generic::<dyn Repository<User>>().unwrap().unwrap();

    assert!(Arc::ptr_eq(&l1, &l2));
    assert!(!Arc::ptr_eq(&l1, &r1));
}

#[test]
fn missing_closing_is_a_configuration_error() {
    let container = Container::new(vec![open_repositories(Lifetime::Transient)]).unwrap();

    match container.resolve_generic::<dyn Repository<Invoice>>() {
        Err(KafilError::Configuration(err)) => {
            assert_eq!(
                err.issue,
                ConfigurationIssue::MissingClosing {
                    arguments: vec![TypeKey::of::<Invoice>()],
                }
            );
            assert_eq!(err.implementation, Some(TypeKey::of::<AnySqlRepository>()));
        }
        other => panic!("Expected Configuration, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn exact_registration_beats_open_one() {
    struct CachedUsers;
    impl Repository<User> for CachedUsers {
        fn entity(&self) -> &'static str {
            "cached"
        }
    }

    let container = Container::new(vec![
        Registration::instance::<dyn Repository<User>>(Arc::new(CachedUsers)),
        open_repositories(Lifetime::Singleton),
    ])
    .unwrap();

    let users = container.resolve_generic::<dyn Repository<User>>().unwrap().unwrap();
    assert_eq!(users.entity(), "cached");

    let orders = container.resolve_generic::<dyn Repository<Order>>().unwrap().unwrap();
    assert!(orders.entity().ends_with("Order"));
}

#[test]
fn plain_key_does_not_fall_back_to_open_registration() {
    let container = Container::new(vec![open_repositories(Lifetime::Singleton)]).unwrap();
    // without the closed shape the lookup has no definition to retry with
    assert!(container.resolve::<dyn Repository<User>>().unwrap().is_none());
}

#[test]
fn collection_includes_open_registrations() {
    struct AuditedUsers;
    impl Repository<User> for AuditedUsers {
        fn entity(&self) -> &'static str {
            "audited"
        }
    }

    let container = Container::new(vec![
        open_repositories(Lifetime::Singleton),
        Registration::instance::<dyn Repository<User>>(Arc::new(AuditedUsers)),
    ])
    .unwrap();

    let all = container
        .resolve_all_generic::<dyn Repository<User>>()
        .unwrap();
    let entities: Vec<&str> = all.iter().map(|r| r.entity()).collect();

    assert_eq!(entities.len(), 2);
    assert!(entities[0].ends_with("User"));
    assert_eq!(entities[1], "audited");
}

#[test]
fn generic_parameter_resolves_through_open_registration() {
    struct Checkout {
        orders: Arc<dyn Repository<Order>>,
    }

    let container = Container::new(vec![
        open_repositories(Lifetime::Singleton),
        Registration::bind::<Checkout>(
            Lifetime::Transient,
            Implementation::of::<Checkout>().constructor(
                [Parameter::closed::<dyn Repository<Order>>()],
                |args| {
                    Ok(Checkout {
                        orders: args.required::<dyn Repository<Order>>(0)?,
                    })
                },
            ),
        ),
    ])
    .unwrap();

    let checkout = container.resolve_required::<Checkout>().unwrap();
    assert!(checkout.orders.entity().ends_with("Order"));
}

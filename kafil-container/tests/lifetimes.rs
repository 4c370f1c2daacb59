//! Lifetime semantics across roots and scopes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kafil_container::prelude::*;

struct Counter {
    id: usize,
}

/// Registers `Counter` with a factory numbering every instance it builds.
fn counter(lifetime: Lifetime) -> Registration {
    let next = Arc::new(AtomicUsize::new(0));
    Registration::factory::<Counter, _>(lifetime, move |_| {
        Ok(Arc::new(Counter {
            id: next.fetch_add(1, Ordering::SeqCst),
        }))
    })
}

#[test]
fn unregistered_service_is_none() {
    struct Missing;

    let container = Container::new(vec![counter(Lifetime::Singleton)]).unwrap();
    let scope = container.create_scope().unwrap();

    assert!(container.resolve::<Missing>().unwrap().is_none());
    assert!(scope.resolve::<Missing>().unwrap().is_none());
    assert!(
        container
            .resolve_type(&TypeKey::of::<Missing>())
            .unwrap()
            .is_none()
    );
}

#[test]
fn singleton_is_shared_by_every_scope_of_a_root() {
    let container = Container::new(vec![counter(Lifetime::Singleton)]).unwrap();
    let scope = container.create_scope().unwrap();
    let nested = scope.create_scope().unwrap();

    let from_root = container.resolve_required::<Counter>().unwrap();
    let from_scope = scope.resolve_required::<Counter>().unwrap();
    let from_nested = nested.resolve_required::<Counter>().unwrap();

    assert!(Arc::ptr_eq(&from_root, &from_scope));
    assert!(Arc::ptr_eq(&from_root, &from_nested));
    assert_eq!(from_root.id, 0);
}

#[test]
fn singletons_are_not_shared_between_roots() {
    let first = Container::new(vec![counter(Lifetime::Singleton)]).unwrap();
    let second = Container::new(vec![counter(Lifetime::Singleton)]).unwrap();

    let a = first.resolve_required::<Counter>().unwrap();
    let b = second.resolve_required::<Counter>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn scoped_is_per_scope() {
    let container = Container::new(vec![counter(Lifetime::Scoped)]).unwrap();
    let left = container.create_scope().unwrap();
    let right = container.create_scope().unwrap();

    let l1 = left.resolve_required::<Counter>().unwrap();
    let l2 = left.resolve_required::<Counter>().unwrap();
    let r1 = right.resolve_required::<Counter>().unwrap();

    assert!(Arc::ptr_eq(&l1, &l2));
    assert!(!Arc::ptr_eq(&l1, &r1));
}

#[test]
fn nested_scope_owns_its_own_scoped_cache() {
    let container = Container::new(vec![counter(Lifetime::Scoped)]).unwrap();
    let outer = container.create_scope().unwrap();
    let inner = outer.create_scope().unwrap();

    let a = outer.resolve_required::<Counter>().unwrap();
    let b = inner.resolve_required::<Counter>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn transient_is_new_every_time() {
    let container = Container::new(vec![counter(Lifetime::Transient)]).unwrap();
    let scope = container.create_scope().unwrap();

    let ids: Vec<usize> = (0..5)
        .map(|_| scope.resolve_required::<Counter>().unwrap().id)
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn scoped_on_root_is_lifetime_misuse() {
    let container = Container::new(vec![counter(Lifetime::Scoped)]).unwrap();

    match container.resolve::<Counter>() {
        Err(KafilError::LifetimeMisuse { service }) => {
            assert_eq!(service, TypeKey::of::<Counter>());
        }
        other => panic!("Expected LifetimeMisuse, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn last_registration_wins() {
    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }
    struct English;
    impl Greeter for English {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }
    struct Uzbek;
    impl Greeter for Uzbek {
        fn greet(&self) -> &'static str {
            "salom"
        }
    }

    let container = Container::new(vec![
        Registration::instance::<dyn Greeter>(Arc::new(English)),
        Registration::instance::<dyn Greeter>(Arc::new(Uzbek)),
    ])
    .unwrap();

    let greeter = container.resolve_required::<dyn Greeter>().unwrap();
    assert_eq!(greeter.greet(), "salom");
}

#[test]
fn prebuilt_instance_is_returned_as_is() {
    struct Settings {
        name: &'static str,
    }

    let settings = Arc::new(Settings { name: "kafil" });
    let container = Container::new(vec![Registration::instance(settings.clone())]).unwrap();
    let scope = container.create_scope().unwrap();

    let resolved = scope.resolve_required::<Settings>().unwrap();
    assert!(Arc::ptr_eq(&resolved, &settings));
    assert_eq!(resolved.name, "kafil");
}

#[test]
fn constructor_dependencies_follow_their_own_lifetimes() {
    struct Handler {
        counter: Arc<Counter>,
    }

    let container = Container::new(vec![
        counter(Lifetime::Scoped),
        Registration::bind::<Handler>(
            Lifetime::Transient,
            Implementation::of::<Handler>().constructor([Parameter::of::<Counter>()], |args| {
                Ok(Handler {
                    counter: args.required::<Counter>(0)?,
                })
            }),
        ),
    ])
    .unwrap();

    let scope = container.create_scope().unwrap();
    let first = scope.resolve_required::<Handler>().unwrap();
    let second = scope.resolve_required::<Handler>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.counter, &second.counter));

    let other = container.create_scope().unwrap();
    let third = other.resolve_required::<Handler>().unwrap();
    assert!(!Arc::ptr_eq(&first.counter, &third.counter));
}

#[test]
fn fewest_parameter_constructor_is_used() {
    struct Mailer {
        via: &'static str,
    }

    let container = Container::new(vec![
        counter(Lifetime::Singleton),
        Registration::bind::<Mailer>(
            Lifetime::Transient,
            Implementation::of::<Mailer>()
                .constructor([Parameter::of::<Counter>()], |_| Ok(Mailer { via: "counter" }))
                .constructor([], |_| Ok(Mailer { via: "default" })),
        ),
    ])
    .unwrap();

    assert_eq!(container.resolve_required::<Mailer>().unwrap().via, "default");
}

//! 注入器公共 API 的端到端测试

use jeni::{
    dependency, Annotated, Annotation, Arguments, ConfigProvider, FnProvider, Injector, InjectorError,
    ProviderError, Resource,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 记录自身实例编号的数据库句柄
struct Db {
    id: usize,
}

fn db_factory(
    created: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
) -> impl Fn() -> Result<Resource<Db>, ProviderError> + Send + Sync + 'static {
    move || {
        let id = created.fetch_add(1, Ordering::SeqCst);
        let closed = closed.clone();
        Ok(Resource::new(Db { id })
            .with_subkeys(|db, table| Ok(dependency(format!("{}@{}", table, db.id))))
            .on_close(move |_| {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
    }
}

fn hello_provider() -> FnProvider {
    FnProvider::new(|name, _| Ok(dependency(format!("Hello, {}!", name.unwrap_or("world")))))
}

#[test]
fn test_subkey_is_passed_to_provider() {
    let injector = Injector::new();
    injector.provider("hello", hello_provider()).unwrap();

    assert_eq!(*injector.get_as::<String>("hello").unwrap(), "Hello, world!");
    assert_eq!(*injector.get_as::<String>("hello:jeni").unwrap(), "Hello, jeni!");
}

#[test]
fn test_annotated_callable_receives_dependencies() {
    let injector = Injector::new();
    injector.provider("hello", hello_provider()).unwrap();

    let greet = Annotated::new(
        Annotation::new().require("greeting", "hello:name"),
        |args: Arguments| args.value::<String>("greeting").unwrap(),
    );
    assert_eq!(injector.apply(&greet).unwrap(), "Hello, name!");
}

#[test]
fn test_namespace_shares_one_provider_instance() {
    let injector = Injector::new();
    let created = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    injector
        .factory("db", db_factory(created.clone(), closed.clone()))
        .unwrap();

    let users = injector.get_as::<String>("db:users").unwrap();
    let orders = injector.get_as::<String>("db:orders").unwrap();
    assert_eq!(*users, "users@0");
    assert_eq!(*orders, "orders@0");
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let first = injector.get_as::<Db>("db").unwrap();
    let second = injector.get_as::<Db>("db").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    injector.close().unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_scope_exit_closes_once_then_rebuilds() {
    let injector = Injector::new();
    let created = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    injector
        .factory("db", db_factory(created.clone(), closed.clone()))
        .unwrap();

    let first = injector
        .scoped(|inj| inj.get_as::<Db>("db").unwrap().id)
        .unwrap();
    assert_eq!(first, 0);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(!injector.is_realized("db"));

    let second = injector.get_as::<Db>("db").unwrap();
    assert_eq!(second.id, 1);
    assert_eq!(created.load(Ordering::SeqCst), 2);

    injector.close().unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_rebinding_after_resolution_fails() {
    let injector = Injector::new();
    injector.provider("hello", hello_provider()).unwrap();
    injector.get("hello").unwrap();

    let err = injector.provider("hello", hello_provider()).unwrap_err();
    assert!(matches!(err, InjectorError::RebindingError { ref base } if base == "hello"));
}

#[test]
fn test_rebinding_allowed_after_scope_eviction() {
    let injector = Injector::new();
    injector
        .factory("conn", || Ok(FnProvider::new(|_, _| Ok(dependency(1_u32)))))
        .unwrap();

    let scope = injector.enter().unwrap();
    injector.get("conn").unwrap();
    assert!(injector.value("conn", 2_u32).is_err());
    injector.exit(scope).unwrap();

    injector.value("conn", 2_u32).unwrap();
    assert_eq!(*injector.get_as::<u32>("conn").unwrap(), 2);
}

#[test]
fn test_partial_matches_apply() {
    let injector = Injector::new();
    injector.value("x", 20_i64).unwrap();
    injector.value("y", 22_i64).unwrap();

    let add = Annotated::new(
        Annotation::new().require("x", "x").require("y", "y"),
        |args: Arguments| args.value::<i64>("x").unwrap() + args.value::<i64>("y").unwrap(),
    );

    let applied = injector.apply(&add).unwrap();
    let lazy = injector.partial(add.clone()).unwrap().call().unwrap();
    let eager = injector.eager_partial(add).unwrap().call().unwrap();
    assert_eq!(applied, 42);
    assert_eq!(lazy, applied);
    assert_eq!(eager, applied);
}

#[test]
fn test_maybe_versus_required() {
    let injector = Injector::new();
    let target = Annotated::new(
        Annotation::new().maybe("label", "label").require("count", "count"),
        |args: Arguments| {
            let label = args.optional::<&'static str>("label").unwrap();
            (label.map(|l| *l), args.value::<u32>("count").unwrap())
        },
    );

    let err = injector.apply(&target).unwrap_err();
    assert!(matches!(
        err,
        InjectorError::UnsatisfiedDependency { parameter: Some(ref p), .. } if p == "count"
    ));

    injector.value("count", 3_u32).unwrap();
    assert_eq!(injector.apply(&target).unwrap(), (None, 3));

    injector.value("label", "items").unwrap();
    assert_eq!(injector.apply(&target).unwrap(), (Some("items"), 3));
}

#[test]
fn test_static_values_have_no_lifecycle() {
    let injector = Injector::new();
    injector.value("limit", 10_usize).unwrap();

    let scope = injector.enter().unwrap();
    assert_eq!(*injector.get_as::<usize>("limit").unwrap(), 10);
    injector.exit(scope).unwrap();

    assert!(!injector.is_realized("limit"));
    assert_eq!(*injector.get_as::<usize>("limit").unwrap(), 10);
    injector.close().unwrap();
}

#[test]
fn test_close_collects_every_failure() {
    let injector = Injector::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = order.clone();
        injector
            .factory(name, move || {
                let order = order.clone();
                Ok(FnProvider::new(|_, _| Ok(dependency(()))).on_close(move || {
                    order.lock().push(name);
                    if name == "second" {
                        Ok(())
                    } else {
                        Err(ProviderError::failed(format!("{} refused to close", name)))
                    }
                }))
            })
            .unwrap();
        injector.get(name).unwrap();
    }

    let err = injector.close().unwrap_err();
    match err {
        InjectorError::CloseAggregate(aggregate) => {
            assert_eq!(aggregate.bases(), vec!["third", "first"]);
            assert!(aggregate.to_string().contains("refused to close"));
        }
        other => panic!("expected aggregate close error, got {other}"),
    }
    assert_eq!(*order.lock(), vec!["third", "second", "first"]);
}

#[test]
fn test_closed_injector_rejects_everything() {
    let injector = Injector::new();
    injector.value("x", 1_u8).unwrap();
    injector.close().unwrap();

    assert!(injector.is_closed());
    assert!(matches!(injector.get("x"), Err(InjectorError::InjectorClosed)));
    assert!(matches!(injector.value("y", 2_u8), Err(InjectorError::InjectorClosed)));
    assert!(matches!(injector.enter(), Err(InjectorError::InjectorClosed)));
    assert!(matches!(injector.close(), Err(InjectorError::InjectorClosed)));
}

#[test]
fn test_factory_annotated_resolves_its_own_notes() {
    let injector = Injector::new();
    injector.value("dsn", "sqlite::memory:".to_string()).unwrap();

    let connect = Annotated::new(
        Annotation::new().require("dsn", "dsn"),
        |args: Arguments| Resource::new(format!("connected to {}", args.value::<String>("dsn").unwrap())),
    );
    injector.factory_annotated("conn", connect).unwrap();

    assert_eq!(
        *injector.get_as::<String>("conn").unwrap(),
        "connected to sqlite::memory:"
    );
}

#[test]
fn test_config_provider_answers_dotted_subkeys() {
    let config = ConfigProvider::from_toml_str(
        r#"
        [db]
        host = "localhost"
        port = 5432
        "#,
    )
    .unwrap();

    let injector = Injector::new();
    injector.provider("config", config).unwrap();

    let connect = Annotated::new(
        Annotation::new()
            .require("host", "config:db.host")
            .require("port", "config:db.port")
            .maybe("user", "config:db.user"),
        |args: Arguments| {
            let user = args
                .optional::<String>("user")
                .unwrap()
                .map(|u| (*u).clone())
                .unwrap_or_else(|| "anonymous".to_string());
            format!(
                "{}@{}:{}",
                user,
                args.value::<String>("host").unwrap(),
                args.value::<i64>("port").unwrap()
            )
        },
    );
    assert_eq!(injector.apply(&connect).unwrap(), "anonymous@localhost:5432");
    assert!(matches!(
        injector.get("config:db.password"),
        Err(InjectorError::UnsetDependency { .. })
    ));
}

fn recording_factory(
    name: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
    fail: bool,
) -> impl Fn() -> Result<FnProvider, ProviderError> + Send + Sync + 'static {
    move || {
        let order = order.clone();
        Ok(FnProvider::new(|_, _| Ok(dependency(()))).on_close(move || {
            order.lock().push(name);
            if fail {
                Err(ProviderError::failed(format!("{} refused to close", name)))
            } else {
                Ok(())
            }
        }))
    }
}

#[test]
fn test_close_walks_open_scopes_innermost_first() {
    let injector = Injector::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["a", "b", "c", "d"] {
        injector
            .factory(name, recording_factory(name, order.clone(), false))
            .unwrap();
    }

    injector.get("a").unwrap();
    let _outer = injector.enter().unwrap();
    injector.get("b").unwrap();
    let inner = injector.enter().unwrap();
    injector.get("c").unwrap();
    injector.get("d").unwrap();
    assert_eq!(injector.depth(), 2);

    injector.close().unwrap();
    assert_eq!(*order.lock(), vec!["d", "c", "b", "a"]);
    assert!(matches!(injector.exit(inner), Err(InjectorError::InjectorClosed)));
}

#[test]
fn test_scope_exit_reports_close_failures() {
    let injector = Injector::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    injector
        .factory("good", recording_factory("good", order.clone(), false))
        .unwrap();
    injector
        .factory("bad", recording_factory("bad", order.clone(), true))
        .unwrap();

    let scope = injector.enter().unwrap();
    injector.get("good").unwrap();
    injector.get("bad").unwrap();

    match injector.exit(scope).unwrap_err() {
        InjectorError::CloseAggregate(aggregate) => assert_eq!(aggregate.bases(), vec!["bad"]),
        other => panic!("expected aggregate close error, got {other}"),
    }
    assert_eq!(*order.lock(), vec!["bad", "good"]);
    assert_eq!(injector.depth(), 0);
    assert!(!injector.is_realized("bad"));
}

#[test]
fn test_annotated_callables_share_namespaced_provider() {
    let injector = Injector::new();
    let created = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    injector
        .factory("db", db_factory(created.clone(), closed.clone()))
        .unwrap();

    let list_users = Annotated::new(Annotation::new().require("table", "db:users"), |args: Arguments| {
        args.value::<String>("table").unwrap()
    });
    let list_orders = Annotated::new(Annotation::new().require("table", "db:orders"), |args: Arguments| {
        args.value::<String>("table").unwrap()
    });

    assert_eq!(injector.apply(&list_users).unwrap(), "users@0");
    assert_eq!(injector.apply(&list_orders).unwrap(), "orders@0");
    assert_eq!(created.load(Ordering::SeqCst), 1);

    injector.close().unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

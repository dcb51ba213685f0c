//! End-to-end tests for script bindings driven by the script system

use ecs_script::prelude::*;
use ecs_script::rhai::{Engine, EvalAltResult, INT};
use ecs_script::scripting::RuntimeState;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone, PartialEq, ScriptComponent)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, ScriptEvent)]
#[script(name = "Collision")]
struct CollisionEvent {
    a: Entity,
    b: Entity,
}

static RUNTIME: Mutex<()> = Mutex::new(());

/// Only one script runtime may be live in the process
fn serial() -> MutexGuard<'static, ()> {
    RUNTIME.lock().unwrap_or_else(PoisonError::into_inner)
}

fn scripts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scripts")
}

struct Fixture {
    system: ScriptSystem,
    entities: EntityManager,
    events: EventManager,
    // Released after the system has shut down
    _serial: MutexGuard<'static, ()>,
}

fn unconfigured(config: ScriptConfig) -> Fixture {
    let serial = serial();
    let events = EventManager::new();
    let mut system = ScriptSystem::new(config);
    system.expose_component::<Position>().unwrap();
    system.expose_event::<CollisionEvent>().unwrap();
    system
        .add_event_proxy::<CollisionEvent, _>(
            &events,
            event_proxy("on_collision", |event: &CollisionEvent| {
                vec![event.a.clone(), event.b.clone()]
            }),
        )
        .unwrap();
    Fixture {
        system,
        entities: EntityManager::new(),
        events,
        _serial: serial,
    }
}

fn fixture() -> Fixture {
    let mut fixture = unconfigured(ScriptConfig::new([scripts_dir()]));
    fixture.system.configure(&fixture.events).unwrap();
    fixture
}

fn collision(a: &Entity, b: &Entity) -> CollisionEvent {
    CollisionEvent {
        a: a.clone(),
        b: b.clone(),
    }
}

#[test]
fn test_system_update_calls_entity_update() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let script = fx
        .system
        .assign(&e, "tests.update_test", "UpdateTest", vec![])
        .unwrap();

    assert!(!script.object().get::<bool>("updated").unwrap());
    fx.system.update(&fx.entities, &fx.events, 0.1).unwrap();
    assert!(script.object().get::<bool>("updated").unwrap());
}

#[test]
fn test_component_assignment_creation_in_script() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let script = fx
        .system
        .assign(&e, "tests.assign_test", "AssignTest", vec![])
        .unwrap();

    assert!(e.component::<ComponentWrapper<Position>>().is_none());
    assert!(script.object().has_method("test_assign_create").unwrap());
    script
        .object()
        .invoke("test_assign_create", vec![])
        .unwrap();

    let position = e.component::<ComponentWrapper<Position>>().unwrap();
    assert_eq!(position.get(), Position { x: 1.0, y: 2.0 });
}

#[test]
fn test_component_assignment_existing_is_shared() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let native = ComponentWrapper::new(Position { x: 2.0, y: 3.0 });
    e.assign(native.clone()).unwrap();

    let script = fx
        .system
        .assign(&e, "tests.assign_test", "AssignTest", vec![])
        .unwrap();
    script
        .object()
        .invoke("test_assign_existing", vec![])
        .unwrap();

    assert_eq!(native.get(), Position { x: 3.0, y: 4.0 });
    assert!(e
        .component::<ComponentWrapper<Position>>()
        .unwrap()
        .ptr_eq(&native));
}

#[test]
fn test_entity_constructor_args() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let script = fx
        .system
        .assign(
            &e,
            "tests.constructor_test",
            "ConstructorTest",
            vec![Dynamic::from(4.0_f64), Dynamic::from(5.0_f64)],
        )
        .unwrap();

    let position = e.component::<ComponentWrapper<Position>>().unwrap();
    assert_eq!(position.get(), Position { x: 4.0, y: 5.0 });
    assert_eq!(script.args().len(), 2);
    assert_eq!(script.module(), "tests.constructor_test");
    assert_eq!(script.class(), "ConstructorTest");
}

#[test]
fn test_event_delivery_filters_implicated_entities() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let f = fx.entities.create();
    let g = fx.entities.create();
    let script_e = fx
        .system
        .assign(&e, "tests.event_test", "EventTest", vec![])
        .unwrap();
    let script_f = fx
        .system
        .assign(&f, "tests.event_test", "EventTest", vec![])
        .unwrap();

    assert!(!script_e.object().get::<bool>("collided").unwrap());
    assert!(!script_f.object().get::<bool>("collided").unwrap());

    fx.events.emit(collision(&f, &g)).unwrap();
    assert!(script_f.object().get::<bool>("collided").unwrap());
    assert!(!script_e.object().get::<bool>("collided").unwrap());
    assert_eq!(
        script_f.object().get::<INT>("partner").unwrap(),
        g.bits() as INT
    );

    fx.events.emit(collision(&e, &f)).unwrap();
    assert!(script_f.object().get::<bool>("collided").unwrap());
    assert!(script_e.object().get::<bool>("collided").unwrap());
    assert_eq!(
        script_e.object().get::<INT>("partner").unwrap(),
        f.bits() as INT
    );
}

#[test]
fn test_duplicate_implicated_entity_handled_once() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let script = fx
        .system
        .assign(&e, "tests.event_test", "EventTest", vec![])
        .unwrap();

    fx.events.emit(collision(&e, &e)).unwrap();
    assert_eq!(script.object().get::<INT>("collisions").unwrap(), 1);
}

#[test]
fn test_handler_error_propagates_out_of_emit() {
    let mut fx = fixture();
    let failing = fx.entities.create();
    let bystander = fx.entities.create();
    fx.system
        .assign(&failing, "tests.event_test", "FailingHandler", vec![])
        .unwrap();
    let script = fx
        .system
        .assign(&bystander, "tests.event_test", "EventTest", vec![])
        .unwrap();

    let err = fx.events.emit(collision(&failing, &bystander)).unwrap_err();
    match &err {
        ScriptError::Invocation { method, reason } => {
            assert_eq!(method, "on_collision");
            assert!(reason.contains("collision rejected on purpose"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Dispatch stopped before the second implicated entity
    assert!(!script.object().get::<bool>("collided").unwrap());
    assert!(fx
        .system
        .pending_error()
        .unwrap()
        .contains("tests.event_test.FailingHandler.on_collision"));

    // Further events are refused until the error is cleared
    assert!(matches!(
        fx.events.emit(collision(&bystander, &bystander)),
        Err(ScriptError::ErrorPending(_))
    ));
    assert!(!script.object().get::<bool>("collided").unwrap());

    assert!(fx.system.clear_error().is_some());
    assert!(fx.system.pending_error().is_none());
    fx.events.emit(collision(&bystander, &bystander)).unwrap();
    assert!(script.object().get::<bool>("collided").unwrap());
}

#[test]
fn test_events_skip_entities_without_handler() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let f = fx.entities.create();
    fx.system
        .assign(&e, "tests.hooks_test", "NoHooks", vec![])
        .unwrap();
    fx.system
        .assign(&f, "tests.hooks_test", "NotCallable", vec![])
        .unwrap();

    fx.events.emit(collision(&e, &f)).unwrap();
    assert!(fx.system.pending_error().is_none());
}

#[test]
fn test_missing_update_hooks_are_skipped() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let f = fx.entities.create();
    let no_hooks = fx
        .system
        .assign(&e, "tests.hooks_test", "NoHooks", vec![])
        .unwrap();
    let not_callable = fx
        .system
        .assign(&f, "tests.hooks_test", "NotCallable", vec![])
        .unwrap();

    assert!(!no_hooks.object().has_method("update").unwrap());
    assert!(!not_callable.object().has_method("update").unwrap());
    fx.system.update(&fx.entities, &fx.events, 0.016).unwrap();
    assert_eq!(not_callable.object().get::<INT>("update").unwrap(), 42);
}

#[test]
fn test_update_follows_binding_creation_order() {
    let printed = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut fx = unconfigured(ScriptConfig::new([scripts_dir()]));
    let sink = printed.clone();
    fx.system
        .log_to(move |text| sink.lock().unwrap().push(text.to_string()))
        .unwrap();
    fx.system.configure(&fx.events).unwrap();

    let x = fx.entities.create();
    let y = fx.entities.create();
    let z = fx.entities.create();
    for (entity, name) in [(&z, "first"), (&x, "second"), (&y, "third")] {
        fx.system
            .assign(entity, "tests.hooks_test", "Named", vec![Dynamic::from(name.to_string())])
            .unwrap();
    }

    fx.system.update(&fx.entities, &fx.events, 0.016).unwrap();
    assert_eq!(*printed.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn test_resolution_errors() {
    let mut fx = fixture();
    let e = fx.entities.create();

    let missing_module = fx
        .system
        .assign(&e, "tests.no_such_module", "Whatever", vec![])
        .unwrap_err();
    assert!(matches!(missing_module, ScriptError::Resolution { .. }));

    let missing_class = fx
        .system
        .assign(&e, "tests.update_test", "NoSuchClass", vec![])
        .unwrap_err();
    assert!(matches!(missing_class, ScriptError::Resolution { .. }));

    let bad_name = fx
        .system
        .assign(&e, "../tests.update_test", "UpdateTest", vec![])
        .unwrap_err();
    assert!(matches!(bad_name, ScriptError::Resolution { .. }));

    assert!(!e.has_component::<ScriptBinding>());
}

#[test]
fn test_construction_errors() {
    let mut fx = fixture();
    let e = fx.entities.create();

    let wrong_arity = fx
        .system
        .assign(
            &e,
            "tests.update_test",
            "UpdateTest",
            vec![Dynamic::from(1_i64)],
        )
        .unwrap_err();
    assert!(matches!(wrong_arity, ScriptError::Construction { .. }));

    let not_a_map = fx
        .system
        .assign(&e, "tests.hooks_test", "NotAnObject", vec![])
        .unwrap_err();
    assert!(matches!(not_a_map, ScriptError::Construction { .. }));

    let throwing = fx
        .system
        .assign(&e, "tests.hooks_test", "ThrowingConstructor", vec![])
        .unwrap_err();
    assert!(matches!(throwing, ScriptError::Construction { .. }));
    assert!(throwing.to_string().contains("constructor failed on purpose"));

    assert!(!e.has_component::<ScriptBinding>());
    // Construction failures do not leave the runtime in an error state
    assert!(fx.system.pending_error().is_none());
}

#[test]
fn test_invocation_error_aborts_frame_and_is_sticky() {
    let mut fx = fixture();
    let failing = fx.entities.create();
    let healthy = fx.entities.create();
    fx.system
        .assign(&failing, "tests.hooks_test", "Failing", vec![])
        .unwrap();
    let script = fx
        .system
        .assign(&healthy, "tests.update_test", "UpdateTest", vec![])
        .unwrap();

    let err = fx
        .system
        .update(&fx.entities, &fx.events, 0.016)
        .unwrap_err();
    assert!(err.is_invocation());
    assert!(err.to_string().contains("update failed on purpose"));
    // Aborted before reaching the later binding
    assert!(!script.object().get::<bool>("updated").unwrap());

    assert!(fx.system.pending_error().is_some());
    assert!(matches!(
        fx.system.update(&fx.entities, &fx.events, 0.016),
        Err(ScriptError::ErrorPending(_))
    ));
    assert!(matches!(
        fx.system
            .assign(&healthy, "tests.update_test", "UpdateTest", vec![]),
        Err(ScriptError::ErrorPending(_))
    ));

    assert!(fx.system.clear_error().is_some());
    failing.remove::<ScriptBinding>();
    fx.system.update(&fx.entities, &fx.events, 0.016).unwrap();
    assert!(script.object().get::<bool>("updated").unwrap());
}

#[test]
fn test_shutdown_with_live_bindings() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let script = fx
        .system
        .assign(&e, "tests.update_test", "UpdateTest", vec![])
        .unwrap();
    assert_eq!(fx.events.receiver_count::<CollisionEvent>(), 1);
    assert_eq!(fx.system.live_objects(), 1);

    fx.system.shutdown();
    assert_eq!(fx.system.runtime().state(), RuntimeState::ShutDown);
    assert_eq!(fx.events.receiver_count::<CollisionEvent>(), 0);

    assert!(!script.object().is_live());
    assert!(matches!(
        script.object().call_method("update", vec![Dynamic::from(0.1_f64)]),
        Err(ScriptError::Lifecycle(_))
    ));
    assert!(matches!(
        fx.system.update(&fx.entities, &fx.events, 0.1),
        Err(ScriptError::Lifecycle(_))
    ));
    assert!(matches!(
        fx.system.configure(&fx.events),
        Err(ScriptError::Lifecycle(_))
    ));

    // Events after shutdown reach nobody
    fx.events.emit(collision(&e, &e)).unwrap();

    fx.system.shutdown();
    drop(fx);
    assert!(script.object().get::<bool>("updated").is_err());
}

#[test]
fn test_configure_is_idempotent_and_locks_setup() {
    let mut fx = fixture();
    fx.system.configure(&fx.events).unwrap();
    assert!(fx.system.is_configured());

    assert!(matches!(
        fx.system.add_path(scripts_dir()),
        Err(ScriptError::Lifecycle(_))
    ));
    assert!(matches!(
        fx.system.expose_component::<Position>(),
        Err(ScriptError::Lifecycle(_))
    ));
    assert!(fx.system.log_to(|_| {}).is_err());
}

#[test]
fn test_assign_replaces_previous_binding() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let first = fx
        .system
        .assign(&e, "tests.update_test", "UpdateTest", vec![])
        .unwrap();
    let second = fx
        .system
        .assign(&e, "tests.event_test", "EventTest", vec![])
        .unwrap();

    let current = e.component::<ScriptBinding>().unwrap();
    assert!(current.object().ptr_eq(second.object()));
    assert_eq!(first.object().strong_count(), 1);
    assert!(second.serial() > first.serial());
}

#[test]
fn test_module_loaded_once() {
    let mut fx = fixture();
    for _ in 0..3 {
        let e = fx.entities.create();
        fx.system
            .assign(&e, "tests.update_test", "UpdateTest", vec![])
            .unwrap();
    }
    let e = fx.entities.create();
    fx.system
        .assign(&e, "tests.event_test", "EventTest", vec![])
        .unwrap();

    assert_eq!(
        fx.system.runtime().loaded_modules(),
        vec!["tests.event_test", "tests.update_test"]
    );
}

#[test]
fn test_search_paths_resolved_in_order() {
    let overrides = tempfile::tempdir().unwrap();
    fs::create_dir_all(overrides.path().join("tests")).unwrap();
    fs::write(
        overrides.path().join("tests/update_test.rhai"),
        r#"fn UpdateTest(entity) { #{ entity: entity, source: "override" } }"#,
    )
    .unwrap();

    let mut fx = unconfigured(ScriptConfig::new([scripts_dir()]));
    fx.system.add_path(overrides.path()).unwrap();
    fx.system.configure(&fx.events).unwrap();
    let e = fx.entities.create();
    let bundled = fx
        .system
        .assign(&e, "tests.update_test", "UpdateTest", vec![])
        .unwrap();
    // The bundled directory comes first, so the override is shadowed
    assert!(bundled.object().has_method("update").unwrap());
    drop(fx);

    let mut fx = unconfigured(ScriptConfig::new([
        overrides.path().to_path_buf(),
        scripts_dir(),
    ]));
    fx.system.configure(&fx.events).unwrap();
    let e = fx.entities.create();
    let overridden = fx
        .system
        .assign(&e, "tests.update_test", "UpdateTest", vec![])
        .unwrap();
    assert_eq!(overridden.object().get::<String>("source").unwrap(), "override");
    assert!(!overridden.object().has_method("update").unwrap());
}

#[test]
fn test_script_imports_use_search_paths() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let f = fx.entities.create();
    let script = fx
        .system
        .assign(&e, "tests.import_test", "ImportTest", vec![])
        .unwrap();
    assert_eq!(script.object().get::<INT>("doubled").unwrap(), 42);

    // Top-level imports stay visible to hooks on later frames
    fx.system.update(&fx.entities, &fx.events, 0.016).unwrap();
    fx.system.update(&fx.entities, &fx.events, 0.016).unwrap();
    assert_eq!(script.object().get::<INT>("doubled").unwrap(), 168);

    let local = fx
        .system
        .assign(&f, "tests.import_test", "LocalImportTest", vec![])
        .unwrap();
    assert_eq!(local.object().get::<INT>("doubled").unwrap(), 10);
}

#[test]
fn test_attribute_access_from_native_code() {
    let mut fx = fixture();
    let e = fx.entities.create();
    let script = fx
        .system
        .assign(&e, "tests.update_test", "UpdateTest", vec![])
        .unwrap();
    let object = script.object();

    object.set_attr("updated", true).unwrap();
    assert!(object.get::<bool>("updated").unwrap());
    assert_eq!(object.get::<Entity>("entity").unwrap(), e);

    assert!(matches!(
        object.get::<bool>("undeclared"),
        Err(ScriptError::MissingAttribute { .. })
    ));
    assert!(matches!(
        object.set_attr("undeclared", 1_i64),
        Err(ScriptError::MissingAttribute { .. })
    ));
    assert!(matches!(
        object.get::<INT>("updated"),
        Err(ScriptError::AttributeType { .. })
    ));
    assert!(matches!(
        object.invoke("undeclared", vec![]),
        Err(ScriptError::Invocation { .. })
    ));
}

fn register_poke(engine: &mut Engine) {
    engine
        .register_type_with_name::<ScriptObject>("ScriptObject")
        .register_fn(
            "poke",
            |object: &mut ScriptObject| -> Result<bool, Box<EvalAltResult>> {
                let pong = object
                    .invoke("ping", vec![])
                    .map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })?;
                Ok(pong.as_bool()?)
            },
        );
}

#[test]
fn test_nested_call_into_running_object() {
    let _serial = serial();
    let mut runtime = ecs_script::scripting::ScriptRuntime::new();
    runtime
        .initialize(&ScriptConfig::new([scripts_dir()]), &[register_poke], None)
        .unwrap();
    let entities = EntityManager::new();
    let e = entities.create();

    let object = runtime
        .factory()
        .unwrap()
        .create("tests.hooks_test", "Reentrant", &e, vec![])
        .unwrap();
    object
        .invoke("poke_self", vec![Dynamic::from(object.clone())])
        .unwrap();
    // The nested call ran to completion and its writes survived the outer one
    assert!(object.get::<bool>("nested").unwrap());
    assert_eq!(object.get::<INT>("pings").unwrap(), 1);

    assert!(object.invoke("ping", vec![]).unwrap().as_bool().unwrap());
    assert_eq!(object.get::<INT>("pings").unwrap(), 2);
}

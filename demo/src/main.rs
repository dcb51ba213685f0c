//! Demo entry point: scripted balls bouncing between two walls

use ecs_script::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

const FRAMES: usize = 120;
const DT: f64 = 0.1;
const CONTACT_DISTANCE: f32 = 0.5;

#[derive(Debug, Default, Clone, ScriptComponent)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Default, Clone, ScriptComponent)]
struct Velocity {
    dx: f32,
}

#[derive(Debug, Clone, ScriptEvent)]
struct Collision {
    a: Entity,
    b: Entity,
}

/// Load `scripting.json` next to the manifest, resolving relative paths against it
fn load_config() -> ScriptResult<ScriptConfig> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let path = root.join("scripting.json");
    let mut config = if path.is_file() {
        ScriptConfig::from_json_file(&path)?
    } else {
        ScriptConfig::new(["scripts"])
    };
    config.search_paths = config
        .search_paths
        .into_iter()
        .map(|dir| if dir.is_relative() { root.join(dir) } else { dir })
        .collect();
    Ok(config)
}

fn velocity(entity: &Entity) -> f32 {
    entity
        .component::<ComponentWrapper<Velocity>>()
        .map(|velocity| velocity.read().dx)
        .unwrap_or(0.0)
}

/// Emit a collision for every pair of bodies that touch while closing in
fn detect_collisions(entities: &EntityManager, events: &EventManager) -> ScriptResult<()> {
    let bodies = entities.query_cloned::<ComponentWrapper<Position>>();
    let mut hits = Vec::new();

    for (i, (a, position_a)) in bodies.iter().enumerate() {
        for (b, position_b) in &bodies[i + 1..] {
            let (xa, xb) = (position_a.read().x, position_b.read().x);
            let closing = (xb - xa) * (velocity(b) - velocity(a)) < 0.0;
            if (xa - xb).abs() < CONTACT_DISTANCE && closing {
                hits.push(Collision {
                    a: a.clone(),
                    b: b.clone(),
                });
            }
        }
    }

    for hit in hits {
        debug!(a = %hit.a, b = %hit.b, "Collision");
        events.emit(hit)?;
    }
    Ok(())
}

fn main() -> ScriptResult<()> {
    ecs_script::init_logging();
    info!("Starting script demo");

    let config = load_config()?;
    config.validate()?;

    let entities = EntityManager::new();
    let events = EventManager::new();

    let mut system = ScriptSystem::new(config);
    system.expose_component::<Position>()?;
    system.expose_component::<Velocity>()?;
    system.expose_event::<Collision>()?;
    system.add_event_proxy::<Collision, _>(
        &events,
        event_proxy("on_collision", |collision: &Collision| {
            vec![collision.a.clone(), collision.b.clone()]
        }),
    )?;
    system.configure(&events)?;

    for x in [-6.0_f64, 6.0] {
        let wall = entities.create();
        system.assign(&wall, "demo.wall", "Wall", vec![Dynamic::from(x)])?;
    }

    let mut balls = Vec::new();
    for (x, speed) in [(-3.0_f64, 2.0_f64), (0.0, -1.0), (3.0, 1.5)] {
        let ball = entities.create();
        let binding = system.assign(
            &ball,
            "demo.ball",
            "Ball",
            vec![Dynamic::from(x), Dynamic::from(speed)],
        )?;
        balls.push(binding);
    }

    for _ in 0..FRAMES {
        system.update(&entities, &events, DT)?;
        detect_collisions(&entities, &events)?;
    }

    for binding in &balls {
        let position = binding
            .entity()
            .component::<ComponentWrapper<Position>>()
            .map(|position| position.read().x)
            .unwrap_or_default();
        info!(
            entity = %binding.entity(),
            x = position,
            bounces = binding.object().get::<i64>("bounces")?,
            "Ball finished"
        );
    }

    // Release every script handle before the runtime goes away
    drop(balls);
    drop(entities);
    system.shutdown();
    Ok(())
}

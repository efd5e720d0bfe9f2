//! A small flock of movers on a wrapping grid.
//!
//! Movers drift by their velocity every tick. A sparse `Stunned` marker freezes a mover for a
//! few ticks without moving it between archetypes, and movers that reach the right edge split
//! in two while the world is being walked by a cursor.

use log::info;
use rusty_ecs::ecs::{Component, Entity, QueryBuilder, Result, Tag, Update, World, WorldConfig};

const WIDTH: f32 = 64.0;
const HEIGHT: f32 = 32.0;

#[derive(Component, Clone, Copy, Debug)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Clone, Copy, Debug)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Component, Clone, Copy, Debug)]
#[component(sparse)]
struct Stunned {
    ticks: u32,
}

#[derive(Tag)]
struct Offspring;

struct Tick {
    dt: f32,
}

impl Update for Position {
    type Args = (Velocity,);
    type Uniform = Tick;

    fn update(&mut self, _: Entity, (velocity,): (&Velocity,), tick: &Tick) {
        self.x = (self.x + velocity.dx * tick.dt).rem_euclid(WIDTH);
        self.y = (self.y + velocity.dy * tick.dt).rem_euclid(HEIGHT);
    }
}

impl Update for Stunned {
    type Args = ();
    type Uniform = ();

    fn update(&mut self, _: Entity, _: (), _: &()) {
        self.ticks = self.ticks.saturating_sub(1);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut world = World::with_config(WorldConfig::default().with_workers(4).with_min_chunk_len(16));
    world.set_uniform(Tick { dt: 1.0 });

    let movers = world.spawn_many((0..256).map(|i| {
        let i = i as f32;
        (
            Position {
                x: i % WIDTH,
                y: (i / WIDTH).floor(),
            },
            Velocity {
                dx: 0.25 + (i % 7.0) * 0.1,
                dy: (i % 3.0) - 1.0,
            },
        )
    }))?;
    for entity in movers.iter().step_by(5) {
        world.add(*entity, Stunned { ticks: 3 })?;
    }

    let stunned = QueryBuilder::new().with::<Stunned>().build(&mut world)?;
    let free = QueryBuilder::new()
        .with::<Position>()
        .without::<Stunned>()
        .build(&mut world)?;

    for tick in 0..10 {
        // Stunned movers hold still: move everyone, then put the stunned ones back.
        let mut held = Vec::new();
        world.for_each_entity(&stunned, |entity, _: &mut Stunned| held.push(entity))?;
        let frozen: Vec<(Entity, Position)> = held
            .iter()
            .map(|&entity| world.get::<Position>(entity).map(|position| (entity, *position)))
            .collect::<Result<_>>()?;

        world.par_update::<Position>()?;
        for (entity, position) in frozen {
            world.set(entity, position)?;
        }

        world.update::<Stunned>()?;
        let mut recovered = Vec::new();
        world.for_each_entity(&stunned, |entity, stun: &mut Stunned| {
            if stun.ticks == 0 {
                recovered.push(entity);
            }
        })?;
        for entity in recovered {
            world.remove::<Stunned>(entity)?;
        }

        // Splits are staged while the cursor is open and land once it is dropped.
        let mut children = Vec::new();
        let mut cursor = world.cursor(&free)?;
        while cursor.advance() {
            let position = *cursor.get::<Position>()?;
            if position.x >= WIDTH - 1.0 {
                let velocity = *cursor.get::<Velocity>()?;
                let child = cursor.spawn((
                    Position { x: 0.0, ..position },
                    Velocity {
                        dx: velocity.dx,
                        dy: -velocity.dy,
                    },
                ))?;
                children.push(child);
            }
        }
        drop(cursor);
        for &child in &children {
            world.add_tag::<Offspring>(child)?;
        }

        info!(
            "tick {tick}: {} movers, {} stunned, {} splits",
            world.len(),
            world.query_len(&stunned)?,
            children.len(),
        );
    }

    let offspring = QueryBuilder::new().tagged::<Offspring>().build(&mut world)?;
    info!("{} tagged offspring", world.query_len(&offspring)?);
    world.check_invariants()?;
    Ok(())
}

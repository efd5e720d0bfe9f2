//! Combat benchmark scenario.
//!
//! Simulates a mid-sized game world with:
//! - 10,000 combatants spread over many archetypes (marker tags fragment the world)
//! - A sparse `Poisoned` effect applied and expired every frame
//! - Hostile tags toggled on a few entities per frame, forcing archetype migration
//!
//! This scenario tests:
//! - Iteration across fragmented archetypes
//! - Sparse filter cost on queries
//! - Structural churn (tag migration vs sparse toggling)

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rusty_ecs::ecs::{Entity, Query, QueryBuilder, Result, World, WorldConfig};

use crate::components::{
    DeltaTime, Health, Hostile, MarkerA, MarkerB, MarkerC, MarkerD, Poisoned, Position,
};
use crate::scenarios::Scenario;

/// Configuration for the combat benchmark.
pub struct CombatConfig {
    pub entity_count: usize,
    /// Entities poisoned each frame.
    pub poison_per_frame: usize,
    /// Entities whose hostility flips each frame.
    pub flips_per_frame: usize,
    pub delta_time: f32,
    pub seed: u64,
    pub workers: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            entity_count: 10_000,
            poison_per_frame: 100,
            flips_per_frame: 20,
            delta_time: 1.0 / 60.0,
            seed: 42,
            workers: 4,
        }
    }
}

#[derive(Clone, Copy)]
struct Queries {
    poisoned: Query,
    hostile: Query,
}

/// Combat scenario state.
pub struct CombatScenario {
    config: CombatConfig,
    world: World,
    rng: ChaCha8Rng,
    entities: Vec<Entity>,
    queries: Option<Queries>,
}

impl CombatScenario {
    pub fn new(config: CombatConfig) -> Self {
        let world = World::with_config(WorldConfig::default().with_workers(config.workers));
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            world,
            rng,
            entities: Vec::new(),
            queries: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    fn spawn_all(&mut self) -> Result<()> {
        for i in 0..self.config.entity_count {
            let entity = self.world.spawn((
                Position {
                    x: self.rng.gen_range(-500.0..500.0),
                    y: self.rng.gen_range(-500.0..500.0),
                    z: 0.0,
                },
                Health {
                    current: 100.0,
                    max: 100.0,
                },
            ))?;
            // Four marker bits give sixteen archetypes before hostility doubles them.
            if i & 1 != 0 {
                self.world.add_tag::<MarkerA>(entity)?;
            }
            if i & 2 != 0 {
                self.world.add_tag::<MarkerB>(entity)?;
            }
            if i & 4 != 0 {
                self.world.add_tag::<MarkerC>(entity)?;
            }
            if i & 8 != 0 {
                self.world.add_tag::<MarkerD>(entity)?;
            }
            self.entities.push(entity);
        }
        Ok(())
    }

    fn poison(&mut self) -> Result<()> {
        for _ in 0..self.config.poison_per_frame {
            let entity = self.entities[self.rng.gen_range(0..self.entities.len())];
            let effect = Poisoned {
                damage: self.rng.gen_range(1.0..5.0),
                remaining: self.rng.gen_range(0.1..1.0),
            };
            self.world.set(entity, effect)?;
        }
        Ok(())
    }

    fn flip_hostility(&mut self) -> Result<()> {
        for _ in 0..self.config.flips_per_frame {
            let entity = self.entities[self.rng.gen_range(0..self.entities.len())];
            if self.world.has_tag::<Hostile>(entity) {
                self.world.remove_tag::<Hostile>(entity)?;
            } else {
                self.world.add_tag::<Hostile>(entity)?;
            }
        }
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let Some(Queries { poisoned, hostile }) = self.queries else {
            return Ok(());
        };

        self.poison()?;
        self.flip_hostility()?;
        self.world.update::<Poisoned>()?;

        // Poisoned entities lose a fixed amount each frame; hostile ones regenerate.
        let dt = self.config.delta_time;
        self.world.par_for_each(&poisoned, move |health: &mut Health| {
            health.current = (health.current - 2.0 * dt).max(0.0);
        })?;
        self.world.par_for_each(&hostile, move |health: &mut Health| {
            health.current = (health.current + dt).min(health.max);
        })?;

        let mut expired = Vec::new();
        self.world.for_each_entity(&poisoned, |entity, effect: &mut Poisoned| {
            if effect.remaining <= 0.0 {
                expired.push(entity);
            }
        })?;
        for entity in expired {
            self.world.remove::<Poisoned>(entity)?;
        }
        Ok(())
    }
}

impl Scenario for CombatScenario {
    fn name(&self) -> &'static str {
        "combat"
    }

    fn description(&self) -> &'static str {
        "Fragmented archetypes with sparse effects and tag churn"
    }

    fn entity_count(&self) -> usize {
        self.config.entity_count
    }

    fn setup(&mut self) {
        self.world.set_uniform(DeltaTime(self.config.delta_time));
        self.spawn_all().expect("combatant spawn");

        let poisoned = QueryBuilder::new()
            .with::<Health>()
            .with::<Poisoned>()
            .build(&mut self.world)
            .expect("poisoned query");
        let hostile = QueryBuilder::new()
            .with::<Health>()
            .tagged::<Hostile>()
            .without::<Poisoned>()
            .build(&mut self.world)
            .expect("hostile query");
        self.queries = Some(Queries { poisoned, hostile });
    }

    fn update(&mut self) {
        self.frame().expect("combat frame");
    }

    fn teardown(&mut self) {
        self.queries = None;
        self.entities.clear();
        self.world = World::with_config(*self.world.config());
    }
}

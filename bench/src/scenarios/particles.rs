//! Particle system benchmark scenario.
//!
//! Simulates a high-volume particle system with:
//! - 100,000 particles
//! - Simple components: Position, Velocity, Lifetime, Color
//! - Updates: movement, lifetime decay, fading, despawn and respawn of dead particles
//!
//! This scenario tests:
//! - High entity count iteration performance
//! - Parallel update throughput
//! - Entity spawn/despawn throughput (particles dying and respawning)

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rusty_ecs::ecs::{Query, QueryBuilder, World, WorldConfig};

use crate::components::{Color, DeltaTime, Lifetime, Position, Velocity};
use crate::scenarios::Scenario;

/// Configuration for the particle benchmark.
pub struct ParticleConfig {
    /// Total number of particles to maintain.
    pub particle_count: usize,
    /// Simulated delta time per frame.
    pub delta_time: f32,
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Worker threads for the parallel updates.
    pub workers: usize,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            particle_count: 100_000,
            delta_time: 1.0 / 60.0, // 60 FPS
            seed: 12345,
            workers: 4,
        }
    }
}

type Particle = (Position, Velocity, Lifetime, Color);

fn create_particle(rng: &mut ChaCha8Rng) -> Particle {
    let position = Position {
        x: rng.gen_range(-100.0..100.0),
        y: rng.gen_range(-100.0..100.0),
        z: rng.gen_range(-100.0..100.0),
    };
    let velocity = Velocity {
        x: rng.gen_range(-10.0..10.0),
        y: rng.gen_range(-10.0..10.0),
        z: rng.gen_range(-10.0..10.0),
    };
    let lifetime = Lifetime {
        remaining: rng.gen_range(1.0..5.0),
        total: 5.0,
    };
    let color = Color {
        r: rng.gen_range(0.0..1.0),
        g: rng.gen_range(0.0..1.0),
        b: rng.gen_range(0.0..1.0),
        a: 1.0,
    };
    (position, velocity, lifetime, color)
}

/// Particle scenario state.
pub struct ParticleScenario {
    config: ParticleConfig,
    world: World,
    rng: ChaCha8Rng,
    particles: Option<Query>,
}

impl ParticleScenario {
    pub fn new(config: ParticleConfig) -> Self {
        let world = World::with_config(WorldConfig::default().with_workers(config.workers));
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            world,
            rng,
            particles: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Despawn particles whose lifetime ran out and spawn the same number of fresh ones.
    fn recycle(&mut self, particles: &Query) -> rusty_ecs::ecs::Result<usize> {
        let mut dead = Vec::new();
        self.world.for_each_entity(particles, |entity, lifetime: &mut Lifetime| {
            if lifetime.remaining <= 0.0 {
                dead.push(entity);
            }
        })?;
        for &entity in &dead {
            self.world.despawn(entity)?;
        }
        let rng = &mut self.rng;
        self.world
            .spawn_many((0..dead.len()).map(|_| create_particle(rng)))?;
        Ok(dead.len())
    }
}

impl Scenario for ParticleScenario {
    fn name(&self) -> &'static str {
        "particles"
    }

    fn description(&self) -> &'static str {
        "High entity count with simple components and short lifetimes"
    }

    fn entity_count(&self) -> usize {
        self.config.particle_count
    }

    fn setup(&mut self) {
        self.world.set_uniform(DeltaTime(self.config.delta_time));
        let rng = &mut self.rng;
        self.world
            .spawn_many((0..self.config.particle_count).map(|_| create_particle(rng)))
            .expect("particle spawn");

        let particles = QueryBuilder::new()
            .with::<Lifetime>()
            .build(&mut self.world)
            .expect("particle query");
        self.particles = Some(particles);
    }

    fn update(&mut self) {
        let Some(particles) = self.particles else {
            return;
        };
        self.world.par_update::<Position>().expect("movement");
        self.world.par_update::<Lifetime>().expect("lifetime decay");
        self.world.par_update::<Color>().expect("fade");
        self.recycle(&particles).expect("recycle");
    }

    fn teardown(&mut self) {
        self.particles = None;
        self.world = World::with_config(*self.world.config());
    }
}

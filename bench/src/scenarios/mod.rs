//! Realistic game scenario benchmarks.
//!
//! These scenarios simulate real-world usage patterns with representative entity counts,
//! component combinations and update workloads.
//!
//! # Scenarios
//!
//! - **Particles**: High entity count, simple components, short lifetimes
//! - **Combat**: Mixed archetypes, tags and sparse status effects that come and go

pub mod combat;
pub mod particles;

pub use combat::{CombatConfig, CombatScenario};
pub use particles::{ParticleConfig, ParticleScenario};

/// Common trait for benchmark scenarios.
pub trait Scenario {
    /// Human-readable name of the scenario.
    fn name(&self) -> &'static str;

    /// Brief description of what this scenario tests.
    fn description(&self) -> &'static str;

    /// Number of entities in this scenario.
    fn entity_count(&self) -> usize;

    /// Set up the scenario (spawn entities, initialize state).
    fn setup(&mut self);

    /// Run one "frame" of the scenario.
    fn update(&mut self);

    /// Clean up the scenario.
    fn teardown(&mut self);
}

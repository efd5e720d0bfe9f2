//! Common component types used across benchmarks.
//!
//! These components are sized like real game components so the benchmarks exercise
//! representative memory traffic.

use rusty_ecs::ecs::{Component, Entity, Tag, Update};

// =============================================================================
// Transform Components
// =============================================================================

/// 3D position component (12 bytes).
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 3D velocity component (12 bytes).
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 4x4 transformation matrix (64 bytes).
#[derive(Component, Clone, Copy, Debug)]
pub struct Transform {
    pub matrix: [[f32; 4]; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}

/// World uniform holding the frame delta time.
#[derive(Clone, Copy, Debug)]
pub struct DeltaTime(pub f32);

impl Update for Position {
    type Args = (Velocity,);
    type Uniform = DeltaTime;

    fn update(&mut self, _: Entity, (velocity,): (&Velocity,), dt: &DeltaTime) {
        self.x += velocity.x * dt.0;
        self.y += velocity.y * dt.0;
        self.z += velocity.z * dt.0;
    }
}

// =============================================================================
// Game Entity Components
// =============================================================================

/// Health component for damageable entities.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

/// Damage over time. Sparse: it comes and goes without moving the entity.
#[derive(Component, Clone, Copy, Debug, Default)]
#[component(sparse)]
pub struct Poisoned {
    pub damage: f32,
    pub remaining: f32,
}

impl Update for Poisoned {
    type Args = ();
    type Uniform = DeltaTime;

    fn update(&mut self, _: Entity, _: (), dt: &DeltaTime) {
        self.remaining -= dt.0;
    }
}

/// Team membership tag.
#[derive(Tag)]
pub struct Hostile;

// =============================================================================
// Particle Components
// =============================================================================

/// Particle lifetime tracking.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Lifetime {
    pub remaining: f32,
    pub total: f32,
}

impl Update for Lifetime {
    type Args = ();
    type Uniform = DeltaTime;

    fn update(&mut self, _: Entity, _: (), dt: &DeltaTime) {
        self.remaining -= dt.0;
    }
}

/// RGBA color (16 bytes).
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Update for Color {
    type Args = (Lifetime,);
    type Uniform = ();

    fn update(&mut self, _: Entity, (lifetime,): (&Lifetime,), _: &()) {
        self.a = (lifetime.remaining / lifetime.total).max(0.0);
    }
}

// =============================================================================
// Fragmentation Test Types
// =============================================================================

/// Shared data component for fragmentation tests.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Data {
    pub value: f64,
}

// Marker tags for creating many archetypes
macro_rules! define_marker_tags {
    ($($name:ident),*) => {
        $(
            #[derive(Tag)]
            pub struct $name;
        )*
    };
}

define_marker_tags!(
    MarkerA, MarkerB, MarkerC, MarkerD, MarkerE, MarkerF, MarkerG, MarkerH, MarkerI, MarkerJ,
    MarkerK, MarkerL, MarkerM, MarkerN, MarkerO, MarkerP
);

//! Benchmark utilities for the `rusty_ecs` entity store.
//!
//! - **Microbenchmarks** (`benches/ecs_micro.rs`): spawn, iteration, migration and query
//!   operations in isolation.
//! - **Scenario benchmarks** (`benches/ecs_scenarios.rs`): seeded workloads mixing update
//!   runners, parallel iteration and structural churn.
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench -p rusty_ecs_bench
//!
//! # Run one group
//! cargo bench -p rusty_ecs_bench -- spawn
//! ```
//!
//! Results are written to `target/criterion/` with HTML reports.

pub mod components;
pub mod scenarios;

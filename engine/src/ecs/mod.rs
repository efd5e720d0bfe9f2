pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod query;
pub mod storage;
pub mod update;
pub(crate) mod util;
pub mod world;

pub use component::{Component, Tag};
pub use config::WorldConfig;
pub use entity::Entity;
pub use error::{Error, Result};
pub use query::{Cursor, Query, QueryBuilder};
pub use update::{Args, Update};
pub use world::{Id as WorldId, World};

pub use rusty_ecs_macros::{Component, Tag};

//! Worker pool primitives backing the parallel iteration and update runners.

mod countdown;
mod executor;

pub use countdown::Countdown;
pub use executor::{Executor, ScopedTask};

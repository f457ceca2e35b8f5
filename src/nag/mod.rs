pub mod controller;
pub mod state;

pub use controller::{NagDeps, NagScheduler};
pub use state::{NagCycle, NagStatus};

//! Simulation engines: grid builder, path generator, event engine, and the
//! pricing driver that ties them together.

pub mod events;
pub mod grid;
pub mod path;
pub mod pricer;

pub use events::{BlockTally, EventEngine, PathOutcome};
pub use grid::{build_simulation_grid, GridStep, SimulationGrid};
pub use path::{PathGenerator, SimulatedBlock};
pub use pricer::{price, price_cancellable, RunConfig};

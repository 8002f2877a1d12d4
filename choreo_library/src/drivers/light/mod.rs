//! Lighting backends
//!
//! - `SimulationLightBus` - records zone state, no hardware required

mod simulation;

pub use simulation::SimulationLightBus;

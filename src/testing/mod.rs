//! Test and simulation harness utilities.
//!
//! Deterministic stand-ins for the pieces a real host provides: a tick player
//! that records what it was asked to play, and a seeded simulated player that
//! taps with a chosen bias and jitter. Shared by the unit tests, the
//! integration tests and the CLI `simulate` command, which is why it ships in
//! the library rather than behind `#[cfg(test)]`.

pub mod player;
pub mod simulation;

pub use player::{RecordingTickPlayer, SimulatedPlayer};
pub use simulation::{run_simulation, SimulationReport};

//! ih-core: application logic for the Ihumure terminal client.
//!
//! Holds the assistant session, chat rooms, configuration and the two
//! front ends (interactive REPL and one-shot mode). Exposed as a library
//! for integration testing.

pub mod assistant;
pub mod batch;
pub mod config;
pub mod logging;
pub mod repl;
pub mod rooms;
pub mod style;

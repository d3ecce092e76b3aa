//! Multi-process 2048 simulation harness.
//!
//! A [`manager::Manager`] creates a shared-memory segment holding the
//! transport structures and the move lookup table, then spawns one
//! `sim-worker` process per game. Workers publish their state to the message
//! queue and block on their mailbox for the agent's move; the agent side is
//! [`agent::Agent`].

pub mod agent;
pub mod config;
pub mod logging;
pub mod manager;
pub mod shared;
pub mod signals;
pub mod worker;

pub mod board;
pub mod constants;
pub mod lookup_table;
pub mod message;
pub mod moves;
pub mod reward;
pub mod rng;
pub mod row;
pub mod simulator;

//! Core abstractions for robot controller backends.
//!
//! - [`controller::RobotController`]: Trait every backend implements
//! - [`connection::Connection`]: Shared connect / disconnect worker
//! - [`state::StateCell`]: Controller state with change notification
//! - [`types`]: Commands, identities and states

pub mod connection;
pub mod controller;
pub mod state;
pub mod types;

//! cellbot-io - Uniform command layer over heterogeneous robot hardware
//!
//! One generic ASCII command language drives an iRobot Create, a Lego NXT or
//! any serial robot that speaks the language natively. Each hardware family
//! has a backend that owns a connection state machine over a paired serial
//! link and translates commands into its own frames.
//!
//! ## Layout
//!
//! - [`transport`]: paired-device lookup, connect policy, byte links
//! - [`core`]: controller trait, state machine, command parser
//! - [`devices`]: backends and the label registry
//! - [`coordinator`]: owns the single active backend

pub mod config;
pub mod coordinator;
pub mod core;
pub mod devices;
pub mod error;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::Coordinator;
pub use core::controller::RobotController;
pub use core::types::{ControllerState, DeviceIdentity, GenericCommand};
pub use error::{Error, Result};

//! RobotController trait definition

use crate::core::types::{ControllerState, DeviceIdentity};
use std::time::Duration;

/// Lifecycle and command contract shared by every backend
///
/// None of these methods fail: transport problems surface through
/// [`RobotController::state`] and the log.
///
/// - `connect` returns immediately after moving to STARTING; the attempt runs
///   on a worker thread and resolves to SUCCESS or BLUETOOTH_FAIL.
/// - `disconnect` is safe in any state and may be called repeatedly.
/// - `send_command` only has an effect in SUCCESS; otherwise the command is dropped.
pub trait RobotController: Send {
    /// Start connecting to `identity`
    fn connect(&mut self, identity: DeviceIdentity);

    /// Close the connection and stop any background work
    fn disconnect(&mut self);

    /// Translate and write one generic command
    fn send_command(&mut self, cmd: &str);

    /// Current connection state
    fn state(&self) -> ControllerState;

    /// Block until the state leaves STARTING or `timeout` elapses
    fn wait_for_transition(&self, timeout: Duration) -> ControllerState;

    /// Odometry as `"<epochMillis>:<distMm>:<angleDeg>:<x>:<y>"`, if supported
    fn odometer(&mut self, reset: bool) -> Option<String> {
        let _ = reset;
        None
    }

    /// Zero the odometry accumulators, if supported
    fn reset_odometer(&mut self) {}

    /// Pose estimate, if supported
    fn pose(&self) -> Option<String> {
        None
    }

    /// Raw sensor packet of the given kind, if supported
    fn sensor_data(&self, kind: u32) -> Option<Vec<u8>> {
        let _ = kind;
        None
    }

    /// Full robot state as JSON, if supported
    fn state_json(&self) -> Option<String> {
        None
    }
}

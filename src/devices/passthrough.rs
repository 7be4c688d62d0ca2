//! Passthrough backends: generic serial robots and VEX Pro
//!
//! These robots understand the generic command language natively, so each
//! command is written as one newline-terminated line.

use crate::config::Config;
use crate::core::connection::Connection;
use crate::core::controller::RobotController;
use crate::core::types::{ControllerState, DeviceIdentity};
use crate::transport::BluetoothAdapter;
use std::sync::Arc;
use std::time::Duration;

/// Backend that forwards commands verbatim
pub struct PassthroughController {
    name: &'static str,
    connection: Connection,
}

impl PassthroughController {
    /// Generic robot following the command language
    pub fn generic(adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Self {
        Self::named("default", adapter, config)
    }

    /// VEX Pro, wire-compatible with the generic robot
    pub fn vex_pro(adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Self {
        Self::named("vexpro", adapter, config)
    }

    fn named(name: &'static str, adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Self {
        Self {
            name,
            connection: Connection::new(name, adapter, &config.transport),
        }
    }
}

impl RobotController for PassthroughController {
    fn connect(&mut self, identity: DeviceIdentity) {
        self.connection.connect(identity, |_| Ok(()));
    }

    fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    fn send_command(&mut self, cmd: &str) {
        let cmd = cmd.trim_end_matches(&['\r', '\n'][..]);
        if cmd.is_empty() {
            log::debug!("{}: ignoring empty command", self.name);
            return;
        }
        self.connection.send_line(cmd);
    }

    fn state(&self) -> ControllerState {
        self.connection.state()
    }

    fn wait_for_transition(&self, timeout: Duration) -> ControllerState {
        self.connection.wait_for_transition(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockAdapter;

    const ADDR: &str = "00:06:66:01:02:03";

    fn config() -> Config {
        let mut config = Config::default();
        config.transport.settle_ms = 0;
        config
    }

    #[test]
    fn test_commands_forwarded_with_newline() {
        let adapter = Arc::new(MockAdapter::new());
        let mut robot = PassthroughController::generic(adapter.clone(), &config());
        robot.connect(DeviceIdentity::new("bot", "", ADDR));
        assert_eq!(
            robot.wait_for_transition(Duration::from_secs(5)),
            ControllerState::Success
        );

        robot.send_command("w 50 -50");
        robot.send_command("dance");
        assert_eq!(
            adapter.link().frames(),
            vec![b"w 50 -50\n".to_vec(), b"dance\n".to_vec()]
        );
    }

    #[test]
    fn test_commands_dropped_before_success() {
        let adapter = Arc::new(MockAdapter::new());
        adapter.set_connect_delay(Duration::from_millis(100));
        let mut robot = PassthroughController::vex_pro(adapter.clone(), &config());

        robot.send_command("f");
        robot.connect(DeviceIdentity::new("vex", "", ADDR));
        assert_eq!(robot.state(), ControllerState::Starting);
        robot.send_command("f");
        assert_eq!(
            robot.wait_for_transition(Duration::from_secs(5)),
            ControllerState::Success
        );
        assert!(adapter.link().written().is_empty());
    }

    #[test]
    fn test_failed_connect_and_double_disconnect() {
        let adapter = Arc::new(MockAdapter::new());
        adapter.fail_service_connect(true);
        adapter.accept_channel(None);
        let mut robot = PassthroughController::generic(adapter, &config());

        robot.connect(DeviceIdentity::new("bot", "", ADDR));
        assert_eq!(
            robot.wait_for_transition(Duration::from_secs(5)),
            ControllerState::BluetoothFail
        );
        robot.disconnect();
        let after_first = robot.state();
        robot.disconnect();
        assert_eq!(robot.state(), after_first);
    }
}

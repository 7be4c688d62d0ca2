//! Owns the single active backend and routes commands to it
//!
//! Upstream channels may prefix a command with a numeric timestamp so that
//! identical back-to-back commands (e.g. repeated `hu`) stay distinct. The
//! coordinator strips that prefix before forwarding.

use crate::core::controller::RobotController;
use crate::core::types::{ControllerState, DeviceIdentity};
use crate::devices::ControllerRegistry;
use crate::error::{Error, Result};
use std::time::Duration;

/// Drop a leading `<integer> ` token, if present
pub fn strip_timestamp(message: &str) -> &str {
    match message.split_once(' ') {
        Some((head, rest)) if head.parse::<i64>().is_ok() => rest,
        _ => message,
    }
}

struct ActiveController {
    label: String,
    controller: Box<dyn RobotController>,
}

/// Exactly-one-active-backend owner
pub struct Coordinator {
    registry: Box<dyn ControllerRegistry>,
    active: Option<ActiveController>,
}

impl Coordinator {
    pub fn new(registry: Box<dyn ControllerRegistry>) -> Self {
        Self {
            registry,
            active: None,
        }
    }

    /// Labels the registry can resolve
    pub fn available_controllers(&self) -> Vec<String> {
        self.registry.labels()
    }

    /// Label of the active backend
    pub fn active_label(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.label.as_str())
    }

    /// Activate the backend for `label` and connect it to the given robot
    ///
    /// A different label replaces (and disconnects) the active backend. The
    /// same label keeps the backend and reconnects it if the robot changed.
    /// An unknown label leaves the current backend untouched.
    pub fn set_controller(
        &mut self,
        label: &str,
        device_name: &str,
        device_address: &str,
    ) -> Result<()> {
        let identity = DeviceIdentity::new(label, device_name, device_address);

        if let Some(active) = self.active.as_mut().filter(|a| a.label == label) {
            active.controller.connect(identity);
            return Ok(());
        }

        let controller = self
            .registry
            .resolve(label)
            .ok_or_else(|| Error::UnknownController(label.to_string()))?;

        self.disconnect();
        log::info!("Activating controller '{}'", label);

        let mut active = ActiveController {
            label: label.to_string(),
            controller,
        };
        active.controller.connect(identity);
        self.active = Some(active);
        Ok(())
    }

    /// Disconnect and drop the active backend
    pub fn disconnect(&mut self) {
        if let Some(mut active) = self.active.take() {
            log::info!("Deactivating controller '{}'", active.label);
            active.controller.disconnect();
        }
    }

    /// Forward a command to the active backend, minus any timestamp prefix
    pub fn send_direct_command(&mut self, cmd: &str) {
        let cmd = strip_timestamp(cmd);
        match self.active.as_mut() {
            Some(active) => active.controller.send_command(cmd),
            None => log::debug!("No active controller, dropping '{}'", cmd),
        }
    }

    /// Active backend's state, NONE without one
    pub fn state(&self) -> ControllerState {
        self.active
            .as_ref()
            .map_or(ControllerState::None, |a| a.controller.state())
    }

    /// Block until the active backend leaves STARTING or `timeout` elapses
    pub fn wait_for_transition(&self, timeout: Duration) -> ControllerState {
        self.active
            .as_ref()
            .map_or(ControllerState::None, |a| {
                a.controller.wait_for_transition(timeout)
            })
    }

    pub fn odometer(&mut self, reset: bool) -> Option<String> {
        self.active.as_mut()?.controller.odometer(reset)
    }

    pub fn reset_odometer(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.controller.reset_odometer();
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::devices::{StaticRegistry, LABEL_CREATE, LABEL_NXT};
    use crate::transport::MockAdapter;
    use std::sync::Arc;

    const NXT_ADDR: &str = "00:16:53:0A:0B:0C";

    fn coordinator() -> (Arc<MockAdapter>, Coordinator) {
        let adapter = Arc::new(MockAdapter::new().with_paired("NXT", NXT_ADDR));
        let mut config = Config::default();
        config.transport.settle_ms = 0;
        let registry = StaticRegistry::new(adapter.clone(), config);
        (adapter, Coordinator::new(Box::new(registry)))
    }

    #[test]
    fn test_strip_timestamp() {
        assert_eq!(strip_timestamp("1690000000000 f"), "f");
        assert_eq!(strip_timestamp("12 w 10 20"), "w 10 20");
        assert_eq!(strip_timestamp("w 10 20"), "w 10 20");
        assert_eq!(strip_timestamp("f"), "f");
        assert_eq!(strip_timestamp("1690000000000"), "1690000000000");
        assert_eq!(strip_timestamp(" f"), " f");
        assert_eq!(strip_timestamp("99999999999999999999 f"), "99999999999999999999 f");
    }

    #[test]
    fn test_state_none_without_controller() {
        let (_adapter, mut coordinator) = coordinator();
        assert_eq!(coordinator.state(), ControllerState::None);
        coordinator.send_direct_command("f");
        assert!(coordinator.odometer(false).is_none());
        coordinator.disconnect();
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let (_adapter, mut coordinator) = coordinator();
        assert!(matches!(
            coordinator.set_controller("Roomba", "x", ""),
            Err(Error::UnknownController(_))
        ));
        assert!(coordinator.active_label().is_none());
    }

    #[test]
    fn test_timestamped_command_reaches_nxt() {
        let (adapter, mut coordinator) = coordinator();
        coordinator.set_controller(LABEL_NXT, "NXT", "").unwrap();
        assert_eq!(
            coordinator.wait_for_transition(Duration::from_secs(5)),
            ControllerState::Success
        );

        coordinator.send_direct_command("1690000000000 f");

        let frames = adapter.link().frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 28);
        assert_eq!(frames[0][4], 0x01);
        assert_eq!(frames[0][5] as i8, 100);
        assert_eq!(frames[0][18], 0x02);
        assert_eq!(frames[0][19] as i8, 100);
    }

    #[test]
    fn test_switching_label_disconnects_previous() {
        let (adapter, mut coordinator) = coordinator();
        coordinator.set_controller(LABEL_NXT, "NXT", "").unwrap();
        coordinator.wait_for_transition(Duration::from_secs(5));
        let nxt_link = adapter.link();

        coordinator
            .set_controller(LABEL_CREATE, "Create", "00:06:66:01:02:03")
            .unwrap();
        assert!(nxt_link.is_closed());
        assert_eq!(coordinator.active_label(), Some(LABEL_CREATE));
        assert_eq!(
            coordinator.wait_for_transition(Duration::from_secs(5)),
            ControllerState::Success
        );
        assert!(coordinator.odometer(false).is_some());
    }

    #[test]
    fn test_same_label_keeps_connection() {
        let (adapter, mut coordinator) = coordinator();
        coordinator.set_controller(LABEL_NXT, "NXT", "").unwrap();
        coordinator.wait_for_transition(Duration::from_secs(5));
        coordinator.set_controller(LABEL_NXT, "NXT", "").unwrap();

        assert_eq!(coordinator.state(), ControllerState::Success);
        assert_eq!(adapter.service_attempts().len(), 1);
    }

    #[test]
    fn test_available_controllers() {
        let (_adapter, coordinator) = coordinator();
        let labels = coordinator.available_controllers();
        assert_eq!(labels.len(), 4);
        assert!(labels.iter().any(|l| l == LABEL_NXT));
    }
}

//! Lego Mindstorms NXT backend (direct commands over a serial link)
//!
//! Drive motors are on ports B (left) and C (right), the head motor on port A.
//! Fixed turns run the inner wheel at reduced power. Timed and scripted moves
//! have no device-side equivalent; a timed move drives like its plain
//! direction and scripted moves are dropped.

pub mod packet;

use crate::config::Config;
use crate::core::connection::Connection;
use crate::core::controller::RobotController;
use crate::core::types::{ControllerState, DeviceIdentity, Direction, GenericCommand, HeadAction};
use crate::transport::BluetoothAdapter;
use packet::{scale_power, TxPacket, TURN_POWER};
use std::sync::Arc;
use std::time::Duration;

/// Head power used when a head command carries no percentage
const DEFAULT_HEAD_POWER: u8 = 50;

fn drive_powers(direction: Direction) -> (i8, i8) {
    match direction {
        Direction::Forward => (100, 100),
        Direction::Backward => (-100, -100),
        Direction::Left => (TURN_POWER, 100),
        Direction::Right => (100, TURN_POWER),
    }
}

/// NXT direct-command backend
pub struct NxtController {
    connection: Connection,
    packet: TxPacket,
}

impl NxtController {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Self {
        Self {
            connection: Connection::new("nxt", adapter, &config.transport),
            packet: TxPacket::new(),
        }
    }

    /// Fill the packet buffer for `cmd`; `false` when nothing should be written
    fn encode(&mut self, cmd: GenericCommand) -> bool {
        match cmd {
            GenericCommand::Move(direction) | GenericCommand::TimedMove { direction, .. } => {
                let (left, right) = drive_powers(direction);
                self.packet.set_drive(left, right);
            }
            GenericCommand::Stop => self.packet.set_drive_stop(),
            GenericCommand::Wheels { left, right } => {
                self.packet.set_drive(scale_power(left), scale_power(right));
            }
            GenericCommand::Head { action, percent } => {
                let power = percent.unwrap_or(DEFAULT_HEAD_POWER) as i8;
                match action {
                    HeadAction::Left | HeadAction::Up => self.packet.set_head(power),
                    HeadAction::Right | HeadAction::Down => self.packet.set_head(-power),
                    HeadAction::Stop => self.packet.set_head_stop(),
                    HeadAction::Center => {
                        log::debug!("NXT: head center not supported");
                        return false;
                    }
                }
            }
            GenericCommand::ScriptedMove { .. } => {
                log::debug!("NXT: scripted moves not supported");
                return false;
            }
        }
        true
    }
}

impl RobotController for NxtController {
    fn connect(&mut self, identity: DeviceIdentity) {
        self.connection.connect(identity, |_| Ok(()));
    }

    fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    fn send_command(&mut self, cmd: &str) {
        if self.connection.state() != ControllerState::Success {
            log::debug!("NXT: not connected, dropping '{}'", cmd);
            return;
        }
        let Some(parsed) = GenericCommand::parse(cmd) else {
            log::warn!("NXT: unknown command '{}'", cmd);
            return;
        };
        if self.encode(parsed) {
            self.connection.send(self.packet.as_bytes());
        }
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

    fn connected() -> (Arc<MockAdapter>, NxtController) {
        let adapter = Arc::new(MockAdapter::new().with_paired("NXT", "00:16:53:0A:0B:0C"));
        let mut config = Config::default();
        config.transport.settle_ms = 0;
        let mut nxt = NxtController::new(adapter.clone(), &config);
        nxt.connect(DeviceIdentity::new("nxt", "NXT", ""));
        assert_eq!(
            nxt.wait_for_transition(Duration::from_secs(5)),
            ControllerState::Success
        );
        (adapter, nxt)
    }

    fn powers(frame: &[u8]) -> (i8, i8) {
        (frame[5] as i8, frame[19] as i8)
    }

    #[test]
    fn test_connect_writes_nothing() {
        let (adapter, _nxt) = connected();
        assert!(adapter.link().written().is_empty());
    }

    #[test]
    fn test_fixed_moves() {
        let (adapter, mut nxt) = connected();
        for cmd in ["f", "b", "l", "r"] {
            nxt.send_command(cmd);
        }
        let frames = adapter.link().frames();
        assert!(frames.iter().all(|f| f.len() == 28));
        assert_eq!(powers(&frames[0]), (100, 100));
        assert_eq!(powers(&frames[1]), (-100, -100));
        assert_eq!(powers(&frames[2]), (40, 100));
        assert_eq!(powers(&frames[3]), (100, 40));
    }

    #[test]
    fn test_wheels_and_stop() {
        let (adapter, mut nxt) = connected();
        nxt.send_command("w 10 -50");
        nxt.send_command("s");
        let frames = adapter.link().frames();
        assert_eq!(powers(&frames[0]), (50, -100));
        assert_eq!(frames[1].len(), 28);
        assert_eq!(frames[1][6], packet::MODE_BRAKE);
    }

    #[test]
    fn test_head_commands() {
        let (adapter, mut nxt) = connected();
        nxt.send_command("hu");
        nxt.send_command("hd 20");
        nxt.send_command("hs");
        nxt.send_command("hc");

        let frames = adapter.link().frames();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 14 && f[4] == packet::PORT_HEAD));
        assert_eq!(frames[0][5] as i8, 50);
        assert_eq!(frames[1][5] as i8, -20);
        assert_eq!(frames[2][6], packet::MODE_BRAKE);
    }

    #[test]
    fn test_unsupported_commands_write_nothing() {
        let (adapter, mut nxt) = connected();
        nxt.send_command("fd 10 100");
        nxt.send_command("jump");
        assert!(adapter.link().written().is_empty());
    }

    #[test]
    fn test_disconnect_twice() {
        let (adapter, mut nxt) = connected();
        nxt.disconnect();
        let after_first = nxt.state();
        nxt.disconnect();
        assert_eq!(nxt.state(), after_first);
        nxt.send_command("f");
        assert!(adapter.link().written().is_empty());
    }
}

//! iRobot Create backend (Open Interface over a serial link)
//!
//! # Commands
//!
//! | Generic | Frame |
//! |---|---|
//! | `f` `b` `l` `r` `s` | drive direct at ±300 / ±100 / 0 mm/s |
//! | `w <l> <r>` | drive direct, each side `clamp(v*5, ±500)` |
//! | `f\|b\|l\|r <speed> <ms>` | drive direct, stop written by a host timer after `ms` unless another motion command comes first |
//! | `fd\|bd\|ld\|rd <speed> <amount>` | script: drive, wait distance/angle, stop |
//!
//! Head commands are not supported and produce no frame.
//!
//! # Telemetry
//!
//! The first [`RobotController::odometer`] call on a connected robot starts the
//! sensor stream (distance + angle) and a reader thread that integrates it
//! into an [`OdometryState`]. Disconnect stops the reader, closes the link and
//! zeroes the accumulators.

pub mod constants;
pub mod odometry;
pub mod packet;
pub mod telemetry;

use crate::config::Config;
use crate::core::connection::Connection;
use crate::core::controller::RobotController;
use crate::core::types::{ControllerState, DeviceIdentity, GenericCommand};
use crate::error::Result;
use crate::transport::{BluetoothAdapter, SerialTransport};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use odometry::{epoch_millis, OdometryState};
use packet::{
    directed_velocities, fixed_velocities, scale_velocity, start_packet, stop_packet,
    stream_start_packet, TxPacket,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use telemetry::TelemetryReader;

/// Create Open Interface backend
pub struct CreateController {
    connection: Connection,
    odometry: Arc<Mutex<OdometryState>>,
    telemetry: Option<TelemetryReader>,
    validate_checksum: bool,
    join_timeout: Duration,
    move_timer: MoveTimer,
    packet: TxPacket,
}

impl CreateController {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, config: &Config) -> Self {
        Self {
            connection: Connection::new("create", adapter, &config.transport),
            odometry: Arc::new(Mutex::new(OdometryState::default())),
            telemetry: None,
            validate_checksum: config.telemetry.validate_checksum,
            join_timeout: Duration::from_millis(config.telemetry.join_timeout_ms),
            move_timer: MoveTimer::default(),
            packet: TxPacket::new(),
        }
    }

    fn streaming(&self) -> bool {
        self.telemetry.as_ref().is_some_and(|t| t.is_running())
    }

    /// Start the reader thread and request the distance/angle stream
    fn start_stream(&mut self, transport: &SerialTransport) -> Result<()> {
        let link = transport.reader()?;
        let mut reader =
            TelemetryReader::spawn(link, Arc::clone(&self.odometry), self.validate_checksum)?;
        if let Err(e) = transport.write(stream_start_packet().as_bytes()) {
            reader.stop(self.join_timeout);
            return Err(e);
        }
        self.telemetry = Some(reader);
        log::info!("Create: sensor stream requested");
        Ok(())
    }

    fn stop_stream(&mut self) {
        if let Some(mut reader) = self.telemetry.take() {
            reader.stop(self.join_timeout);
        }
    }

    fn zero_odometry(&self) {
        self.odometry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
    }

    /// Stop everything tied to the current link
    fn teardown(&mut self) {
        self.move_timer.cancel();
        self.stop_stream();
        self.connection.disconnect();
        self.zero_odometry();
    }

    /// Fill the packet buffer for `cmd`; `false` when nothing should be written
    fn encode(&mut self, cmd: GenericCommand) -> bool {
        match cmd {
            GenericCommand::Move(direction) => {
                let (left, right) = fixed_velocities(direction);
                self.packet.set_drive(left, right);
            }
            GenericCommand::TimedMove {
                direction, speed, ..
            } => {
                let (left, right) = directed_velocities(direction, scale_velocity(speed));
                self.packet.set_drive(left, right);
            }
            GenericCommand::Stop => self.packet.set_drive(0, 0),
            GenericCommand::Wheels { left, right } => {
                self.packet
                    .set_drive(scale_velocity(left), scale_velocity(right));
            }
            GenericCommand::ScriptedMove {
                direction,
                speed,
                amount,
            } => {
                let streaming = self.streaming();
                self.packet.set_script(direction, speed, amount, streaming);
            }
            GenericCommand::Head { .. } => {
                log::debug!("Create: head commands not supported");
                return false;
            }
        }
        true
    }
}

impl RobotController for CreateController {
    fn connect(&mut self, identity: DeviceIdentity) {
        if !self.connection.is_active_for(&identity) {
            self.teardown();
        }
        self.connection.connect(identity, |transport| {
            transport.write(start_packet().as_bytes())
        });
    }

    fn disconnect(&mut self) {
        self.teardown();
    }

    fn send_command(&mut self, cmd: &str) {
        if self.connection.state() != ControllerState::Success {
            log::debug!("Create: not connected, dropping '{}'", cmd);
            return;
        }
        let Some(parsed) = GenericCommand::parse(cmd) else {
            log::warn!("Create: unknown command '{}'", cmd);
            return;
        };
        if !self.encode(parsed) {
            return;
        }

        // Any motion command overrides a pending timed stop
        self.move_timer.cancel();
        self.connection.send(self.packet.as_bytes());

        if let GenericCommand::TimedMove { duration_ms, .. } = parsed {
            if let Some(transport) = self.connection.ready_transport() {
                self.move_timer
                    .arm(Arc::clone(transport), Duration::from_millis(duration_ms));
            }
        }
    }

    fn state(&self) -> ControllerState {
        self.connection.state()
    }

    fn wait_for_transition(&self, timeout: Duration) -> ControllerState {
        self.connection.wait_for_transition(timeout)
    }

    fn odometer(&mut self, reset: bool) -> Option<String> {
        let transport = self.connection.ready_transport()?;
        if !transport.is_connected() {
            return None;
        }
        if !self.streaming() {
            let transport = Arc::clone(transport);
            if let Err(e) = self.start_stream(&transport) {
                log::error!("Create: failed to start sensor stream: {}", e);
            }
        }

        let snapshot = {
            let mut odom = self.odometry.lock().unwrap_or_else(|e| e.into_inner());
            let snapshot = *odom;
            if reset {
                odom.reset();
            }
            snapshot
        };
        Some(snapshot.format(epoch_millis()))
    }

    fn reset_odometer(&mut self) {
        self.zero_odometry();
    }
}

impl Drop for CreateController {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Host-side stop for timed moves
///
/// Each armed timer waits on its own cancel channel; arming a new one or
/// cancelling drops the previous sender, which wakes and retires the old timer.
#[derive(Default)]
struct MoveTimer {
    cancel: Option<Sender<()>>,
}

impl MoveTimer {
    fn arm(&mut self, transport: Arc<SerialTransport>, after: Duration) {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        self.cancel = Some(cancel_tx);

        let spawned = thread::Builder::new()
            .name("create-move-timer".to_string())
            .spawn(move || match cancel_rx.recv_timeout(after) {
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!("Create: timed move elapsed, stopping");
                    if let Err(e) = transport.write(stop_packet().as_bytes()) {
                        log::error!("Create: failed to stop after timed move: {}", e);
                    }
                }
                _ => log::trace!("Create: timed move superseded"),
            });

        if let Err(e) = spawned {
            log::error!("Create: failed to spawn move timer: {}", e);
        }
    }

    fn cancel(&mut self) {
        self.cancel = None;
    }
}

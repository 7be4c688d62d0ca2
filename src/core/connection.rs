//! Connection worker shared by every backend
//!
//! `connect` flips the state to STARTING on the caller's thread and spawns a
//! worker that opens the transport, waits the settle interval, runs the
//! backend's handshake and publishes SUCCESS or BLUETOOTH_FAIL.
//!
//! Every attempt carries a generation number. `disconnect` and newer attempts
//! bump it, so a worker that resolves late can neither overwrite the state
//! nor keep its transport open.

use super::state::StateCell;
use super::types::{ControllerState, DeviceIdentity};
use crate::config::TransportConfig;
use crate::error::Result;
use crate::transport::{BluetoothAdapter, SerialTransport};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Shared connection lifecycle for one backend instance
pub struct Connection {
    name: &'static str,
    adapter: Arc<dyn BluetoothAdapter>,
    settle: Duration,
    channel_fallback: bool,
    state: Arc<StateCell>,
    /// Current attempt; held while publishing a state so stale workers stay silent
    generation: Arc<Mutex<u64>>,
    transport: Option<Arc<SerialTransport>>,
    identity: Option<DeviceIdentity>,
}

impl Connection {
    pub fn new(name: &'static str, adapter: Arc<dyn BluetoothAdapter>, config: &TransportConfig) -> Self {
        Self {
            name,
            adapter,
            settle: Duration::from_millis(config.settle_ms),
            channel_fallback: config.channel_fallback,
            state: Arc::new(StateCell::new()),
            generation: Arc::new(Mutex::new(0)),
            transport: None,
            identity: None,
        }
    }

    /// Start a connection attempt unless one is already live for `identity`
    ///
    /// `handshake` runs on the worker after the settle interval; an error
    /// there fails the attempt.
    pub fn connect<F>(&mut self, identity: DeviceIdentity, handshake: F)
    where
        F: FnOnce(&SerialTransport) -> Result<()> + Send + 'static,
    {
        if self.is_active_for(&identity) {
            log::debug!(
                "{}: already {} for '{}', ignoring connect",
                self.name,
                self.state.get(),
                identity.display_name
            );
            return;
        }

        let attempt = {
            let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
            *generation += 1;
            self.state.set(ControllerState::Starting);
            *generation
        };
        if let Some(old) = self.transport.take() {
            old.disconnect();
        }

        log::info!(
            "{}: connecting to '{}' ({} / {})",
            self.name,
            identity.display_name,
            identity.bt_name,
            identity.bt_address
        );

        let transport = Arc::new(SerialTransport::new(
            Arc::clone(&self.adapter),
            self.channel_fallback,
        ));
        self.transport = Some(Arc::clone(&transport));
        self.identity = Some(identity.clone());

        let worker = ConnectWorker {
            name: self.name,
            attempt,
            generation: Arc::clone(&self.generation),
            state: Arc::clone(&self.state),
            settle: self.settle,
        };
        let spawned = thread::Builder::new()
            .name(format!("{}-connect", self.name))
            .spawn(move || worker.run(&transport, &identity, handshake));

        if let Err(e) = spawned {
            log::error!("{}: failed to spawn connect worker: {}", self.name, e);
            self.state.set(ControllerState::BluetoothFail);
        }
    }

    /// Whether an attempt for `identity` is in flight or already succeeded
    pub fn is_active_for(&self, identity: &DeviceIdentity) -> bool {
        matches!(
            self.state.get(),
            ControllerState::Starting | ControllerState::Success
        ) && self.identity.as_ref() == Some(identity)
    }

    /// Invalidate any in-flight attempt, close the transport and go quiescent
    pub fn disconnect(&mut self) {
        {
            let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
            *generation += 1;
            if self.state.get() != ControllerState::None {
                self.state.set(ControllerState::None);
            }
        }
        if let Some(transport) = self.transport.take() {
            transport.disconnect();
            log::info!("{}: disconnected", self.name);
        }
        self.identity = None;
    }

    pub fn state(&self) -> ControllerState {
        self.state.get()
    }

    pub fn wait_for_transition(&self, timeout: Duration) -> ControllerState {
        self.state.wait_while_starting(timeout)
    }

    /// Transport of the live connection, only once it reached SUCCESS
    pub fn ready_transport(&self) -> Option<&Arc<SerialTransport>> {
        if self.state.get() != ControllerState::Success {
            return None;
        }
        self.transport.as_ref()
    }

    /// Write one frame if connected; failures are logged, never raised
    pub fn send(&self, frame: &[u8]) {
        let Some(transport) = self.ready_transport() else {
            log::debug!("{}: not connected, dropping {} byte frame", self.name, frame.len());
            return;
        };
        log::trace!("{}: writing {:02X?}", self.name, frame);
        if let Err(e) = transport.write(frame) {
            log::error!("{}: error sending data to robot: {}", self.name, e);
        }
    }

    /// Write one newline-terminated text command if connected
    pub fn send_line(&self, cmd: &str) {
        let Some(transport) = self.ready_transport() else {
            log::debug!("{}: not connected, dropping '{}'", self.name, cmd);
            return;
        };
        if let Err(e) = transport.write_line(cmd) {
            log::error!("{}: error sending '{}' to robot: {}", self.name, cmd, e);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct ConnectWorker {
    name: &'static str,
    attempt: u64,
    generation: Arc<Mutex<u64>>,
    state: Arc<StateCell>,
    settle: Duration,
}

impl ConnectWorker {
    fn run<F>(self, transport: &SerialTransport, identity: &DeviceIdentity, handshake: F)
    where
        F: FnOnce(&SerialTransport) -> Result<()>,
    {
        if !transport.start_connection(identity) {
            self.publish(ControllerState::BluetoothFail, transport);
            return;
        }

        thread::sleep(self.settle);

        if !self.is_current() {
            transport.disconnect();
            return;
        }

        match handshake(transport) {
            Ok(()) => self.publish(ControllerState::Success, transport),
            Err(e) => {
                log::error!("{}: handshake failed: {}", self.name, e);
                transport.disconnect();
                self.publish(ControllerState::BluetoothFail, transport);
            }
        }
    }

    fn is_current(&self) -> bool {
        *self.generation.lock().unwrap_or_else(|e| e.into_inner()) == self.attempt
    }

    fn publish(&self, next: ControllerState, transport: &SerialTransport) {
        let generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        if *generation != self.attempt {
            log::debug!("{}: stale connect attempt resolved, discarding", self.name);
            transport.disconnect();
            return;
        }
        self.state.transition(ControllerState::Starting, next);
        log::info!("{}: connection {}", self.name, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::MockAdapter;

    const ADDR: &str = "00:06:66:01:02:03";

    fn fast_config() -> TransportConfig {
        TransportConfig {
            settle_ms: 0,
            ..TransportConfig::default()
        }
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("robot", "FireFly", ADDR)
    }

    #[test]
    fn test_connect_reports_starting_then_success() {
        let adapter = Arc::new(MockAdapter::new());
        adapter.set_connect_delay(Duration::from_millis(50));
        let mut conn = Connection::new("test", adapter, &fast_config());

        conn.connect(identity(), |_| Ok(()));
        assert_eq!(conn.state(), ControllerState::Starting);
        assert_eq!(
            conn.wait_for_transition(Duration::from_secs(5)),
            ControllerState::Success
        );
    }

    #[test]
    fn test_connect_failure_reports_bluetooth_fail() {
        let adapter = Arc::new(MockAdapter::new());
        adapter.fail_service_connect(true);
        let mut conn = Connection::new("test", adapter, &fast_config());

        conn.connect(identity(), |_| Ok(()));
        assert_eq!(
            conn.wait_for_transition(Duration::from_secs(5)),
            ControllerState::BluetoothFail
        );
        assert!(conn.ready_transport().is_none());
    }

    #[test]
    fn test_handshake_runs_and_can_fail() {
        let adapter = Arc::new(MockAdapter::new());
        let mut conn = Connection::new("test", adapter.clone(), &fast_config());

        conn.connect(identity(), |t| t.write(&[0x80, 0x84]));
        assert_eq!(
            conn.wait_for_transition(Duration::from_secs(5)),
            ControllerState::Success
        );
        assert_eq!(adapter.link().written(), vec![0x80, 0x84]);

        conn.disconnect();
        conn.connect(identity(), |_| Err(Error::Other("no ack".to_string())));
        assert_eq!(
            conn.wait_for_transition(Duration::from_secs(5)),
            ControllerState::BluetoothFail
        );
    }

    #[test]
    fn test_repeat_connect_is_ignored() {
        let adapter = Arc::new(MockAdapter::new());
        let mut conn = Connection::new("test", adapter.clone(), &fast_config());

        conn.connect(identity(), |_| Ok(()));
        conn.wait_for_transition(Duration::from_secs(5));
        conn.connect(identity(), |_| Ok(()));
        assert_eq!(conn.state(), ControllerState::Success);
        assert_eq!(adapter.service_attempts().len(), 1);
    }

    #[test]
    fn test_disconnect_during_attempt_wins() {
        let adapter = Arc::new(MockAdapter::new());
        adapter.set_connect_delay(Duration::from_millis(100));
        let mut conn = Connection::new("test", adapter.clone(), &fast_config());

        conn.connect(identity(), |_| Ok(()));
        conn.disconnect();
        thread::sleep(Duration::from_millis(300));

        assert_eq!(conn.state(), ControllerState::None);
        assert!(adapter.link().is_closed());
    }

    #[test]
    fn test_send_drops_until_connected() {
        let adapter = Arc::new(MockAdapter::new());
        adapter.set_connect_delay(Duration::from_millis(50));
        let mut conn = Connection::new("test", adapter.clone(), &fast_config());

        conn.connect(identity(), |_| Ok(()));
        conn.send(&[0x91, 0, 0, 0, 0]);
        conn.wait_for_transition(Duration::from_secs(5));
        conn.send_line("f");
        assert_eq!(adapter.link().written(), b"f\n");
    }

    #[test]
    fn test_disconnect_twice() {
        let adapter = Arc::new(MockAdapter::new());
        let mut conn = Connection::new("test", adapter, &fast_config());
        conn.disconnect();
        conn.connect(identity(), |_| Ok(()));
        conn.wait_for_transition(Duration::from_secs(5));
        conn.disconnect();
        let after_first = conn.state();
        conn.disconnect();
        assert_eq!(conn.state(), after_first);
    }
}

//! Transport layer: one byte-stream connection to a paired robot.
//!
//! - [`Link`]: an open byte stream (serial port, RFCOMM socket, mock)
//! - [`BluetoothAdapter`]: the platform capability that enumerates paired
//!   devices, cancels discovery and opens links
//! - [`SerialTransport`]: connection policy on top of an adapter
//!   (address-or-name lookup, discovery cancel, channel fallback)

use crate::core::types::DeviceIdentity;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub mod mock;
mod serial;

pub use mock::{MockAdapter, MockLink};
pub use serial::{SerialLink, SerialPortAdapter};

/// Well-known Serial Port Profile service class
pub const SERIAL_PORT_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5F9B_34FB);

/// Legacy RFCOMM channels tried after the service-record attempt fails
pub const MAX_FALLBACK_CHANNELS: u8 = 10;

/// Open byte stream to a device
pub trait Link: Send {
    /// Read available bytes into buffer. Returns 0 when the read timed out with no data.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Independent handle to the same stream, for a dedicated reader thread
    fn try_clone(&self) -> Result<Box<dyn Link>>;

    /// Close the stream. Idempotent.
    fn close(&mut self);

    /// Whether the stream can still carry data
    fn is_open(&self) -> bool;
}

/// 6-octet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BtAddress([u8; 6]);

impl BtAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for BtAddress {
    type Err = Error;

    /// Parses `XX:XX:XX:XX:XX:XX`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidAddress(s.to_string());
        if s.len() != 17 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for BtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// A device already paired with this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    pub name: String,
    pub address: BtAddress,
}

/// Platform capability consumed by [`SerialTransport`]
pub trait BluetoothAdapter: Send + Sync {
    /// Devices already paired with this host
    fn paired_devices(&self) -> Result<Vec<PairedDevice>>;

    /// Stop any in-progress device discovery
    fn cancel_discovery(&self) -> Result<()>;

    /// Open a stream to `address` through its service record for `service`
    fn connect_service(&self, address: &BtAddress, service: &Uuid) -> Result<Box<dyn Link>>;

    /// Open a stream to `address` on a fixed RFCOMM channel
    fn connect_channel(&self, address: &BtAddress, channel: u8) -> Result<Box<dyn Link>> {
        let _ = (address, channel);
        Err(Error::NotSupported("RFCOMM channel connect".to_string()))
    }
}

/// Single physical connection to a robot
///
/// Writes and reads block. All methods take `&self` so the transport can be
/// shared between the command path, a move timer and a telemetry reader.
pub struct SerialTransport {
    adapter: Arc<dyn BluetoothAdapter>,
    channel_fallback: bool,
    link: Mutex<Option<Box<dyn Link>>>,
}

impl SerialTransport {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, channel_fallback: bool) -> Self {
        Self {
            adapter,
            channel_fallback,
            link: Mutex::new(None),
        }
    }

    /// Connect to the robot described by `identity`
    ///
    /// Never fails past this boundary: any error is logged and reported as `false`.
    pub fn start_connection(&self, identity: &DeviceIdentity) -> bool {
        match self.open(identity) {
            Ok(link) => {
                let mut guard = self.link.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(mut old) = guard.replace(link) {
                    old.close();
                }
                true
            }
            Err(e) => {
                log::error!(
                    "Unable to connect to robot '{}': {}",
                    identity.display_name,
                    e
                );
                false
            }
        }
    }

    fn resolve_address(&self, identity: &DeviceIdentity) -> Result<BtAddress> {
        if let Ok(address) = identity.bt_address.parse::<BtAddress>() {
            return Ok(address);
        }

        log::debug!(
            "No valid address for '{}', searching paired devices for '{}'",
            identity.display_name,
            identity.bt_name
        );
        self.adapter
            .paired_devices()?
            .into_iter()
            .find(|d| d.name == identity.bt_name)
            .map(|d| d.address)
            .ok_or_else(|| {
                Error::DeviceNotFound(format!("'{}' is not paired", identity.bt_name))
            })
    }

    fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn Link>> {
        let address = self.resolve_address(identity)?;

        // Discovery running in the background makes socket connects fail spuriously
        if let Err(e) = self.adapter.cancel_discovery() {
            log::warn!("Failed to cancel discovery: {}", e);
        }

        let first_error = match self
            .adapter
            .connect_service(&address, &SERIAL_PORT_SERVICE_UUID)
        {
            Ok(link) => {
                log::info!("Connected to {} via service record", address);
                return Ok(link);
            }
            Err(e) => e,
        };
        log::warn!("Service record connect to {} failed: {}", address, first_error);

        if self.channel_fallback {
            for channel in 1..=MAX_FALLBACK_CHANNELS {
                match self.adapter.connect_channel(&address, channel) {
                    Ok(link) => {
                        log::info!("Connected to {} on channel {}", address, channel);
                        return Ok(link);
                    }
                    Err(Error::NotSupported(_)) => break,
                    Err(e) => log::debug!("Channel {} connect failed: {}", channel, e),
                }
            }
        }

        Err(Error::ConnectFailed(format!("{}: {}", address, first_error)))
    }

    /// Write raw bytes
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.link.lock().map_err(|_| Error::MutexPoisoned)?;
        let link = guard.as_mut().ok_or(Error::NotConnected)?;
        link.write_all(data)?;
        link.flush()
    }

    /// Write a text command terminated by a newline
    pub fn write_line(&self, cmd: &str) -> Result<()> {
        let mut line = Vec::with_capacity(cmd.len() + 1);
        line.extend_from_slice(cmd.as_bytes());
        line.push(b'\n');
        self.write(&line)
    }

    /// Blocking read of a single byte
    pub fn read_byte(&self) -> Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            if self.read(&mut byte, 0, 1)? == 1 {
                return Ok(byte[0]);
            }
        }
    }

    /// Read up to `len` bytes into `buffer[offset..]`. Returns 0 on a read timeout.
    pub fn read(&self, buffer: &mut [u8], offset: usize, len: usize) -> Result<usize> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= buffer.len())
            .ok_or_else(|| Error::Other("read range out of bounds".to_string()))?;
        let mut guard = self.link.lock().map_err(|_| Error::MutexPoisoned)?;
        let link = guard.as_mut().ok_or(Error::NotConnected)?;
        link.read(&mut buffer[offset..end])
    }

    /// Independent handle to the open stream for a long-lived reader thread
    pub fn reader(&self) -> Result<Box<dyn Link>> {
        let guard = self.link.lock().map_err(|_| Error::MutexPoisoned)?;
        guard.as_ref().ok_or(Error::NotConnected)?.try_clone()
    }

    /// Close the stream. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut guard = self.link.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut link) = guard.take() {
            link.close();
            log::info!("Transport disconnected");
        }
    }

    /// Whether the stream is live, not merely allocated
    pub fn is_connected(&self) -> bool {
        let guard = self.link.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().is_some_and(|link| link.is_open())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

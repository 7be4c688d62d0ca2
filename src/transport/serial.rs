//! Serial-port backed adapter
//!
//! On Linux a paired robot's RFCOMM link is bound to a TTY (`rfcomm bind`),
//! so "paired devices" are a configured table of name / address / port and
//! opening a service connection opens that port.

use super::{BluetoothAdapter, BtAddress, Link, PairedDevice};
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Serial link for RFCOMM-bound TTYs
///
/// Any I/O error other than a read timeout marks the stream dead for this
/// handle and every clone of it.
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    failed: Arc<AtomicBool>,
}

impl SerialLink {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/rfcomm0")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    /// * `read_timeout` - How long a read waits before returning 0
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);
        Ok(SerialLink {
            port: Some(port),
            failed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(Error::NotConnected);
        }
        self.port.as_mut().ok_or(Error::NotConnected)
    }

    fn fail(&self, e: io::Error) -> Error {
        if !self.failed.swap(true, Ordering::Relaxed) {
            log::warn!("Serial link lost: {}", e);
        }
        e.into()
    }
}

impl Link for SerialLink {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let result = self.port()?.read(buffer);
        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let result = self.port()?.write_all(data);
        result.map_err(|e| self.fail(e))
    }

    fn flush(&mut self) -> Result<()> {
        let result = self.port()?.flush();
        result.map_err(|e| self.fail(e))
    }

    fn try_clone(&self) -> Result<Box<dyn Link>> {
        let port = self.port.as_ref().ok_or(Error::NotConnected)?;
        Ok(Box::new(SerialLink {
            port: Some(port.try_clone()?),
            failed: Arc::clone(&self.failed),
        }))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!("Serial port closed");
        }
    }

    fn is_open(&self) -> bool {
        !self.failed.load(Ordering::Relaxed)
            && self
                .port
                .as_ref()
                .is_some_and(|port| port.bytes_to_read().is_ok())
    }
}

/// Adapter over a configured table of paired devices and their serial ports
pub struct SerialPortAdapter {
    paired: Vec<(PairedDevice, String)>,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortAdapter {
    pub fn new(config: &TransportConfig) -> Self {
        let paired = config
            .paired
            .iter()
            .filter_map(|entry| match entry.address.parse::<BtAddress>() {
                Ok(address) => Some((
                    PairedDevice {
                        name: entry.name.clone(),
                        address,
                    },
                    entry.port.clone(),
                )),
                Err(e) => {
                    log::warn!("Ignoring paired device '{}': {}", entry.name, e);
                    None
                }
            })
            .collect();

        Self {
            paired,
            baud_rate: config.baud_rate,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        }
    }

    fn port_for(&self, address: &BtAddress) -> Result<&str> {
        self.paired
            .iter()
            .find(|(device, _)| device.address == *address)
            .map(|(_, port)| port.as_str())
            .ok_or_else(|| Error::DeviceNotFound(format!("no port bound for {}", address)))
    }
}

impl BluetoothAdapter for SerialPortAdapter {
    fn paired_devices(&self) -> Result<Vec<PairedDevice>> {
        Ok(self.paired.iter().map(|(device, _)| device.clone()).collect())
    }

    fn cancel_discovery(&self) -> Result<()> {
        // Bound TTYs never run discovery
        Ok(())
    }

    fn connect_service(&self, address: &BtAddress, service: &Uuid) -> Result<Box<dyn Link>> {
        let path = self.port_for(address)?;
        log::debug!("Opening {} for {} (service {})", path, address, service);
        let link = SerialLink::open(path, self.baud_rate, self.read_timeout)?;
        Ok(Box::new(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PairedDeviceConfig;

    fn config() -> TransportConfig {
        TransportConfig {
            paired: vec![
                PairedDeviceConfig {
                    name: "FireFly".to_string(),
                    address: "00:06:66:01:02:03".to_string(),
                    port: "/dev/rfcomm0".to_string(),
                },
                PairedDeviceConfig {
                    name: "Broken".to_string(),
                    address: "nope".to_string(),
                    port: "/dev/rfcomm1".to_string(),
                },
            ],
            ..TransportConfig::default()
        }
    }

    #[test]
    fn test_paired_table_skips_bad_addresses() {
        let adapter = SerialPortAdapter::new(&config());
        let devices = adapter.paired_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "FireFly");
    }

    #[test]
    fn test_unbound_address_is_not_found() {
        let adapter = SerialPortAdapter::new(&config());
        let addr: BtAddress = "11:22:33:44:55:66".parse().unwrap();
        assert!(matches!(
            adapter.connect_service(&addr, &crate::transport::SERIAL_PORT_SERVICE_UUID),
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            adapter.connect_channel(&addr, 1),
            Err(Error::NotSupported(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_up_link_reports_closed() {
        let (master, slave) = serialport::TTYPort::pair().unwrap();
        let path = slave.name().unwrap();
        let mut link = SerialLink::open(&path, 115_200, Duration::from_millis(50)).unwrap();
        let reader = link.try_clone().unwrap();
        assert!(link.is_open());

        drop(slave);
        drop(master);

        let mut buf = [0u8; 4];
        assert!(link.read(&mut buf).is_err());
        assert!(!link.is_open());
        assert!(!reader.is_open());
        assert!(link.write_all(&[0x80, 0x84]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_idle_link_stays_open() {
        let (_master, slave) = serialport::TTYPort::pair().unwrap();
        let path = slave.name().unwrap();
        let mut link = SerialLink::open(&path, 115_200, Duration::from_millis(20)).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 0);
        assert!(link.is_open());
    }
}

//! Mock adapter and link for testing and hardware-free runs

use super::{BluetoothAdapter, BtAddress, Link, PairedDevice};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Default time a read waits for injected data before reporting a timeout
const MOCK_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// In-memory link: injected bytes are read back, written bytes are captured
///
/// Clones share the same stream, like a serial port handle and its `try_clone`.
/// Reads block until data arrives, the read timeout passes (returns 0) or the
/// link is closed (returns an error).
#[derive(Clone)]
pub struct MockLink {
    inner: Arc<(Mutex<MockLinkInner>, Condvar)>,
    read_timeout: Duration,
}

struct MockLinkInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    frames: Vec<Vec<u8>>,
    closed: bool,
    fail_writes: bool,
}

impl MockLink {
    /// Create a new open mock link
    pub fn new() -> Self {
        MockLink {
            inner: Arc::new((
                Mutex::new(MockLinkInner {
                    read_buffer: VecDeque::new(),
                    write_buffer: Vec::new(),
                    frames: Vec::new(),
                    closed: false,
                    fail_writes: false,
                }),
                Condvar::new(),
            )),
            read_timeout: MOCK_READ_TIMEOUT,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockLinkInner> {
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        let mut inner = self.lock();
        inner.read_buffer.extend(data);
        self.inner.1.notify_all();
    }

    /// All written bytes, concatenated
    pub fn written(&self) -> Vec<u8> {
        self.lock().write_buffer.clone()
    }

    /// Written data, one entry per `write_all` call
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        let mut inner = self.lock();
        inner.write_buffer.clear();
        inner.frames.clear();
    }

    /// Bytes injected but not yet read
    pub fn pending_read(&self) -> usize {
        self.lock().read_buffer.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Make writes fail without closing the link
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

impl Link for MockLink {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let guard = self.lock();
        let (mut inner, _) = self
            .inner
            .1
            .wait_timeout_while(guard, self.read_timeout, |i| {
                i.read_buffer.is_empty() && !i.closed
            })
            .unwrap_or_else(|e| e.into_inner());

        if inner.closed {
            return Err(Error::NotConnected);
        }

        let available = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(Error::NotConnected);
        }
        if inner.fail_writes {
            return Err(Error::Other("mock write failure".to_string()));
        }
        inner.write_buffer.extend_from_slice(data);
        inner.frames.push(data.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Link>> {
        Ok(Box::new(self.clone()))
    }

    fn close(&mut self) {
        let mut inner = self.lock();
        inner.closed = true;
        self.inner.1.notify_all();
    }

    fn is_open(&self) -> bool {
        !self.lock().closed
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock adapter with scriptable connect outcomes
///
/// Every successful connect hands out the current [`MockLink`]; once that link
/// is closed the next connect creates a fresh one.
pub struct MockAdapter {
    paired: Vec<PairedDevice>,
    link: Mutex<MockLink>,
    fail_service: AtomicBool,
    accept_channel: Mutex<Option<u8>>,
    connect_delay: Mutex<Duration>,
    discovery_cancels: AtomicUsize,
    service_attempts: Mutex<Vec<BtAddress>>,
    channel_attempts: Mutex<Vec<u8>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            paired: Vec::new(),
            link: Mutex::new(MockLink::new()),
            fail_service: AtomicBool::new(false),
            accept_channel: Mutex::new(None),
            connect_delay: Mutex::new(Duration::ZERO),
            discovery_cancels: AtomicUsize::new(0),
            service_attempts: Mutex::new(Vec::new()),
            channel_attempts: Mutex::new(Vec::new()),
        }
    }

    /// Add a paired device. Panics on a malformed address (test helper).
    pub fn with_paired(mut self, name: &str, address: &str) -> Self {
        let address = address.parse().expect("mock paired address");
        self.paired.push(PairedDevice {
            name: name.to_string(),
            address,
        });
        self
    }

    /// Link handed out by the most recent connect
    pub fn link(&self) -> MockLink {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make service-record connects fail
    pub fn fail_service_connect(&self, fail: bool) {
        self.fail_service.store(fail, Ordering::Relaxed);
    }

    /// Fallback channel that accepts connections, `None` for none
    pub fn accept_channel(&self, channel: Option<u8>) {
        *self.accept_channel.lock().unwrap_or_else(|e| e.into_inner()) = channel;
    }

    /// Delay every connect attempt, to observe the STARTING state
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn discovery_cancels(&self) -> usize {
        self.discovery_cancels.load(Ordering::Relaxed)
    }

    pub fn service_attempts(&self) -> Vec<BtAddress> {
        self.service_attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn channel_attempts(&self) -> Vec<u8> {
        self.channel_attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn delay(&self) {
        let delay = *self.connect_delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    fn hand_out_link(&self) -> Box<dyn Link> {
        let mut link = self.link.lock().unwrap_or_else(|e| e.into_inner());
        if link.is_closed() {
            *link = MockLink::new();
        }
        Box::new(link.clone())
    }
}

impl BluetoothAdapter for MockAdapter {
    fn paired_devices(&self) -> Result<Vec<PairedDevice>> {
        Ok(self.paired.clone())
    }

    fn cancel_discovery(&self) -> Result<()> {
        self.discovery_cancels.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn connect_service(&self, address: &BtAddress, service: &Uuid) -> Result<Box<dyn Link>> {
        log::debug!("Mock connect to {} (service {})", address, service);
        self.service_attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*address);
        self.delay();
        if self.fail_service.load(Ordering::Relaxed) {
            return Err(Error::ConnectFailed("service discovery failed".to_string()));
        }
        Ok(self.hand_out_link())
    }

    fn connect_channel(&self, address: &BtAddress, channel: u8) -> Result<Box<dyn Link>> {
        log::debug!("Mock connect to {} (channel {})", address, channel);
        self.channel_attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(channel);
        let accepted = *self.accept_channel.lock().unwrap_or_else(|e| e.into_inner());
        if accepted == Some(channel) {
            Ok(self.hand_out_link())
        } else {
            Err(Error::ConnectFailed(format!("channel {} refused", channel)))
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

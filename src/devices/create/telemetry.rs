//! Sensor stream reader for the Create
//!
//! After a stream-start request the robot pushes a 9-byte frame every 15 ms:
//!
//! ```text
//! [19][count=6][19][dist hi][dist lo][20][angle hi][angle lo][checksum]
//! ```
//!
//! The checksum makes the byte sum of the whole frame zero mod 256. The
//! reader synchronizes on `19, 6`, drops the first (partial) data set, then
//! reads whole frames. A frame with a bad header or checksum triggers a
//! resync on the next `19, 6`.

use super::constants::*;
use super::odometry::OdometryState;
use crate::error::{Error, Result};
use crate::transport::Link;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Distance and angle deltas carried by one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorFrame {
    pub distance: Option<i16>,
    pub angle: Option<i16>,
}

/// True when the frame's bytes sum to zero mod 256
pub fn checksum_ok(frame: &[u8]) -> bool {
    frame.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
}

/// Decode a 9-byte stream frame, `None` if the header is wrong
pub fn parse_frame(frame: &[u8; STREAM_FRAME_SIZE]) -> Option<SensorFrame> {
    if frame[0] != STREAM_HEADER {
        return None;
    }

    // Pairs of (id, hi, lo) fill `count` bytes after the count byte
    let end = (2 + frame[1] as usize).min(STREAM_FRAME_SIZE - 1);
    let mut parsed = SensorFrame::default();
    let mut i = 2;
    while i + 2 < end {
        let value = i16::from_be_bytes([frame[i + 1], frame[i + 2]]);
        match frame[i] {
            PACKET_DISTANCE => parsed.distance = Some(value),
            PACKET_ANGLE => parsed.angle = Some(value),
            other => log::trace!("Ignoring sensor packet id {}", other),
        }
        i += 3;
    }
    Some(parsed)
}

/// Frame reader over a dedicated link handle
struct StreamReader {
    link: Box<dyn Link>,
    stop: Arc<AtomicBool>,
    validate_checksum: bool,
}

impl StreamReader {
    /// Fill `buf` completely. Returns `Ok(false)` if stopped first.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(false);
            }
            filled += self.link.read(&mut buf[filled..])?;
        }
        Ok(true)
    }

    /// Consume bytes up to and including a `19, 6` header
    fn find_header(&mut self) -> Result<bool> {
        let mut byte = [0u8; 1];
        let mut after_header = false;
        loop {
            if !self.read_exact(&mut byte)? {
                return Ok(false);
            }
            if after_header && byte[0] == STREAM_FRAME_COUNT {
                return Ok(true);
            }
            after_header = byte[0] == STREAM_HEADER;
        }
    }

    /// Align to the stream and drop the first data set
    fn synchronize(&mut self) -> Result<bool> {
        if !self.find_header()? {
            return Ok(false);
        }
        let mut discard = [0u8; SYNC_DISCARD_BYTES];
        self.read_exact(&mut discard)
    }

    /// Realign after a bad frame; the frame following the header is returned
    fn resync(&mut self, frame: &mut [u8; STREAM_FRAME_SIZE]) -> Result<bool> {
        if !self.find_header()? {
            return Ok(false);
        }
        frame[0] = STREAM_HEADER;
        frame[1] = STREAM_FRAME_COUNT;
        self.read_exact(&mut frame[2..])
    }

    fn is_valid(&self, frame: &[u8; STREAM_FRAME_SIZE]) -> bool {
        !self.validate_checksum || checksum_ok(frame)
    }

    fn run(mut self, odometry: Arc<Mutex<OdometryState>>) -> Result<()> {
        if !self.synchronize()? {
            return Ok(());
        }
        log::info!("Sensor stream synchronized");

        let mut frame = [0u8; STREAM_FRAME_SIZE];
        let mut have_frame = false;
        let mut dropped = 0u64;

        while !self.stop.load(Ordering::Relaxed) {
            if !have_frame && !self.read_exact(&mut frame)? {
                break;
            }
            have_frame = false;

            let parsed = if self.is_valid(&frame) {
                parse_frame(&frame)
            } else {
                None
            };

            let Some(parsed) = parsed else {
                dropped += 1;
                log::warn!(
                    "Dropping sensor frame {:02X?} ({} dropped), resynchronizing",
                    frame,
                    dropped
                );
                if !self.resync(&mut frame)? {
                    break;
                }
                have_frame = true;
                continue;
            };

            {
                let mut odom = odometry.lock().map_err(|_| Error::MutexPoisoned)?;
                odom.integrate(parsed.distance, parsed.angle);
            }

            thread::sleep(Duration::from_millis(READER_POLL_MS));
        }
        Ok(())
    }
}

/// Running sensor reader thread
pub struct TelemetryReader {
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl TelemetryReader {
    /// Spawn the reader on `link`, accumulating into `odometry`
    pub fn spawn(
        link: Box<dyn Link>,
        odometry: Arc<Mutex<OdometryState>>,
        validate_checksum: bool,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = bounded(1);

        let reader = StreamReader {
            link,
            stop: Arc::clone(&stop),
            validate_checksum,
        };
        let handle = thread::Builder::new()
            .name("create-telemetry".to_string())
            .spawn(move || {
                if let Err(e) = reader.run(odometry) {
                    log::error!("Sensor reader stopped: {}", e);
                }
                log::info!("Sensor reader thread exiting");
                let _ = done_tx.send(());
            })
            .map_err(|e| Error::Other(format!("Failed to spawn telemetry thread: {}", e)))?;

        Ok(Self {
            stop,
            done,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still reading
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Request a stop and wait up to `timeout` for the thread to exit
    ///
    /// A thread still blocked after the timeout is detached; closing the
    /// transport afterwards unblocks its read.
    pub fn stop(&mut self, timeout: Duration) {
        self.stop.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return;
        };

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    log::error!("Sensor reader thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Sensor reader did not stop within {:?}, detaching",
                    timeout
                );
            }
        }
    }
}

impl Drop for TelemetryReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

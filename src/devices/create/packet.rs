//! Outgoing Open Interface frames
//!
//! `TxPacket` is one reusable buffer sized for the largest frame (a script
//! with stream pause/resume, 20 bytes). Every setter overwrites the previous
//! contents.
//!
//! ```ignore
//! let mut pkt = TxPacket::new();
//! pkt.set_drive(300, 300);
//! transport.write(pkt.as_bytes())?;
//! ```

use super::constants::*;
use crate::core::types::Direction;

/// Largest frame: script with pause and resume sub-frames
const MAX_PACKET_SIZE: usize = 20;

/// Scale a generic velocity unit to mm/s, clamped to the drive limits
pub fn scale_velocity(value: i32) -> i16 {
    value
        .saturating_mul(VELOCITY_SCALE)
        .clamp(-MAX_VELOCITY, MAX_VELOCITY) as i16
}

/// Left/right wheel velocities (mm/s) for a fixed-speed move
pub fn fixed_velocities(direction: Direction) -> (i16, i16) {
    match direction {
        Direction::Forward => (STRAIGHT_VELOCITY, STRAIGHT_VELOCITY),
        Direction::Backward => (-STRAIGHT_VELOCITY, -STRAIGHT_VELOCITY),
        Direction::Left => (-TURN_VELOCITY, TURN_VELOCITY),
        Direction::Right => (TURN_VELOCITY, -TURN_VELOCITY),
    }
}

/// Left/right wheel velocities for a move at `speed` (mm/s, already scaled)
pub fn directed_velocities(direction: Direction, speed: i16) -> (i16, i16) {
    match direction {
        Direction::Forward => (speed, speed),
        Direction::Backward => (-speed, -speed),
        Direction::Left => (-speed, speed),
        Direction::Right => (speed, -speed),
    }
}

/// Reusable TX buffer for Create frames
pub struct TxPacket {
    data: [u8; MAX_PACKET_SIZE],
    len: usize,
}

impl TxPacket {
    pub const fn new() -> Self {
        Self {
            data: [0u8; MAX_PACKET_SIZE],
            len: 0,
        }
    }

    /// Get packet bytes for sending
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    fn push(&mut self, byte: u8) {
        self.data[self.len] = byte;
        self.len += 1;
    }

    #[inline]
    fn push_i16(&mut self, value: i16) {
        let [hi, lo] = value.to_be_bytes();
        self.push(hi);
        self.push(lo);
    }

    fn push_drive(&mut self, left: i16, right: i16) {
        self.push(OP_DRIVE_DIRECT);
        self.push_i16(right);
        self.push_i16(left);
    }

    // ========================================================================
    // Mode and motion
    // ========================================================================

    /// Start + full mode (0x80 0x84)
    pub fn set_start(&mut self) {
        self.len = 0;
        self.push(OP_START);
        self.push(OP_FULL);
    }

    /// Drive direct (0x91): right velocity then left velocity, mm/s
    pub fn set_drive(&mut self, left: i16, right: i16) {
        self.len = 0;
        self.push_drive(left, right);
    }

    // ========================================================================
    // Telemetry stream
    // ========================================================================

    /// Stream distance (19) and angle (20) packets
    pub fn set_stream_start(&mut self) {
        self.len = 0;
        self.push(OP_STREAM);
        self.push(2);
        self.push(PACKET_DISTANCE);
        self.push(PACKET_ANGLE);
    }

    // ========================================================================
    // Scripts
    // ========================================================================

    /// Move `amount` mm (forward/backward) or turn `amount` degrees (left/right), then stop
    ///
    /// `speed` is in generic units and scaled like a wheel velocity. When the
    /// telemetry stream is running it is paused for the duration of the script
    /// definition and resumed at the end.
    ///
    /// Layout: `0x98 len [0x96 0x00] drive(5) wait hi lo drive(0,0) [0x96 0x01] 0x99`
    pub fn set_script(&mut self, direction: Direction, speed: i32, amount: i32, streaming: bool) {
        let speed = scale_velocity(speed);
        let (left, right) = directed_velocities(direction, speed);
        let amount = amount.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let (wait_op, value) = match direction {
            Direction::Forward => (OP_WAIT_DISTANCE, amount),
            Direction::Backward => (OP_WAIT_DISTANCE, amount.saturating_neg()),
            Direction::Left => (OP_WAIT_ANGLE, amount),
            Direction::Right => (OP_WAIT_ANGLE, amount.saturating_neg()),
        };

        self.len = 0;
        self.push(OP_SCRIPT);
        self.push(0); // length, patched below
        if streaming {
            self.push(OP_PAUSE_RESUME_STREAM);
            self.push(STREAM_PAUSE);
        }
        self.push_drive(left, right);
        self.push(wait_op);
        self.push_i16(value);
        self.push_drive(0, 0);
        if streaming {
            self.push(OP_PAUSE_RESUME_STREAM);
            self.push(STREAM_RESUME);
        }
        self.push(OP_PLAY_SCRIPT);
        self.data[1] = (self.len - 2) as u8;
    }
}

impl Default for TxPacket {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-configured start + full mode packet
pub fn start_packet() -> TxPacket {
    let mut pkt = TxPacket::new();
    pkt.set_start();
    pkt
}

/// Pre-configured stop packet (velocity 0/0)
pub fn stop_packet() -> TxPacket {
    let mut pkt = TxPacket::new();
    pkt.set_drive(0, 0);
    pkt
}

/// Pre-configured stream start packet
pub fn stream_start_packet() -> TxPacket {
    let mut pkt = TxPacket::new();
    pkt.set_stream_start();
    pkt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_values(bytes: &[u8]) -> (i16, i16) {
        let right = i16::from_be_bytes([bytes[1], bytes[2]]);
        let left = i16::from_be_bytes([bytes[3], bytes[4]]);
        (left, right)
    }

    #[test]
    fn test_start_packet() {
        assert_eq!(start_packet().as_bytes(), &[0x80, 0x84]);
    }

    #[test]
    fn test_stream_start_packet() {
        assert_eq!(stream_start_packet().as_bytes(), &[0x94, 0x02, 0x13, 0x14]);
    }

    #[test]
    fn test_velocity_scaling_clamps() {
        for v in -1000..=1000 {
            let expected = (v * 5).clamp(-500, 500);
            assert_eq!(scale_velocity(v) as i32, expected);

            let mut pkt = TxPacket::new();
            pkt.set_drive(scale_velocity(v), scale_velocity(-v));
            assert_eq!(pkt.as_bytes().len(), 5);
            assert_eq!(pkt.as_bytes()[0], 0x91);
        }
        assert_eq!(scale_velocity(i32::MAX), 500);
        assert_eq!(scale_velocity(i32::MIN), -500);
    }

    #[test]
    fn test_drive_puts_right_wheel_first() {
        let mut pkt = TxPacket::new();
        pkt.set_drive(scale_velocity(100), scale_velocity(-100));
        // [91] [right hi lo] [left hi lo]
        assert_eq!(pkt.as_bytes(), &[0x91, 0xFE, 0x0C, 0x01, 0xF4]);
        assert_eq!(drive_values(pkt.as_bytes()), (500, -500));
    }

    #[test]
    fn test_fixed_velocities() {
        assert_eq!(fixed_velocities(Direction::Forward), (300, 300));
        assert_eq!(fixed_velocities(Direction::Backward), (-300, -300));
        assert_eq!(fixed_velocities(Direction::Left), (-100, 100));
        assert_eq!(fixed_velocities(Direction::Right), (100, -100));
    }

    #[test]
    fn test_script_forward_layout() {
        let mut pkt = TxPacket::new();
        pkt.set_script(Direction::Forward, 40, 500, false);
        let bytes = pkt.as_bytes();

        // 98 len | 91 r r l l | 9C hi lo | 91 0 0 0 0 | 99
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], 0x98);
        assert_eq!(bytes[1], 14);
        assert_eq!(drive_values(&bytes[2..7]), (200, 200));
        assert_eq!(bytes[7], 0x9C);
        assert_eq!(i16::from_be_bytes([bytes[8], bytes[9]]), 500);
        assert_eq!(&bytes[10..15], &[0x91, 0, 0, 0, 0]);
        assert_eq!(bytes[15], 0x99);
    }

    #[test]
    fn test_script_right_turn_with_stream() {
        let mut pkt = TxPacket::new();
        pkt.set_script(Direction::Right, 20, 90, true);
        let bytes = pkt.as_bytes();

        assert_eq!(bytes.len(), 20);
        assert_eq!(bytes[1], 18);
        assert_eq!(&bytes[2..4], &[0x96, 0x00]);
        assert_eq!(drive_values(&bytes[4..9]), (100, -100));
        assert_eq!(bytes[9], 0x9D);
        assert_eq!(i16::from_be_bytes([bytes[10], bytes[11]]), -90);
        assert_eq!(&bytes[17..19], &[0x96, 0x01]);
        assert_eq!(bytes[19], 0x99);
    }

    #[test]
    fn test_script_length_byte_for_every_direction() {
        let mut pkt = TxPacket::new();
        for direction in [
            Direction::Forward,
            Direction::Backward,
            Direction::Left,
            Direction::Right,
        ] {
            for streaming in [false, true] {
                pkt.set_script(direction, 100, 1000, streaming);
                let bytes = pkt.as_bytes();
                assert_eq!(bytes[1] as usize, bytes.len() - 2);
                assert_eq!(*bytes.last().unwrap(), 0x99);
            }
        }
    }

    #[test]
    fn test_script_backward_negates_distance() {
        let mut pkt = TxPacket::new();
        pkt.set_script(Direction::Backward, 200, 300, false);
        let bytes = pkt.as_bytes();
        assert_eq!(drive_values(&bytes[2..7]), (-500, -500));
        assert_eq!(i16::from_be_bytes([bytes[8], bytes[9]]), -300);
    }

    #[test]
    fn test_packet_reuse() {
        let mut pkt = TxPacket::new();
        pkt.set_script(Direction::Left, 10, 45, true);
        assert_eq!(pkt.as_bytes().len(), 20);
        pkt.set_start();
        assert_eq!(pkt.as_bytes().len(), 2);
        assert_eq!(stop_packet().as_bytes(), &[0x91, 0, 0, 0, 0]);
    }
}

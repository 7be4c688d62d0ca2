//! LEGO direct-command SETOUTPUTSTATE frames
//!
//! Every payload is 14 bytes on the wire:
//!
//! ```text
//! [len lo][len hi][0x80][0x04][port][power i8][mode][regulation][turn 0][run state][tacho x4]
//! ```
//!
//! Drive commands write one payload for the left motor (port B) followed by
//! one for the right motor (port C), 28 bytes total. Head commands address
//! the pan/tilt motor on port A alone.

/// Bytes following the 2-byte length prefix
const COMMAND_LENGTH: u8 = 0x0C;
/// One payload including its length prefix
pub const PAYLOAD_SIZE: usize = 14;
const MAX_PACKET_SIZE: usize = 2 * PAYLOAD_SIZE;

// Command type / opcode
pub const DIRECT_NO_RESPONSE: u8 = 0x80;
pub const OP_SET_OUTPUT_STATE: u8 = 0x04;

// Output ports
pub const PORT_HEAD: u8 = 0x00; // A
pub const PORT_LEFT: u8 = 0x01; // B
pub const PORT_RIGHT: u8 = 0x02; // C

// Mode flags
pub const MODE_MOTOR_ON: u8 = 0x01;
pub const MODE_BRAKE: u8 = 0x02;
pub const MODE_REGULATED: u8 = 0x04;

// Regulation modes
pub const REGULATION_IDLE: u8 = 0x00;
pub const REGULATION_MOTOR_SPEED: u8 = 0x01;

// Run states
pub const RUN_STATE_IDLE: u8 = 0x00;
pub const RUN_STATE_RUNNING: u8 = 0x20;

/// Motor power limits
pub const MAX_POWER: i32 = 100;
pub const POWER_SCALE: i32 = 5;
/// Power of the slowed side during a fixed turn
pub const TURN_POWER: i8 = 40;

/// Scale a generic wheel velocity to motor power, clamped to ±100
pub fn scale_power(value: i32) -> i8 {
    value
        .saturating_mul(POWER_SCALE)
        .clamp(-MAX_POWER, MAX_POWER) as i8
}

/// Reusable TX buffer for NXT output commands
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

    fn push_output_state(&mut self, port: u8, power: i8, running: bool) {
        let (mode, regulation, run_state) = if running {
            (
                MODE_MOTOR_ON | MODE_REGULATED,
                REGULATION_MOTOR_SPEED,
                RUN_STATE_RUNNING,
            )
        } else {
            (MODE_BRAKE, REGULATION_IDLE, RUN_STATE_IDLE)
        };

        let start = self.len;
        let payload = &mut self.data[start..start + PAYLOAD_SIZE];
        payload[0] = COMMAND_LENGTH;
        payload[1] = 0x00;
        payload[2] = DIRECT_NO_RESPONSE;
        payload[3] = OP_SET_OUTPUT_STATE;
        payload[4] = port;
        payload[5] = power as u8;
        payload[6] = mode;
        payload[7] = regulation;
        payload[8] = 0x00; // turn ratio
        payload[9] = run_state;
        payload[10..14].fill(0x00); // tacho limit, 0 = run forever
        self.len += PAYLOAD_SIZE;
    }

    // ========================================================================
    // Drive (ports B + C)
    // ========================================================================

    /// Run both drive motors at the given power
    pub fn set_drive(&mut self, left: i8, right: i8) {
        self.len = 0;
        self.push_output_state(PORT_LEFT, left, true);
        self.push_output_state(PORT_RIGHT, right, true);
    }

    /// Brake both drive motors
    pub fn set_drive_stop(&mut self) {
        self.len = 0;
        self.push_output_state(PORT_LEFT, 0, false);
        self.push_output_state(PORT_RIGHT, 0, false);
    }

    // ========================================================================
    // Head (port A)
    // ========================================================================

    /// Run the pan/tilt motor; positive power pans left / tilts up
    pub fn set_head(&mut self, power: i8) {
        self.len = 0;
        self.push_output_state(PORT_HEAD, power, true);
    }

    /// Brake the pan/tilt motor
    pub fn set_head_stop(&mut self) {
        self.len = 0;
        self.push_output_state(PORT_HEAD, 0, false);
    }
}

impl Default for TxPacket {
    fn default() -> Self {
        Self::new()
    }
}

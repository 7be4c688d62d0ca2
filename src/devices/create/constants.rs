//! Constants for the iRobot Create Open Interface

// Mode opcodes
pub const OP_START: u8 = 0x80; // Enter passive mode
pub const OP_FULL: u8 = 0x84; // Full mode, safety checks off

// Motion opcodes
pub const OP_DRIVE_DIRECT: u8 = 0x91; // Right then left velocity, i16 BE each

// Script opcodes
pub const OP_SCRIPT: u8 = 0x98; // Define script: length then body
pub const OP_PLAY_SCRIPT: u8 = 0x99; // Play the script just defined
pub const OP_WAIT_DISTANCE: u8 = 0x9C; // Wait until distance (mm, i16 BE) travelled
pub const OP_WAIT_ANGLE: u8 = 0x9D; // Wait until angle (deg, i16 BE) turned

// Stream opcodes
pub const OP_STREAM: u8 = 0x94; // Start streaming: count then packet ids
pub const OP_PAUSE_RESUME_STREAM: u8 = 0x96; // 0x00 = pause, 0x01 = resume
pub const STREAM_PAUSE: u8 = 0x00;
pub const STREAM_RESUME: u8 = 0x01;

// Sensor packet ids
pub const PACKET_DISTANCE: u8 = 19; // Distance since last read (mm, i16 BE)
pub const PACKET_ANGLE: u8 = 20; // Angle since last read (deg, i16 BE)

// Stream framing
pub const STREAM_HEADER: u8 = 19; // First byte of every stream frame
pub const STREAM_FRAME_COUNT: u8 = 6; // Bytes following the count, excluding checksum
pub const STREAM_FRAME_SIZE: usize = 9; // header, count, 2 x (id, hi, lo), checksum
pub const SYNC_DISCARD_BYTES: usize = 7; // Rest of the first frame after header + count

// Velocity limits (mm/s)
pub const MAX_VELOCITY: i32 = 500;
pub const VELOCITY_SCALE: i32 = 5; // Generic unit -> mm/s
pub const STRAIGHT_VELOCITY: i16 = 300;
pub const TURN_VELOCITY: i16 = 100;

// Timing
pub const READER_POLL_MS: u64 = 5;

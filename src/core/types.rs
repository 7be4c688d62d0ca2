//! Core data types shared by every backend.
//!
//! - [`ControllerState`]: lifecycle of a backend's connection
//! - [`DeviceIdentity`]: which robot to connect to
//! - [`GenericCommand`]: parsed form of the ASCII command vocabulary

use std::fmt;

/// Connection lifecycle of a backend
///
/// ```text
/// NONE ──connect──▶ STARTING ──open ok──▶ SUCCESS
///                       │
///                       └──open failed──▶ BLUETOOTH_FAIL
/// ```
///
/// `Error` is reserved for failures observed while already connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    None,
    Starting,
    Success,
    BluetoothFail,
    Error,
}

impl ControllerState {
    /// True once a connection attempt has resolved either way
    pub fn is_settled(self) -> bool {
        !matches!(self, ControllerState::Starting)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::None => "NONE",
            ControllerState::Starting => "STARTING",
            ControllerState::Success => "SUCCESS",
            ControllerState::BluetoothFail => "BLUETOOTH_FAIL",
            ControllerState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Robot to connect to
///
/// `bt_address` wins when it is a well-formed hardware address; otherwise
/// the transport looks `bt_name` up among paired devices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceIdentity {
    pub display_name: String,
    pub bt_name: String,
    pub bt_address: String,
}

impl DeviceIdentity {
    pub fn new(display_name: &str, bt_name: &str, bt_address: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            bt_name: bt_name.to_string(),
            bt_address: bt_address.to_string(),
        }
    }
}

/// Drive direction for fixed-speed, timed and scripted moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "f" => Some(Direction::Forward),
            "b" => Some(Direction::Backward),
            "l" => Some(Direction::Left),
            "r" => Some(Direction::Right),
            _ => None,
        }
    }
}

/// Head / turret motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadAction {
    Left,
    Right,
    Up,
    Down,
    Stop,
    Center,
}

impl HeadAction {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "hl" => Some(HeadAction::Left),
            "hr" => Some(HeadAction::Right),
            "hu" => Some(HeadAction::Up),
            "hd" => Some(HeadAction::Down),
            "hs" => Some(HeadAction::Stop),
            "hc" => Some(HeadAction::Center),
            _ => None,
        }
    }

    fn takes_percent(self) -> bool {
        !matches!(self, HeadAction::Stop | HeadAction::Center)
    }
}

/// Parsed generic command
///
/// Grammar (space-delimited ASCII):
///
/// ```text
/// f | b | l | r                     fixed-speed move
/// f|b|l|r <speed> <durationMs>      timed move, host stops after durationMs
/// s                                 stop
/// w <left> <right>                  differential wheel velocity, -100..100
/// fd|bd|ld|rd <speed> <amount>      scripted move: amount is mm (fd/bd) or degrees (ld/rd)
/// hl|hr|hu|hd [<percent>]           head pan/tilt, percent 0..100
/// hs | hc                           head stop / center
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericCommand {
    Move(Direction),
    TimedMove {
        direction: Direction,
        speed: i32,
        duration_ms: u64,
    },
    Stop,
    Wheels {
        left: i32,
        right: i32,
    },
    ScriptedMove {
        direction: Direction,
        speed: i32,
        amount: i32,
    },
    Head {
        action: HeadAction,
        percent: Option<u8>,
    },
}

impl GenericCommand {
    /// Parse a command string, returning `None` for unknown verbs or malformed arguments
    pub fn parse(cmd: &str) -> Option<Self> {
        let tokens: Vec<&str> = cmd.split_whitespace().collect();
        let (&verb, args) = tokens.split_first()?;

        if let Some(direction) = Direction::from_token(verb) {
            return match args {
                [] => Some(GenericCommand::Move(direction)),
                [speed, duration] => Some(GenericCommand::TimedMove {
                    direction,
                    speed: speed.parse().ok()?,
                    duration_ms: duration.parse().ok()?,
                }),
                _ => None,
            };
        }

        if let Some(action) = HeadAction::from_token(verb) {
            return match args {
                [] => Some(GenericCommand::Head {
                    action,
                    percent: None,
                }),
                [percent] if action.takes_percent() => {
                    let percent: i32 = percent.parse().ok()?;
                    Some(GenericCommand::Head {
                        action,
                        percent: Some(percent.clamp(0, 100) as u8),
                    })
                }
                _ => None,
            };
        }

        match (verb, args) {
            ("s", []) => Some(GenericCommand::Stop),
            ("w", [left, right]) => Some(GenericCommand::Wheels {
                left: left.parse().ok()?,
                right: right.parse().ok()?,
            }),
            ("fd" | "bd" | "ld" | "rd", [speed, amount]) => {
                let direction = Direction::from_token(&verb[..1])?;
                Some(GenericCommand::ScriptedMove {
                    direction,
                    speed: speed.parse().ok()?,
                    amount: amount.parse().ok()?,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed_moves() {
        assert_eq!(
            GenericCommand::parse("f"),
            Some(GenericCommand::Move(Direction::Forward))
        );
        assert_eq!(
            GenericCommand::parse("r"),
            Some(GenericCommand::Move(Direction::Right))
        );
        assert_eq!(GenericCommand::parse("s"), Some(GenericCommand::Stop));
    }

    #[test]
    fn test_parse_wheels() {
        assert_eq!(
            GenericCommand::parse("w 100 -100"),
            Some(GenericCommand::Wheels {
                left: 100,
                right: -100
            })
        );
        assert_eq!(GenericCommand::parse("w 100"), None);
        assert_eq!(GenericCommand::parse("w fast slow"), None);
    }

    #[test]
    fn test_parse_scripted_and_timed() {
        assert_eq!(
            GenericCommand::parse("ld 40 90"),
            Some(GenericCommand::ScriptedMove {
                direction: Direction::Left,
                speed: 40,
                amount: 90
            })
        );
        assert_eq!(
            GenericCommand::parse("b 60 1500"),
            Some(GenericCommand::TimedMove {
                direction: Direction::Backward,
                speed: 60,
                duration_ms: 1500
            })
        );
        assert_eq!(GenericCommand::parse("fd 40"), None);
    }

    #[test]
    fn test_parse_head() {
        assert_eq!(
            GenericCommand::parse("hu"),
            Some(GenericCommand::Head {
                action: HeadAction::Up,
                percent: None
            })
        );
        assert_eq!(
            GenericCommand::parse("hl 250"),
            Some(GenericCommand::Head {
                action: HeadAction::Left,
                percent: Some(100)
            })
        );
        assert_eq!(GenericCommand::parse("hs 10"), None);
    }

    #[test]
    fn test_unknown_verbs_rejected() {
        assert_eq!(GenericCommand::parse(""), None);
        assert_eq!(GenericCommand::parse("dance"), None);
        assert_eq!(GenericCommand::parse("x 1 2"), None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ControllerState::BluetoothFail.to_string(), "BLUETOOTH_FAIL");
        assert!(!ControllerState::Starting.is_settled());
        assert!(ControllerState::Success.is_settled());
    }
}

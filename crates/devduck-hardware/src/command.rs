//! Command vocabulary: the atomic motions the duck firmware understands.
//!
//! Wire format is the ASCII token followed by `\n`. The firmware matches on the
//! token verbatim, so tokens must never change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Line terminator appended to every command on the wire.
pub const LINE_TERMINATOR: u8 = b'\n';

/// One atomic motion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestureCommand {
    Nod,
    Shake,
    LookUp,
    LookDown,
    Left,
    Right,
    Dance,
    Surprise,
    DanceAgain,
}

impl GestureCommand {
    pub const ALL: [GestureCommand; 9] = [
        GestureCommand::Nod,
        GestureCommand::Shake,
        GestureCommand::LookUp,
        GestureCommand::LookDown,
        GestureCommand::Left,
        GestureCommand::Right,
        GestureCommand::Dance,
        GestureCommand::Surprise,
        GestureCommand::DanceAgain,
    ];

    /// Token sent to the firmware (without terminator).
    pub fn wire_token(self) -> &'static str {
        match self {
            GestureCommand::Nod => "NOD",
            GestureCommand::Shake => "SHAKE",
            GestureCommand::LookUp => "LOOKUP",
            GestureCommand::LookDown => "LOOKDOWN",
            GestureCommand::Left => "LEFT",
            GestureCommand::Right => "RIGHT",
            GestureCommand::Dance => "DANCE",
            GestureCommand::Surprise => "SURPRISE",
            GestureCommand::DanceAgain => "DANCEAGAIN",
        }
    }

    /// Full wire frame for this command.
    pub fn encode(self) -> Vec<u8> {
        encode(self)
    }
}

/// Encode a command as newline-terminated ASCII.
pub fn encode(command: GestureCommand) -> Vec<u8> {
    let token = command.wire_token().as_bytes();
    let mut bytes = Vec::with_capacity(token.len() + 1);
    bytes.extend_from_slice(token);
    bytes.push(LINE_TERMINATOR);
    bytes
}

impl fmt::Display for GestureCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_token())
    }
}

/// Returned when an action name does not match any gesture.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown gesture: {0}")]
pub struct UnknownGesture(pub String);

impl FromStr for GestureCommand {
    type Err = UnknownGesture;

    /// Case-insensitive; `_` and `-` are ignored so `dance_again` == `DANCEAGAIN`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        GestureCommand::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.wire_token() == folded)
            .ok_or_else(|| UnknownGesture(s.to_string()))
    }
}

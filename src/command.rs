//! Operator command vocabulary.
//!
//! Each command is one ASCII byte on the command channel. Bytes outside the
//! table decode to `None` and are ignored by the controller.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
}

impl Direction {
    /// Keyword used by the vehicle text protocol.
    pub fn keyword(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Back => "back",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Takeoff,
    Land,
    Move(Direction),
    /// Switch to autonomous line following.
    Auto,
    /// Switch to teleoperation.
    Manual,
    Quit,
}

const COMMAND_TABLE: [(u8, Command); 9] = [
    (b't', Command::Takeoff),
    (b'l', Command::Land),
    (b'w', Command::Move(Direction::Forward)),
    (b's', Command::Move(Direction::Back)),
    (b'a', Command::Move(Direction::Left)),
    (b'd', Command::Move(Direction::Right)),
    (b'1', Command::Auto),
    (b'0', Command::Manual),
    (b'q', Command::Quit),
];

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(b, _)| *b == byte)
            .map(|(_, command)| *command)
    }
}

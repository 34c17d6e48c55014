use std::fmt;
use std::str::FromStr;

use crate::board::{CellId, Seat};

/// Prefix of the one-shot seat assignment line a host sends to every
/// accepted connection before any game traffic.
pub const HANDSHAKE_PREFIX: &str = "Ex:";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown instruction kind: {0}")]
    UnknownKind(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("malformed number: {0}")]
    BadNumber(String),
    #[error("malformed handshake: {0}")]
    BadHandshake(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Join,
    Play,
    Load,
    Ready,
    EndTurn,
    Error,
}

impl MoveKind {
    pub fn token(self) -> &'static str {
        match self {
            MoveKind::Join => "JOIN",
            MoveKind::Play => "PLAY",
            MoveKind::Load => "LOAD",
            MoveKind::Ready => "READY",
            MoveKind::EndTurn => "NEXT",
            MoveKind::Error => "ERROR",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "JOIN" => Some(MoveKind::Join),
            "PLAY" => Some(MoveKind::Play),
            "LOAD" => Some(MoveKind::Load),
            "READY" => Some(MoveKind::Ready),
            "NEXT" => Some(MoveKind::EndTurn),
            "ERROR" => Some(MoveKind::Error),
            _ => None,
        }
    }
}

/// The wire message exchanged between engines. Unset fields are explicit
/// `None`s rather than sentinel values; on the wire they encode as `-`.
///
/// `Join` reuses the seat field to carry the player count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveInstruction {
    pub kind: MoveKind,
    pub seat: Option<Seat>,
    pub origin: Option<CellId>,
    pub dest: Option<CellId>,
}

impl MoveInstruction {
    pub fn join(players: Seat) -> Self {
        Self::bare(MoveKind::Join, players)
    }

    pub fn play(seat: Seat, origin: CellId, dest: CellId) -> Self {
        MoveInstruction {
            kind: MoveKind::Play,
            seat: Some(seat),
            origin: Some(origin),
            dest: Some(dest),
        }
    }

    pub fn load(seat: Seat) -> Self {
        Self::bare(MoveKind::Load, seat)
    }

    pub fn ready(seat: Seat) -> Self {
        Self::bare(MoveKind::Ready, seat)
    }

    pub fn end_turn(seat: Seat) -> Self {
        Self::bare(MoveKind::EndTurn, seat)
    }

    pub fn error() -> Self {
        MoveInstruction {
            kind: MoveKind::Error,
            seat: None,
            origin: None,
            dest: None,
        }
    }

    fn bare(kind: MoveKind, seat: Seat) -> Self {
        MoveInstruction {
            kind,
            seat: Some(seat),
            origin: None,
            dest: None,
        }
    }
}

impl fmt::Display for MoveInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field<T: fmt::Display>(value: Option<T>) -> String {
            value.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "{};{};{};{}",
            self.kind.token(),
            field(self.seat),
            field(self.origin),
            field(self.dest)
        )
    }
}

fn parse_field<T: FromStr>(token: &str) -> Result<Option<T>, ProtocolError> {
    if token == "-" {
        return Ok(None);
    }
    token
        .parse()
        .map(Some)
        .map_err(|_| ProtocolError::BadNumber(token.to_string()))
}

impl FromStr for MoveInstruction {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.trim_end().split(';');
        let token = parts.next().unwrap_or_default();
        let kind = MoveKind::from_token(token)
            .ok_or_else(|| ProtocolError::UnknownKind(token.to_string()))?;
        let seat = parse_field(parts.next().ok_or(ProtocolError::MissingField("seat"))?)?;
        let origin = parse_field(parts.next().ok_or(ProtocolError::MissingField("origin"))?)?;
        let dest = parse_field(parts.next().ok_or(ProtocolError::MissingField("dest"))?)?;
        Ok(MoveInstruction {
            kind,
            seat,
            origin,
            dest,
        })
    }
}

/// Seat assignment sent host -> peer, exactly once per connection:
/// `Ex:<assignedSeat>;<startingSeat>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub seat: Seat,
    pub starting_seat: Seat,
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{};{}", HANDSHAKE_PREFIX, self.seat, self.starting_seat)
    }
}

impl FromStr for Handshake {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let rest = line
            .trim_end()
            .strip_prefix(HANDSHAKE_PREFIX)
            .ok_or_else(|| ProtocolError::BadHandshake(line.to_string()))?;
        let (seat, starting) = rest
            .split_once(';')
            .ok_or_else(|| ProtocolError::BadHandshake(line.to_string()))?;
        let parse = |token: &str| {
            token
                .parse::<Seat>()
                .map_err(|_| ProtocolError::BadNumber(token.to_string()))
        };
        Ok(Handshake {
            seat: parse(seat)?,
            starting_seat: parse(starting)?,
        })
    }
}

/// A decoded inbound line: either the seat-assignment handshake or a game
/// instruction, told apart by the `Ex:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Handshake(Handshake),
    Instruction(MoveInstruction),
}

impl FromStr for WireMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line.starts_with(HANDSHAKE_PREFIX) {
            line.parse().map(WireMessage::Handshake)
        } else {
            line.parse().map(WireMessage::Instruction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_round_trips() {
        let instructions = [
            MoveInstruction::join(2),
            MoveInstruction::play(0, 37, 42),
            MoveInstruction::load(3),
            MoveInstruction::ready(1),
            MoveInstruction::end_turn(5),
            MoveInstruction::error(),
        ];
        for instr in instructions {
            let line = instr.to_string();
            assert_eq!(line.parse::<MoveInstruction>().unwrap(), instr, "{}", line);
        }
    }

    #[test]
    fn wire_tokens() {
        assert_eq!(MoveInstruction::play(0, 37, 42).to_string(), "PLAY;0;37;42");
        assert_eq!(MoveInstruction::ready(1).to_string(), "READY;1;-;-");
        assert_eq!(MoveInstruction::end_turn(2).to_string(), "NEXT;2;-;-");
        assert_eq!(MoveInstruction::error().to_string(), "ERROR;-;-;-");
    }

    #[test]
    fn handshake_round_trips() {
        let handshake = Handshake {
            seat: 2,
            starting_seat: 0,
        };
        assert_eq!(handshake.to_string(), "Ex:2;0");
        assert_eq!("Ex:2;0".parse::<Handshake>().unwrap(), handshake);
    }

    #[test]
    fn wire_message_dispatches_on_prefix() {
        match "Ex:1;0".parse::<WireMessage>().unwrap() {
            WireMessage::Handshake(hs) => assert_eq!(hs.seat, 1),
            other => panic!("expected handshake, got {:?}", other),
        }
        match "PLAY;0;3;5".parse::<WireMessage>().unwrap() {
            WireMessage::Instruction(instr) => assert_eq!(instr.kind, MoveKind::Play),
            other => panic!("expected instruction, got {:?}", other),
        }
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(
            "FOO;1;-;-".parse::<MoveInstruction>(),
            Err(ProtocolError::UnknownKind("FOO".to_string()))
        );
        assert_eq!(
            "PLAY;x;-;-".parse::<MoveInstruction>(),
            Err(ProtocolError::BadNumber("x".to_string()))
        );
        assert_eq!(
            "PLAY;1".parse::<MoveInstruction>(),
            Err(ProtocolError::MissingField("origin"))
        );
        assert_eq!(
            "Ex:zz".parse::<Handshake>(),
            Err(ProtocolError::BadHandshake("Ex:zz".to_string()))
        );
        assert!("".parse::<WireMessage>().is_err());
    }
}

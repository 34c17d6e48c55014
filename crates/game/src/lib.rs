pub mod board;
pub mod engine;
pub mod net;
pub mod protocol;

pub use board::{BaseId, Board, CellId, DIRECTIONS, Direction, Seat};
pub use engine::{EngineError, GameEngine, MAX_SEATS, WIN_THRESHOLD};
pub use net::{
    DEFAULT_PORT, HostConfig, HostSession, MAX_PEERS, PeerConfig, PeerSession, SessionError,
    SessionEvent, SessionHandle,
};
pub use protocol::{Handshake, MoveInstruction, MoveKind, ProtocolError, WireMessage};

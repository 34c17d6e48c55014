pub mod host;
pub mod peer;

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::board::Seat;
use crate::engine::EngineError;
use crate::protocol::MoveInstruction;

pub use host::{HostConfig, HostSession};
pub use peer::{PeerConfig, PeerSession};

pub const DEFAULT_PORT: u16 = 8000;
pub const MAX_PEERS: usize = 6;

/// Observable session activity, drained by the embedding process and turned
/// into log lines or UI updates.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PeerConnected { slot: usize, addr: SocketAddr },
    PeerDisconnected { slot: usize },
    /// Peer side: the host assigned us a seat.
    SeatAssigned { seat: Seat, starting_seat: Seat },
    Applied { instr: MoveInstruction },
    Rejected { instr: MoveInstruction, reason: String },
    /// Peer side: the host reported our last instruction as invalid.
    RemoteError,
    Started,
    Finished { winners: Vec<Seat> },
    /// Host side: the last peer left; engine and roster were reset.
    SessionReset,
    /// Peer side: the connection to the host ended.
    ConnectionLost,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session task has shut down")]
    Closed,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Everything the session task reacts to. All connection workers and the
/// local actor feed one channel of these, which is what serializes engine
/// access.
pub(crate) enum SessionMsg {
    Connected {
        stream: TcpStream,
        addr: SocketAddr,
    },
    Incoming {
        slot: usize,
        line: String,
    },
    Closed {
        slot: usize,
    },
    Local {
        instr: MoveInstruction,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
}

/// Handle for the local actor (UI, AI, stdin) to submit instructions into
/// the session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMsg>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionMsg>) -> Self {
        SessionHandle { tx }
    }

    /// Validates and applies `instr` on the local engine; on success the
    /// session forwards it to every connected party.
    pub async fn submit(&self, instr: MoveInstruction) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(SessionMsg::Local { instr, reply })
            .map_err(|_| SessionError::Closed)?;
        response
            .await
            .map_err(|_| SessionError::Closed)?
            .map_err(SessionError::Engine)
    }
}

/// One registered connection: the line channel its writer task drains.
pub(crate) struct PeerLink {
    pub(crate) tx: mpsc::UnboundedSender<String>,
}

impl PeerLink {
    /// Queues a line for sending. Write failures are left for the reader
    /// task to notice as a closed stream.
    pub(crate) fn send(&self, line: &str) {
        let _ = self.tx.send(line.to_string());
    }
}

/// Fixed six-slot connection roster. Lowest free slot wins, and the slot
/// index doubles as the peer's assigned seat.
pub(crate) struct Roster {
    slots: [Option<PeerLink>; MAX_PEERS],
}

impl Roster {
    pub(crate) fn new() -> Self {
        Roster {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub(crate) fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.is_none())
    }

    pub(crate) fn insert(&mut self, slot: usize, link: PeerLink) {
        self.slots[slot] = Some(link);
    }

    pub(crate) fn remove(&mut self, slot: usize) -> Option<PeerLink> {
        self.slots[slot].take()
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&PeerLink> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub(crate) fn send_to(&self, slot: usize, line: &str) {
        if let Some(link) = self.get(slot) {
            link.send(line);
        }
    }

    /// Sends `line` to every connected peer except `skip` (the connection a
    /// message arrived from must never see its own echo).
    pub(crate) fn broadcast_except(&self, skip: Option<usize>, line: &str) {
        for (slot, link) in self.slots.iter().enumerate() {
            if Some(slot) == skip {
                continue;
            }
            if let Some(link) = link {
                link.send(line);
            }
        }
    }
}

/// Splits a stream into a writer task (draining a line channel) and a
/// reader task (line-oriented receive loop feeding the session channel,
/// reporting `Closed` when the stream ends). Returns the line channel.
pub(crate) fn spawn_connection(
    stream: TcpStream,
    slot: usize,
    msgs: mpsc::UnboundedSender<SessionMsg>,
) -> mpsc::UnboundedSender<String> {
    let (read_half, mut write_half) = stream.into_split();
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err()
                || write_half.write_all(b"\n").await.is_err()
            {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if msgs.send(SessionMsg::Incoming { slot, line }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::debug!("connection {}: read failed: {}", slot, e);
                    break;
                }
            }
        }
        let _ = msgs.send(SessionMsg::Closed { slot });
    });

    line_tx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> (PeerLink, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PeerLink { tx }, rx)
    }

    #[test]
    fn roster_assigns_lowest_free_slot() {
        let mut roster = Roster::new();
        assert_eq!(roster.free_slot(), Some(0));
        let (a, _ra) = link();
        roster.insert(0, a);
        assert_eq!(roster.free_slot(), Some(1));
        let (b, _rb) = link();
        roster.insert(1, b);
        roster.remove(0);
        assert_eq!(roster.free_slot(), Some(0));
        assert!(!roster.is_empty());
        roster.remove(1);
        assert!(roster.is_empty());
    }

    #[test]
    fn broadcast_skips_originator() {
        let mut roster = Roster::new();
        let (a, mut ra) = link();
        let (b, mut rb) = link();
        roster.insert(0, a);
        roster.insert(1, b);

        roster.broadcast_except(Some(0), "PLAY;0;1;2");
        assert!(ra.try_recv().is_err());
        assert_eq!(rb.try_recv().unwrap(), "PLAY;0;1;2");

        roster.broadcast_except(None, "READY;1;-;-");
        assert_eq!(ra.try_recv().unwrap(), "READY;1;-;-");
        assert_eq!(rb.try_recv().unwrap(), "READY;1;-;-");
    }
}

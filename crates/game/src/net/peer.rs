use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use crate::engine::{EngineError, GameEngine};
use crate::protocol::{MoveInstruction, MoveKind, WireMessage};

use super::{SessionEvent, SessionHandle, SessionMsg, spawn_connection};

#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// First retry delay while the host is not up yet.
    pub initial_backoff: Duration,
    /// Retry delay ceiling.
    pub max_backoff: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Joining side of a session. Keeps a replica engine in lockstep with the
/// host by applying every received instruction, and forwards locally
/// submitted instructions upstream after applying them.
pub struct PeerSession {
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    shutdown: watch::Sender<bool>,
}

impl PeerSession {
    /// Dials `addr`, retrying with capped exponential backoff until the
    /// host answers or `shutdown` is called.
    pub fn connect(addr: SocketAddr, config: PeerConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(session_task(
            addr,
            config,
            msg_rx,
            msg_tx.clone(),
            event_tx,
            shutdown_rx,
        ));

        PeerSession {
            handle: SessionHandle::new(msg_tx),
            events,
            shutdown,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn connect_with_backoff(
    addr: SocketAddr,
    config: &PeerConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<TcpStream> {
    let mut delay = config.initial_backoff;
    loop {
        let attempt = tokio::select! {
            _ = shutdown.changed() => return None,
            attempt = TcpStream::connect(addr) => attempt,
        };
        match attempt {
            Ok(stream) => return Some(stream),
            Err(e) => {
                log::debug!("connect to {} failed, retrying in {:?}: {}", addr, delay, e);
                tokio::select! {
                    _ = shutdown.changed() => return None,
                    _ = sleep(delay) => {}
                }
                delay = (delay * 2).min(config.max_backoff);
            }
        }
    }
}

async fn session_task(
    addr: SocketAddr,
    config: PeerConfig,
    mut msgs: mpsc::UnboundedReceiver<SessionMsg>,
    msg_tx: mpsc::UnboundedSender<SessionMsg>,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let Some(stream) = connect_with_backoff(addr, &config, &mut shutdown).await else {
        return;
    };
    let upstream = spawn_connection(stream, 0, msg_tx);
    let mut engine = GameEngine::new();
    // Seat is unknown until the handshake arrives.
    let mut seat = None;

    loop {
        let msg = tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
                continue;
            }
            msg = msgs.recv() => match msg {
                Some(msg) => msg,
                None => return,
            },
        };

        match msg {
            SessionMsg::Incoming { line, .. } => match line.parse::<WireMessage>() {
                Ok(WireMessage::Handshake(hello)) => {
                    seat = Some(hello.seat);
                    if let Err(e) = engine.set_starting_seat(hello.starting_seat) {
                        log::warn!("late handshake ignored: {}", e);
                    }
                    log::info!(
                        "joined {} as seat {}, seat {} opens",
                        addr,
                        hello.seat,
                        hello.starting_seat
                    );
                    let _ = events.send(SessionEvent::SeatAssigned {
                        seat: hello.seat,
                        starting_seat: hello.starting_seat,
                    });
                }
                Ok(WireMessage::Instruction(instr)) => {
                    if instr.kind == MoveKind::Error {
                        log::warn!("host rejected our last instruction");
                        let _ = events.send(SessionEvent::RemoteError);
                        continue;
                    }
                    apply_remote(&mut engine, &events, &upstream, instr);
                }
                Err(e) => {
                    log::warn!("unreadable line from host {:?}: {}", line, e);
                }
            },
            SessionMsg::Closed { .. } => {
                let _ = events.send(SessionEvent::ConnectionLost);
                return;
            }
            SessionMsg::Local { instr, reply } => {
                if seat.is_none() {
                    log::warn!("submitting before the handshake arrived");
                }
                let outcome = apply(&mut engine, &events, &instr);
                if outcome.is_ok() {
                    let _ = upstream.send(instr.to_string());
                }
                let _ = reply.send(outcome);
            }
            SessionMsg::Connected { .. } => unreachable!("peers never accept connections"),
        }
    }
}

/// Applies one instruction on the replica, emitting Applied plus any
/// Started/Finished transition, or Rejected on failure.
fn apply(
    engine: &mut GameEngine,
    events: &mpsc::UnboundedSender<SessionEvent>,
    instr: &MoveInstruction,
) -> Result<(), EngineError> {
    let was_started = engine.started();
    let was_finished = engine.finished();
    let outcome = engine.apply(instr);
    match &outcome {
        Ok(()) => {
            let _ = events.send(SessionEvent::Applied {
                instr: instr.clone(),
            });
            if !was_started && engine.started() {
                let _ = events.send(SessionEvent::Started);
            }
            if !was_finished && engine.finished() {
                let _ = events.send(SessionEvent::Finished {
                    winners: engine.winners().to_vec(),
                });
            }
        }
        Err(e) => {
            let _ = events.send(SessionEvent::Rejected {
                instr: instr.clone(),
                reason: e.to_string(),
            });
        }
    }
    outcome
}

/// Replays a host-sent instruction. Divergence means the replica is out of
/// step with the host; report it upstream and carry on.
fn apply_remote(
    engine: &mut GameEngine,
    events: &mpsc::UnboundedSender<SessionEvent>,
    upstream: &mpsc::UnboundedSender<String>,
    instr: MoveInstruction,
) {
    if let Err(e) = apply(engine, events, &instr) {
        log::error!("replica rejected host instruction {}: {}", instr, e);
        let _ = upstream.send(MoveInstruction::error().to_string());
    }
}

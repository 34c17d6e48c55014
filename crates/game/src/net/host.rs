use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot, watch};

use crate::board::Seat;
use crate::engine::{EngineError, GameEngine};
use crate::protocol::{Handshake, MoveInstruction, MoveKind, WireMessage};

use super::{PeerLink, Roster, SessionEvent, SessionHandle, SessionMsg, spawn_connection};

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Seat that opens the first game, echoed to every peer at handshake.
    pub starting_seat: Seat,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig { starting_seat: 0 }
    }
}

/// Authoritative side of a session. Owns the engine, assigns seats to
/// incoming connections in arrival order and relays every accepted
/// instruction to all other parties.
pub struct HostSession {
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl HostSession {
    pub async fn bind(addr: impl ToSocketAddrs, config: HostConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(accept_loop(listener, msg_tx.clone(), shutdown_rx));
        tokio::spawn(session_task(
            config,
            msg_rx,
            msg_tx.clone(),
            event_tx,
            shutdown.clone(),
        ));

        Ok(HostSession {
            handle: SessionHandle::new(msg_tx),
            events,
            local_addr,
            shutdown,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Stops accepting connections and winds down the session task.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn accept_loop(
    listener: TcpListener,
    msgs: mpsc::UnboundedSender<SessionMsg>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        if msgs.send(SessionMsg::Connected { stream, addr }).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        log::warn!("accept failed: {}", e);
                    }
                }
            }
        }
    }
}

async fn session_task(
    config: HostConfig,
    mut msgs: mpsc::UnboundedReceiver<SessionMsg>,
    msg_tx: mpsc::UnboundedSender<SessionMsg>,
    events: mpsc::UnboundedSender<SessionEvent>,
    shutdown_tx: watch::Sender<bool>,
) {
    let mut shutdown = shutdown_tx.subscribe();
    let mut engine = GameEngine::with_starting_seat(config.starting_seat);
    let mut roster = Roster::new();

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
            SessionMsg::Connected { stream, addr } => {
                if engine.started() {
                    log::info!("refusing {}: game already running", addr);
                    continue;
                }
                let Some(slot) = roster.free_slot() else {
                    log::info!("refusing {}: all seats taken", addr);
                    continue;
                };
                let tx = spawn_connection(stream, slot, msg_tx.clone());
                let link = PeerLink { tx };
                // Handshake goes through the same writer channel as later
                // traffic, so it is always the first line the peer reads.
                let hello = Handshake {
                    seat: slot as Seat,
                    starting_seat: engine.starting_seat(),
                };
                link.send(&hello.to_string());
                roster.insert(slot, link);
                log::info!("peer {} connected as seat {}", addr, slot);
                let _ = events.send(SessionEvent::PeerConnected { slot, addr });
            }
            SessionMsg::Incoming { slot, line } => {
                let instr = match line.parse::<WireMessage>() {
                    Ok(WireMessage::Instruction(instr)) => instr,
                    Ok(WireMessage::Handshake(_)) => {
                        log::warn!("seat {} sent a handshake, ignoring", slot);
                        continue;
                    }
                    Err(e) => {
                        log::warn!("seat {}: unreadable line {:?}: {}", slot, line, e);
                        continue;
                    }
                };
                if instr.kind == MoveKind::Error {
                    // Error frames only flow host to peer.
                    continue;
                }
                dispatch(&mut engine, &roster, &events, Some(slot), instr, None);
            }
            SessionMsg::Closed { slot } => {
                if roster.remove(slot).is_none() {
                    continue;
                }
                log::info!("seat {} disconnected", slot);
                let _ = events.send(SessionEvent::PeerDisconnected { slot });
                if roster.is_empty() {
                    engine.reset();
                    let _ = events.send(SessionEvent::SessionReset);
                    let _ = shutdown_tx.send(true);
                    return;
                }
            }
            SessionMsg::Local { instr, reply } => {
                dispatch(&mut engine, &roster, &events, None, instr, Some(reply));
            }
        }
    }
}

/// Applies one instruction and relays the outcome: accepted instructions go
/// to every connection except the one they arrived on, rejected ones earn
/// the originator an error frame.
fn dispatch(
    engine: &mut GameEngine,
    roster: &Roster,
    events: &mpsc::UnboundedSender<SessionEvent>,
    origin: Option<usize>,
    instr: MoveInstruction,
    reply: Option<oneshot::Sender<Result<(), EngineError>>>,
) {
    let was_started = engine.started();
    let was_finished = engine.finished();
    let outcome = engine.apply(&instr);
    match &outcome {
        Ok(()) => {
            roster.broadcast_except(origin, &instr.to_string());
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
            if let Some(slot) = origin {
                roster.send_to(slot, &MoveInstruction::error().to_string());
            }
            let _ = events.send(SessionEvent::Rejected {
                instr: instr.clone(),
                reason: e.to_string(),
            });
        }
    }
    if let Some(reply) = reply {
        let _ = reply.send(outcome);
    }
}

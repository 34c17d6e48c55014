//! Session tests over real loopback sockets: a bound host, raw line-level
//! peers and full `PeerSession` replicas.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::timeout;

use trylma::{HostConfig, HostSession, MoveInstruction, PeerConfig, PeerSession, SessionEvent};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

struct RawPeer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: tokio::net::tcp::OwnedWriteHalf,
}

impl RawPeer {
    async fn join(host: &HostSession) -> RawPeer {
        let stream = TcpStream::connect(host.local_addr()).await.unwrap();
        let (read, write) = stream.into_split();
        RawPeer {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn recv(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("no line within the deadline")
            .unwrap()
            .expect("stream closed")
    }

    async fn expect_silence(&mut self) {
        assert!(
            timeout(QUIET, self.lines.next_line()).await.is_err(),
            "received a line that should not have been sent"
        );
    }

    async fn send(&mut self, line: &str) {
        use tokio::io::AsyncWriteExt;
        self.write.write_all(line.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
    }
}

async fn next_event(host: &mut HostSession) -> SessionEvent {
    timeout(WAIT, host.next_event())
        .await
        .expect("no event within the deadline")
        .expect("session task gone")
}

async fn bind_host() -> HostSession {
    HostSession::bind("127.0.0.1:0", HostConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn handshake_is_the_first_line_and_seats_follow_arrival() {
    let host = bind_host().await;
    let mut first = RawPeer::join(&host).await;
    assert_eq!(first.recv().await, "Ex:0;0");
    let mut second = RawPeer::join(&host).await;
    assert_eq!(second.recv().await, "Ex:1;0");
}

#[tokio::test]
async fn handshake_carries_the_starting_seat() {
    let host = HostSession::bind("127.0.0.1:0", HostConfig { starting_seat: 2 })
        .await
        .unwrap();
    let mut peer = RawPeer::join(&host).await;
    assert_eq!(peer.recv().await, "Ex:0;2");
}

#[tokio::test]
async fn accepted_instructions_reach_everyone_but_the_originator() {
    let mut host = bind_host().await;
    let mut first = RawPeer::join(&host).await;
    let mut second = RawPeer::join(&host).await;
    first.recv().await;
    second.recv().await;

    first.send("JOIN;2;-;-").await;
    assert_eq!(second.recv().await, "JOIN;2;-;-");
    assert!(matches!(
        next_event(&mut host).await,
        SessionEvent::PeerConnected { slot: 0, .. }
    ));
    assert!(matches!(
        next_event(&mut host).await,
        SessionEvent::PeerConnected { slot: 1, .. }
    ));
    assert!(matches!(
        next_event(&mut host).await,
        SessionEvent::Applied { .. }
    ));
    first.expect_silence().await;
}

#[tokio::test]
async fn locally_submitted_instructions_reach_every_peer() {
    let host = bind_host().await;
    let mut first = RawPeer::join(&host).await;
    let mut second = RawPeer::join(&host).await;
    first.recv().await;
    second.recv().await;

    host.handle().submit(MoveInstruction::join(2)).await.unwrap();
    assert_eq!(first.recv().await, "JOIN;2;-;-");
    assert_eq!(second.recv().await, "JOIN;2;-;-");
}

#[tokio::test]
async fn rejections_earn_the_originator_an_error_frame() {
    let mut host = bind_host().await;
    let mut first = RawPeer::join(&host).await;
    let mut second = RawPeer::join(&host).await;
    first.recv().await;
    second.recv().await;

    // Ending a turn before anything started cannot be accepted.
    first.send("NEXT;0;-;-").await;
    assert_eq!(first.recv().await, "ERROR;-;-;-");
    second.expect_silence().await;

    loop {
        if let SessionEvent::Rejected { .. } = next_event(&mut host).await {
            break;
        }
    }
}

#[tokio::test]
async fn unreadable_lines_are_dropped_without_closing_the_connection() {
    let mut host = bind_host().await;
    let mut peer = RawPeer::join(&host).await;
    peer.recv().await;

    peer.send("BOGUS;0;-;-").await;
    peer.send("JOIN;2;-;-").await;
    loop {
        if let SessionEvent::Applied { instr } = next_event(&mut host).await {
            assert_eq!(instr.to_string(), "JOIN;2;-;-");
            break;
        }
    }
}

#[tokio::test]
async fn a_freed_slot_is_reassigned_to_the_next_arrival() {
    let mut host = bind_host().await;
    let mut first = RawPeer::join(&host).await;
    let mut second = RawPeer::join(&host).await;
    assert_eq!(first.recv().await, "Ex:0;0");
    assert_eq!(second.recv().await, "Ex:1;0");

    drop(first);
    loop {
        if let SessionEvent::PeerDisconnected { slot: 0 } = next_event(&mut host).await {
            break;
        }
    }

    let mut third = RawPeer::join(&host).await;
    assert_eq!(third.recv().await, "Ex:0;0");
}

#[tokio::test]
async fn last_departure_resets_the_session() {
    let mut host = bind_host().await;
    let peer = RawPeer::join(&host).await;
    assert!(matches!(
        next_event(&mut host).await,
        SessionEvent::PeerConnected { slot: 0, .. }
    ));
    drop(peer);
    assert!(matches!(
        next_event(&mut host).await,
        SessionEvent::PeerDisconnected { slot: 0 }
    ));
    assert!(matches!(
        next_event(&mut host).await,
        SessionEvent::SessionReset
    ));
}

#[tokio::test]
async fn replica_follows_the_host_through_a_game_start() {
    let mut host = bind_host().await;
    let mut peer = PeerSession::connect(host.local_addr(), PeerConfig::default());

    match timeout(WAIT, peer.next_event()).await.unwrap().unwrap() {
        SessionEvent::SeatAssigned { seat, starting_seat } => {
            assert_eq!(seat, 0);
            assert_eq!(starting_seat, 0);
        }
        other => panic!("expected a seat assignment, got {:?}", other),
    }

    host.handle().submit(MoveInstruction::join(1)).await.unwrap();
    host.handle().submit(MoveInstruction::ready(0)).await.unwrap();

    let mut started = false;
    while !started {
        match timeout(WAIT, peer.next_event()).await.unwrap().unwrap() {
            SessionEvent::Started => started = true,
            SessionEvent::Applied { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }
}

#[tokio::test]
async fn replica_submissions_flow_back_to_the_host() {
    let mut host = bind_host().await;
    let mut peer = PeerSession::connect(host.local_addr(), PeerConfig::default());
    timeout(WAIT, peer.next_event()).await.unwrap().unwrap();

    peer.handle().submit(MoveInstruction::join(2)).await.unwrap();
    loop {
        if let SessionEvent::Applied { instr } = next_event(&mut host).await {
            assert_eq!(instr.to_string(), "JOIN;2;-;-");
            break;
        }
    }
}

#[tokio::test]
async fn replica_rejects_bad_local_submissions_without_forwarding() {
    let host = bind_host().await;
    let mut peer = PeerSession::connect(host.local_addr(), PeerConfig::default());
    timeout(WAIT, peer.next_event()).await.unwrap().unwrap();

    assert!(peer.handle().submit(MoveInstruction::ready(9)).await.is_err());
}

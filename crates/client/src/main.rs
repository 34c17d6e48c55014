use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::lookup_host;

use trylma::{MoveInstruction, PeerConfig, PeerSession, SessionEvent};

#[derive(Parser)]
#[command(name = "trylma-client")]
#[command(about = "Trylma game client")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    #[arg(short, long, default_value_t = trylma::DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let target = format!("{}:{}", args.address, args.port);
    let addr = lookup_host(&target)
        .await
        .with_context(|| format!("cannot resolve {}", target))?
        .next()
        .with_context(|| format!("no addresses for {}", target))?;
    log::info!("connecting to {}", addr);

    let mut peer = PeerSession::connect(addr, PeerConfig::default());
    let handle = peer.handle();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut own_seat = None;

    loop {
        tokio::select! {
            event = peer.next_event() => {
                match event {
                    Some(SessionEvent::ConnectionLost) | None => {
                        log::warn!("connection to the host ended");
                        break;
                    }
                    Some(event) => {
                        if let SessionEvent::SeatAssigned { seat, .. } = event {
                            own_seat = Some(seat);
                        }
                        report(event);
                    }
                }
            }
            line = input.next_line() => {
                let Some(line) = line? else { break };
                match parse(&line, own_seat) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Submit(instr))) => {
                        if let Err(e) = handle.submit(instr).await {
                            log::warn!("not accepted: {}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(message) => log::warn!("{}", message),
                }
            }
        }
    }

    peer.shutdown();
    Ok(())
}

fn report(event: SessionEvent) {
    match event {
        SessionEvent::SeatAssigned { seat, starting_seat } => {
            log::info!("we are seat {}, seat {} moves first", seat, starting_seat);
        }
        SessionEvent::Applied { instr } => {
            log::info!("applied {}", instr);
        }
        SessionEvent::Rejected { instr, reason } => {
            log::warn!("rejected {}: {}", instr, reason);
        }
        SessionEvent::RemoteError => {
            log::warn!("the host refused our last instruction");
        }
        SessionEvent::Started => {
            log::info!("game on");
        }
        SessionEvent::Finished { winners } => {
            log::info!("game over, finishing order {:?}", winners);
        }
        other => {
            log::debug!("unhandled event {:?}", other);
        }
    }
}

enum Command {
    Submit(MoveInstruction),
    Quit,
}

/// Console commands a joined player may issue; seat counts are chosen on
/// the host side. Commands without an explicit seat use the one the
/// handshake assigned.
fn parse(line: &str, own_seat: Option<u8>) -> Result<Option<Command>> {
    let seat = || own_seat.context("no seat assigned yet; give one explicitly");
    let words: Vec<&str> = line.split_whitespace().collect();
    let instr = match words.as_slice() {
        [] => return Ok(None),
        ["quit"] | ["exit"] => return Ok(Some(Command::Quit)),
        ["ready"] => MoveInstruction::ready(seat()?),
        ["ready", s] => MoveInstruction::ready(s.parse()?),
        ["load"] => MoveInstruction::load(seat()?),
        ["load", s] => MoveInstruction::load(s.parse()?),
        ["move", origin, dest] => {
            MoveInstruction::play(seat()?, origin.parse()?, dest.parse()?)
        }
        ["move", s, origin, dest] => {
            MoveInstruction::play(s.parse()?, origin.parse()?, dest.parse()?)
        }
        ["end"] => MoveInstruction::end_turn(seat()?),
        ["end", s] => MoveInstruction::end_turn(s.parse()?),
        _ => bail!("unknown command; try ready, load, move, end or quit"),
    };
    Ok(Some(Command::Submit(instr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_instructions() {
        let parsed = |line: &str| match parse(line, Some(1)).unwrap().unwrap() {
            Command::Submit(instr) => instr.to_string(),
            Command::Quit => panic!("parsed as quit"),
        };
        assert_eq!(parsed("ready 0"), "READY;0;-;-");
        assert_eq!(parsed("ready"), "READY;1;-;-");
        assert_eq!(parsed("move 6 15"), "PLAY;1;6;15");
        assert_eq!(parsed("move 0 6 15"), "PLAY;0;6;15");
        assert_eq!(parsed("end"), "NEXT;1;-;-");
        assert!(parse("players 2", Some(1)).is_err());
        assert!(parse("move 6 15", None).is_err());
        assert!(matches!(parse("quit", None), Ok(Some(Command::Quit))));
    }
}

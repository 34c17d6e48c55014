mod repl;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use repl::Command;
use trylma::{HostConfig, HostSession, SessionEvent};

#[derive(Parser)]
#[command(name = "trylma-server")]
#[command(about = "Trylma game host")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = trylma::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 0, help = "Seat that makes the first move")]
    starting_seat: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut host = HostSession::bind(
        (args.bind.as_str(), args.port),
        HostConfig {
            starting_seat: args.starting_seat,
        },
    )
    .await?;
    log::info!("listening on {}", host.local_addr());

    let handle = host.handle();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = host.next_event() => {
                match event {
                    Some(event) => report(event),
                    None => break,
                }
            }
            line = input.next_line() => {
                let Some(line) = line? else { break };
                match repl::parse(&line) {
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

    host.shutdown();
    Ok(())
}

fn report(event: SessionEvent) {
    match event {
        SessionEvent::PeerConnected { slot, addr } => {
            log::info!("seat {} joined from {}", slot, addr);
        }
        SessionEvent::PeerDisconnected { slot } => {
            log::info!("seat {} left", slot);
        }
        SessionEvent::Applied { instr } => {
            log::info!("applied {}", instr);
        }
        SessionEvent::Rejected { instr, reason } => {
            log::warn!("rejected {}: {}", instr, reason);
        }
        SessionEvent::Started => {
            log::info!("game on");
        }
        SessionEvent::Finished { winners } => {
            log::info!("game over, finishing order {:?}", winners);
        }
        SessionEvent::SessionReset => {
            log::info!("all peers left, session reset");
        }
        other => {
            log::debug!("unhandled event {:?}", other);
        }
    }
}

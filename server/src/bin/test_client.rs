//! Headless smoke-test client for the bingo server.
//!
//! Connects, joins with a nickname and, when it finds itself host, drives a
//! full game by drawing numbers until someone wins. Run one instance first
//! as the host, then more instances with other nicknames to fill the room:
//!
//! ```text
//! cargo run --bin test_client -- 127.0.0.1:8080 Alice
//! ```

use shared::{read_frame, write_frame, ClientEvent, ServerEvent, PROTOCOL_VERSION};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;

const DRAW_PAUSE: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let nickname = args.next().unwrap_or_else(|| "tester".to_string());

    println!("Connecting to {} as {}", addr, nickname);
    let mut stream = TcpStream::connect(&addr).await?;

    let mut is_host = false;
    let mut joined = false;

    loop {
        let event: ServerEvent = read_frame(&mut stream).await?;

        match event {
            ServerEvent::GameState {
                status,
                players,
                called_numbers,
                winner,
            } => {
                println!(
                    "Room snapshot: status={:?}, {} players, {} numbers called, winner={:?}",
                    status,
                    players.len(),
                    called_numbers.len(),
                    winner
                );
                if !joined {
                    write_frame(
                        &mut stream,
                        &ClientEvent::Join {
                            nickname: nickname.clone(),
                            protocol_version: PROTOCOL_VERSION,
                        },
                    )
                    .await?;
                    joined = true;
                }
            }
            ServerEvent::Joined {
                nickname,
                is_host: host,
                players,
            } => {
                is_host = host;
                println!(
                    "Joined as {} (host: {}), roster: {:?}",
                    nickname,
                    is_host,
                    players.iter().map(|p| &p.nickname).collect::<Vec<_>>()
                );
                if is_host {
                    println!("Starting the game");
                    write_frame(&mut stream, &ClientEvent::StartGame).await?;
                }
            }
            ServerEvent::GameStarted { players } => {
                println!("Game started with {} boards dealt", players.len());
                if is_host {
                    sleep(DRAW_PAUSE).await;
                    write_frame(&mut stream, &ClientEvent::DrawNumber).await?;
                }
            }
            ServerEvent::NumberDrawn {
                number,
                called_numbers,
                players,
            } => {
                let lines: Vec<String> = players
                    .iter()
                    .map(|p| format!("{}={}", p.nickname, p.line_count))
                    .collect();
                println!(
                    "Drawn: {} ({} called so far), lines: {}",
                    number,
                    called_numbers.len(),
                    lines.join(", ")
                );
                if is_host {
                    sleep(DRAW_PAUSE).await;
                    write_frame(&mut stream, &ClientEvent::DrawNumber).await?;
                }
            }
            ServerEvent::BingoComplete {
                winner,
                bingo_count,
                ..
            } => {
                println!("Bingo! {} wins with {} lines", winner, bingo_count);
                break;
            }
            ServerEvent::PlayerListUpdate { players } => {
                println!(
                    "Roster update: {:?}",
                    players.iter().map(|p| &p.nickname).collect::<Vec<_>>()
                );
            }
            ServerEvent::HostChanged { new_host, .. } => {
                println!("New host: {}", new_host);
            }
            ServerEvent::GameRestarted { .. } => {
                println!("Game restarted, waiting for the host");
            }
            ServerEvent::Error { message } => {
                println!("Server error: {}", message);
            }
        }
    }

    println!("Test client finished");
    Ok(())
}

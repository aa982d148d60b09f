//! Scripted player for poking a running server from the command line.

use bincode::{deserialize, serialize};
use clap::Parser;
use rand::Rng;
use shared::{Packet, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:20000")]
    server: SocketAddr,
    /// Game the server is expected to run
    #[clap(short, long, default_value = "demo")]
    game: String,
    /// Display name shown above the player
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// Number of random moves to make
    #[clap(short, long, default_value_t = 10)]
    moves: u32,
}

async fn send(socket: &UdpSocket, packet: &Packet, server: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, server).await?;
    Ok(())
}

async fn recv(socket: &UdpSocket, buf: &mut [u8], wait: Duration) -> Option<Packet> {
    match timeout(wait, socket.recv_from(buf)).await {
        Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[0..len]) {
            Ok(packet) => Some(packet),
            Err(e) => {
                println!("Failed to deserialize packet: {}", e);
                None
            }
        },
        Ok(Err(e)) => {
            println!("Error receiving packet: {}", e);
            None
        }
        Err(_) => None,
    }
}

fn summarize(packet: &Packet) {
    match packet {
        Packet::Step {
            game_sec,
            map_name,
            sprites,
            overlay,
            action_text,
            ..
        } => {
            println!(
                "Step at {:.2}s on '{}': {} sprites, {} overlay, action: {:?}",
                game_sec,
                map_name,
                sprites.len(),
                overlay.len(),
                action_text
            );
            for s in sprites {
                println!("  {} at ({:.1}, {:.1})", s.describe(), s.anchor_x, s.anchor_y);
            }
        }
        other => println!("Received packet: {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let join = Packet::JoinRequest {
        game: args.game.clone(),
        display_name: args.name.clone(),
    };
    println!("Sending join request to {}", args.server);
    send(&socket, &join, args.server).await?;

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    match recv(&socket, &mut buf, Duration::from_secs(2)).await {
        Some(Packet::JoinReply { player_number, server_sec, test_mode }) => {
            println!(
                "Joined as player {} (server clock {:.2}s, test mode {})",
                player_number, server_sec, test_mode
            );
        }
        Some(Packet::Error { result }) => {
            println!("Join refused: {}", result);
            return Ok(());
        }
        Some(other) => {
            println!("Unexpected packet: {:?}", other);
            return Ok(());
        }
        None => {
            println!("No response from server");
            return Ok(());
        }
    }

    let mut rng = rand::thread_rng();
    for i in 0..args.moves {
        let packet = if i % 3 == 2 {
            Packet::PlayerAction
        } else {
            Packet::PlayerMove {
                dest_x: rng.gen_range(0.0..640.0),
                dest_y: rng.gen_range(0.0..640.0),
            }
        };
        println!("Sending {:?}", packet);
        send(&socket, &packet, args.server).await?;

        // Drain whatever arrived while the sprite walks
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while let Some(packet) =
            recv(&socket, &mut buf, deadline.saturating_duration_since(tokio::time::Instant::now())).await
        {
            summarize(&packet);
        }
    }

    println!("Leaving");
    send(&socket, &Packet::Leave, args.server).await?;
    sleep(Duration::from_millis(100)).await;

    Ok(())
}

//! Small command line client for poking a running server: pings it, logs in,
//! polls a few snapshots and logs out again.

use clap::Parser;
use rand::Rng;
use server::snapshot::SnapshotSummary;
use shared::{MsgType, PacketReader, PacketWriter, DISCOVERY_PING, DISCOVERY_TOKEN};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:28000")]
    server: SocketAddr,
    /// Client version sent on login
    #[clap(long, default_value = "2.4")]
    version: String,
    #[clap(short, long, default_value = "probe")]
    name: String,
    /// Number of snapshots to request
    #[clap(short, long, default_value = "5")]
    polls: u32,
}

async fn request(
    socket: &UdpSocket,
    server: SocketAddr,
    data: &[u8],
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    socket.send_to(data, server).await?;
    let mut buf = [0u8; 4096];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await??;
    Ok(buf[..len].to_vec())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Probe bound to {}", socket.local_addr()?);

    let mut ping = PacketWriter::new();
    ping.put_int(DISCOVERY_TOKEN).put_slice(DISCOVERY_PING);
    let pong = request(&socket, args.server, &ping.into_vec()).await?;
    println!("Discovery reply: {:?}", String::from_utf8_lossy(&pong[4..]));

    let token: u32 = rand::thread_rng().gen_range(1..DISCOVERY_TOKEN);
    let mut login = PacketWriter::new();
    login
        .put_int(token)
        .put_tag(MsgType::Login)
        .put_string(&args.version)
        .put_string(&args.name);
    let reply = request(&socket, args.server, &login.into_vec()).await?;

    let mut reader = PacketReader::new(&reply);
    reader.get_byte()?;
    let status = reader.get_byte()?;
    if status != MsgType::LoginOk as u8 {
        let code = reader.get_byte().unwrap_or(0);
        println!("Login refused with code {}", code);
        return Ok(());
    }
    let id = reader.get_byte()?;
    let mode = reader.get_byte()?;
    let map = reader.get_string()?;
    println!("Logged in as player {} (mode {}, map {})", id, mode, map);

    for poll in 0..args.polls {
        let mut update = PacketWriter::new();
        update.put_int(token).put_tag(MsgType::NamesRequest).put_byte(id);
        if poll == 0 {
            update.put_tag(MsgType::MapLoaded).put_string(&map);
        }
        update.put_tag(MsgType::End);

        let reply = request(&socket, args.server, &update.into_vec()).await?;
        match SnapshotSummary::parse(&reply) {
            Ok(summary) => println!(
                "Snapshot: {} players, {} names, {} radar, session {:?}",
                summary.players.len(),
                summary.names.len(),
                summary.radar,
                summary.session
            ),
            Err(e) => println!("Could not parse snapshot: {}", e),
        }
        sleep(Duration::from_millis(500)).await;
    }

    let mut logout = PacketWriter::new();
    logout.put_int(token).put_tag(MsgType::Logout).put_byte(id);
    request(&socket, args.server, &logout.into_vec()).await?;
    println!("Probe finished");
    Ok(())
}

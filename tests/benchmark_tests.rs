//! Performance benchmarks for critical server systems

use server::config::ServerConfig;
use server::game::GameState;
use server::map::{MemoryMapProvider, TileMap};
use server::session::Outcome;
use shared::{MsgType, PacketReader, PacketWriter, MAX_PLAYERS};
use std::time::{Duration, Instant};

fn full_server(start: Instant) -> (GameState, u8) {
    let config = ServerConfig {
        bot_count: MAX_PLAYERS as i32 - 1,
        bot_depart_limit: MAX_PLAYERS as i32,
        seed: Some(3),
        maps: vec!["arena".to_string()],
        ..ServerConfig::default()
    };
    let maps = MemoryMapProvider::new().with_map(TileMap::arena("arena", 80, 60, 32.0));
    let mut state = GameState::new(config, Box::new(maps), start).unwrap();

    // One human keeps the bots thinking
    let mut login = PacketWriter::new();
    login
        .put_int(77)
        .put_tag(MsgType::Login)
        .put_string("2.4")
        .put_string("bench");
    let id = match state.handle_datagram(&login.into_vec(), start) {
        Outcome::Reply(reply) => {
            assert_eq!(reply[1], MsgType::LoginOk as u8);
            reply[2]
        }
        other => panic!("login failed: {:?}", other),
    };
    (state, id)
}

/// Benchmarks a full simulation second with a full server
#[test]
fn benchmark_full_server_ticks() {
    let start = Instant::now();
    let (mut state, _) = full_server(start);
    assert_eq!(state.active_bot_count(), MAX_PLAYERS - 1);

    let ticks = 60;
    let step = Duration::from_millis(16);
    let timer = Instant::now();
    for i in 1..=ticks {
        state.tick(start + step * i);
    }
    let duration = timer.elapsed();

    println!(
        "Simulation: {} ticks with {} bots in {:?} ({:.2} ms/tick)",
        ticks,
        state.active_bot_count(),
        duration,
        duration.as_secs_f64() * 1000.0 / ticks as f64
    );

    // Generous bound for unoptimized test builds
    assert!(duration.as_secs() < 10);
}

/// Benchmarks snapshot composition for a full server
#[test]
fn benchmark_snapshot_composition() {
    let start = Instant::now();
    let (mut state, id) = full_server(start);

    let iterations = 500;
    let timer = Instant::now();
    let mut bytes = 0;
    for _ in 0..iterations {
        if let Some(player) = state.player_mut(id) {
            player.send_names = true;
        }
        bytes += state.compose_snapshot(id, start).len();
    }
    let duration = timer.elapsed();

    println!(
        "Snapshots: {} in {:?} ({:.2} us each, {} bytes average)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64,
        bytes / iterations
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks inbound datagram handling including the reply
#[test]
fn benchmark_datagram_handling() {
    let start = Instant::now();
    let (mut state, id) = full_server(start);

    let mut update = PacketWriter::new();
    update
        .put_int(77)
        .put_tag(MsgType::Player)
        .put_byte(id)
        .put_short(400)
        .put_short(400)
        .put_ushort(45)
        .put_byte(1)
        .put_byte(1)
        .put_tag(MsgType::End);
    let update = update.into_vec();

    let iterations = 1_000;
    let timer = Instant::now();
    for i in 0..iterations {
        match state.handle_datagram(&update, start + Duration::from_millis(i)) {
            Outcome::Reply(reply) => assert_eq!(reply.last(), Some(&(MsgType::End as u8))),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    let duration = timer.elapsed();

    println!(
        "Datagrams: {} in {:?} ({:.2} us each)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks the wire codec with a large message batch
#[test]
fn benchmark_codec() {
    let iterations = 10_000;
    let timer = Instant::now();

    for i in 0..iterations {
        let mut out = PacketWriter::with_capacity(256);
        for id in 1..=32u8 {
            out.put_tag(MsgType::Player)
                .put_byte(id)
                .put_short(i)
                .put_short(-i)
                .put_ushort(180);
        }
        out.put_string("round over").put_tag(MsgType::End);

        let data = out.into_vec();
        let mut reader = PacketReader::new(&data);
        let mut count = 0;
        while let Some(_tag) = reader.next_tag() {
            reader.get_byte().unwrap();
            reader.get_short().unwrap();
            reader.get_short().unwrap();
            reader.get_ushort().unwrap();
            count += 1;
            if count == 32 {
                break;
            }
        }
        assert_eq!(count, 32);
        assert_eq!(reader.get_string().unwrap(), "round over");
    }

    let duration = timer.elapsed();
    println!("Codec: {} batches in {:?}", iterations, duration);
    assert!(duration.as_secs() < 5);
}

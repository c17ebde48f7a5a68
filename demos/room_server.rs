//! Room server demo with a synthetic event feed
//!
//! Run with: cargo run --example room_server -- [OPTIONS]
//!
//! Examples:
//!   cargo run --example room_server                          # one random room on 0.0.0.0:8080
//!   cargo run --example room_server -- --bind 127.0.0.1:9000
//!   ROOMCAST_ROOMS=<uuid>,<uuid> cargo run --example room_server
//!
//! ## Subscribing
//!
//! With websocat:
//!   websocat ws://localhost:8080/subscribe/<room id>
//!
//! Send `{"kind":"client_ping"}` to get `{"kind":"server_pong"}` back.
//!
//! The feed publishes one event per room every `--interval-ms`, cycling
//! through created, reaction up, reaction down and answered.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use roomcast::broadcast::payload::MessageCreated;
use roomcast::{Broadcaster, Event, KnownRooms, RoomId, RoomServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "room_server")]
#[command(about = "Room-scoped WebSocket notifications demo", long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "ROOMCAST_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "ROOMCAST_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Rooms that accept subscribers (a random one when empty)
    #[arg(long, env = "ROOMCAST_ROOMS", value_delimiter = ',')]
    rooms: Vec<uuid::Uuid>,

    /// Synthetic event interval in milliseconds (0 = no feed)
    #[arg(long, env = "ROOMCAST_INTERVAL_MS", default_value_t = 2000)]
    interval_ms: u64,
}

/// The event published into `room` on feed step `tick`
///
/// Each message goes through created, reaction up, reaction down, answered.
fn demo_event(room: &RoomId, tick: u64) -> Event {
    let message_id = format!("msg-{}", tick / 4);
    match tick % 4 {
        0 => Event::message_created(
            room.clone(),
            MessageCreated {
                id: message_id,
                message: format!("question #{}", tick / 4),
                author: "demo".into(),
            },
        ),
        1 => Event::reaction_increased(room.clone(), message_id, 1),
        2 => Event::reaction_decreased(room.clone(), message_id, 0),
        _ => Event::message_answered(room.clone(), message_id),
    }
}

/// Publish a rotating set of events into every room
async fn feed(broadcaster: Broadcaster, rooms: Vec<RoomId>, every: Duration) {
    let mut ticker = tokio::time::interval(every);

    for tick in 0u64.. {
        ticker.tick().await;

        for room in &rooms {
            let event = demo_event(room, tick);
            let report = broadcaster.notify(&event);
            if report.subscribers > 0 {
                tracing::info!(
                    room = %room,
                    kind = %event.kind,
                    delivered = report.delivered,
                    pruned = report.pruned,
                    "Published demo event"
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roomcast=debug".parse()?)
                .add_directive("room_server=debug".parse()?),
        )
        .init();

    let mut rooms: Vec<RoomId> = args.rooms.iter().map(|id| RoomId::new(id.to_string())).collect();
    if rooms.is_empty() {
        rooms.push(RoomId::new(uuid::Uuid::new_v4().to_string()));
    }

    let config = ServerConfig::default()
        .bind(args.bind)
        .max_connections(args.max_connections);

    println!("Starting room server on {}", config.bind_addr);
    println!();
    println!("=== Subscribe ===");
    for room in &rooms {
        println!("websocat ws://localhost:{}/subscribe/{}", config.bind_addr.port(), room);
    }
    println!();

    let directory: KnownRooms = rooms.iter().collect();
    let server = Arc::new(RoomServer::new(config, directory));

    let feed_task = (args.interval_ms > 0).then(|| {
        tokio::spawn(feed(
            server.broadcaster(),
            rooms.clone(),
            Duration::from_millis(args.interval_ms),
        ))
    });

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        println!("\nShutting down...");
    };

    if let Err(e) = server.run_until(shutdown).await {
        eprintln!("Server error: {}", e);
    }

    if let Some(task) = feed_task {
        task.abort();
    }

    let stats = server.stats();
    println!(
        "Served {} connections ({} rejected, {} failed upgrades)",
        stats.total_connections, stats.rejected_connections, stats.failed_handshakes
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use roomcast::EventKind;

    use super::*;

    #[test]
    fn test_feed_creates_before_reacting() {
        let room = RoomId::from("r1");
        let kinds: Vec<EventKind> = (0..5).map(|tick| demo_event(&room, tick).kind).collect();

        assert_eq!(
            kinds,
            [
                EventKind::MessageCreated,
                EventKind::MessageReactionIncreased,
                EventKind::MessageReactionDecreased,
                EventKind::MessageAnswered,
                EventKind::MessageCreated,
            ]
        );
        assert_eq!(demo_event(&room, 1).value["id"], "msg-0");
        assert_eq!(demo_event(&room, 4).value["id"], "msg-1");
    }
}

//! Subscribe endpoint: accept loop, upgrade and room lookup

pub mod config;
pub mod directory;
pub mod listener;
pub mod upgrade;

pub use config::ServerConfig;
pub use directory::{AnyRoom, KnownRooms, RoomDirectory};
pub use listener::RoomServer;
pub use upgrade::{parse_subscribe_path, PathRejection, SUBSCRIBE_PREFIX};

//! # cuecast-server
//!
//! HTTP and WebSocket front end for the cuecast room relay.
//!
//! - `GET /` - Landing page
//! - `GET /controller` - Allocates a room and serves its controller page
//! - `GET /receiver` - Receiver join page
//! - `POST /rooms` - Allocates a room, returns `{"room_code": ...}`
//! - `GET /health` - Status, version, room and connection counts
//! - `GET /ws` - WebSocket event endpoint (path configurable)

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod pages;

pub use config::Config;
pub use handlers::{build_app, run_server, serve, AppState};

//! # Overworld Client Library
//!
//! This library provides the client side of a top-down multiplayer world:
//! a WebSocket session to an authoritative server, a local mirror of the
//! players and avatars the server reports, a camera that follows the local
//! player, and a renderer that draws the visible slice of the world.
//!
//! ## Architecture Overview
//!
//! The server owns the world. The client never simulates movement; it sends
//! intents (`move`, `stop`) and draws whatever positions come back.
//!
//! ### Single-threaded state
//! The WebSocket connection runs on a tokio task, but it never touches game
//! state. It forwards decoded messages over a channel, and the game thread
//! drains that channel once per frame. All mutation of the world mirror,
//! the camera and the sprite cache happens on that one thread.
//!
//! ### Render on change
//! Every message that changes the mirror is rendered before the handler
//! returns, so an observer never sees a half-applied update. Rendering is
//! a pure function of the mirror, the camera and the cached sprites.
//!
//! ### Reconnection
//! A dropped connection is never fatal. The session schedules one reconnect
//! per close, waits according to its retry policy, and joins again. The
//! server assigns a fresh player id on every join.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Owns the WebSocket connection:
//! - Connect with an advisory timeout
//! - Join handshake on every open
//! - Reconnect scheduling via a [`retry::RetryPolicy`]
//! - Outbound intents, dropped while disconnected
//!
//! ### Game Module (`game`)
//! The world mirror: players keyed by id, avatar definitions keyed by name,
//! and the local player id for the current session.
//!
//! ### Viewport Module (`viewport`)
//! Camera offset centered on the local player and clamped to world bounds.
//!
//! ### Sprites Module (`sprites`)
//! Base64 image blobs decoded once, keyed by content, optionally ahead of
//! time on the runtime's blocking pool.
//!
//! ### Rendering Module (`rendering`)
//! Background sampling, culling, sprite scaling and name labels, drawn onto
//! any [`rendering::Surface`]. The macroquad window implementation lives in
//! `surface`.
//!
//! ### Input Module (`input`)
//! Keyboard edges turned into `move`/`stop` intents.
//!
//! ## Usage Example
//!
//! ```ignore
//! use client::*;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let mut session = network::TransportSession::spawn(
//!     runtime.handle(),
//!     network::TransportConfig::new("ws://127.0.0.1:8080", "alice"),
//! );
//! let mut game = app::GameClient::new(
//!     rendering::WorldMap::new(2048.0, 2048.0),
//!     sprites::SpriteCache::with_loader(runtime.handle().clone()),
//!     (800.0, 600.0),
//!     input::ReleaseBehavior::default(),
//! );
//! let mut surface = surface::MacroquadSurface::new();
//!
//! loop {
//!     for event in session.poll_events() {
//!         game.handle_session_event(event, &mut surface)?;
//!     }
//!     game.redraw(&mut surface);
//! }
//! ```
//!
//! ## Failure Handling
//!
//! Nothing in the client is fatal. A malformed message is logged and
//! skipped, a missing avatar or undecodable frame draws nothing for that
//! player, and a lost connection retries in the background while the last
//! known world stays on screen.

pub mod app;
pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
pub mod retry;
pub mod sprites;
pub mod surface;
pub mod viewport;

//! # Arena Server Library
//!
//! This library provides the authoritative server for a top-down multiplayer
//! shooter. It owns the canonical world state, runs the simulation at a fixed
//! rate and answers every client datagram with a snapshot tailored to that
//! client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Rounds, respawns, team changes, bots and projectiles are all decided here.
//! Clients report their own movement, which is checked against the map, and
//! everything else they see comes from the server.
//!
//! ### Roster Management
//! Handles the complete lifecycle of the fixed player slots:
//! - Login with version, capacity and nickname checks
//! - Logout, kicks and inactivity timeouts
//! - Bots that fill the server up to a configured target and leave as humans arrive
//!
//! ### Request/Reply Protocol
//! Clients poll the server. Each datagram carries the client's token, its slot
//! and a sequence of tagged messages; the reply is a snapshot with visible
//! players, radar blips, queued events and the round clock.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns the [`game::GameState`] and processes received datagrams and
//! simulation ticks one at a time. Separate tasks only move bytes between the
//! socket and the main loop through channels, so no locks are needed.
//!
//! ### Explicit Time
//! Every operation that depends on time takes the current `Instant` as an
//! argument, which keeps the simulation deterministic under test.
//!
//! ## Module Organization
//!
//! - `game`: world state and the ordered tick phases
//! - `roster`: login, logout, kicks, teams and bots
//! - `projectile`: firing, projectile flight and damage
//! - `session`: inbound datagram handling and discovery
//! - `snapshot`: per-player reply composition
//! - `network`: UDP socket tasks and the main loop
//! - `map`, `agent`, `listing`: collaborators behind traits
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::game::GameState;
//! use server::listing::LogListing;
//! use server::map::JsonMapProvider;
//! use server::network::Server;
//! use std::time::Instant;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let maps = Box::new(JsonMapProvider::new(&config.maps_dir));
//!     let state = GameState::new(config, maps, Instant::now())?;
//!
//!     // Runs until a shutdown is requested or the socket fails
//!     let mut server = Server::new("0.0.0.0:28000", state, Box::new(LogListing::new(false))).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod game;
pub mod listing;
pub mod map;
pub mod messages;
pub mod network;
pub mod player;
pub mod projectile;
pub mod roster;
pub mod session;
pub mod snapshot;
pub mod utils;

//! # Tile-Map Game Server Library
//!
//! This library provides the authoritative server for a multiplayer tile-map
//! game. Every map, sprite and trigger lives on the server; clients only
//! send requests (join, move, act) and draw the step messages they get back.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Maps are stepped at a fixed tick rate. Each step runs a fixed sequence of
//! phases over every sprite on the map, so the outcome of a tick only
//! depends on the map's contents and the game clock.
//!
//! ### Player Management
//! Every `player` sprite in the loaded world is a slot. Joining clients take
//! over a free slot, and leaving or silent clients hand it back:
//! - Join validation (game name, display name length, capacity)
//! - Request processing (move destination, action)
//! - Timeout detection and sprite reset
//!
//! ### Change-Driven Updates
//! A player is sent a step message only when their map changed during the
//! tick or their own action text changed.
//!
//! ## Architecture Design
//!
//! ### Hooks and Mechanics
//! The step engine knows nothing about doors or saws. Mechanics register
//! named hooks with a priority into a [`hooks::HookRegistry`]; each map
//! builds its own ordered table at load time, and a map's init hooks may
//! re-prioritise other hooks before the table is frozen.
//!
//! ### Triggers
//! Trigger objects are dispatched to the handler registered for their type,
//! lowest priority first. A handler can stop dispatch for the rest of the
//! tick, which is how a door wins over a pop-up on the same tile.
//!
//! ### Single Owner World
//! Objects are owned by exactly one map. Crossing maps moves the object out
//! of one store and into the other; no object is ever shared.
//!
//! ## Module Organization
//!
//! ### Map Module (`map`)
//! Object store, named object lists, layers, tilesets and spatial queries.
//!
//! ### Hooks Module (`hooks`)
//! Hook registration, priorities and the per-map hook table.
//!
//! ### Step Module (`step`)
//! The per-tick phase scheduler, trigger dispatch and text arbitration.
//!
//! ### Movement Module (`movement`)
//! Moves sprites toward their destination with axis sliding at boundaries.
//!
//! ### Mechanics Module (`mechanics`)
//! Doors, holdables, switches, pop-up text, saws, speed zones, timers and
//! friends.
//!
//! ### World and Loader Modules (`world`, `loader`)
//! All maps of a game, and their JSON description on disk.
//!
//! ### Client Manager and Network Modules (`client_manager`, `network`)
//! Player slots, UDP transport and the tick loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::loader::load_world;
//! use server::mechanics;
//! use server::network::{Server, ServerConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load every map and install the standard mechanics on each
//!     let world = load_world(Path::new("worlds/demo.json"), &mechanics::standard())?;
//!
//!     let mut server = Server::new(ServerConfig::default(), world).await?;
//!
//!     // Runs until a shutdown message arrives:
//!     // - Receives join/move/action requests
//!     // - Steps every map with a player on it
//!     // - Sends step messages for changed maps
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server runs a few internal async tasks:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Serialises and sends the outgoing packet queue
//! - **Timeout Checker**: Removes players who stopped sending
//! - **Main Loop**: Applies requests and steps the world
//!
//! ## Security Considerations
//!
//! ### Input Validation
//! Display names and game names are length-checked and coordinates must be
//! finite. Invalid requests are answered with an error message and change
//! nothing.
//!
//! ### State Authority
//! Clients only choose a destination. Speed, bounds and every trigger
//! effect are decided on the server.

pub mod client_manager;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod map;
pub mod mechanics;
pub mod movement;
pub mod network;
pub mod step;
pub mod world;

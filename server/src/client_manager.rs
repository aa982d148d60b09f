//! Joined players and the pool of player slots they take over
//!
//! This module handles the server-side bookkeeping for players, including:
//! - Slot assignment: every `player` sprite in the world is a slot, handed out
//!   in a random order so join order does not decide who plays which sprite
//! - Player lifecycle (join, leave, timeout)
//! - Per-player settings such as movement speed
//! - Change tracking for the text shown only to that player
//!
//! The client manager never touches the world itself; the network layer
//! applies the matching sprite changes when players join or leave.

use log::info;
use rand::seq::SliceRandom;
use shared::{ObjectId, DEFAULT_MOVE_SPEED};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A player sprite that can be taken over by a joining client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSlot {
    /// Number shown to the player, starting at 1
    pub player_number: u32,
    /// Sprite controlled by whoever holds the slot
    pub sprite: ObjectId,
}

/// A joined player
///
/// Each client maintains:
/// - Connection metadata (ID, address, last activity)
/// - The slot (sprite and player number) it controls
/// - What it was last told, so unchanged state is not resent
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// The player sprite this client controls
    pub slot: PlayerSlot,
    /// Name shown above the sprite
    pub display_name: String,
    /// Pixels per second used for move requests
    pub move_speed: f32,
    /// Action text included in the last step message sent
    pub last_action_text: Option<String>,
}

impl Client {
    /// Creates a new client for the given slot
    ///
    /// The client starts with the default move speed, is marked as recently
    /// active and has not been sent any action text yet.
    pub fn new(id: u32, addr: SocketAddr, slot: PlayerSlot, display_name: &str) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            slot,
            display_name: display_name.to_string(),
            move_speed: DEFAULT_MOVE_SPEED,
            last_action_text: None,
        }
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages joined players and the free slot pool
///
/// The number of player sprites in the world is the player capacity. Slots
/// are shuffled once at startup; a leaving player's slot goes back to the
/// pool once the network layer has reset its sprite.
pub struct ClientManager {
    /// Joined clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new players
    next_client_id: u32,
    /// Slots nobody controls; the next join takes the last one
    free_slots: Vec<PlayerSlot>,
}

impl ClientManager {
    /// Creates a client manager over the given player sprites
    ///
    /// Player numbers follow the order of `sprites`; the pool is then
    /// shuffled so the assignment order is random.
    pub fn new(sprites: Vec<ObjectId>) -> Self {
        let mut free_slots: Vec<PlayerSlot> = sprites
            .into_iter()
            .enumerate()
            .map(|(i, sprite)| PlayerSlot {
                player_number: i as u32 + 1,
                sprite,
            })
            .collect();
        free_slots.shuffle(&mut rand::thread_rng());

        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            free_slots,
        }
    }

    /// Attempts to add a new player
    ///
    /// Returns Some(client_id) if a slot was free, None if the game is full.
    /// Logs the join for server monitoring.
    pub fn add_client(&mut self, addr: SocketAddr, display_name: &str) -> Option<u32> {
        let slot = self.free_slots.pop()?;

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr, slot, display_name);
        info!(
            "Player {} '{}' joined from {} as player {}",
            client_id, display_name, addr, slot.player_number
        );
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a player
    ///
    /// Returns the removed client so its sprite can be reset; the slot is
    /// not free again until [`ClientManager::free_slot`] is called.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Player {} '{}' left", client.id, client.display_name);
        Some(client)
    }

    /// Returns a slot to the pool
    pub fn free_slot(&mut self, slot: PlayerSlot) {
        if !self.free_slots.contains(&slot) {
            self.free_slots.push(slot);
        }
    }

    /// Finds a client ID by their network address
    ///
    /// Used to associate incoming packets with joined players.
    /// Returns None if no player joined from the given address.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Records activity from a client
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Checks for and removes timed-out players
    ///
    /// Returns the removed clients so their sprites can be reset and their
    /// slots freed.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Gets all client IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> + '_ {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client> + '_ {
        self.clients.values_mut()
    }

    /// Number of slots still free
    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    /// Returns the number of joined players
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if nobody has joined
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

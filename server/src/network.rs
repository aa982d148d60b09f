//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::{Client, ClientManager, PlayerSlot};
use crate::map::{Map, ObjectList};
use crate::step::Clock;
use crate::world::World;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{MoveTarget, ObjectId, Packet, MAX_PACKET_SIZE};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

pub const NOT_JOINED: &str =
    "Players that have not joined game may only send joinRequest msg type.";
pub const GAME_FULL: &str = "Game is full. No more players can join.";

/// Runtime settings for [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. `127.0.0.1:20000`
    pub addr: String,
    /// Steps per second
    pub tick_rate: u32,
    /// Accept the `TestPlayer*` debugging packets
    pub test_mode: bool,
    /// Players silent for longer than this are removed
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{}", shared::DEFAULT_PORT),
            tick_rate: shared::DEFAULT_TICK_RATE,
            test_mode: false,
            client_timeout: Duration::from_secs(60),
        }
    }
}

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client: Client,
    },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and world simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: World,
    config: ServerConfig,
    started: Instant,
    tick: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig, world: World) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let slots = world.player_slots();
        if slots.is_empty() {
            warn!("Game '{}' has no player sprites; nobody can join", world.game);
        } else {
            info!("Game '{}' has room for {} players", world.game, slots.len());
        }
        if config.test_mode {
            info!("Server running in TEST MODE");
        }

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(slots))),
            world,
            config,
            started: Instant::now(),
            tick: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender for injecting messages, e.g. [`ServerMessage::Shutdown`]
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Seconds since the server started; the game clock.
    fn game_sec(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send {} to {}: {}", packet.kind(), addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that removes players who went silent
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(format!("{} bytes do not fit in one datagram", data.len()).into());
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn broadcast_packet(&self, packet: &Packet, exclude: Option<u32>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket {
            packet: packet.clone(),
            exclude,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn send_error(&self, result: &str, addr: SocketAddr) {
        let packet = Packet::Error {
            result: result.to_string(),
        };
        self.send_packet(&packet, addr).await;
    }

    /// Validates a request and applies it to the world
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = packet.validate() {
            warn!("Invalid {} from {}: {}", packet.kind(), addr, e);
            self.send_error(&e.to_string(), addr).await;
            return;
        }

        let client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };

        let Some(client_id) = client_id else {
            match packet {
                Packet::JoinRequest { game, display_name } => {
                    self.handle_join(&game, &display_name, addr).await;
                }
                other => {
                    warn!("{} from {} who has not joined", other.kind(), addr);
                    self.send_error(NOT_JOINED, addr).await;
                }
            }
            return;
        };

        let (slot, move_speed) = {
            let mut clients = self.clients.write().await;
            clients.touch(client_id);
            match clients.get(client_id) {
                Some(client) => (client.slot, client.move_speed),
                None => return,
            }
        };

        match packet {
            Packet::JoinRequest { .. } => {
                info!("Player at {} sent joinRequest again", addr);
                self.send_join_reply(slot, addr).await;
            }
            Packet::PlayerMove { dest_x, dest_y } => {
                if let Some(map) = self.world.map_of_mut(slot.sprite) {
                    map.set_destination(slot.sprite, MoveTarget::new(dest_x, dest_y, move_speed));
                }
            }
            Packet::PlayerAction => {
                if let Some(obj) = self
                    .world
                    .map_of_mut(slot.sprite)
                    .and_then(|map| map.object_mut(slot.sprite))
                {
                    obj.action = true;
                }
            }
            Packet::Leave => {
                let client = {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id)
                };
                if let Some(client) = client {
                    self.release_slot(client.slot).await;
                }
            }
            Packet::TestPlayerJump { x, y } if self.config.test_mode => {
                if let Some(map) = self.world.map_of_mut(slot.sprite) {
                    map.set_location_by_anchor(slot.sprite, x, y);
                    map.stop_object(slot.sprite);
                    info!("TEST: player {} jumped to ({}, {})", slot.player_number, x, y);
                }
            }
            Packet::TestPlayerNextMap if self.config.test_mode => {
                self.move_to_next_map(slot.sprite);
            }
            Packet::TestPlayerJump { .. } | Packet::TestPlayerNextMap => {
                warn!("Ignoring {} from {}: test mode is off", packet.kind(), addr);
            }
            other => {
                warn!("Unexpected {} packet from client at {}", other.kind(), addr);
            }
        }
    }

    async fn handle_join(&mut self, game: &str, display_name: &str, addr: SocketAddr) {
        if game != self.world.game {
            info!("Player at {} tried to join wrong game '{}'", addr, game);
            let result = format!(
                "Client and Server are not running the same game: client->{}, server->{}",
                game, self.world.game
            );
            self.send_error(&result, addr).await;
            return;
        }

        let slot = {
            let mut clients = self.clients.write().await;
            clients
                .add_client(addr, display_name)
                .and_then(|id| clients.get(id))
                .map(|client| client.slot)
        };
        let Some(slot) = slot else {
            info!("Player at {} tried to join full game", addr);
            self.send_error(GAME_FULL, addr).await;
            return;
        };

        match self
            .world
            .map_of_mut(slot.sprite)
            .and_then(|map| map.object_mut(slot.sprite))
        {
            Some(obj) => {
                obj.label_text = Some(display_name.to_string());
                obj.player_number = Some(slot.player_number);
            }
            None => error!("Player sprite {:?} is missing from the world", slot.sprite),
        }
        if let Some(map) = self.world.map_of_mut(slot.sprite) {
            map.mark_changed();
        }
        self.send_join_reply(slot, addr).await;
    }

    async fn send_join_reply(&self, slot: PlayerSlot, addr: SocketAddr) {
        let reply = Packet::JoinReply {
            player_number: slot.player_number,
            server_sec: self.game_sec(),
            test_mode: self.config.test_mode,
        };
        self.send_packet(&reply, addr).await;
    }

    /// Resets a departed player's sprite and puts its slot back in the pool
    async fn release_slot(&mut self, slot: PlayerSlot) {
        if let Some(map) = self.world.map_of_mut(slot.sprite) {
            if let Some(obj) = map.object_mut(slot.sprite) {
                obj.label_text = None;
                obj.player_number = None;
                obj.action = false;
                obj.action_text = None;
                obj.stop();
            }
            map.mark_changed();
        }
        self.clients.write().await.free_slot(slot);
    }

    fn move_to_next_map(&mut self, sprite: ObjectId) {
        let Some(current) = self.world.locate(sprite).map(str::to_string) else {
            return;
        };
        let Some(next) = self.world.next_map_name(&current) else {
            return;
        };
        if next != current {
            if let Err(e) = self.world.transfer(sprite, &next) {
                error!("TEST: cannot move {:?} to '{}': {}", sprite, next, e);
                return;
            }
        }
        if let Some(map) = self.world.map_mut(&next) {
            let inside = map
                .object(sprite)
                .map_or(false, |o| map.within_extent(o.anchor_x, o.anchor_y));
            if !inside {
                let (cx, cy) = (map.pixel_width() / 2.0, map.pixel_height() / 2.0);
                map.set_location_by_anchor(sprite, cx, cy);
            }
            map.stop_object(sprite);
        }
        info!("TEST: {:?} changed maps from '{}' to '{}'", sprite, current, next);
    }

    fn step_packet(&self, map: &Map, action_text: Option<String>) -> Packet {
        Packet::Step {
            game_sec: self.game_sec(),
            map_name: map.name.clone(),
            layer_visibility: map.visibility_mask(),
            sprites: map.objects_in(ObjectList::Sprites).cloned().collect(),
            overlay: map.objects_in(ObjectList::Overlay).cloned().collect(),
            action_text,
        }
    }

    /// Steps every map that has a player on it, then tells each player
    /// about their map if it or their action text changed.
    async fn step_world(&mut self) {
        let sprites: Vec<ObjectId> = {
            let clients = self.clients.read().await;
            clients.iter().map(|c| c.slot.sprite).collect()
        };
        let active: BTreeSet<String> = sprites
            .iter()
            .filter_map(|s| self.world.locate(*s).map(str::to_string))
            .collect();

        self.world
            .step(&active, Clock::new(self.game_sec(), self.config.tick_rate));

        let mut outgoing = Vec::new();
        {
            let mut clients = self.clients.write().await;
            for client in clients.iter_mut() {
                let Some(map) = self
                    .world
                    .locate(client.slot.sprite)
                    .and_then(|name| self.world.map(name))
                else {
                    continue;
                };
                let action_text = map
                    .object(client.slot.sprite)
                    .and_then(|o| o.action_text.clone());
                if map.changed() || action_text != client.last_action_text {
                    client.last_action_text = action_text.clone();
                    outgoing.push((self.step_packet(map, action_text), client.addr));
                }
            }
        }
        for (packet, addr) in outgoing {
            self.send_packet(&packet, addr).await;
        }

        self.world.clear_changed();
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let tick_rate = self.config.tick_rate.max(1);
        let mut tick_interval = interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_report = Instant::now();

        info!("Server started successfully at {} ticks per second", tick_rate);

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client }) => {
                            info!("Player {} '{}' timed out", client.id, client.display_name);
                            self.release_slot(client.slot).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            let bye = Packet::Disconnected {
                                reason: "Server shutting down".to_string(),
                            };
                            self.broadcast_packet(&bye, None).await;
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.step_world().await;
                    self.tick += 1;

                    // Periodic performance monitoring
                    if self.tick % 60 == 0 {
                        let (client_count, active_maps) = {
                            let clients = self.clients.read().await;
                            let maps: BTreeSet<&str> = clients
                                .iter()
                                .filter_map(|c| self.world.locate(c.slot.sprite))
                                .collect();
                            (clients.len(), maps.len())
                        };

                        if client_count > 0 {
                            let elapsed = last_report.elapsed().as_secs_f32();
                            debug!("Tick {}: {} players on {} maps, {:.1}Hz",
                                   self.tick, client_count, active_maps, 60.0 / elapsed);
                        }
                        last_report = Instant::now();
                    }
                },
            }
        }

        Ok(())
    }
}

//! UDP Game Server implementation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;

use hunt_shared::{ClientMessage, ErrorKind, ServerMessage, PROTOCOL_VERSION};

use crate::afk::AfkService;
use crate::entities::PlayerCombatant;
use crate::error::{AfkError, CombatError};
use crate::persistence::{CharacterStore, Database, PersistenceHandle};
use crate::world::{GameWorld, TickOutput, DEFAULT_ZONE_ID};

/// Maximum packet size
const MAX_PACKET_SIZE: usize = 1200;

/// Connection timeout in seconds
const CONNECTION_TIMEOUT: f32 = 30.0;

/// Connection state - tracks whether client is in character select or in game
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Authenticated but not yet selected a character
    CharacterSelect,
    /// In game with a character
    InGame {
        character_id: i64,
        character_name: String,
    },
}

/// Client connection state
#[derive(Debug)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    /// Runtime id, also the player's id in the game world
    pub player_id: u64,
    pub account_id: i64,
    pub username: String,
    pub state: ConnectionState,
    pub last_seen: std::time::Instant,
    /// Outgoing message queue
    pub outgoing_queue: Vec<ServerMessage>,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, player_id: u64, account_id: i64, username: String) -> Self {
        Self {
            addr,
            player_id,
            account_id,
            username,
            state: ConnectionState::CharacterSelect,
            last_seen: std::time::Instant::now(),
            outgoing_queue: Vec::new(),
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.last_seen.elapsed().as_secs_f32() > CONNECTION_TIMEOUT
    }

    /// Check if client is in game
    pub fn is_in_game(&self) -> bool {
        matches!(self.state, ConnectionState::InGame { .. })
    }

    /// Get character ID if in game
    pub fn character_id(&self) -> Option<i64> {
        match &self.state {
            ConnectionState::InGame { character_id, .. } => Some(*character_id),
            _ => None,
        }
    }
}

/// Game server
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: HashMap<SocketAddr, ClientConnection>,
    next_player_id: u64,
    /// Account login; None when Postgres is unreachable
    database: Option<Database>,
    store: Arc<dyn CharacterStore>,
    afk: Arc<AfkService>,
    persistence: PersistenceHandle,
}

impl Server {
    /// Create a new server listening on the given port
    pub async fn new(
        port: u16,
        database: Option<Database>,
        store: Arc<dyn CharacterStore>,
        afk: Arc<AfkService>,
        persistence: PersistenceHandle,
    ) -> Result<Self, std::io::Error> {
        let addr = format!("0.0.0.0:{}", port);
        let socket = UdpSocket::bind(&addr).await?;

        Ok(Self {
            socket: Arc::new(socket),
            clients: HashMap::new(),
            next_player_id: 1,
            database,
            store,
            afk,
            persistence,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Process incoming network messages. `now_ms` is the live loop's clock.
    pub async fn process_incoming(&mut self, world: &mut GameWorld, now_ms: u64) {
        let mut buf = [0u8; MAX_PACKET_SIZE];

        // Non-blocking receive loop
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, addr)) => {
                    self.handle_packet(&buf[..len], addr, world, now_ms).await;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    break;
                }
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    break;
                }
            }
        }

        self.check_timeouts(world);
    }

    /// Handle a received packet
    async fn handle_packet(&mut self, data: &[u8], addr: SocketAddr, world: &mut GameWorld, now_ms: u64) {
        let message = match ClientMessage::deserialize(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize packet from {}: {}", addr, e);
                return;
            }
        };

        if let Some(client) = self.clients.get_mut(&addr) {
            client.last_seen = std::time::Instant::now();
        }

        match message {
            ClientMessage::Login {
                protocol_version,
                username,
                password,
            } => {
                self.handle_login(addr, protocol_version, username, password, world).await;
            }
            ClientMessage::SelectCharacter { character_id } => {
                self.handle_select_character(addr, character_id, world).await;
            }
            ClientMessage::Disconnect => {
                self.handle_disconnect(addr, world);
            }
            ClientMessage::PlayerUpdate { position } => {
                if let Some(client) = self.clients.get(&addr).filter(|c| c.is_in_game()) {
                    world.update_player_position(client.player_id, position);
                }
            }
            ClientMessage::Attack { target_id } => {
                self.handle_attack(addr, target_id, world, now_ms);
            }
            ClientMessage::SetAutoAttack { enabled } => {
                if let Some(client) = self.clients.get(&addr).filter(|c| c.is_in_game()) {
                    world.set_auto_attack(client.player_id, enabled);
                }
            }
            ClientMessage::ChangeZone { zone_id } => {
                self.handle_change_zone(addr, zone_id, world);
            }
            ClientMessage::BeginAfk {
                character_id,
                zone_id,
                auto,
            } => {
                let afk = self.afk.clone();
                let account_id = self.account_of(addr);
                self.respond_async(addr, async move {
                    let session = afk.begin(account_id, character_id, zone_id, auto).await?;
                    Ok::<_, AfkError>(ServerMessage::AfkStarted {
                        character_id: session.character_id,
                        zone_id: session.zone_id,
                        started_at_ms: session.session_start_ms,
                    })
                });
            }
            ClientMessage::SettleAfk { character_id } => {
                let afk = self.afk.clone();
                let account_id = self.account_of(addr);
                self.respond_async(addr, async move {
                    let settlement = afk.settle(account_id, character_id).await?;
                    Ok::<_, AfkError>(ServerMessage::AfkSettled(settlement))
                });
            }
            ClientMessage::EndAfk { character_id } => {
                let afk = self.afk.clone();
                let account_id = self.account_of(addr);
                self.respond_async(addr, async move {
                    afk.end(account_id, character_id).await?;
                    Ok::<_, AfkError>(ServerMessage::AfkEnded {
                        character_id: character_id.unwrap_or_default(),
                    })
                });
            }
        }
    }

    fn account_of(&self, addr: SocketAddr) -> Option<i64> {
        self.clients.get(&addr).map(|c| c.account_id)
    }

    /// Run an AFK request off the game loop and send its reply when done
    fn respond_async<F>(&self, addr: SocketAddr, request: F)
    where
        F: std::future::Future<Output = Result<ServerMessage, AfkError>> + Send + 'static,
    {
        let socket = self.socket.clone();
        tokio::spawn(async move {
            let reply = match request.await {
                Ok(msg) => msg,
                Err(e) => {
                    if e.kind() == ErrorKind::Internal {
                        error!("AFK request from {} failed: {}", addr, e);
                    } else {
                        debug!("AFK request from {} rejected: {}", addr, e);
                    }
                    ServerMessage::RequestFailed {
                        kind: e.kind(),
                        reason: e.to_string(),
                    }
                }
            };
            send_message(&socket, addr, &reply).await;
        });
    }

    /// Handle login request - only authenticates, does not spawn player
    async fn handle_login(
        &mut self,
        addr: SocketAddr,
        protocol_version: u32,
        username: String,
        password: String,
        world: &mut GameWorld,
    ) {
        if protocol_version != PROTOCOL_VERSION {
            let msg = ServerMessage::LoginFailed {
                reason: format!(
                    "Protocol version mismatch. Server: {}, Client: {}",
                    PROTOCOL_VERSION, protocol_version
                ),
            };
            self.send_to(addr, &msg).await;
            return;
        }

        if self.clients.contains_key(&addr) {
            warn!("Client {} already connected, ignoring", addr);
            return;
        }

        let db = match &self.database {
            Some(db) => db,
            None => {
                let msg = ServerMessage::LoginFailed {
                    reason: "Server persistence not available".to_string(),
                };
                self.send_to(addr, &msg).await;
                return;
            }
        };

        let account_id = match db.authenticate_account(&username, &password).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Login failed for {}: {}", username, e);
                let msg = ServerMessage::LoginFailed {
                    reason: "Invalid username or password".to_string(),
                };
                self.send_to(addr, &msg).await;
                return;
            }
        };

        if let Err(e) = db.update_last_login(account_id).await {
            warn!("Failed to update last login for account {}: {}", account_id, e);
        }

        self.replace_account_session(account_id, world);

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        self.clients
            .insert(addr, ClientConnection::new(addr, player_id, account_id, username.clone()));
        info!("Account '{}' ({}) authenticated from {}", username, account_id, addr);

        self.send_to(addr, &ServerMessage::LoginSuccess { account_id }).await;
    }

    /// Handle character selection - loads the character and enters the world
    async fn handle_select_character(&mut self, addr: SocketAddr, character_id: i64, world: &mut GameWorld) {
        let (player_id, account_id) = match self.clients.get(&addr) {
            Some(c) if !c.is_in_game() => (c.player_id, c.account_id),
            Some(_) => {
                warn!("SelectCharacter from {} which is already in game", addr);
                return;
            }
            None => {
                self.send_to(addr, &request_failed(ErrorKind::Unauthenticated, "Not logged in"))
                    .await;
                return;
            }
        };

        let record = match self.store.load_character(character_id).await {
            Ok(Some(record)) if record.account_id == account_id => record,
            Ok(_) => {
                warn!(
                    "Account {} tried to select character {} it does not own",
                    account_id, character_id
                );
                self.send_to(addr, &request_failed(ErrorKind::Forbidden, "Character not available"))
                    .await;
                return;
            }
            Err(e) => {
                error!("Failed to load character {}: {}", character_id, e);
                self.send_to(addr, &request_failed(ErrorKind::Internal, "Failed to load character"))
                    .await;
                return;
            }
        };

        let stats = record.derived_stats();
        let spawn = world
            .zones()
            .get(record.zone_id)
            .or_else(|| world.zones().get(DEFAULT_ZONE_ID))
            .map(|z| z.player_spawn)
            .unwrap_or([0.0, 0.0]);
        world.spawn_player(PlayerCombatant::new(
            player_id,
            record.id,
            record.name.clone(),
            record.class,
            record.zone_id,
            spawn,
            stats,
        ));

        // The world may have moved the player out of an unknown zone
        let (zone_id, position) = world
            .player(player_id)
            .map(|p| (p.zone_id, p.position))
            .unwrap_or((record.zone_id, spawn));

        if let Some(client) = self.clients.get_mut(&addr) {
            client.state = ConnectionState::InGame {
                character_id: record.id,
                character_name: record.name.clone(),
            };
        }
        info!(
            "Character '{}' (level {} {}) entered zone {} as player {}",
            record.name,
            record.level,
            record.class.name(),
            zone_id,
            player_id
        );

        let msg = ServerMessage::CharacterSelected {
            character_id: record.id,
            name: record.name,
            class: record.class,
            zone_id,
            position,
            level: record.level,
            experience: record.exp,
            gold: record.gold,
            stats,
        };
        self.send_to(addr, &msg).await;
    }

    /// Handle disconnect
    fn handle_disconnect(&mut self, addr: SocketAddr, world: &mut GameWorld) {
        if let Some(connection) = self.clients.remove(&addr) {
            self.leave_world(&connection, world);
            info!("Account '{}' disconnected", connection.username);
        }
    }

    /// A second login for the same account replaces the first, taking its
    /// player out of the world with it
    fn replace_account_session(&mut self, account_id: i64, world: &mut GameWorld) {
        let existing_addr = self
            .clients
            .iter()
            .find(|(_, c)| c.account_id == account_id)
            .map(|(a, _)| *a);
        if let Some(connection) = existing_addr.and_then(|a| self.clients.remove(&a)) {
            info!("Kicking existing connection for account {} (reconnecting)", account_id);
            self.leave_world(&connection, world);
        }
    }

    fn leave_world(&self, connection: &ClientConnection, world: &mut GameWorld) {
        if let ConnectionState::InGame {
            character_id,
            character_name,
        } = &connection.state
        {
            if let Some(player) = world.despawn_player(connection.player_id) {
                self.persistence.save_zone(*character_id, player.zone_id);
            }
            info!(
                "Character '{}' (player ID: {}) left the world",
                character_name, connection.player_id
            );
        }
    }

    fn handle_attack(&mut self, addr: SocketAddr, target_id: u64, world: &mut GameWorld, now_ms: u64) {
        let Some(client) = self.clients.get(&addr).filter(|c| c.is_in_game()) else {
            return;
        };

        match world.player_attack(client.player_id, target_id, now_ms) {
            Ok(()) => {}
            // Cooldown and range misses are routine with client-side prediction
            Err(CombatError::OnCooldown { .. }) | Err(CombatError::OutOfRange) => {}
            Err(e) => debug!("Attack from player {} rejected: {}", client.player_id, e),
        }
    }

    fn handle_change_zone(&mut self, addr: SocketAddr, zone_id: u32, world: &mut GameWorld) {
        let Some((player_id, character_id)) = self
            .clients
            .get(&addr)
            .and_then(|c| c.character_id().map(|id| (c.player_id, id)))
        else {
            return;
        };

        let Some(position) = world.change_zone(player_id, zone_id) else {
            if let Some(client) = self.clients.get_mut(&addr) {
                client
                    .outgoing_queue
                    .push(request_failed(ErrorKind::NotFound, "Unknown zone"));
            }
            return;
        };

        self.persistence.save_zone(character_id, zone_id);

        let afk = self.afk.clone();
        tokio::spawn(async move {
            if let Err(e) = afk.on_zone_exit(character_id, zone_id).await {
                error!("Failed to end AFK session for character {}: {}", character_id, e);
            }
        });

        if let Some(client) = self.clients.get_mut(&addr) {
            client
                .outgoing_queue
                .push(ServerMessage::ZoneChanged { zone_id, position });
        }
    }

    /// Check for timed out connections
    fn check_timeouts(&mut self, world: &mut GameWorld) {
        let timed_out: Vec<SocketAddr> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_timed_out())
            .map(|(addr, _)| *addr)
            .collect();

        for addr in timed_out {
            if let Some(connection) = self.clients.remove(&addr) {
                self.leave_world(&connection, world);
                warn!("Account '{}' timed out", connection.username);
            }
        }
    }

    /// Queue a tick's zone events and direct messages
    pub fn queue_tick_output(&mut self, output: &TickOutput, world: &GameWorld) {
        for event in &output.events {
            self.broadcast_to_zone(event.zone_id, &event.message, world);
        }
        for (player_id, msg) in &output.direct {
            self.queue_message_for_player(*player_id, msg.clone());
        }
    }

    /// Send every in-game client the state of its own zone
    pub async fn broadcast_world_state(&self, world: &GameWorld) {
        let mut by_zone: HashMap<u32, Vec<u8>> = HashMap::new();

        for (addr, client) in &self.clients {
            if !client.is_in_game() {
                continue;
            }
            let Some(player) = world.player(client.player_id) else {
                continue;
            };

            if !by_zone.contains_key(&player.zone_id) {
                match world.world_state(player.zone_id).serialize() {
                    Ok(data) => {
                        by_zone.insert(player.zone_id, data);
                    }
                    Err(e) => {
                        error!("Failed to serialize world state for zone {}: {}", player.zone_id, e);
                        continue;
                    }
                }
            }
            let Some(data) = by_zone.get(&player.zone_id) else {
                continue;
            };

            if let Err(e) = self.socket.send_to(data, addr).await {
                error!("Failed to send world state to {}: {}", addr, e);
            }
        }
    }

    /// Process outgoing message queues
    pub async fn process_outgoing(&mut self) {
        for (addr, client) in &mut self.clients {
            for msg in client.outgoing_queue.drain(..) {
                send_message(&self.socket, *addr, &msg).await;
            }
        }
    }

    /// Send a message to a specific address
    async fn send_to(&self, addr: SocketAddr, msg: &ServerMessage) {
        send_message(&self.socket, addr, msg).await;
    }

    /// Queue a message to broadcast to all in-game clients in a specific zone
    fn broadcast_to_zone(&mut self, zone_id: u32, msg: &ServerMessage, world: &GameWorld) {
        for client in self.clients.values_mut() {
            if !client.is_in_game() {
                continue;
            }
            if let Some(player) = world.player(client.player_id) {
                if player.zone_id == zone_id {
                    client.outgoing_queue.push(msg.clone());
                }
            }
        }
    }

    /// Queue a message for a specific player
    fn queue_message_for_player(&mut self, player_id: u64, msg: ServerMessage) {
        if let Some(client) = self
            .clients
            .values_mut()
            .find(|c| c.player_id == player_id && c.is_in_game())
        {
            client.outgoing_queue.push(msg);
        }
    }

    /// Persist the zone of every connected character (called periodically)
    pub fn save_all_players(&self, world: &GameWorld) {
        for client in self.clients.values() {
            if let (Some(character_id), Some(player)) =
                (client.character_id(), world.player(client.player_id))
            {
                self.persistence.save_zone(character_id, player.zone_id);
            }
        }
    }
}

fn request_failed(kind: ErrorKind, reason: &str) -> ServerMessage {
    ServerMessage::RequestFailed {
        kind,
        reason: reason.to_string(),
    }
}

async fn send_message(socket: &UdpSocket, addr: SocketAddr, msg: &ServerMessage) {
    let data = match msg.serialize() {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to serialize message for {}: {}", addr, e);
            return;
        }
    };
    if let Err(e) = socket.send_to(&data, addr).await {
        error!("Failed to send to {}: {}", addr, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::AfkConfig;
    use crate::ledger::{LocalLeveling, RewardLedger};
    use crate::persistence::{spawn_writer, MemoryStore};
    use crate::world::ZoneManager;
    use hunt_shared::{resolve, BaseStats, CharacterClass, CreatureTable, Equipment};

    async fn server() -> Server {
        let store: Arc<dyn CharacterStore> = Arc::new(MemoryStore::new());
        let ledger = Arc::new(RewardLedger::new(store.clone(), Arc::new(LocalLeveling::new(store.clone()))));
        let afk = Arc::new(AfkService::new(
            store.clone(),
            ledger.clone(),
            Arc::new(ZoneManager::with_defaults()),
            Arc::new(CreatureTable::with_defaults()),
            Arc::new(SystemClock),
            AfkConfig::default(),
        ));
        let handle = spawn_writer(store.clone(), ledger);
        Server::new(0, None, store, afk, handle).await.expect("bind")
    }

    #[tokio::test]
    async fn test_relogin_takes_old_player_out_of_world() {
        let mut server = server().await;
        let mut world = GameWorld::new(
            Arc::new(ZoneManager::with_defaults()),
            Arc::new(CreatureTable::with_defaults()),
            Some(1),
        );
        let old_addr: SocketAddr = "127.0.0.1:4001".parse().expect("addr");
        let mut old = ClientConnection::new(old_addr, 1, 10, "alice".into());
        old.state = ConnectionState::InGame {
            character_id: 42,
            character_name: "Alice".into(),
        };
        server.clients.insert(old_addr, old);
        let base = BaseStats { strength: 5, ..Default::default() };
        let stats = resolve(CharacterClass::Warrior, &base, 1, &Equipment::default(), &[]);
        world.spawn_player(PlayerCombatant::new(
            1,
            42,
            "Alice".into(),
            CharacterClass::Warrior,
            DEFAULT_ZONE_ID,
            [20.0, 12.0],
            stats,
        ));
        world.set_auto_attack(1, true);

        server.replace_account_session(10, &mut world);

        assert!(server.clients.is_empty());
        assert!(world.player(1).is_none());
        for i in 0..200u64 {
            assert!(world.tick(i * 50, 0.05).rewards.is_empty());
        }
    }

    #[tokio::test]
    async fn test_relogin_leaves_other_accounts_alone() {
        let mut server = server().await;
        let mut world = GameWorld::new(
            Arc::new(ZoneManager::with_defaults()),
            Arc::new(CreatureTable::with_defaults()),
            Some(1),
        );
        let addr: SocketAddr = "127.0.0.1:4002".parse().expect("addr");
        server.clients.insert(addr, ClientConnection::new(addr, 2, 11, "bob".into()));

        server.replace_account_session(10, &mut world);

        assert_eq!(server.clients.len(), 1);
    }
}

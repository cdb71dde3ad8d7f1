//! Admission Controller (C6): the connection-accept loop, per spec §4.6.
//! Every accepted socket gets its own thread that reads a `Username`
//! packet and then routes the connection to exactly one of: join the
//! waiting queue, resume an interrupted match, or spectate the match
//! currently in progress. A second, long-lived thread drains the waiting
//! queue two at a time and spawns a fresh session-engine thread per pair.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ids::GameId;
use crate::presence::{PresenceRegistry, ReserveOutcome, ResumeOutcome};
use crate::reconnect::ReconnectCoordinator;
use crate::session::{self, MatchConfig, Player, PlayerFate};
use crate::spectate::{self, SpectatorFanout};
use crate::waiting::WaitingQueue;
use battleship_board::Catalogue;
use battleship_proto::{Key, PacketType};
use battleship_transport::{ReceiveOutcome, Transport};
use slog::Logger;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

struct CurrentMatch {
    spectators: Arc<SpectatorFanout>,
    summary: String,
}

pub struct AdmissionController {
    key: Key,
    move_timeout: Duration,
    reconnect_timeout: Duration,
    connection_timeout: Duration,
    catalogue: Catalogue,
    presence: Arc<PresenceRegistry>,
    waiting: Arc<WaitingQueue>,
    current_match: Mutex<Option<CurrentMatch>>,
    log: Logger,
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
}

impl AdmissionController {
    pub fn new(config: &ServerConfig, log: Logger) -> Arc<AdmissionController> {
        let presence = Arc::new(PresenceRegistry::new(config.timeouts.reconnect_timeout()));
        Arc::new(AdmissionController {
            key: config.server.psk.clone(),
            move_timeout: config.timeouts.move_timeout(),
            reconnect_timeout: config.timeouts.reconnect_timeout(),
            connection_timeout: config.timeouts.connection_timeout(),
            catalogue: config.catalogue.clone(),
            presence,
            waiting: WaitingQueue::new(),
            current_match: Mutex::new(None),
            log,
        })
    }

    /// Runs forever: spawns the lobby/pairing thread, then accepts
    /// connections on `listener`, handing each to its own thread.
    pub fn run(self: &Arc<Self>, listener: TcpListener) {
        let lobby = self.clone();
        std::thread::spawn(move || lobby.run_lobby());

        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let controller = self.clone();
                    slog::debug!(self.log, "accepted connection"; "peer" => %addr);
                    std::thread::spawn(move || controller.handle_connection(stream));
                }
                Err(err) => {
                    slog::warn!(self.log, "accept failed"; "error" => %err);
                }
            }
        }
    }

    fn run_lobby(self: Arc<Self>) {
        loop {
            let (a, b) = self.waiting.pop_pair();
            let controller = self.clone();
            std::thread::spawn(move || controller.play_match(a, b));
        }
    }

    fn handle_connection(self: Arc<Self>, stream: std::net::TcpStream) {
        let mut transport = Transport::new(stream, self.key.clone(), self.log.clone());

        let username = match transport.receive(self.connection_timeout) {
            ReceiveOutcome::Valid(header, payload) if header.packet_type == PacketType::Username => {
                let text = String::from_utf8_lossy(&payload).trim().to_string();
                if text.is_empty() {
                    self.reject(&mut transport, ServerError::ProtocolMisuse("empty username"));
                    return;
                }
                text
            }
            ReceiveOutcome::Valid(_, _) => {
                self.reject(&mut transport, ServerError::ProtocolMisuse("first packet must be Username"));
                return;
            }
            ReceiveOutcome::Timeout => {
                self.reject(&mut transport, ServerError::Timeout);
                return;
            }
            ReceiveOutcome::Closed | ReceiveOutcome::Corrupt => return,
        };

        self.admit(username, transport);
    }

    fn reject(&self, transport: &mut Transport, err: ServerError) {
        slog::info!(self.log, "rejecting connection"; "reason" => %err);
        let _ = transport.send(PacketType::Error, err.to_string().as_bytes(), 1);
        transport.shutdown();
    }

    fn admit(self: &Arc<Self>, username: String, transport: Transport) {
        match self.presence.try_reserve(&username) {
            ReserveOutcome::Reserved(conn_id) => {
                self.route_fresh_admission(username, conn_id, transport);
            }
            ReserveOutcome::AlreadyActive => {
                let mut transport = transport;
                self.reject(&mut transport, ServerError::PresenceConflict);
            }
            ReserveOutcome::ResumeEligible => {
                let conn_id = self.presence.next_conn_id();
                match self.presence.resume(&username, conn_id, transport) {
                    ResumeOutcome::Delivered => {
                        slog::info!(self.log, "player resumed an interrupted match"; "username" => username.as_str());
                    }
                    ResumeOutcome::NoLongerEligible(transport) => {
                        self.presence.reserve_fresh(&username, conn_id);
                        self.route_fresh_admission(username, conn_id, transport);
                    }
                }
            }
        }
    }

    /// A brand-new (non-resuming) reservation: spectate the in-progress
    /// match if there is one, otherwise join the waiting queue.
    fn route_fresh_admission(self: &Arc<Self>, username: String, conn_id: crate::presence::ConnId, transport: Transport) {
        let current = self.current_match.lock().unwrap().as_ref().map(|m| (m.spectators.clone(), m.summary.clone()));

        match current {
            Some((spectators, summary)) => {
                self.presence.release(&username, conn_id);
                self.start_spectating(spectators, transport, &summary);
            }
            None => {
                self.waiting.enqueue(
                    username,
                    transport,
                    conn_id,
                    self.presence.clone(),
                    self.connection_timeout,
                    self.log.clone(),
                );
            }
        }
    }

    fn start_spectating(&self, spectators: Arc<SpectatorFanout>, transport: Transport, summary: &str) {
        let original = transport;
        let clone_for_fanout = match original.try_clone() {
            Ok(t) => t,
            Err(_) => return,
        };
        let label = spectators.join(clone_for_fanout, summary, &self.log);
        spectate::spawn_reader(spectators, original, label, self.connection_timeout, self.log.clone());
    }

    fn play_match(self: Arc<Self>, a: crate::waiting::WaitingPlayer, b: crate::waiting::WaitingPlayer) {
        let game_id = GameId::new(&a.username, &b.username, now_unix());
        let spectators = Arc::new(SpectatorFanout::new());
        let summary = format!("{} vs {} is in progress.", a.username, b.username);

        *self.current_match.lock().unwrap() = Some(CurrentMatch { spectators: spectators.clone(), summary });
        self.presence.set_current_match(Some(game_id.clone()));

        slog::info!(self.log, "match starting"; "game_id" => %game_id);

        let reconnect = ReconnectCoordinator::new(self.presence.clone());
        let config = MatchConfig {
            move_timeout: self.move_timeout,
            reconnect_timeout: self.reconnect_timeout,
            catalogue: self.catalogue.clone(),
        };

        let p1 = Player { username: a.username, conn_id: a.conn_id, transport: a.transport };
        let p2 = Player { username: b.username, conn_id: b.conn_id, transport: b.transport };

        let result = session::run_match(game_id.clone(), p1, p2, &reconnect, &spectators, &config, &self.log);

        self.presence.set_current_match(None);
        *self.current_match.lock().unwrap() = None;

        slog::info!(self.log, "match concluded"; "game_id" => %game_id);

        self.apply_fate(result.p1);
        self.apply_fate(result.p2);
    }

    fn apply_fate(self: &Arc<Self>, fate: PlayerFate) {
        match fate {
            PlayerFate::Requeue(player) => {
                self.waiting.enqueue(
                    player.username,
                    player.transport,
                    player.conn_id,
                    self.presence.clone(),
                    self.connection_timeout,
                    self.log.clone(),
                );
            }
            PlayerFate::Left(player) => {
                self.presence.release(&player.username, player.conn_id);
            }
        }
    }
}

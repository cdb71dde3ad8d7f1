//! Presence Registry (C5): tracks active usernames, disconnected-but-
//! resumable players with expiry, and which match (if any) is currently
//! running. One `Mutex`-guarded map, per spec §5's "no I/O while held"
//! policy — the only cross-thread hand-off here is a one-shot channel that
//! carries the literal `Transport` from the admission thread that accepted
//! a reconnection to the session-engine thread waiting on it.

use crate::ids::GameId;
use crate::session::GameSnapshot;
use battleship_transport::Transport;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type ConnId = u64;

#[derive(Debug, Eq, PartialEq)]
pub enum ReserveOutcome {
    Reserved(ConnId),
    AlreadyActive,
    ResumeEligible,
}

pub enum ResumeOutcome {
    Delivered,
    /// The disconnected entry had already expired or the waiting session
    /// gave up before this resume attempt landed. Hands the transport back
    /// so the admission controller can fall back to the `Reserved` path.
    NoLongerEligible(Transport),
}

struct ActiveRecord {
    conn_id: ConnId,
}

struct DisconnectedRecord {
    snapshot: GameSnapshot,
    disconnect_time: u64,
    game_id: GameId,
    #[allow(dead_code)] // carried per spec's data model; not read internally
    opponent: String,
    resume_tx: Option<SyncSender<Transport>>,
}

#[derive(Default)]
struct Inner {
    active: HashMap<String, ActiveRecord>,
    disconnected: HashMap<String, DisconnectedRecord>,
    current_match: Option<GameId>,
}

pub struct PresenceRegistry {
    inner: Mutex<Inner>,
    next_conn_id: AtomicU64,
    reconnect_timeout: Duration,
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
}

impl PresenceRegistry {
    pub fn new(reconnect_timeout: Duration) -> PresenceRegistry {
        PresenceRegistry {
            inner: Mutex::new(Inner::default()),
            next_conn_id: AtomicU64::new(1),
            reconnect_timeout,
        }
    }

    /// Drops expired `disconnected` entries. Runs implicitly on every
    /// `try_reserve`, per spec §4.5.
    fn sweep(&self, inner: &mut Inner) {
        let now = now_unix();
        let timeout = self.reconnect_timeout.as_secs();
        inner.disconnected.retain(|_, rec| now.saturating_sub(rec.disconnect_time) <= timeout);
    }

    pub fn try_reserve(&self, username: &str) -> ReserveOutcome {
        let mut inner = self.inner.lock().unwrap();
        self.sweep(&mut inner);

        if inner.disconnected.contains_key(username) {
            return ReserveOutcome::ResumeEligible;
        }
        if inner.active.contains_key(username) {
            return ReserveOutcome::AlreadyActive;
        }

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        inner.active.insert(username.to_string(), ActiveRecord { conn_id });
        ReserveOutcome::Reserved(conn_id)
    }

    /// Removes `active[username]` only if it is still owned by `conn_id`
    /// — guards against a stale release racing a reconnection swap.
    pub fn release(&self, username: &str, conn_id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.active.get(username).map(|r| r.conn_id) == Some(conn_id) {
            inner.active.remove(username);
        }
    }

    /// Moves `username` from `active` to `disconnected`, stamped with the
    /// current time and owning match. Returns a receiver that yields the
    /// new connection once `resume` is called for the same username.
    pub fn park(
        &self,
        username: &str,
        snapshot: GameSnapshot,
        game_id: GameId,
        opponent: &str,
    ) -> Receiver<Transport> {
        let (tx, rx) = sync_channel(1);
        let mut inner = self.inner.lock().unwrap();
        inner.active.remove(username);
        inner.disconnected.insert(
            username.to_string(),
            DisconnectedRecord {
                snapshot,
                disconnect_time: now_unix(),
                game_id,
                opponent: opponent.to_string(),
                resume_tx: Some(tx),
            },
        );
        rx
    }

    /// Called from the admission controller's `ResumeEligible` path: marks
    /// `username` active under the new connection identity and hands the
    /// connection itself to whichever session engine is waiting on it.
    pub fn resume(&self, username: &str, conn_id: ConnId, new_transport: Transport) -> ResumeOutcome {
        let tx = {
            let mut inner = self.inner.lock().unwrap();
            self.sweep(&mut inner);

            match inner.disconnected.get_mut(username).and_then(|r| r.resume_tx.take()) {
                Some(tx) => tx,
                None => return ResumeOutcome::NoLongerEligible(new_transport),
            }
        };

        match tx.send(new_transport) {
            Ok(()) => {
                let mut inner = self.inner.lock().unwrap();
                inner.active.insert(username.to_string(), ActiveRecord { conn_id });
                ResumeOutcome::Delivered
            }
            Err(err) => ResumeOutcome::NoLongerEligible(err.0),
        }
    }

    /// Allocates a fresh connection identity without reserving anything.
    /// Used by the admission controller when a resume attempt turns out to
    /// be stale and it needs to fall back to a brand-new reservation.
    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Forcibly clears any stale `active`/`disconnected` record for
    /// `username` and inserts a fresh `active` entry. Only called after a
    /// `resume` attempt has already reported `NoLongerEligible`, so there
    /// is no live connection left to race with.
    pub fn reserve_fresh(&self, username: &str, conn_id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        inner.disconnected.remove(username);
        inner.active.insert(username.to_string(), ActiveRecord { conn_id });
    }

    /// Called by the session engine once `wait_for_return` has yielded the
    /// new connection: clears the parked snapshot for `game_id` and
    /// returns it (the session engine's own in-memory copy is
    /// authoritative; this is the bookkeeping half of C5's `claim`).
    pub fn claim(&self, username: &str, game_id: &GameId) -> Option<GameSnapshot> {
        let mut inner = self.inner.lock().unwrap();
        match inner.disconnected.remove(username) {
            Some(rec) if &rec.game_id == game_id => Some(rec.snapshot),
            Some(rec) => {
                inner.disconnected.insert(username.to_string(), rec);
                None
            }
            None => None,
        }
    }

    /// Removes any snapshot still parked under `username` for `game_id` at
    /// normal session shutdown, so it cannot zombie-resume a later match
    /// (C9's `clean`).
    pub fn clean(&self, username: &str, game_id: &GameId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.disconnected.get(username).map(|r| &r.game_id) == Some(game_id) {
            inner.disconnected.remove(username);
        }
    }

    pub fn set_current_match(&self, game_id: Option<GameId>) {
        self.inner.lock().unwrap().current_match = game_id;
    }

    pub fn current_match_running(&self) -> bool {
        self.inner.lock().unwrap().current_match.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use battleship_board::Board;

    fn snapshot() -> GameSnapshot {
        GameSnapshot {
            board_p1: Board::new(10).snapshot(),
            board_p2: Board::new(10).snapshot(),
            next_turn: "alice".to_string(),
        }
    }

    #[test]
    fn reserve_then_release_frees_the_name() {
        let registry = PresenceRegistry::new(Duration::from_secs(60));
        let conn_id = match registry.try_reserve("alice") {
            ReserveOutcome::Reserved(id) => id,
            other => panic!("expected Reserved, got {other:?}"),
        };
        assert_eq!(registry.try_reserve("alice"), ReserveOutcome::AlreadyActive);
        registry.release("alice", conn_id);
        assert!(matches!(registry.try_reserve("alice"), ReserveOutcome::Reserved(_)));
    }

    #[test]
    fn park_then_try_reserve_is_resume_eligible() {
        let registry = PresenceRegistry::new(Duration::from_secs(60));
        registry.try_reserve("alice");
        let game_id = GameId::new("alice", "bob", 0);
        let _rx = registry.park("alice", snapshot(), game_id, "bob");
        assert_eq!(registry.try_reserve("alice"), ReserveOutcome::ResumeEligible);
    }

    #[test]
    fn resume_delivers_transport_and_claim_returns_snapshot() {
        use std::net::TcpListener;

        let registry = PresenceRegistry::new(Duration::from_secs(60));
        registry.try_reserve("alice");
        let game_id = GameId::new("alice", "bob", 0);
        let rx = registry.park("alice", snapshot(), game_id.clone(), "bob");

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server_sock, _) = listener.accept().unwrap();
        let log = slog::Logger::root(slog::Discard, slog::o!());
        let transport = Transport::new(server_sock, battleship_proto::Key::zero(), log);

        let outcome = registry.resume("alice", 99, transport);
        assert!(matches!(outcome, ResumeOutcome::Delivered));

        let _received = rx.recv_timeout(Duration::from_secs(1)).expect("transport delivered");
        assert!(registry.claim("alice", &game_id).is_some());
        drop(client);
    }

    #[test]
    fn expired_park_sweeps_away() {
        let registry = PresenceRegistry::new(Duration::from_secs(0));
        registry.try_reserve("alice");
        let game_id = GameId::new("alice", "bob", 0);
        let _rx = registry.park("alice", snapshot(), game_id, "bob");
        std::thread::sleep(Duration::from_millis(1100));
        assert!(matches!(registry.try_reserve("alice"), ReserveOutcome::Reserved(_)));
    }
}

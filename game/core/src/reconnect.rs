//! Reconnect Coordinator (C9): a thin façade over the Presence Registry,
//! per spec §4.9. All the actual state lives in `PresenceRegistry`; this
//! module only shapes the three operations the Session Engine calls into
//! the vocabulary spec §4.9 uses (`park`, `wait_for_return`, `clean`).

use crate::ids::GameId;
use crate::presence::PresenceRegistry;
use crate::session::GameSnapshot;
use battleship_transport::Transport;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub enum ReturnOutcome {
    Resumed(Transport),
    ExpiredForfeit,
}

pub struct ReconnectCoordinator {
    presence: Arc<PresenceRegistry>,
}

impl ReconnectCoordinator {
    pub fn new(presence: Arc<PresenceRegistry>) -> ReconnectCoordinator {
        ReconnectCoordinator { presence }
    }

    /// Snapshots the interrupted match under `username`, idempotently for
    /// the same `game_id` (a later park of the same match supersedes an
    /// earlier one, since `PresenceRegistry::park` simply overwrites).
    pub fn park(
        &self,
        username: &str,
        snapshot: GameSnapshot,
        game_id: GameId,
        opponent: &str,
    ) -> Receiver<Transport> {
        self.presence.park(username, snapshot, game_id, opponent)
    }

    /// Polls for `username`'s return at roughly one-second granularity
    /// until either a new connection is delivered or `deadline` passes.
    pub fn wait_for_return(&self, rx: &Receiver<Transport>, deadline: Instant) -> ReturnOutcome {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ReturnOutcome::ExpiredForfeit;
            }

            let poll = remaining.min(Duration::from_secs(1));
            match rx.recv_timeout(poll) {
                Ok(transport) => return ReturnOutcome::Resumed(transport),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return ReturnOutcome::ExpiredForfeit,
            }
        }
    }

    /// Clears the parked entry for `username`/`game_id` once the owning
    /// session has actually resumed on the new connection, so a later,
    /// stale reconnection attempt for the same username cannot be
    /// misclassified as `ResumeEligible` (C5's `claim`).
    pub fn claim(&self, username: &str, game_id: &GameId) {
        self.presence.claim(username, game_id);
    }

    /// Removes any snapshot still parked under `username` for `game_id` so
    /// it cannot zombie-resume a later match, per spec's normal-shutdown
    /// cleanup requirement.
    pub fn clean(&self, username: &str, game_id: &GameId) {
        self.presence.clean(username, game_id);
    }
}

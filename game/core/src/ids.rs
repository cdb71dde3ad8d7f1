use std::fmt;

/// A unique per-match token: both usernames plus the match's start time,
/// per spec §3's "composite of both usernames and start time suffices".
#[derive(Debug, Clone, Eq, PartialEq, Hash, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct GameId(String);

impl GameId {
    pub fn new(player1: &str, player2: &str, start_unix_secs: u64) -> GameId {
        GameId(format!("{player1}-vs-{player2}-{start_unix_secs}"))
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

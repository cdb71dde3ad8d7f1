use battleship_board::Catalogue;
use battleship_proto::Key;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5001;

#[derive(Serialize, Deserialize)]
pub struct Server {
    pub address: String,
    pub psk: Key,
    pub max_clients: u16,
}

#[derive(Serialize, Deserialize)]
pub struct Timeouts {
    pub move_timeout_secs: u64,
    pub reconnect_timeout_secs: u64,
    pub connection_timeout_secs: u64,
}

impl Timeouts {
    pub fn move_timeout(&self) -> Duration {
        Duration::from_secs(self.move_timeout_secs)
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

#[derive(Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: Server,
    pub timeouts: Timeouts,
    #[serde(default)]
    pub catalogue: Catalogue,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            server: Server {
                address: format!("127.0.0.1:{}", DEFAULT_PORT),
                psk: Key::zero(),
                max_clients: 256,
            },
            timeouts: Timeouts {
                move_timeout_secs: 30,
                reconnect_timeout_secs: 60,
                connection_timeout_secs: 60,
            },
            catalogue: Catalogue::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file. A missing file is not an
    /// error — callers should fall back to `ServerConfig::default()`
    /// before calling this, or use `load_or_default`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ServerConfig, serdeconv::Error> {
        serdeconv::from_toml_file(path)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> ServerConfig {
        match path {
            Some(path) if path.as_ref().exists() => {
                ServerConfig::load(path).expect("error loading server configuration file")
            }
            _ => ServerConfig::default(),
        }
    }
}

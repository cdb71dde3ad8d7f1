//! Orchestration for one Battleship server instance: configuration,
//! logging, the match identifier, the presence registry, the waiting
//! queue, spectator fanout, the reconnect coordinator, the session engine,
//! and the admission controller that ties them together. Corresponds to
//! components C4 through C9 of the spec, plus the ambient config/logging
//! stack.

pub mod admission;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod presence;
pub mod reconnect;
pub mod render;
pub mod session;
pub mod spectate;
pub mod waiting;

pub const MOVE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
pub const RECONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
pub const CONNECTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

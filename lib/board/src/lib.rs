//! Pure board model: grid, ship placement, fire resolution, snapshotting.
//! No I/O lives in this crate — it is the part of the server that the
//! Session Engine drives, never the part that talks to a socket.

pub mod board;
pub mod coord;
pub mod ship;

pub use board::{Board, Cell, FireOutcome, Snapshot};
pub use coord::{Coordinate, Orientation};
pub use ship::{Catalogue, PlacedShip, ShipSpec};

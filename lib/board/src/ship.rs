use crate::coord::Coordinate;
use serde_derive::{Deserialize, Serialize};

/// Longest ship in the default catalogue; bounds the fixed-size `remaining`
/// set so a `PlacedShip` never needs a heap-allocated collection, per the
/// "sets of ship coordinates" design note.
pub const MAX_SHIP_LEN: usize = 5;

/// One entry of the placement catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipSpec {
    pub name: String,
    pub length: u8,
}

/// The ordered fleet a board is populated with. Defaults to the spec's
/// fixed catalogue; kept as data (not a hardcoded array) so tests can swap
/// in a smaller fleet, per SPEC_FULL's `ShipCatalogue` note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalogue {
    pub ships: Vec<ShipSpec>,
}

impl Catalogue {
    pub fn total_cells(&self) -> usize {
        self.ships.iter().map(|s| s.length as usize).sum()
    }
}

impl Default for Catalogue {
    fn default() -> Catalogue {
        Catalogue {
            ships: vec![
                ShipSpec { name: "Carrier".into(), length: 5 },
                ShipSpec { name: "Battleship".into(), length: 4 },
                ShipSpec { name: "Cruiser".into(), length: 3 },
                ShipSpec { name: "Submarine".into(), length: 3 },
                ShipSpec { name: "Destroyer".into(), length: 2 },
            ],
        }
    }
}

/// Fixed-capacity set of a ship's still-unhit cells. Capacity is
/// `MAX_SHIP_LEN`; a ship longer than that is a configuration error the
/// caller must not construct.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RemainingCells {
    cells: [Option<Coordinate>; MAX_SHIP_LEN],
    len: usize,
}

impl RemainingCells {
    pub fn from_cells(initial: &[Coordinate]) -> RemainingCells {
        assert!(
            initial.len() <= MAX_SHIP_LEN,
            "ship occupies more cells than MAX_SHIP_LEN"
        );
        let mut cells = [None; MAX_SHIP_LEN];
        for (slot, coord) in cells.iter_mut().zip(initial.iter()) {
            *slot = Some(*coord);
        }
        RemainingCells { cells, len: initial.len() }
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        self.cells[..self.len].iter().any(|c| *c == Some(coord))
    }

    /// Removes `coord` if present; returns whether the set is now empty.
    pub fn remove(&mut self, coord: Coordinate) -> bool {
        if let Some(pos) = self.cells[..self.len].iter().position(|c| *c == Some(coord)) {
            self.cells.swap(pos, self.len - 1);
            self.cells[self.len - 1] = None;
            self.len -= 1;
        }
        self.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.cells[..self.len].iter().filter_map(|c| *c)
    }
}

/// A ship placed on a board: its catalogue name, the cells it originally
/// occupied (kept around so a sunk ship can still be rendered in
/// `SUNK_SHIPS_INFO` after `remaining` has emptied out), and the cells it
/// still occupies (not yet hit).
#[derive(Debug, Clone)]
pub struct PlacedShip {
    pub name: String,
    pub cells: Vec<Coordinate>,
    pub remaining: RemainingCells,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_cells_tracks_emptiness() {
        let mut remaining = RemainingCells::from_cells(&[
            Coordinate::new(0, 0),
            Coordinate::new(0, 1),
        ]);
        assert!(!remaining.contains(Coordinate::new(0, 2)));
        assert!(!remaining.remove(Coordinate::new(0, 0)));
        assert!(remaining.remove(Coordinate::new(0, 1)));
        assert!(remaining.is_empty());
    }
}

use crate::coord::{Coordinate, Orientation};
use crate::ship::{Catalogue, PlacedShip, RemainingCells};
use rand::Rng;
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Cell {
    Empty,
    Ship,
    Hit,
    Miss,
}

#[derive(Debug, Eq, PartialEq)]
pub enum FireOutcome {
    Invalid,
    AlreadyShot,
    Miss,
    /// Hit; carries the sunk ship's name if this shot emptied its
    /// `remaining` set.
    Hit(Option<String>),
}

/// One player's grid plus ship bookkeeping. All operations are pure
/// functions of this state — no I/O, per spec §4.3.
pub struct Board {
    size: u8,
    hidden: Vec<Vec<Cell>>,
    ships: Vec<PlacedShip>,
}

/// A fully-reconstructing snapshot of a `Board`, per spec §3/§4.3.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub size: u8,
    pub hidden_rows: Vec<Vec<CellKind>>,
    pub ships: Vec<ShipSnapshot>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum CellKind {
    Empty,
    Ship,
    Hit,
    Miss,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShipSnapshot {
    pub name: String,
    pub cells: Vec<Coordinate>,
    pub remaining: Vec<Coordinate>,
}

impl From<Cell> for CellKind {
    fn from(c: Cell) -> CellKind {
        match c {
            Cell::Empty => CellKind::Empty,
            Cell::Ship => CellKind::Ship,
            Cell::Hit => CellKind::Hit,
            Cell::Miss => CellKind::Miss,
        }
    }
}

impl From<CellKind> for Cell {
    fn from(c: CellKind) -> Cell {
        match c {
            CellKind::Empty => Cell::Empty,
            CellKind::Ship => Cell::Ship,
            CellKind::Hit => Cell::Hit,
            CellKind::Miss => Cell::Miss,
        }
    }
}

impl Board {
    pub fn new(size: u8) -> Board {
        Board {
            size,
            hidden: vec![vec![Cell::Empty; size as usize]; size as usize],
            ships: Vec::new(),
        }
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    fn cell(&self, coord: Coordinate) -> Cell {
        self.hidden[coord.row as usize][coord.col as usize]
    }

    fn set_cell(&mut self, coord: Coordinate, cell: Cell) {
        self.hidden[coord.row as usize][coord.col as usize] = cell;
    }

    /// The run of `length` cells starting at `(row, col)` in `orientation`.
    /// Returns `None` if any cell would fall outside the grid.
    fn run(&self, row: u8, col: u8, length: u8, orientation: Orientation) -> Option<Vec<Coordinate>> {
        let mut cells = Vec::with_capacity(length as usize);
        for i in 0..length {
            let coord = match orientation {
                Orientation::Horizontal => Coordinate::new(row, col.checked_add(i)?),
                Orientation::Vertical => Coordinate::new(row.checked_add(i)?, col),
            };
            if !coord.in_bounds(self.size) {
                return None;
            }
            cells.push(coord);
        }
        Some(cells)
    }

    /// True iff a ship of `length` cells can be placed at `(row, col)` in
    /// `orientation`: the run stays in bounds and every target cell is
    /// currently empty.
    pub fn can_place(&self, row: u8, col: u8, length: u8, orientation: Orientation) -> bool {
        match self.run(row, col, length, orientation) {
            Some(cells) => cells.iter().all(|&c| self.cell(c) == Cell::Empty),
            None => false,
        }
    }

    /// Places a ship. Caller must have already verified `can_place`;
    /// behavior is unspecified (in practice: may overwrite cells) if not.
    pub fn place(&mut self, name: &str, row: u8, col: u8, length: u8, orientation: Orientation) {
        let cells = self
            .run(row, col, length, orientation)
            .expect("place called on an out-of-bounds run");

        for &coord in &cells {
            self.set_cell(coord, Cell::Ship);
        }

        self.ships.push(PlacedShip {
            name: name.to_string(),
            cells: cells.clone(),
            remaining: RemainingCells::from_cells(&cells),
        });
    }

    /// Places every ship in `catalogue` at a uniform-random legal position,
    /// retrying draws until each lands. Terminates with overwhelming
    /// probability on a 10x10 board with the standard catalogue (17 of 100
    /// cells occupied at most).
    pub fn place_random<R: Rng>(&mut self, catalogue: &Catalogue, rng: &mut R) {
        for spec in &catalogue.ships {
            loop {
                let orientation = if rng.gen_bool(0.5) {
                    Orientation::Horizontal
                } else {
                    Orientation::Vertical
                };
                let row = rng.gen_range(0..self.size);
                let col = rng.gen_range(0..self.size);

                if self.can_place(row, col, spec.length, orientation) {
                    self.place(&spec.name, row, col, spec.length, orientation);
                    break;
                }
            }
        }
    }

    /// Resolves a shot at `(row, col)` against this board.
    pub fn fire_at(&mut self, coord: Coordinate) -> FireOutcome {
        if !coord.in_bounds(self.size) {
            return FireOutcome::Invalid;
        }

        match self.cell(coord) {
            Cell::Hit | Cell::Miss => FireOutcome::AlreadyShot,
            Cell::Empty => {
                self.set_cell(coord, Cell::Miss);
                FireOutcome::Miss
            }
            Cell::Ship => {
                self.set_cell(coord, Cell::Hit);

                let ship = self
                    .ships
                    .iter_mut()
                    .find(|s| s.remaining.contains(coord))
                    .expect("hidden_grid Ship cell with no owning PlacedShip");

                let sunk = ship.remaining.remove(coord);
                FireOutcome::Hit(if sunk { Some(ship.name.clone()) } else { None })
            }
        }
    }

    /// True iff every placed ship's `remaining` set is empty.
    pub fn all_sunk(&self) -> bool {
        !self.ships.is_empty() && self.ships.iter().all(|s| s.remaining.is_empty())
    }

    /// The masked view of this board: Hit/Miss pass through, Ship and Empty
    /// both render as Empty. Derived on demand rather than stored, so the
    /// "never shows Ship" invariant holds by construction.
    pub fn display_cell(&self, coord: Coordinate) -> Cell {
        match self.cell(coord) {
            Cell::Ship => Cell::Empty,
            other => other,
        }
    }

    /// Every cell still marked Ship (not yet hit) across all placed ships.
    /// Used only by the own-grid renderer, which is the sole exception to
    /// "display never reveals Ship".
    pub fn ship_cells(&self) -> Vec<Coordinate> {
        self.ships.iter().flat_map(|s| s.remaining.iter()).collect()
    }

    /// The full set of cells a named ship originally occupied, regardless
    /// of how many have since been hit. `None` if no ship by that name has
    /// been placed on this board.
    pub fn ship_cells_for(&self, name: &str) -> Option<Vec<Coordinate>> {
        self.ships.iter().find(|s| s.name == name).map(|s| s.cells.clone())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            size: self.size,
            hidden_rows: self
                .hidden
                .iter()
                .map(|row| row.iter().map(|&c| c.into()).collect())
                .collect(),
            ships: self
                .ships
                .iter()
                .map(|s| ShipSnapshot {
                    name: s.name.clone(),
                    cells: s.cells.clone(),
                    remaining: s.remaining.iter().collect(),
                })
                .collect(),
        }
    }

    pub fn restore(snapshot: Snapshot) -> Board {
        let hidden = snapshot
            .hidden_rows
            .into_iter()
            .map(|row| row.into_iter().map(Cell::from).collect())
            .collect();

        let ships = snapshot
            .ships
            .into_iter()
            .map(|s| PlacedShip {
                name: s.name,
                cells: s.cells,
                remaining: RemainingCells::from_cells(&s.remaining),
            })
            .collect();

        Board { size: snapshot.size, hidden, ships }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn full_catalogue() -> Catalogue {
        Catalogue::default()
    }

    #[test]
    fn happy_path_sink_sequence() {
        let mut board = Board::new(10);
        board.place("Carrier", 0, 0, 5, Orientation::Horizontal);

        let expectations = [
            (Coordinate::new(0, 0), FireOutcome::Hit(None)),
            (Coordinate::new(0, 1), FireOutcome::Hit(None)),
            (Coordinate::new(0, 2), FireOutcome::Hit(None)),
            (Coordinate::new(0, 3), FireOutcome::Hit(None)),
            (Coordinate::new(0, 4), FireOutcome::Hit(Some("Carrier".into()))),
        ];

        for (coord, expected) in expectations {
            assert_eq!(board.fire_at(coord), expected);
        }

        assert!(board.all_sunk());
        assert_eq!(board.fire_at(Coordinate::new(0, 4)), FireOutcome::AlreadyShot);
    }

    #[test]
    fn miss_then_already_shot_does_not_change_cell_state() {
        let mut board = Board::new(10);
        let coord = Coordinate::new(1, 1);
        assert_eq!(board.fire_at(coord), FireOutcome::Miss);
        assert_eq!(board.fire_at(coord), FireOutcome::AlreadyShot);
    }

    #[test]
    fn out_of_bounds_is_invalid() {
        let mut board = Board::new(10);
        assert_eq!(board.fire_at(Coordinate::new(10, 0)), FireOutcome::Invalid);
    }

    #[test]
    fn display_never_reveals_ship_cells() {
        let mut board = Board::new(10);
        board.place("Destroyer", 2, 2, 2, Orientation::Horizontal);

        for row in 0..10 {
            for col in 0..10 {
                assert_ne!(board.display_cell(Coordinate::new(row, col)), Cell::Ship);
            }
        }
    }

    #[test]
    fn snapshot_restore_roundtrip_preserves_fire_outcomes() {
        let mut board = Board::new(10);
        board.place("Cruiser", 3, 3, 3, Orientation::Vertical);
        board.fire_at(Coordinate::new(3, 3));

        let restored = Board::restore(board.snapshot());

        for row in 0..10u8 {
            for col in 0..10u8 {
                let coord = Coordinate::new(row, col);
                let mut a = Board::restore(board.snapshot());
                let mut b = Board::restore(restored.snapshot());
                assert_eq!(a.fire_at(coord), b.fire_at(coord));
            }
        }
    }

    #[test]
    fn place_random_fills_full_catalogue_without_overlap() {
        let mut board = Board::new(10);
        let mut rng = StdRng::seed_from_u64(42);
        let catalogue = full_catalogue();
        board.place_random(&catalogue, &mut rng);

        let ship_cells = (0..10)
            .flat_map(|r| (0..10).map(move |c| (r, c)))
            .filter(|&(r, c)| board.hidden[r as usize][c as usize] == Cell::Ship)
            .count();

        assert_eq!(ship_cells, catalogue.total_cells());
    }

    #[test]
    fn can_place_rejects_overlap_and_out_of_bounds() {
        let mut board = Board::new(10);
        board.place("Destroyer", 0, 0, 2, Orientation::Horizontal);
        assert!(!board.can_place(0, 1, 2, Orientation::Horizontal));
        assert!(!board.can_place(0, 9, 2, Orientation::Horizontal));
    }
}

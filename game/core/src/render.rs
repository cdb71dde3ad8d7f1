//! Text rendering of board state for the `BoardUpdate` packet payload, per
//! spec §6's "Board rendering format" — this is the one piece of wire
//! payload format pinned down bit-exactly rather than left free-form.

use battleship_board::{Board, Cell, Coordinate};

fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let pad = width - len;
    let left = pad / 2;
    let right = pad - left;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

fn cell_symbol(cell: Cell) -> &'static str {
    match cell {
        Cell::Hit => "X",
        Cell::Miss => "o",
        Cell::Ship | Cell::Empty => ".",
    }
}

/// Column header row: three-space gutter, then 1..=size each centered in a
/// 3-wide field.
fn header_row(size: u8) -> String {
    let mut row = String::from("   ");
    for col in 1..=size {
        row.push_str(&center(&col.to_string(), 3));
    }
    row
}

/// One data row of the masked view: the row letter, two spaces, then each
/// cell centered in a 3-wide field. Ship cells are never distinguished from
/// Empty here — only `render_own_grid` can show 'S'.
fn data_row(board: &Board, row: u8) -> String {
    let mut line = format!("{}  ", (b'A' + row) as char);
    for col in 0..board.size() {
        let coord = Coordinate::new(row, col);
        line.push_str(&center(cell_symbol(board.display_cell(coord)), 3));
    }
    line
}

fn grid_block(title: &str, board: &Board) -> String {
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    out.push_str(&header_row(board.size()));
    out.push('\n');
    for row in 0..board.size() {
        out.push_str(&data_row(board, row));
        out.push('\n');
    }
    out
}

/// Renders a player's own grid, which is the only grid allowed to show 'S'.
/// Takes the live ship cells explicitly because `Board`'s public API masks
/// ships everywhere (the model enforces "display never shows Ship" by
/// construction); the owner's client is the one exception, so the caller
/// supplies the set of currently-unsunk ship cells to overlay.
pub fn render_own_grid(title: &str, board: &Board, ship_cells: &[Coordinate]) -> String {
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    out.push_str(&header_row(board.size()));
    out.push('\n');
    for row in 0..board.size() {
        let mut line = format!("{}  ", (b'A' + row) as char);
        for col in 0..board.size() {
            let coord = Coordinate::new(row, col);
            let masked = board.display_cell(coord);
            let symbol = if masked == Cell::Empty && ship_cells.contains(&coord) {
                "S"
            } else {
                cell_symbol(masked)
            };
            line.push_str(&center(symbol, 3));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Renders an opponent's (or spectated player's) masked grid: never shows
/// 'S'.
pub fn render_masked_grid(title: &str, board: &Board) -> String {
    grid_block(title, board)
}

/// Encodes the `SUNK_SHIPS_INFO:` line: one entry per sunk ship, each
/// listing its name followed by the coordinates it occupied, per spec §6's
/// `SUNK_SHIPS_INFO:name:r,c_r,c_...;name:...` format — cells within a ship
/// are `_`-joined, ships are `;`-joined.
pub fn sunk_ships_info(sunk: &[(String, Vec<Coordinate>)]) -> Option<String> {
    if sunk.is_empty() {
        return None;
    }

    let mut line = String::from("SUNK_SHIPS_INFO:");
    for (i, (name, cells)) in sunk.iter().enumerate() {
        if i > 0 {
            line.push(';');
        }
        line.push_str(name);
        line.push(':');
        for (j, coord) in cells.iter().enumerate() {
            if j > 0 {
                line.push('_');
            }
            line.push_str(&coord.row.to_string());
            line.push(',');
            line.push_str(&coord.col.to_string());
        }
    }
    Some(line)
}

/// Assembles a full `BoardUpdate` payload: the player's own grid (ships
/// visible), the opponent's masked grid, and an optional sunk-ship info
/// line.
pub fn board_update_payload(
    own_title: &str,
    own_board: &Board,
    own_ship_cells: &[Coordinate],
    other_title: &str,
    other_board: &Board,
    sunk: &[(String, Vec<Coordinate>)],
) -> String {
    let mut out = render_own_grid(own_title, own_board, own_ship_cells);
    out.push_str(&render_masked_grid(other_title, other_board));
    if let Some(line) = sunk_ships_info(sunk) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Assembles the view a spectator gets: both grids masked, since a
/// spectator never gets to see either player's `S` cells.
pub fn spectator_payload(title_p1: &str, board_p1: &Board, title_p2: &str, board_p2: &Board) -> String {
    let mut out = render_masked_grid(title_p1, board_p1);
    out.push_str(&render_masked_grid(title_p2, board_p2));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use battleship_board::Orientation;

    #[test]
    fn own_grid_never_leaks_unsunk_ship_via_masked_path() {
        let mut board = Board::new(10);
        board.place("Destroyer", 0, 0, 2, Orientation::Horizontal);
        let masked = render_masked_grid("Opponent's Grid:", &board);
        assert!(!masked.contains('S'));
    }

    #[test]
    fn own_grid_shows_ship_cells_supplied_by_caller() {
        let board = Board::new(10);
        let rendered = render_own_grid("Your Grid:", &board, &[Coordinate::new(0, 0)]);
        assert!(rendered.contains('S'));
    }

    #[test]
    fn sunk_ships_info_is_none_when_nothing_sunk() {
        assert_eq!(sunk_ships_info(&[]), None);
    }

    #[test]
    fn sunk_ships_info_encodes_coordinates() {
        let info = sunk_ships_info(&[("Carrier".to_string(), vec![Coordinate::new(0, 0), Coordinate::new(0, 1)])]);
        assert_eq!(info.as_deref(), Some("SUNK_SHIPS_INFO:Carrier:0,0_0,1"));
    }

    #[test]
    fn sunk_ships_info_joins_multiple_ships_with_semicolons() {
        let info = sunk_ships_info(&[
            ("Destroyer".to_string(), vec![Coordinate::new(1, 1), Coordinate::new(1, 2)]),
            ("Submarine".to_string(), vec![Coordinate::new(3, 3), Coordinate::new(4, 3), Coordinate::new(5, 3)]),
        ]);
        assert_eq!(info.as_deref(), Some("SUNK_SHIPS_INFO:Destroyer:1,1_1,2;Submarine:3,3_4,3_5,3"));
    }

    #[test]
    fn spectator_payload_never_shows_either_players_ships() {
        let mut p1 = Board::new(10);
        p1.place("Destroyer", 0, 0, 2, Orientation::Horizontal);
        let mut p2 = Board::new(10);
        p2.place("Destroyer", 5, 5, 2, Orientation::Vertical);

        let payload = spectator_payload("alice's Grid:", &p1, "bob's Grid:", &p2);
        assert!(!payload.contains('S'));
    }
}

use std::fmt;

/// Grid size. Spec fixes N = 10 for the default catalogue; kept as a
/// runtime field on `Board` so tests can shrink it, but the server binary
/// always constructs boards with `Board::new(Coordinate::DEFAULT_SIZE, ..)`.
pub const DEFAULT_SIZE: u8 = 10;

/// A zero-based (row, col) grid position, 0 <= row, col < size.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct Coordinate {
    pub row: u8,
    pub col: u8,
}

impl Coordinate {
    #[inline]
    pub fn new(row: u8, col: u8) -> Coordinate {
        Coordinate { row, col }
    }

    #[inline]
    pub fn in_bounds(self, size: u8) -> bool {
        self.row < size && self.col < size
    }

    /// Parses the external form: a row letter followed by a 1-based decimal
    /// column, e.g. "B5" -> (1, 4). Rejects out-of-range letters/columns and
    /// malformed input, per spec §8's coordinate parser property.
    pub fn parse(s: &str, size: u8) -> Option<Coordinate> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars.next()?;

        if !letter.is_ascii_alphabetic() {
            return None;
        }

        let row = (letter.to_ascii_uppercase() as u8).checked_sub(b'A')?;
        if row >= size {
            return None;
        }

        let rest: &str = chars.as_str();
        if rest.is_empty() {
            return None;
        }

        let col_1based: u32 = rest.parse().ok()?;
        if col_1based == 0 || col_1based > size as u32 {
            return None;
        }

        Some(Coordinate::new(row, (col_1based - 1) as u8))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'A' + self.row) as char, self.col + 1)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn parse(s: &str) -> Option<Orientation> {
        match s.trim().to_ascii_uppercase().as_str() {
            "H" => Some(Orientation::Horizontal),
            "V" => Some(Orientation::Vertical),
            _ => None,
        }
    }
}

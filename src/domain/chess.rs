//! Pure chess domain types and utilities.
//! No image or process dependencies - this is the domain layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::{Color as SColor, File, Rank, Role, Square};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

impl PieceKind {
    pub const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ];

    /// Uppercase notation letter (`P N B R Q K`)
    pub fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'P',
            PieceKind::Knight => 'N',
            PieceKind::Bishop => 'B',
            PieceKind::Rook => 'R',
            PieceKind::Queen => 'Q',
            PieceKind::King => 'K',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'P' => Some(PieceKind::Pawn),
            'N' => Some(PieceKind::Knight),
            'B' => Some(PieceKind::Bishop),
            'R' => Some(PieceKind::Rook),
            'Q' => Some(PieceKind::Queen),
            'K' => Some(PieceKind::King),
            _ => None,
        }
    }

    fn word(self) -> &'static str {
        match self {
            PieceKind::Pawn => "pawn",
            PieceKind::Knight => "knight",
            PieceKind::Bishop => "bishop",
            PieceKind::Rook => "rook",
            PieceKind::Queen => "queen",
            PieceKind::King => "king",
        }
    }
}

/// Side of a piece, also used as the side to move.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum PieceColor {
    #[default]
    White,
    Black,
}

impl PieceColor {
    /// Turn code used in the notation string (`w` / `b`)
    pub fn code(self) -> char {
        match self {
            PieceColor::White => 'w',
            PieceColor::Black => 'b',
        }
    }

}

impl fmt::Display for PieceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid side to move {0:?}, expected \"w\" or \"b\"")]
pub struct ParseColorError(pub String);

impl FromStr for PieceColor {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "w" | "white" => Ok(PieceColor::White),
            "b" | "black" => Ok(PieceColor::Black),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: PieceColor,
}

impl Piece {
    pub fn new(color: PieceColor, kind: PieceKind) -> Self {
        Self { kind, color }
    }

    /// Single-character notation code, uppercase for white
    pub fn code(self) -> char {
        match self.color {
            PieceColor::White => self.kind.letter(),
            PieceColor::Black => self.kind.letter().to_ascii_lowercase(),
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        let kind = PieceKind::from_letter(c)?;
        let color = if c.is_ascii_uppercase() {
            PieceColor::White
        } else {
            PieceColor::Black
        };
        Some(Self { kind, color })
    }
}

/// What the classifier decided a tile shows.
///
/// Twelve piece labels plus `Empty` are the recognized classes. A class name
/// that maps to none of them is kept as `Unrecognized`; the encoder's
/// [`LabelPolicy`](crate::domain::notation::LabelPolicy) decides what happens to it.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum PieceLabel {
    Occupied(Piece),
    #[default]
    Empty,
    Unrecognized(String),
}

impl PieceLabel {
    pub fn piece(color: PieceColor, kind: PieceKind) -> Self {
        PieceLabel::Occupied(Piece::new(color, kind))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PieceLabel::Empty)
    }

    /// Map a classifier class name to a label.
    ///
    /// Accepts the dataset folder names (`wP`, `bK`, `empty`), bare notation
    /// letters (`P`, `k`) and spelled-out names (`white-pawn`, `black_king`).
    pub fn from_class_name(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.eq_ignore_ascii_case("empty") {
            return PieceLabel::Empty;
        }

        let mut chars = trimmed.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(c), None, None) => {
                if let Some(piece) = Piece::from_code(c) {
                    return PieceLabel::Occupied(piece);
                }
            }
            (Some(side), Some(letter), None) => {
                let color = match side {
                    'w' => Some(PieceColor::White),
                    'b' => Some(PieceColor::Black),
                    _ => None,
                };
                if let (Some(color), Some(kind)) = (color, PieceKind::from_letter(letter)) {
                    return PieceLabel::piece(color, kind);
                }
            }
            _ => {}
        }

        let lower = trimmed.to_ascii_lowercase();
        let mut parts = lower.split(['-', '_', ' ']).filter(|p| !p.is_empty());
        if let (Some(side), Some(word), None) = (parts.next(), parts.next(), parts.next()) {
            let color = match side {
                "white" => Some(PieceColor::White),
                "black" => Some(PieceColor::Black),
                _ => None,
            };
            let kind = PieceKind::ALL.into_iter().find(|k| k.word() == word);
            if let (Some(color), Some(kind)) = (color, kind) {
                return PieceLabel::piece(color, kind);
            }
        }

        PieceLabel::Unrecognized(trimmed.to_string())
    }

    /// Class name in the dataset folder convention
    pub fn class_name(&self) -> String {
        match self {
            PieceLabel::Occupied(piece) => format!("{}{}", piece.color.code(), piece.kind.letter()),
            PieceLabel::Empty => "empty".to_string(),
            PieceLabel::Unrecognized(name) => name.clone(),
        }
    }
}

impl fmt::Display for PieceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name())
    }
}

/// Convert row/col (0-indexed, row 0 = rank 8) to shakmaty Square
pub fn to_square(row: usize, col: usize) -> Square {
    let file = File::new(col as u32);
    let rank = Rank::new(7 - row as u32); // row 0 = rank 8, row 7 = rank 1
    Square::from_coords(file, rank)
}

/// Convert shakmaty piece to our domain Piece
pub fn shakmaty_to_piece(piece: shakmaty::Piece) -> Piece {
    let kind = match piece.role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    };
    let color = match piece.color {
        SColor::White => PieceColor::White,
        SColor::Black => PieceColor::Black,
    };
    Piece { kind, color }
}

pub fn shakmaty_to_color(color: SColor) -> PieceColor {
    match color {
        SColor::White => PieceColor::White,
        SColor::Black => PieceColor::Black,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_codes() {
        assert_eq!(Piece::new(PieceColor::White, PieceKind::Knight).code(), 'N');
        assert_eq!(Piece::new(PieceColor::Black, PieceKind::Queen).code(), 'q');
        assert_eq!(
            Piece::from_code('k'),
            Some(Piece::new(PieceColor::Black, PieceKind::King))
        );
        assert_eq!(Piece::from_code('x'), None);
    }

    #[test]
    fn test_label_from_dataset_names() {
        assert_eq!(
            PieceLabel::from_class_name("wP"),
            PieceLabel::piece(PieceColor::White, PieceKind::Pawn)
        );
        assert_eq!(
            PieceLabel::from_class_name("bB"),
            PieceLabel::piece(PieceColor::Black, PieceKind::Bishop)
        );
        assert_eq!(PieceLabel::from_class_name("empty"), PieceLabel::Empty);
        assert_eq!(PieceLabel::from_class_name("Empty"), PieceLabel::Empty);
    }

    #[test]
    fn test_label_from_letters_and_words() {
        assert_eq!(
            PieceLabel::from_class_name("r"),
            PieceLabel::piece(PieceColor::Black, PieceKind::Rook)
        );
        assert_eq!(
            PieceLabel::from_class_name("white-queen"),
            PieceLabel::piece(PieceColor::White, PieceKind::Queen)
        );
        assert_eq!(
            PieceLabel::from_class_name("black_knight"),
            PieceLabel::piece(PieceColor::Black, PieceKind::Knight)
        );
    }

    #[test]
    fn test_unknown_label_is_kept() {
        assert_eq!(
            PieceLabel::from_class_name("shadow"),
            PieceLabel::Unrecognized("shadow".to_string())
        );
        assert_eq!(
            PieceLabel::from_class_name("xP"),
            PieceLabel::Unrecognized("xP".to_string())
        );
    }

    #[test]
    fn test_class_name_roundtrip() {
        for color in [PieceColor::White, PieceColor::Black] {
            for kind in PieceKind::ALL {
                let label = PieceLabel::piece(color, kind);
                assert_eq!(PieceLabel::from_class_name(&label.class_name()), label);
            }
        }
    }

    #[test]
    fn test_to_square() {
        assert_eq!(to_square(0, 0), Square::A8);
        assert_eq!(to_square(7, 7), Square::H1);
        assert_eq!(to_square(6, 4), Square::E2);
    }

    #[test]
    fn test_color_parse() {
        assert_eq!("w".parse::<PieceColor>(), Ok(PieceColor::White));
        assert_eq!("b".parse::<PieceColor>(), Ok(PieceColor::Black));
        assert!("x".parse::<PieceColor>().is_err());
    }
}

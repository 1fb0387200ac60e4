//! Local copy of the engine's position.
//!
//! UCI has no command for reading a position back, so the gateway replays
//! every position/move it sends to the engine on a shakmaty board and reads
//! the resulting notation from there.

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, CastlingSide, Chess, Color as SColor, EnPassantMode, Position, PositionError};
use thiserror::Error;

use crate::domain::board::BoardMatrix;
use crate::domain::chess::shakmaty_to_color;
use crate::domain::notation::{AuxiliaryState, CastlingRights, NotationEncoder};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MirrorError {
    #[error("no position has been set")]
    NoPosition,
    #[error("cannot parse notation {notation:?}: {reason}")]
    InvalidNotation { notation: String, reason: String },
    #[error("position is not playable: {0}")]
    IllegalPosition(String),
    #[error("malformed move {0:?}")]
    BadMove(String),
    #[error("illegal move {0:?}")]
    IllegalMove(String),
}

#[derive(Debug, Clone, Default)]
pub struct PositionMirror {
    position: Option<Chess>,
}

impl PositionMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the position. Castling rights or en-passant targets that do
    /// not fit the placement are dropped rather than rejected.
    pub fn set_notation(&mut self, notation: &str) -> Result<(), MirrorError> {
        self.position = None;
        let fen: Fen = notation.parse().map_err(|e: shakmaty::fen::ParseFenError| {
            MirrorError::InvalidNotation {
                notation: notation.to_string(),
                reason: e.to_string(),
            }
        })?;
        let position: Chess = fen
            .into_position(CastlingMode::Standard)
            .or_else(PositionError::ignore_invalid_castling_rights)
            .or_else(PositionError::ignore_invalid_ep_square)
            .map_err(|e| MirrorError::IllegalPosition(e.to_string()))?;
        self.position = Some(position);
        Ok(())
    }

    /// Play a move given in UCI long algebraic form (`e2e4`, `e7e8q`)
    pub fn apply_uci(&mut self, mv: &str) -> Result<(), MirrorError> {
        let position = self.position.as_ref().ok_or(MirrorError::NoPosition)?;
        let uci: UciMove = mv.parse().map_err(|_| MirrorError::BadMove(mv.to_string()))?;
        let m = uci
            .to_move(position)
            .map_err(|_| MirrorError::IllegalMove(mv.to_string()))?;
        let next = position
            .clone()
            .play(m)
            .map_err(|_| MirrorError::IllegalMove(mv.to_string()))?;
        self.position = Some(next);
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.position.is_some()
    }

    pub fn aux(&self) -> Option<AuxiliaryState> {
        let pos = self.position.as_ref()?;
        let castles = pos.castles();
        Some(AuxiliaryState {
            turn: shakmaty_to_color(pos.turn()),
            castling: CastlingRights {
                white_king: castles.has(SColor::White, CastlingSide::KingSide),
                white_queen: castles.has(SColor::White, CastlingSide::QueenSide),
                black_king: castles.has(SColor::Black, CastlingSide::KingSide),
                black_queen: castles.has(SColor::Black, CastlingSide::QueenSide),
            },
            en_passant: pos.ep_square(EnPassantMode::Legal),
            halfmove_clock: pos.halfmoves(),
            fullmove_number: pos.fullmoves().get(),
        })
    }

    /// Current notation string, if a position is set
    pub fn notation(&self) -> Option<String> {
        let pos = self.position.as_ref()?;
        let board = BoardMatrix::from_shakmaty(pos.board());
        NotationEncoder::default().encode(&board, &self.aux()?).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INI_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_roundtrip_initial() {
        let mut mirror = PositionMirror::new();
        mirror.set_notation(INI_FEN).unwrap();
        assert_eq!(mirror.notation().as_deref(), Some(INI_FEN));
    }

    #[test]
    fn test_apply_moves() {
        let mut mirror = PositionMirror::new();
        mirror.set_notation(INI_FEN).unwrap();
        mirror.apply_uci("e2e4").unwrap();
        assert_eq!(
            mirror.notation().as_deref(),
            Some("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")
        );
        mirror.apply_uci("g8f6").unwrap();
        mirror.apply_uci("e1e2").unwrap();
        let aux = mirror.aux().unwrap();
        assert_eq!(aux.castling.to_string(), "kq");
        assert_eq!(aux.halfmove_clock, 2);
        assert_eq!(aux.fullmove_number, 2);
    }

    #[test]
    fn test_rejects_bad_moves() {
        let mut mirror = PositionMirror::new();
        assert_eq!(mirror.apply_uci("e2e4"), Err(MirrorError::NoPosition));
        mirror.set_notation(INI_FEN).unwrap();
        assert_eq!(mirror.apply_uci("zz"), Err(MirrorError::BadMove("zz".to_string())));
        assert_eq!(
            mirror.apply_uci("e2e5"),
            Err(MirrorError::IllegalMove("e2e5".to_string()))
        );
        // unchanged after the failures
        assert_eq!(mirror.notation().as_deref(), Some(INI_FEN));
    }

    #[test]
    fn test_stale_castling_rights_are_dropped() {
        // rooks gone from h1/h8, carried-forward rights still claim them
        let mut mirror = PositionMirror::new();
        mirror
            .set_notation("rnbqkbn1/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBN1 w KQkq - 0 1")
            .unwrap();
        assert_eq!(mirror.aux().unwrap().castling.to_string(), "Qq");
    }

    #[test]
    fn test_kingless_board_is_not_playable() {
        let mut mirror = PositionMirror::new();
        let err = mirror.set_notation("8/8/8/8/8/8/8/8 w - - 0 1").unwrap_err();
        assert!(matches!(err, MirrorError::IllegalPosition(_)));
        assert!(!mirror.is_set());
    }
}

//! Game state tracking across successive board recognitions.
//!
//! The tracker owns the authoritative notation and the one engine handle.
//! Placement comes fresh from each recognition; everything else is carried
//! forward from the previous notation unless the caller overrides it.

use std::time::Instant;

use serde::Serialize;
use shakmaty::Square;
use tracing::{debug, error, info, warn};

use crate::domain::board::BoardMatrix;
use crate::domain::chess::PieceColor;
use crate::domain::notation::{
    AuxiliaryState, CastlingRights, LabelPolicy, Notation, NotationEncoder, NotationParseError,
};
use crate::domain::uci::Score;
use crate::error::{Error, Result};
use crate::models::engine::{EngineFactory, SearchEngine};

/// Out-of-band corrections to the carried auxiliary state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateOverrides {
    pub castling: Option<CastlingRights>,
    /// `Some(None)` clears the en-passant target
    pub en_passant: Option<Option<Square>>,
    pub halfmove_clock: Option<u32>,
    pub fullmove_number: Option<u32>,
}

impl StateOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// A fullmove number of `0` is rejected.
    fn apply(&self, aux: &mut AuxiliaryState) -> Result<(), NotationParseError> {
        if let Some(castling) = self.castling {
            aux.castling = castling;
        }
        if let Some(en_passant) = self.en_passant {
            aux.en_passant = en_passant;
        }
        if let Some(halfmove) = self.halfmove_clock {
            aux.halfmove_clock = halfmove;
        }
        if let Some(fullmove) = self.fullmove_number {
            if fullmove == 0 {
                return Err(NotationParseError::Fullmove(fullmove.to_string()));
            }
            aux.fullmove_number = fullmove;
        }
        Ok(())
    }
}

/// Result of one recognition-to-move cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineReply {
    pub placement: String,
    /// Notation the engine searched
    pub position: String,
    pub best_move: Option<String>,
    /// Notation after the best move was played
    pub notation: String,
    pub score: Option<Score>,
    pub depth: Option<u32>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
struct TrackedState {
    notation: String,
    aux: AuxiliaryState,
}

pub struct GameStateTracker<F: EngineFactory> {
    factory: F,
    engine: Option<F::Engine>,
    encoder: NotationEncoder,
    /// `None` until the first recognition arrives
    state: Option<TrackedState>,
}

impl<F: EngineFactory> GameStateTracker<F> {
    /// Starts an engine right away. A failed start is logged and retried on
    /// first use.
    pub fn new(mut factory: F, policy: LabelPolicy) -> Self {
        let engine = match factory.launch() {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!(error = %e, "engine not started");
                None
            }
        };
        Self {
            factory,
            engine,
            encoder: NotationEncoder::new(policy),
            state: None,
        }
    }

    pub fn notation(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.notation.as_str())
    }

    pub fn aux(&self) -> Option<&AuxiliaryState> {
        self.state.as_ref().map(|s| &s.aux)
    }

    pub fn is_tracking(&self) -> bool {
        self.state.is_some()
    }

    /// Encode a freshly recognized board and make it the current position.
    ///
    /// The first call seeds default auxiliary state; later calls keep the
    /// previous castling rights, en-passant target and clocks. On error the
    /// tracked state is unchanged.
    pub fn update(&mut self, board: &BoardMatrix, turn: PieceColor, overrides: &StateOverrides) -> Result<String> {
        let mut aux = match &self.state {
            None => AuxiliaryState::initial(turn),
            Some(state) => AuxiliaryState { turn, ..state.aux },
        };
        overrides.apply(&mut aux)?;

        let notation = self.encoder.encode(board, &aux)?;
        debug!(notation = %notation, first = self.state.is_none(), "tracker updated");
        self.state = Some(TrackedState {
            notation: notation.clone(),
            aux,
        });
        self.seed_engine(&notation);
        Ok(notation)
    }

    fn seed_engine(&mut self, notation: &str) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if let Err(e) = engine.set_position(notation) {
            warn!(error = %e, "engine rejected position; dropping handle");
            self.engine = None;
        }
    }

    /// Probe the engine and replace it once if it does not answer. A fresh
    /// engine is given the current notation before it is used.
    pub fn ensure_engine_alive(&mut self) -> Result<()> {
        if let Some(engine) = self.engine.as_mut() {
            if engine.is_responsive() {
                return Ok(());
            }
            warn!("engine unresponsive; restarting");
            self.engine = None;
        } else {
            info!("no engine running; starting one");
        }

        let mut engine = self.factory.launch().map_err(|e| {
            error!(error = %e, "engine restart failed");
            Error::EngineUnavailable(e)
        })?;
        if let Some(state) = &self.state {
            engine
                .set_position(&state.notation)
                .map_err(|e| Error::EngineDesync(format!("restarted engine rejected position: {e}")))?;
        }
        info!("engine restarted");
        self.engine = Some(engine);
        Ok(())
    }

    /// Best move for the current notation
    pub fn best_move(&mut self) -> Result<Option<String>> {
        if self.state.is_none() {
            return Err(Error::EngineDesync("no position is being tracked".to_string()));
        }
        self.ensure_engine_alive()?;
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| Error::EngineDesync("engine handle missing".to_string()))?;
        match engine.best_move() {
            Ok(mv) => {
                debug!(best_move = ?mv, "engine answered");
                Ok(mv)
            }
            Err(e) => {
                // Next call restarts it.
                warn!(error = %e, "best move failed; dropping engine");
                self.engine = None;
                Err(Error::EngineDesync(e.to_string()))
            }
        }
    }

    /// Play `best_move` in the engine and adopt the engine's resulting
    /// notation. Without a move, or if the engine cannot apply it, the
    /// previous notation stays current.
    pub fn advance(&mut self, best_move: Option<&str>) -> Result<String> {
        let Some(mv) = best_move else {
            return Err(Error::EngineDesync("engine returned no move".to_string()));
        };
        let previous = self
            .state
            .as_ref()
            .map(|s| s.notation.clone())
            .ok_or_else(|| Error::EngineDesync("no position is being tracked".to_string()))?;
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| Error::EngineDesync("no engine to apply the move".to_string()))?;

        let applied = engine
            .apply_move(mv)
            .map_err(|e| e.to_string())
            .and_then(|()| {
                engine
                    .current_notation()
                    .ok_or_else(|| "engine holds no position".to_string())
            })
            .and_then(|notation| {
                notation
                    .parse::<Notation>()
                    .map(|parsed| (notation, parsed.aux))
                    .map_err(|e| e.to_string())
            });

        match applied {
            Ok((notation, aux)) => {
                debug!(mv, notation = %notation, "advanced");
                self.state = Some(TrackedState {
                    notation: notation.clone(),
                    aux,
                });
                Ok(notation)
            }
            Err(reason) => {
                let reseeded = engine.set_position(&previous);
                if let Err(e) = reseeded {
                    warn!(error = %e, "could not restore engine position");
                    self.engine = None;
                }
                Err(Error::EngineDesync(format!("cannot apply {mv}: {reason}")))
            }
        }
    }

    /// One full cycle: track `board`, ask for a move and play it
    pub fn next_move(
        &mut self,
        board: &BoardMatrix,
        turn: PieceColor,
        overrides: &StateOverrides,
    ) -> Result<EngineReply> {
        let started = Instant::now();
        let position = self.update(board, turn, overrides)?;
        let best_move = self.best_move()?;
        let info = self
            .engine
            .as_ref()
            .and_then(|engine| engine.last_info())
            .cloned()
            .unwrap_or_default();
        let notation = self.advance(best_move.as_deref())?;

        let placement = position.split(' ').next().unwrap_or_default().to_string();
        Ok(EngineReply {
            placement,
            position,
            best_move,
            notation,
            score: info.score,
            depth: info.depth,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

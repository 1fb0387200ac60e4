//! UCI (Universal Chess Interface) protocol types and utilities.
//!
//! This module handles the text side of talking to a search engine.
//! Process spawning and I/O live in the models layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// UCI commands sent to an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    /// Initialize UCI mode
    Uci,
    /// Check if engine is ready
    IsReady,
    /// Set a new game
    UciNewGame,
    /// Set an engine option
    SetOption { name: String, value: String },
    /// Set position (startpos or notation string, with optional moves)
    Position { fen: Option<String>, moves: Vec<String> },
    /// Search with the given limit
    Go(SearchLimit),
    /// Stop searching
    Stop,
    /// Quit the engine
    Quit,
}

impl UciCommand {
    /// Convert command to UCI protocol string
    pub fn to_uci_string(&self) -> String {
        match self {
            UciCommand::Uci => "uci".to_string(),
            UciCommand::IsReady => "isready".to_string(),
            UciCommand::UciNewGame => "ucinewgame".to_string(),
            UciCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            UciCommand::Position { fen, moves } => {
                let mut cmd = String::from("position ");
                match fen {
                    Some(f) => {
                        cmd.push_str("fen ");
                        cmd.push_str(f);
                    }
                    None => cmd.push_str("startpos"),
                }
                if !moves.is_empty() {
                    cmd.push_str(" moves ");
                    cmd.push_str(&moves.join(" "));
                }
                cmd
            }
            UciCommand::Go(SearchLimit::Depth(d)) => format!("go depth {}", d),
            UciCommand::Go(SearchLimit::MoveTime(ms)) => format!("go movetime {}", ms),
            UciCommand::Stop => "stop".to_string(),
            UciCommand::Quit => "quit".to_string(),
        }
    }
}

/// How long a best-move search may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchLimit {
    /// Fixed depth in plies
    Depth(u32),
    /// Fixed wall time in milliseconds
    #[serde(rename = "movetime_ms")]
    MoveTime(u64),
}

impl Default for SearchLimit {
    fn default() -> Self {
        SearchLimit::Depth(15)
    }
}

/// Categorized engine output line
#[derive(Debug, Clone, PartialEq)]
pub enum UciOutputKind {
    /// "uciok" - engine is ready for UCI
    UciOk,
    /// "readyok" - engine is ready
    ReadyOk,
    /// "info ..." - analysis information
    Info(String),
    /// "bestmove ..." - `None` when the engine has no legal move
    BestMove(Option<String>),
    /// Engine identification
    Id(String),
    /// Unknown/other output, including option definitions
    Other(String),
}

impl UciOutputKind {
    /// Parse a raw UCI output line into a categorized type
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if line == "uciok" {
            UciOutputKind::UciOk
        } else if line == "readyok" {
            UciOutputKind::ReadyOk
        } else if let Some(rest) = line.strip_prefix("info ") {
            UciOutputKind::Info(rest.to_string())
        } else if line == "bestmove" {
            UciOutputKind::BestMove(None)
        } else if let Some(rest) = line.strip_prefix("bestmove ") {
            // "bestmove e2e4 ponder e7e5", "bestmove (none)", "bestmove 0000"
            let mv = rest
                .split_whitespace()
                .next()
                .filter(|m| !matches!(*m, "(none)" | "0000" | "none"))
                .map(str::to_string);
            UciOutputKind::BestMove(mv)
        } else if let Some(rest) = line.strip_prefix("id ") {
            UciOutputKind::Id(rest.to_string())
        } else {
            UciOutputKind::Other(line.to_string())
        }
    }
}

/// Engine evaluation score, from the side to move's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Centipawn score
    Centipawns(i32),
    /// Mate in N moves (negative = being mated)
    Mate(i32),
}

impl Score {
    /// Format score for display (e.g., "+0.35" or "M3" or "-M2")
    pub fn display(&self) -> String {
        match self {
            Score::Centipawns(cp) => {
                let pawns = *cp as f64 / 100.0;
                if pawns >= 0.0 {
                    format!("+{:.2}", pawns)
                } else {
                    format!("{:.2}", pawns)
                }
            }
            Score::Mate(moves) => {
                if *moves > 0 {
                    format!("M{}", moves)
                } else {
                    format!("-M{}", moves.abs())
                }
            }
        }
    }
}

/// The parts of a UCI info line we report alongside a best move
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UciInfo {
    /// Search depth
    pub depth: Option<u32>,
    /// Evaluation score
    pub score: Option<Score>,
    /// Nodes searched
    pub nodes: Option<u64>,
    /// Time spent in milliseconds
    pub time: Option<u64>,
    /// Principal variation as UCI moves
    pub pv: Vec<String>,
}

impl UciInfo {
    /// Parse a UCI info string (the part after "info ")
    pub fn parse(info_str: &str) -> Self {
        let mut info = UciInfo::default();
        let tokens: Vec<&str> = info_str.split_whitespace().collect();
        let mut i = 0;

        while i < tokens.len() {
            let next = tokens.get(i + 1).copied();
            match tokens[i] {
                "depth" => {
                    info.depth = next.and_then(|t| t.parse().ok());
                    i += 2;
                }
                "nodes" => {
                    info.nodes = next.and_then(|t| t.parse().ok());
                    i += 2;
                }
                "time" => {
                    info.time = next.and_then(|t| t.parse().ok());
                    i += 2;
                }
                "score" => {
                    // score cp <x> or score mate <x>
                    let value = tokens.get(i + 2).and_then(|t| t.parse::<i32>().ok());
                    info.score = match (next, value) {
                        (Some("cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                        (Some("mate"), Some(m)) => Some(Score::Mate(m)),
                        _ => info.score,
                    };
                    i += 3;
                }
                "pv" => {
                    // PV runs to the end of the line
                    info.pv = tokens[i + 1..].iter().map(|t| t.to_string()).collect();
                    break;
                }
                "string" => break,
                _ => i += 1,
            }
        }

        info
    }

    /// Whether this line carries a scored search result
    pub fn has_analysis(&self) -> bool {
        self.depth.is_some() && self.score.is_some()
    }
}

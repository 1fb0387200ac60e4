use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use shakmaty::Square;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fenlens::config::Config;
use fenlens::domain::chess::PieceColor;
use fenlens::domain::notation::CastlingRights;
use fenlens::models::{GameStateTracker, StateOverrides, UciEngineFactory};
use fenlens::vision::tiles::{load_board, save_tiles};
use fenlens::vision::{BoardAssembler, TemplateClassifier, TileExtractor};

#[derive(Parser)]
#[command(name = "fenlens")]
#[command(about = "Read a chessboard screenshot and ask a UCI engine for the next move", long_about = None)]
struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recognize one board and print the engine's reply as JSON
    Analyze {
        image: PathBuf,
        #[command(flatten)]
        state: StateArgs,
    },
    /// Track one game across screenshots taken in order, one reply per image
    Play {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[command(flatten)]
        state: StateArgs,
    },
    /// Write the 64 square crops of a board image as <stem>_<row><col>.png
    Tiles { image: PathBuf, dir: PathBuf },
    /// Print the JSON schema of the config file
    Schema,
}

#[derive(Args)]
struct StateArgs {
    /// Side to move in every screenshot (w or b)
    #[arg(short, long, default_value = "w")]
    turn: PieceColor,

    /// Castling rights, e.g. KQkq or -
    #[arg(long)]
    castling: Option<CastlingRights>,

    /// En-passant target square, or -
    #[arg(long)]
    en_passant: Option<String>,

    #[arg(long)]
    halfmove: Option<u32>,

    #[arg(long)]
    fullmove: Option<u32>,

    /// Log the recognized board with per-square confidence
    #[arg(long)]
    describe: bool,
}

impl StateArgs {
    fn overrides(&self) -> Result<StateOverrides> {
        let en_passant = match self.en_passant.as_deref() {
            None => None,
            Some("-") => Some(None),
            Some(s) => Some(Some(
                s.parse::<Square>()
                    .with_context(|| format!("invalid en-passant square {s:?}"))?,
            )),
        };
        Ok(StateOverrides {
            castling: self.castling,
            en_passant,
            halfmove_clock: self.halfmove,
            fullmove_number: self.fullmove,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_env(),
    };

    match cli.command {
        Command::Analyze { image, state } => analyze(&config, &image, &state),
        Command::Play { images, state } => play(&config, &images, &state),
        Command::Tiles { image, dir } => tiles(&config, &image, &dir),
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&Config::schema())?);
            Ok(())
        }
    }
}

fn assembler(config: &Config) -> Result<BoardAssembler<TemplateClassifier>> {
    let Some(dir) = &config.vision.templates else {
        bail!("no classifier configured; set vision.templates in the config file");
    };
    let classifier = TemplateClassifier::load(dir, config.vision.tile_size, config.vision.filter.into())
        .with_context(|| format!("loading reference tiles from {}", dir.display()))?
        .with_temperature(config.vision.temperature);
    Ok(BoardAssembler::new(TileExtractor::new(&config.vision), classifier))
}

fn analyze(config: &Config, image: &Path, state: &StateArgs) -> Result<()> {
    let assembler = assembler(config)?;
    let overrides = state.overrides()?;
    let mut tracker = GameStateTracker::new(
        UciEngineFactory::new(config.engine.clone()),
        config.notation.label_policy,
    );

    let board = load_board(image, &config.vision).with_context(|| format!("reading {}", image.display()))?;
    let recognition = assembler.recognize(&board)?;
    if state.describe {
        info!("recognized board:\n{}", recognition.describe());
    }
    let reply = tracker.next_move(&recognition.board, state.turn, &overrides)?;
    if let Some(score) = reply.score {
        info!(best_move = ?reply.best_move, score = %score.display(), "engine reply");
    }
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

fn play(config: &Config, images: &[PathBuf], state: &StateArgs) -> Result<()> {
    let assembler = assembler(config)?;
    let mut overrides = state.overrides()?;
    let mut tracker = GameStateTracker::new(
        UciEngineFactory::new(config.engine.clone()),
        config.notation.label_policy,
    );

    for image in images {
        let result = load_board(image, &config.vision)
            .map_err(fenlens::Error::from)
            .and_then(|board| assembler.recognize(&board))
            .and_then(|recognition| {
                if state.describe {
                    info!("recognized board:\n{}", recognition.describe());
                }
                tracker.next_move(&recognition.board, state.turn, &overrides)
            });

        let line = match result {
            Ok(reply) => {
                // overrides describe the starting position only
                overrides = StateOverrides::default();
                json!({ "image": image, "reply": reply })
            }
            Err(e) => {
                warn!(image = %image.display(), error = %e, "skipping screenshot");
                json!({ "image": image, "error": e.report() })
            }
        };
        println!("{}", line);
    }
    Ok(())
}

fn tiles(config: &Config, image: &Path, dir: &Path) -> Result<()> {
    let board = load_board(image, &config.vision).with_context(|| format!("reading {}", image.display()))?;
    let stem = image.file_stem().and_then(|s| s.to_str()).unwrap_or("board");
    let written = save_tiles(&board, dir, stem)?;
    info!(count = written.len(), dir = %dir.display(), "tiles written");
    Ok(())
}

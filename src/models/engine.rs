//! Search engine gateway - the trait the tracker talks to, and a UCI process
//! implementation of it.
//!
//! Architecture:
//! - Engine I/O runs on OS threads (reader/writer)
//! - The reader pushes every output line into a channel
//! - Calls block on that channel with a deadline; a missed deadline counts
//!   as the engine being unresponsive

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::domain::uci::{SearchLimit, UciCommand, UciInfo, UciOutputKind};
use crate::models::mirror::{MirrorError, PositionMirror};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine pipe unavailable: {0}")]
    Pipe(String),
    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("engine process exited")]
    Exited,
    #[error("no position has been sent to the engine")]
    NoPosition,
    #[error(transparent)]
    Position(#[from] MirrorError),
}

/// A long-lived search process holding its own current position
pub trait SearchEngine {
    /// Make `notation` the current position, discarding any played moves
    fn set_position(&mut self, notation: &str) -> Result<(), EngineError>;

    /// Best move for the current position, `None` if there is none
    fn best_move(&mut self) -> Result<Option<String>, EngineError>;

    /// Play `mv` (UCI long algebraic) on the current position
    fn apply_move(&mut self, mv: &str) -> Result<(), EngineError>;

    /// Notation string of the current position
    fn current_notation(&self) -> Option<String>;

    /// Cheap liveness probe
    fn is_responsive(&mut self) -> bool;

    /// Analysis attached to the last best move, if the engine reported any
    fn last_info(&self) -> Option<&UciInfo> {
        None
    }
}

/// Creates fresh engine handles; used for the first start and for restarts
pub trait EngineFactory {
    type Engine: SearchEngine;

    fn launch(&mut self) -> Result<Self::Engine, EngineError>;
}

/// Messages sent from the engine reader thread
#[derive(Debug)]
enum EngineEvent {
    /// A line of output from the engine
    Output(String),
    /// Engine process exited
    Exited,
    /// Error occurred while reading
    Error(String),
}

/// A UCI engine running as a child process
pub struct UciEngine {
    /// Handle to the engine process
    process: Child,
    /// Channel sender for commands to engine writer thread
    command_sender: Sender<String>,
    /// Channel receiver for engine output
    event_receiver: Receiver<EngineEvent>,
    search: SearchLimit,
    timeout: Duration,
    /// Position the engine was last given, plus moves played since
    base_position: Option<String>,
    moves: Vec<String>,
    mirror: PositionMirror,
    last_info: Option<UciInfo>,
    exited: bool,
}

impl UciEngine {
    /// Spawn the engine, run the UCI handshake and apply configured options
    pub fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        let path = config.path.display().to_string();
        let mut child = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: path.clone(),
                source,
            })?;

        // Take ownership of stdin/stdout
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Pipe("stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Pipe("stdout".to_string()))?;

        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<String>();

        // Reader thread (OS thread for blocking I/O)
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(text) => {
                        if event_tx.send(EngineEvent::Output(text)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = event_tx.send(EngineEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            let _ = event_tx.send(EngineEvent::Exited);
        });

        // Writer thread (OS thread for blocking I/O)
        thread::spawn(move || {
            let mut writer = stdin;
            while let Ok(cmd) = cmd_rx.recv() {
                if writeln!(writer, "{}", cmd).is_err() {
                    break;
                }
                if writer.flush().is_err() {
                    break;
                }
            }
        });

        let mut engine = Self {
            process: child,
            command_sender: cmd_tx,
            event_receiver: event_rx,
            search: config.search,
            timeout: config.timeout(),
            base_position: None,
            moves: Vec::new(),
            mirror: PositionMirror::new(),
            last_info: None,
            exited: false,
        };

        engine.send_command(UciCommand::Uci);
        engine.wait_for(engine.timeout, |kind| matches!(kind, UciOutputKind::UciOk).then_some(()))?;
        for (name, value) in &config.options {
            engine.send_command(UciCommand::SetOption {
                name: name.clone(),
                value: value.clone(),
            });
        }
        engine.send_command(UciCommand::UciNewGame);
        engine.send_command(UciCommand::IsReady);
        engine.wait_for(engine.timeout, |kind| matches!(kind, UciOutputKind::ReadyOk).then_some(()))?;

        info!(path = %path, "engine started");
        Ok(engine)
    }

    /// Send a UCI command to the engine
    fn send_command(&self, cmd: UciCommand) {
        let cmd_str = cmd.to_uci_string();
        debug!(command = %cmd_str, "to engine");
        let _ = self.command_sender.send(cmd_str);
    }

    /// Throw away output left over from earlier commands
    fn drain(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            if matches!(event, EngineEvent::Exited) {
                self.exited = true;
            }
        }
    }

    /// Read engine output until `accept` returns a value or `limit` elapses
    fn wait_for<T>(
        &mut self,
        limit: Duration,
        mut accept: impl FnMut(&UciOutputKind) -> Option<T>,
    ) -> Result<T, EngineError> {
        if self.exited {
            return Err(EngineError::Exited);
        }
        let deadline = deadline_after(limit);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.event_receiver.recv_timeout(remaining) {
                Ok(EngineEvent::Output(line)) => {
                    let kind = UciOutputKind::parse(&line);
                    if let UciOutputKind::Info(info_str) = &kind {
                        let info = UciInfo::parse(info_str);
                        if info.has_analysis() {
                            self.last_info = Some(info);
                        }
                    }
                    if let Some(value) = accept(&kind) {
                        return Ok(value);
                    }
                }
                Ok(EngineEvent::Error(e)) => {
                    warn!(error = %e, "engine read failed");
                    self.exited = true;
                    return Err(EngineError::Exited);
                }
                Ok(EngineEvent::Exited) | Err(RecvTimeoutError::Disconnected) => {
                    self.exited = true;
                    return Err(EngineError::Exited);
                }
                Err(RecvTimeoutError::Timeout) => return Err(EngineError::Timeout(limit)),
            }
        }
    }

}

/// Longest single wait on engine output
const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

fn deadline_after(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit.min(MAX_WAIT)).unwrap_or(now)
}

/// Time allowed for a search: the read timeout plus any fixed move time
fn search_budget(timeout: Duration, search: SearchLimit) -> Duration {
    match search {
        SearchLimit::Depth(_) => timeout,
        SearchLimit::MoveTime(ms) => timeout.saturating_add(Duration::from_millis(ms)),
    }
}

impl SearchEngine for UciEngine {
    fn set_position(&mut self, notation: &str) -> Result<(), EngineError> {
        // The engine itself accepts anything; only the local copy can refuse.
        let mirrored = self.mirror.set_notation(notation);
        if let Err(e) = &mirrored {
            warn!(error = %e, "position not mirrored; moves cannot be applied");
        }
        self.base_position = Some(notation.to_string());
        self.moves.clear();
        Ok(())
    }

    fn best_move(&mut self) -> Result<Option<String>, EngineError> {
        let fen = self.base_position.clone().ok_or(EngineError::NoPosition)?;
        self.drain();
        self.last_info = None;
        self.send_command(UciCommand::Position {
            fen: Some(fen),
            moves: self.moves.clone(),
        });
        self.send_command(UciCommand::Go(self.search));

        let budget = search_budget(self.timeout, self.search);
        let result = self.wait_for(budget, |kind| match kind {
            UciOutputKind::BestMove(mv) => Some(mv.clone()),
            _ => None,
        });
        if matches!(result, Err(EngineError::Timeout(_))) {
            self.send_command(UciCommand::Stop);
        }
        result
    }

    fn apply_move(&mut self, mv: &str) -> Result<(), EngineError> {
        if self.base_position.is_none() {
            return Err(EngineError::NoPosition);
        }
        self.mirror.apply_uci(mv)?;
        self.moves.push(mv.to_string());
        Ok(())
    }

    fn current_notation(&self) -> Option<String> {
        self.mirror.notation()
    }

    fn is_responsive(&mut self) -> bool {
        if !matches!(self.process.try_wait(), Ok(None)) {
            return false;
        }
        self.drain();
        self.send_command(UciCommand::IsReady);
        let timeout = self.timeout;
        match self.wait_for(timeout, |kind| matches!(kind, UciOutputKind::ReadyOk).then_some(())) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "engine liveness probe failed");
                false
            }
        }
    }

    fn last_info(&self) -> Option<&UciInfo> {
        self.last_info.as_ref()
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        self.send_command(UciCommand::Quit);
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Starts [`UciEngine`]s from an [`EngineConfig`]
#[derive(Debug, Clone)]
pub struct UciEngineFactory {
    config: EngineConfig,
}

impl UciEngineFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for UciEngineFactory {
    type Engine = UciEngine;

    fn launch(&mut self) -> Result<UciEngine, EngineError> {
        UciEngine::start(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::BoardMatrix;
    use crate::domain::chess::PieceColor;
    use crate::domain::notation::LabelPolicy;
    use crate::domain::uci::Score;
    use crate::models::tracker::{GameStateTracker, StateOverrides};
    use std::fs;
    use std::path::PathBuf;

    const INI_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// A shell UCI engine that logs starts and positions to `log`. After
    /// `ready_limit` `isready` commands it stops answering them.
    fn script_engine(name: &str, ready_limit: Option<u32>, timeout_ms: u64) -> (EngineConfig, PathBuf) {
        let dir = std::env::temp_dir().join(format!("fenlens-uci-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        let log = dir.join("log");
        let _ = fs::remove_file(&log);
        let script = dir.join("engine.sh");
        let limit = ready_limit.map(|n| n.to_string()).unwrap_or_default();
        fs::write(
            &script,
            format!(
                r#"echo started >> "{log}"
ready=0
limit="{limit}"
while read -r line; do
  case "$line" in
    uci) echo "id name scripted"; echo "uciok" ;;
    isready)
      ready=$((ready + 1))
      if [ -z "$limit" ] || [ "$ready" -le "$limit" ]; then echo "readyok"; fi ;;
    position*) echo "$line" >> "{log}" ;;
    go*) echo "info depth 3 score cp 12 nodes 100 pv e2e4 e7e5"; echo "bestmove e2e4 ponder e7e5" ;;
    quit) exit 0 ;;
  esac
done
"#,
                log = log.display(),
            ),
        )
        .unwrap();
        let config = EngineConfig {
            path: PathBuf::from("/bin/sh"),
            args: vec![script.display().to_string()],
            timeout_ms,
            ..EngineConfig::default()
        };
        (config, log)
    }

    fn log_lines(log: &std::path::Path) -> Vec<String> {
        fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_search_budget_saturates() {
        let timeout = Duration::from_millis(u64::MAX);
        assert_eq!(search_budget(timeout, SearchLimit::Depth(10)), timeout);
        assert_eq!(
            search_budget(timeout, SearchLimit::MoveTime(u64::MAX)),
            Duration::from_millis(u64::MAX).saturating_add(Duration::from_millis(u64::MAX))
        );
        assert_eq!(
            search_budget(Duration::from_secs(1), SearchLimit::MoveTime(500)),
            Duration::from_millis(1_500)
        );
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline <= Instant::now() + MAX_WAIT);
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let config = EngineConfig {
            path: PathBuf::from("/nonexistent/fenlens-test-engine"),
            ..EngineConfig::default()
        };
        let err = UciEngineFactory::new(config).launch().err().unwrap();
        assert!(matches!(err, EngineError::Spawn { .. }));
        assert!(err.to_string().contains("fenlens-test-engine"));
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_process_times_out() {
        // `cat` never says uciok; it just echoes "uci" back
        let config = EngineConfig {
            path: PathBuf::from("cat"),
            timeout_ms: 200,
            ..EngineConfig::default()
        };
        let err = UciEngine::start(&config).err().unwrap();
        assert!(matches!(err, EngineError::Timeout(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_exiting_process_is_detected() {
        let config = EngineConfig {
            path: PathBuf::from("true"),
            timeout_ms: 2_000,
            ..EngineConfig::default()
        };
        let err = UciEngine::start(&config).err().unwrap();
        assert!(matches!(err, EngineError::Exited));
    }

    #[cfg(unix)]
    #[test]
    fn test_scripted_engine_best_move() {
        let (config, log) = script_engine("best-move", None, 2_000);
        let mut engine = UciEngine::start(&config).unwrap();
        assert!(matches!(engine.best_move(), Err(EngineError::NoPosition)));

        engine.set_position(INI_FEN).unwrap();
        assert_eq!(engine.best_move().unwrap().as_deref(), Some("e2e4"));
        let info = engine.last_info().unwrap();
        assert_eq!(info.depth, Some(3));
        assert_eq!(info.score, Some(Score::Centipawns(12)));
        assert_eq!(info.pv, vec!["e2e4".to_string(), "e7e5".to_string()]);
        assert!(engine.is_responsive());

        engine.apply_move("e2e4").unwrap();
        assert_eq!(
            engine.current_notation().as_deref(),
            Some("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")
        );
        engine.best_move().unwrap();
        assert_eq!(
            log_lines(&log).last().map(String::as_str),
            Some(format!("position fen {INI_FEN} moves e2e4").as_str())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_engine_is_not_responsive() {
        // the handshake uses the only answered isready
        let (config, _) = script_engine("hung", Some(1), 300);
        let mut engine = UciEngine::start(&config).unwrap();
        assert!(!engine.is_responsive());
    }

    #[cfg(unix)]
    #[test]
    fn test_tracker_replaces_hung_engine() {
        let (config, log) = script_engine("restart", Some(1), 300);
        let mut tracker = GameStateTracker::new(UciEngineFactory::new(config), LabelPolicy::Strict);
        let board = BoardMatrix::from_placement("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR").unwrap();
        tracker
            .update(&board, PieceColor::White, &StateOverrides::default())
            .unwrap();

        assert_eq!(tracker.best_move().unwrap().as_deref(), Some("e2e4"));
        let lines = log_lines(&log);
        assert_eq!(lines.iter().filter(|l| *l == "started").count(), 2);
        // the replacement searched the tracked position
        let restarted = lines.iter().rposition(|l| l == "started").unwrap();
        assert_eq!(lines[restarted + 1], format!("position fen {INI_FEN}"));
    }
}

//! Runtime configuration, read from a JSON file.
//!
//! Every section falls back to its defaults, so `{}` is a valid config.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::imageops::FilterType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::notation::LabelPolicy;
use crate::domain::uci::SearchLimit;
use crate::vision::classifier::DEFAULT_TEMPERATURE;
use crate::error::{Error, Result};

/// Environment variable overriding `engine.path`
pub const ENGINE_PATH_ENV: &str = "FENLENS_ENGINE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub vision: VisionConfig,
    pub notation: NotationConfig,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a config file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_json(&text)?;
        config.apply_env();
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Some(path) = std::env::var_os(ENGINE_PATH_ENV) {
            self.engine.path = PathBuf::from(path);
        }
    }

    /// JSON schema of the config file
    pub fn schema() -> schemars::Schema {
        schemars::schema_for!(Config)
    }
}

/// Pixel rectangle of the board inside a larger screenshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BoardRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VisionConfig {
    /// Exact board side in pixels; `None` accepts any square multiple of 8
    pub board_size: Option<u32>,
    /// Classifier input side in pixels
    pub tile_size: u32,
    pub filter: ResizeFilter,
    /// Crop applied before extraction
    pub region: Option<BoardRegion>,
    /// Reference tiles for the template classifier, one folder per class
    pub templates: Option<PathBuf>,
    /// Softmax temperature of the template classifier
    pub temperature: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            board_size: None,
            tile_size: 64,
            filter: ResizeFilter::default(),
            region: None,
            templates: None,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NotationConfig {
    pub label_policy: LabelPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    pub path: PathBuf,
    /// Command-line arguments for the engine binary
    pub args: Vec<String>,
    /// Sent as `setoption name <key> value <value>` after the handshake
    pub options: BTreeMap<String, String>,
    pub search: SearchLimit,
    /// Upper bound on every blocking read from the engine
    pub timeout_ms: u64,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            options: BTreeMap::new(),
            search: SearchLimit::default(),
            timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_json(
            r#"{
                "vision": { "board_size": 720, "region": { "left": 10, "top": 20, "right": 730, "bottom": 740 } },
                "notation": { "label_policy": "lenient" },
                "engine": { "search": { "movetime_ms": 200 }, "options": { "Hash": "64" } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.vision.board_size, Some(720));
        assert_eq!(config.vision.tile_size, 64);
        assert_eq!(config.vision.region.map(|r| r.right), Some(730));
        assert_eq!(config.notation.label_policy, LabelPolicy::Lenient);
        assert_eq!(config.engine.search, SearchLimit::MoveTime(200));
        assert_eq!(config.engine.options.get("Hash").map(String::as_str), Some("64"));
        assert_eq!(config.engine.timeout(), Duration::from_secs(10));
        assert!(config.engine.args.is_empty());
        assert_eq!(config.vision.temperature, DEFAULT_TEMPERATURE);
    }

    #[test]
    fn test_bad_config_is_config_error() {
        let err = Config::from_json(r#"{ "notation": { "label_policy": "sloppy" } }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_schema_mentions_sections() {
        let schema = serde_json::to_string(&Config::schema()).unwrap();
        assert!(schema.contains("vision"));
        assert!(schema.contains("label_policy"));
    }
}

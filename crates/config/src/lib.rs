//! Configuration loading, validation, and management for Ponder.
//!
//! Loads configuration from `~/.ponder/config.toml` with environment
//! variable overrides. Validates all settings before use.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ponder/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PonderConfig {
    /// Turn loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// LLM call settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Tool execution settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Size limits applied when parsing model decisions
    #[serde(default)]
    pub parser: ParserConfig,

    /// Repeated-failure detection
    #[serde(default)]
    pub loop_detection: LoopDetectionConfig,

    /// Supplementary reasoning before each decision
    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Turn budget for one run
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// How many recent turns are replayed into the prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Ask the backend for native function calls instead of the JSON protocol
    #[serde(default)]
    pub function_calling: bool,
}

fn default_max_turns() -> usize {
    10
}
fn default_history_window() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            history_window: default_history_window(),
            function_calling: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_llm_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Optional maximum lengths (in characters). `None` means unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_thoughts_len: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_final_len: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_summary_len: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectionConfig {
    /// Identical failures needed to trip the detector
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Tool calls remembered per agent
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_failure_threshold() -> usize {
    3
}
fn default_history_size() -> usize {
    20
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            history_size: default_history_size(),
        }
    }
}

/// Which reasoning pass runs before each decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    #[default]
    None,
    ChainOfThought,
    TreeOfThoughts,
}

impl std::str::FromStr for ReasoningMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" | "off" => Ok(Self::None),
            "chain_of_thought" | "cot" => Ok(Self::ChainOfThought),
            "tree_of_thoughts" | "tot" => Ok(Self::TreeOfThoughts),
            other => Err(ConfigError::ValidationError(format!(
                "unknown reasoning mode '{other}'"
            ))),
        }
    }
}

/// Tree-of-thoughts exploration strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationStrategyKind {
    #[default]
    BestFirst,
    BreadthFirst,
    DepthFirst,
    BeamSearch,
    MonteCarlo,
}

impl ExplorationStrategyKind {
    pub const ALL: [ExplorationStrategyKind; 5] = [
        Self::BestFirst,
        Self::BreadthFirst,
        Self::DepthFirst,
        Self::BeamSearch,
        Self::MonteCarlo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestFirst => "best_first",
            Self::BreadthFirst => "breadth_first",
            Self::DepthFirst => "depth_first",
            Self::BeamSearch => "beam_search",
            Self::MonteCarlo => "monte_carlo",
        }
    }
}

impl std::fmt::Display for ExplorationStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default)]
    pub mode: ReasoningMode,

    #[serde(default)]
    pub tree: TreeConfig,
}

/// Tree-of-thoughts search limits and strategy policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Hard ceiling on nodes created and on nodes explored
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,

    /// Children generated per expansion
    #[serde(default = "default_branching_factor")]
    pub branching_factor: usize,

    #[serde(default)]
    pub strategy: ExplorationStrategyKind,

    /// Evaluated nodes scoring below this are pruned (never the root)
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: f64,

    #[serde(default = "default_beam_width")]
    pub beam_width: usize,

    #[serde(default = "default_monte_carlo_walks")]
    pub monte_carlo_walks: usize,

    /// Chance a Monte Carlo walk descends instead of stopping
    #[serde(default = "default_continue_probability")]
    pub continue_probability: f64,

    /// Best-first stops as soon as a leaf scores above this
    #[serde(default = "default_early_stop_score")]
    pub early_stop_score: f64,

    /// Best-first stops once `good_enough_min_nodes` are explored and the
    /// best score is above this
    #[serde(default = "default_good_enough_score")]
    pub good_enough_score: f64,

    #[serde(default = "default_good_enough_min_nodes")]
    pub good_enough_min_nodes: usize,

    /// Fixed RNG seed for reproducible Monte Carlo walks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_max_depth() -> usize {
    3
}
fn default_max_nodes() -> usize {
    20
}
fn default_branching_factor() -> usize {
    3
}
fn default_prune_threshold() -> f64 {
    0.3
}
fn default_beam_width() -> usize {
    3
}
fn default_monte_carlo_walks() -> usize {
    10
}
fn default_continue_probability() -> f64 {
    0.7
}
fn default_early_stop_score() -> f64 {
    0.8
}
fn default_good_enough_score() -> f64 {
    0.6
}
fn default_good_enough_min_nodes() -> usize {
    15
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes: default_max_nodes(),
            branching_factor: default_branching_factor(),
            strategy: ExplorationStrategyKind::default(),
            prune_threshold: default_prune_threshold(),
            beam_width: default_beam_width(),
            monte_carlo_walks: default_monte_carlo_walks(),
            continue_probability: default_continue_probability(),
            early_stop_score: default_early_stop_score(),
            good_enough_score: default_good_enough_score(),
            good_enough_min_nodes: default_good_enough_min_nodes(),
            seed: None,
        }
    }
}

impl PonderConfig {
    /// Load configuration from the default path (~/.ponder/config.toml).
    ///
    /// Environment variables override file values:
    /// - `PONDER_MAX_TURNS`
    /// - `PONDER_LLM_TIMEOUT_SECS`
    /// - `PONDER_TOOL_TIMEOUT_SECS`
    /// - `PONDER_REASONING_MODE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ponder")
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PONDER_MAX_TURNS") {
            self.agent.max_turns = parse_env("PONDER_MAX_TURNS", &v)?;
        }
        if let Some(v) = lookup("PONDER_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("PONDER_LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PONDER_TOOL_TIMEOUT_SECS") {
            self.tools.timeout_secs = parse_env("PONDER_TOOL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PONDER_REASONING_MODE") {
            self.reasoning.mode = v.parse()?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".into(),
            ));
        }

        if self.llm.timeout_secs == 0 || self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "llm.timeout_secs and tools.timeout_secs must be > 0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let ld = &self.loop_detection;
        if ld.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "loop_detection.failure_threshold must be at least 1".into(),
            ));
        }
        if ld.history_size < ld.failure_threshold {
            return Err(ConfigError::ValidationError(
                "loop_detection.history_size must be >= failure_threshold".into(),
            ));
        }

        let tree = &self.reasoning.tree;
        if tree.max_nodes == 0 || tree.beam_width == 0 || tree.branching_factor == 0 {
            return Err(ConfigError::ValidationError(
                "reasoning.tree.max_nodes, beam_width and branching_factor must be at least 1"
                    .into(),
            ));
        }

        for (name, value) in [
            ("prune_threshold", tree.prune_threshold),
            ("continue_probability", tree.continue_probability),
            ("early_stop_score", tree.early_stop_score),
            ("good_enough_score", tree.good_enough_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "reasoning.tree.{name} must be between 0.0 and 1.0"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has invalid value '{value}'")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

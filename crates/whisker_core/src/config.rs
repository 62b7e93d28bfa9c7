use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::interaction::InteractionType;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WhiskerConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub costs: InteractionCosts,
    pub thoughts: ThoughtConfig,
    pub storage: StorageConfig,
}

impl WhiskerConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: WhiskerConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("WHISKER_DB") {
            self.storage.db_path = v;
        }
        if let Ok(v) = std::env::var("WHISKER_STAGE_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.pipeline.stage_timeout_secs = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.4,
        }
    }
}

/// Tunables for the interaction pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum detector confidence before a declared/detected disagreement
    /// counts as a type mismatch.
    pub mismatch_threshold: f32,
    /// Upper bound for a single stage's call to the generation backend.
    pub stage_timeout_secs: u64,
    /// Payloads longer than this are filtered out before validation.
    pub max_payload_chars: usize,
    /// How many pre-ranked memories are offered to the retrieval stage.
    pub memory_candidates: usize,
    /// How many memories the retrieval stage may keep.
    pub max_relevant_memories: usize,
    /// How many past interactions are loaded into the character context.
    pub recent_interactions: usize,
    /// How many stored memories are loaded into the character context.
    pub recent_memories: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mismatch_threshold: 0.6,
            stage_timeout_secs: 30,
            max_payload_chars: 2_000,
            memory_candidates: 12,
            max_relevant_memories: 5,
            recent_interactions: 10,
            recent_memories: 50,
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs.max(1))
    }
}

/// Credits debited from the user's balance per declared interaction type.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractionCosts {
    pub pet: u64,
    pub feed: u64,
    pub play: u64,
    pub chat: u64,
    pub autonomous_thought: u64,
}

impl Default for InteractionCosts {
    fn default() -> Self {
        Self {
            pet: 1,
            feed: 5,
            play: 3,
            chat: 2,
            autonomous_thought: 0,
        }
    }
}

impl InteractionCosts {
    pub fn cost_of(&self, kind: InteractionType) -> u64 {
        match kind {
            InteractionType::Pet => self.pet,
            InteractionType::Feed => self.feed,
            InteractionType::Play => self.play,
            InteractionType::Chat => self.chat,
            InteractionType::AutonomousThought => self.autonomous_thought,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThoughtConfig {
    pub frequency: ThoughtFrequency,
}

/// How often the cat has an autonomous thought.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtFrequency {
    Off,
    Rarely,
    #[default]
    Sometimes,
    Often,
    Custom {
        interval_secs: u64,
    },
}

impl ThoughtFrequency {
    /// Interval between thoughts, or `None` when thoughts are disabled.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            ThoughtFrequency::Off => None,
            ThoughtFrequency::Rarely => Some(Duration::from_secs(4 * 60 * 60)),
            ThoughtFrequency::Sometimes => Some(Duration::from_secs(60 * 60)),
            ThoughtFrequency::Often => Some(Duration::from_secs(15 * 60)),
            ThoughtFrequency::Custom { interval_secs } => {
                Some(Duration::from_secs((*interval_secs).max(1)))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Credits granted to a user created by the CLI.
    pub starting_balance: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "whisker.db".to_string(),
            starting_balance: 100,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = WhiskerConfig::default();
        assert_eq!(cfg.llm.provider, "mock");
        assert!((cfg.pipeline.mismatch_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(cfg.pipeline.stage_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.thoughts.frequency, ThoughtFrequency::Sometimes);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"
"#;
        let cfg: WhiskerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        // Defaults for unspecified fields
        assert_eq!(cfg.llm.max_tokens, 1024);
        assert_eq!(cfg.costs.feed, 5);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[llm]
provider = "anthropic"
model = "claude-sonnet-4-5"
base_url = "https://api.anthropic.com"
max_tokens = 2048
temperature = 0.2

[pipeline]
mismatch_threshold = 0.75
stage_timeout_secs = 5
max_payload_chars = 500
memory_candidates = 8
max_relevant_memories = 3
recent_interactions = 4
recent_memories = 20

[costs]
pet = 0
feed = 10
play = 4
chat = 1
autonomous_thought = 0

[thoughts]
frequency = "often"

[storage]
db_path = "data/cat.db"
starting_balance = 25
"#;
        let cfg: WhiskerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.provider, "anthropic");
        assert_eq!(cfg.llm.max_tokens, 2048);
        assert_eq!(cfg.pipeline.stage_timeout_secs, 5);
        assert_eq!(cfg.pipeline.max_relevant_memories, 3);
        assert_eq!(cfg.costs.cost_of(InteractionType::Feed), 10);
        assert_eq!(cfg.costs.cost_of(InteractionType::Pet), 0);
        assert_eq!(cfg.thoughts.frequency, ThoughtFrequency::Often);
        assert_eq!(cfg.storage.db_path, "data/cat.db");
        assert_eq!(cfg.storage.starting_balance, 25);
    }

    #[test]
    fn test_parse_custom_frequency() {
        let toml_str = r#"
[thoughts]
frequency = { custom = { interval_secs = 90 } }
"#;
        let cfg: WhiskerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            cfg.thoughts.frequency.interval(),
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_frequency_presets() {
        assert_eq!(ThoughtFrequency::Off.interval(), None);
        assert!(ThoughtFrequency::Often.interval() < ThoughtFrequency::Sometimes.interval());
        assert!(ThoughtFrequency::Sometimes.interval() < ThoughtFrequency::Rarely.interval());
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        // Part 1: env overrides
        std::env::set_var("LLM_PROVIDER", "openai");
        std::env::set_var("WHISKER_STAGE_TIMEOUT_SECS", "7");

        let mut cfg = WhiskerConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.pipeline.stage_timeout_secs, 7);

        std::env::remove_var("LLM_PROVIDER");
        std::env::remove_var("WHISKER_STAGE_TIMEOUT_SECS");

        // Part 2: nonexistent path returns defaults (no env interference)
        let cfg = WhiskerConfig::load_or_default("/nonexistent/path.toml");
        assert_eq!(cfg.llm.provider, "mock");
    }
}

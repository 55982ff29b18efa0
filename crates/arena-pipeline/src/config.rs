//! Run configuration.
//!
//! Precedence: environment overrides > TOML file values > built-in defaults.
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::evolution::EvolutionStrategy;

/// Tunables for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Generation tasks per direction.
    pub replica_count: u32,
    pub k_factor: f64,
    /// Weight of the reflection score in the initial rating, 0.0-1.0.
    pub quality_weight: f64,
    /// Rating points per quality point away from neutral.
    pub quality_scale: f64,
    pub evolution_strategies: Vec<EvolutionStrategy>,
    pub max_debate_rounds: u32,
    /// Run the final finalist debate.
    pub use_debate: bool,
    /// Score evolved variants before their bracket.
    pub score_evolved: bool,
    pub oracle_timeout_secs: u64,
    /// Retries per oracle call for retriable errors.
    pub oracle_retries: u32,
    /// Base back-off between retries.
    pub retry_backoff_ms: u64,
    /// Upper bound on concurrent oracle calls.
    pub max_parallel_calls: usize,
    /// Passed through to the comparator untouched.
    pub project_context: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            replica_count: 3,
            k_factor: 32.0,
            quality_weight: 0.6,
            quality_scale: 10.0,
            evolution_strategies: EvolutionStrategy::ALL.to_vec(),
            max_debate_rounds: 3,
            use_debate: true,
            score_evolved: true,
            oracle_timeout_secs: 120,
            oracle_retries: 1,
            retry_backoff_ms: 2000,
            max_parallel_calls: 4,
            project_context: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply `ARENA_*` overrides from `lookup`. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parsed(&lookup, "ARENA_REPLICAS") {
            self.replica_count = v;
        }
        if let Some(v) = parsed(&lookup, "ARENA_K_FACTOR") {
            self.k_factor = v;
        }
        if let Some(v) = parsed(&lookup, "ARENA_MAX_DEBATE_ROUNDS") {
            self.max_debate_rounds = v;
        }
        if let Some(raw) = lookup("ARENA_USE_DEBATE") {
            match parse_flag(&raw) {
                Some(v) => self.use_debate = v,
                None => warn!(key = "ARENA_USE_DEBATE", value = %raw, "ignoring invalid flag"),
            }
        }
        if let Some(v) = parsed(&lookup, "ARENA_ORACLE_TIMEOUT_SECS") {
            self.oracle_timeout_secs = v;
        }
        if let Some(v) = parsed(&lookup, "ARENA_MAX_PARALLEL") {
            self.max_parallel_calls = v;
        }
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), String> {
        if self.replica_count == 0 {
            return Err("replica_count must be at least 1".into());
        }
        if !(self.k_factor.is_finite() && self.k_factor > 0.0) {
            return Err(format!("k_factor must be positive, got {}", self.k_factor));
        }
        if !(0.0..=1.0).contains(&self.quality_weight) {
            return Err(format!(
                "quality_weight must be within [0, 1], got {}",
                self.quality_weight
            ));
        }
        if !(self.quality_scale.is_finite() && self.quality_scale >= 0.0) {
            return Err(format!(
                "quality_scale must be non-negative, got {}",
                self.quality_scale
            ));
        }
        if self.max_debate_rounds == 0 {
            return Err("max_debate_rounds must be at least 1".into());
        }
        if self.oracle_timeout_secs == 0 {
            return Err("oracle_timeout_secs must be at least 1".into());
        }
        if self.max_parallel_calls == 0 {
            return Err("max_parallel_calls must be at least 1".into());
        }
        Ok(())
    }
}

/// Content oracle endpoint (any OpenAI-compatible server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleEndpointConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Temperature for generation and evolution.
    pub generator_temperature: f64,
    /// Temperature for scoring, comparison and debate.
    pub judge_temperature: f64,
}

impl Default for OracleEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".into(),
            api_key: "not-needed".into(),
            model: "default".into(),
            generator_temperature: 0.7,
            judge_temperature: 0.1,
        }
    }
}

impl OracleEndpointConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ARENA_ORACLE_URL") {
            self.base_url = url;
        }
        if let Some(key) = lookup("ARENA_ORACLE_API_KEY") {
            self.api_key = key;
        }
        if let Some(model) = lookup("ARENA_ORACLE_MODEL") {
            self.model = model;
        }
    }
}

/// Everything the binary needs: run tunables plus the oracle endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub oracle: OracleEndpointConfig,
}

impl ArenaConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse arena config TOML")
    }

    /// Load from an optional file, then apply environment overrides, then
    /// validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`Self::load`] with an explicit variable lookup.
    pub fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.pipeline.apply_overrides(&lookup);
        config.oracle.apply_overrides(&lookup);
        config
            .pipeline
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid arena config: {e}"))?;
        Ok(config)
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.replica_count, 3);
        assert_eq!(config.k_factor, 32.0);
        assert_eq!(config.evolution_strategies.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(lookup_from(&[
            ("ARENA_REPLICAS", "5"),
            ("ARENA_K_FACTOR", "16"),
            ("ARENA_USE_DEBATE", "off"),
            ("ARENA_MAX_PARALLEL", "not-a-number"),
        ]));
        assert_eq!(config.replica_count, 5);
        assert_eq!(config.k_factor, 16.0);
        assert!(!config.use_debate);
        assert_eq!(config.max_parallel_calls, 4);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let cases: Vec<Box<dyn Fn(&mut PipelineConfig)>> = vec![
            Box::new(|c| c.replica_count = 0),
            Box::new(|c| c.k_factor = 0.0),
            Box::new(|c| c.quality_weight = 1.5),
            Box::new(|c| c.max_debate_rounds = 0),
            Box::new(|c| c.oracle_timeout_secs = 0),
            Box::new(|c| c.max_parallel_calls = 0),
        ];
        for mutate in cases {
            let mut config = PipelineConfig::default();
            mutate(&mut config);
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_toml_partial_document() {
        let config = ArenaConfig::from_toml(
            r#"
replica_count = 2
evolution_strategies = ["refine"]

[oracle]
model = "judge-7b"
"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.replica_count, 2);
        assert_eq!(
            config.pipeline.evolution_strategies,
            vec![EvolutionStrategy::Refine]
        );
        assert_eq!(config.pipeline.k_factor, 32.0);
        assert_eq!(config.oracle.model, "judge-7b");
        assert_eq!(config.oracle.judge_temperature, 0.1);
    }

    #[test]
    fn test_oracle_env_overrides() {
        let mut oracle = OracleEndpointConfig::default();
        oracle.apply_overrides(lookup_from(&[
            ("ARENA_ORACLE_URL", "http://judge:9000/v1"),
            ("ARENA_ORACLE_MODEL", "m"),
        ]));
        assert_eq!(oracle.base_url, "http://judge:9000/v1");
        assert_eq!(oracle.model, "m");
        assert_eq!(oracle.api_key, "not-needed");
    }
}

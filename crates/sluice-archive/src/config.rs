//! File and environment configuration for an [`Engine`].
//!
//! Settings come from built-in defaults, then an optional TOML file, then
//! `SLUICE_`-prefixed environment variables. Nested keys use `__`, so
//! `SLUICE_SCORE__THRESHOLD=0.9` sets `score.threshold`.

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::digest::HashStrategy;
use crate::error::{Error, Result};
use crate::extract::Engine;
use crate::filter::{EntryFilter, FilterConfig};
use crate::memory::{DEFAULT_WARNING_THRESHOLD_PERCENT, MemorySourceKind};
use crate::options::{DEFAULT_STREAMING_THRESHOLD, ExtractOptions, PermissionStrategy, Strategy};
use crate::pool::{BufferPool, DEFAULT_FREE_CAP};
use crate::score::{
    DEFAULT_BASELINE_THROUGHPUT, DEFAULT_MIN_BUDGET, DEFAULT_THRESHOLD, ScoreWeights,
    VerificationScorer,
};

pub const ENV_PREFIX: &str = "SLUICE_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bytes; unbounded when absent.
    pub memory_limit: Option<u64>,
    pub warning_threshold_percent: f64,
    pub memory_source: MemorySourceKind,
    pub free_list_cap: usize,
    pub strategy: Strategy,
    pub streaming_threshold: u64,
    pub high_water_mark_override: Option<u64>,
    pub overwrite_existing: bool,
    pub strip_components: usize,
    pub hash_strategy: HashStrategy,
    pub perm_strategy: PermissionStrategy,
    pub timeout_ms: Option<u64>,
    pub filter: FilterSection,
    pub score: ScoreSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            warning_threshold_percent: DEFAULT_WARNING_THRESHOLD_PERCENT,
            memory_source: MemorySourceKind::default(),
            free_list_cap: DEFAULT_FREE_CAP,
            strategy: Strategy::default(),
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            high_water_mark_override: None,
            overwrite_existing: true,
            strip_components: 0,
            hash_strategy: HashStrategy::None,
            perm_strategy: PermissionStrategy::default(),
            timeout_ms: None,
            filter: FilterSection::default(),
            score: ScoreSection::default(),
        }
    }
}

/// The serializable part of a [`FilterConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
}

impl From<&FilterSection> for FilterConfig {
    fn from(section: &FilterSection) -> Self {
        FilterConfig {
            include_patterns: section.include.clone(),
            exclude_patterns: section.exclude.clone(),
            min_size: section.min_size,
            max_size: section.max_size,
            allowed_content_types: section.allowed_content_types.clone(),
            allowed_extensions: section.allowed_extensions.clone(),
            custom_predicate: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreSection {
    pub weights: ScoreWeights,
    /// Bytes per second.
    pub baseline_throughput: f64,
    pub min_budget_ms: u64,
    pub threshold: f64,
}

impl Default for ScoreSection {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            baseline_throughput: DEFAULT_BASELINE_THROUGHPUT,
            min_budget_ms: DEFAULT_MIN_BUDGET.as_millis() as u64,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Defaults, then `path` if it exists, then the environment.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(path))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::Config(msg));

        if self.memory_limit == Some(0) {
            return invalid("memory_limit must be positive".into());
        }
        if !(self.warning_threshold_percent > 0.0 && self.warning_threshold_percent <= 100.0) {
            return invalid(format!(
                "warning_threshold_percent must be in (0, 100], got {}",
                self.warning_threshold_percent
            ));
        }
        if self.streaming_threshold == 0 {
            return invalid("streaming_threshold must be positive".into());
        }
        if self.high_water_mark_override == Some(0) {
            return invalid("high_water_mark_override must be positive".into());
        }
        if let (Some(min), Some(max)) = (self.filter.min_size, self.filter.max_size) {
            if min > max {
                return invalid(format!("filter.min_size {min} exceeds filter.max_size {max}"));
            }
        }

        let score = &self.score;
        if !(0.0..=1.0).contains(&score.threshold) {
            return invalid(format!("score.threshold must be in [0, 1], got {}", score.threshold));
        }
        if !(score.baseline_throughput.is_finite() && score.baseline_throughput > 0.0) {
            return invalid("score.baseline_throughput must be positive".into());
        }
        let w = score.weights;
        if [w.accuracy, w.integrity, w.performance]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return invalid("score.weights must be finite and non-negative".into());
        }

        EntryFilter::new(&self.filter_config()).map(drop)
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig::from(&self.filter)
    }

    /// Per-run options. Callbacks, events and cancellation are left unset.
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            filter: self.filter_config(),
            strategy: self.strategy,
            streaming_threshold: self.streaming_threshold,
            high_water_mark_override: self.high_water_mark_override,
            overwrite_existing: self.overwrite_existing,
            strip_components: self.strip_components,
            hash_strategy: self.hash_strategy,
            perm_strategy: self.perm_strategy,
            timeout: self.timeout_ms.map(Duration::from_millis),
            ..ExtractOptions::default()
        }
    }

    pub fn scorer(&self) -> VerificationScorer {
        VerificationScorer::new()
            .weights(self.score.weights)
            .baseline_throughput(self.score.baseline_throughput)
            .min_budget(Duration::from_millis(self.score.min_budget_ms))
            .threshold(self.score.threshold)
    }

    pub fn engine(&self) -> Engine {
        let mut builder = Engine::builder()
            .memory_source(self.memory_source)
            .warning_threshold_percent(self.warning_threshold_percent)
            .pool(BufferPool::new().free_cap(self.free_list_cap))
            .scorer(self.scorer());
        if let Some(limit) = self.memory_limit {
            builder = builder.memory_limit(limit);
        }
        builder.build()
    }
}

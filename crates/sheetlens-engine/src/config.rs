use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::{EngineError, Result};

/// What to do with a formula cell that already carries a cached value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachedFormulaPolicy {
    /// Return the stored value without evaluating (values computed on import win)
    #[default]
    TrustCached,
    /// Ignore stored values of formula cells and evaluate every time the cache is cold
    AlwaysEvaluate,
}

impl FromStr for CachedFormulaPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trust-cached" | "trust_cached" => Ok(CachedFormulaPolicy::TrustCached),
            "always-evaluate" | "always_evaluate" => Ok(CachedFormulaPolicy::AlwaysEvaluate),
            other => Err(EngineError::Config(format!(
                "unknown cached formula policy `{}`",
                other
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest range a single formula argument may expand to
    pub max_range_cells: usize,
    /// Locale handed to the formula evaluator
    pub locale_id: String,
    pub cached_formula_policy: CachedFormulaPolicy,
    /// Deepest chain of nested cell evaluations before giving up with `#REF!`
    pub max_eval_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_range_cells: 100_000,
            locale_id: "en-US".to_string(),
            cached_formula_policy: CachedFormulaPolicy::default(),
            max_eval_depth: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("SHEETLENS_MAX_RANGE_CELLS") {
            config.max_range_cells = parse_var("SHEETLENS_MAX_RANGE_CELLS", &raw)?;
        }
        if let Some(raw) = lookup("SHEETLENS_LOCALE") {
            config.locale_id = raw;
        }
        if let Some(raw) = lookup("SHEETLENS_CACHED_FORMULA_POLICY") {
            config.cached_formula_policy = raw.parse()?;
        }
        if let Some(raw) = lookup("SHEETLENS_MAX_EVAL_DEPTH") {
            config.max_eval_depth = parse_var("SHEETLENS_MAX_EVAL_DEPTH", &raw)?;
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{} must be a number, got `{}`", key, raw)))
}

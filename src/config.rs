// ⚙️ Configuration - JSON file + environment overrides
//
// Every field has a default, so an empty `{}` file (or no file at all)
// is a valid configuration.

use crate::entities::FinancialKind;
use anyhow::{bail, Context as AnyhowContext, Result};
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG: &str = "DISPOSITION_CONFIG";
pub const ENV_DB: &str = "DISPOSITION_DB";
pub const ENV_YEAR_MATCH: &str = "DISPOSITION_YEAR_MATCH";
pub const ENV_ANCHOR_POLICY: &str = "DISPOSITION_ANCHOR_POLICY";
pub const ENV_ENFORCE_SUBDIVISION_PARCELS: &str = "DISPOSITION_ENFORCE_SUBDIVISION_PARCELS";

// ============================================================================
// AGGREGATOR
// ============================================================================

/// How a rollup picks a property's record for the project's fiscal year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearMatch {
    /// Exact year, else the latest earlier year
    #[default]
    ExactOrPrior,
    /// Exact year only; anything else contributes zero
    Exact,
}

/// Which anchor-kind effective date dates the project snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Most recent effective date not after the processing time
    #[default]
    Latest,
    /// Oldest effective date
    Earliest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub anchor_kind: FinancialKind,
    pub anchor_policy: AnchorPolicy,
    pub year_match: YearMatch,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            anchor_kind: FinancialKind::Assessed,
            anchor_policy: AnchorPolicy::Latest,
            year_match: YearMatch::ExactOrPrior,
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Attach the "at least one parent parcel" rule to subdivision forms.
    /// Off restores the historical behaviour where the rule was never applied.
    pub enforce_subdivision_parcels: bool,

    /// Pin the calendar year used by the current-year financial rule
    pub current_year: Option<i32>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            enforce_subdivision_parcels: true,
            current_year: None,
        }
    }
}

impl ValidationConfig {
    pub fn current_year(&self) -> i32 {
        self.current_year.unwrap_or_else(|| Local::now().year())
    }
}

// ============================================================================
// ROOT CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub aggregator: AggregatorConfig,
    pub validation: ValidationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("disposition.db"),
            aggregator: AggregatorConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// File named by DISPOSITION_CONFIG (if any), then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(ENV_CONFIG) {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from any key lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB) {
            self.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_YEAR_MATCH) {
            self.aggregator.year_match = match raw.trim().to_lowercase().as_str() {
                "exact" => YearMatch::Exact,
                "exact_or_prior" | "prior" => YearMatch::ExactOrPrior,
                other => bail!(
                    "{} must be 'exact' or 'exact_or_prior', got '{}'",
                    ENV_YEAR_MATCH,
                    other
                ),
            };
        }

        if let Some(raw) = lookup(ENV_ANCHOR_POLICY) {
            self.aggregator.anchor_policy = match raw.trim().to_lowercase().as_str() {
                "latest" => AnchorPolicy::Latest,
                "earliest" => AnchorPolicy::Earliest,
                other => bail!(
                    "{} must be 'latest' or 'earliest', got '{}'",
                    ENV_ANCHOR_POLICY,
                    other
                ),
            };
        }

        if let Some(raw) = lookup(ENV_ENFORCE_SUBDIVISION_PARCELS) {
            self.validation.enforce_subdivision_parcels = match raw.trim() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => bail!(
                    "{} must be a boolean, got '{}'",
                    ENV_ENFORCE_SUBDIVISION_PARCELS,
                    other
                ),
            };
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.aggregator.anchor_kind, FinancialKind::Assessed);
        assert_eq!(config.aggregator.anchor_policy, AnchorPolicy::Latest);
        assert_eq!(config.aggregator.year_match, YearMatch::ExactOrPrior);
        assert!(config.validation.enforce_subdivision_parcels);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "aggregator": {{ "year_match": "exact" }}, "validation": {{ "current_year": 2021 }} }}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.aggregator.year_match, YearMatch::Exact);
        assert_eq!(config.aggregator.anchor_policy, AnchorPolicy::Latest);
        assert_eq!(config.validation.current_year(), 2021);
        assert_eq!(config.database_path, PathBuf::from("disposition.db"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Config::from_file("/definitely/not/here.json");
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to read config file"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DB, "/tmp/other.db"),
            (ENV_YEAR_MATCH, "exact"),
            (ENV_ANCHOR_POLICY, "Earliest"),
            (ENV_ENFORCE_SUBDIVISION_PARCELS, "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.aggregator.year_match, YearMatch::Exact);
        assert_eq!(config.aggregator.anchor_policy, AnchorPolicy::Earliest);
        assert!(!config.validation.enforce_subdivision_parcels);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_YEAR_MATCH).then(|| "sometimes".to_string())
        });
        assert!(result.is_err());
    }
}

//! Runtime configuration.
//!
//! Every option can come from the command line or from a JSON config file;
//! a flag wins over the file, and the file wins over the built-in default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::Deserialize;

use crate::detect::{Contamination, IsolationForest};
use crate::error::{Error, Result};

pub const DEFAULT_INPUT: &str = "output.csv";
pub const DEFAULT_CREDENTIALS: &str = "api_key.txt";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_LISTED: usize = 50;

// ---------------------------------------------------------------------------
// Partial options (CLI flags / config file)
// ---------------------------------------------------------------------------

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Input table (.csv, .json or .parquet)
    #[arg(short, long, global = true)]
    pub input: Option<PathBuf>,

    /// Number of isolation trees
    #[arg(long, global = true)]
    pub trees: Option<usize>,

    /// Subsample size per tree
    #[arg(long, global = true)]
    pub max_samples: Option<usize>,

    /// Random seed for the forest
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Expected outlier share: "auto" or a fraction in (0, 0.5]
    #[arg(long, global = true)]
    pub contamination: Option<Contamination>,

    /// Longest list printed per finding
    #[arg(long, global = true)]
    pub max_listed: Option<usize>,
}

impl AnalysisOptions {
    fn or(self, fallback: Self) -> Self {
        Self {
            input: self.input.or(fallback.input),
            trees: self.trees.or(fallback.trees),
            max_samples: self.max_samples.or(fallback.max_samples),
            seed: self.seed.or(fallback.seed),
            contamination: self.contamination.or(fallback.contamination),
            max_listed: self.max_listed.or(fallback.max_listed),
        }
    }
}

/// Options for the text-generation service.
#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// File holding the API key
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Chat-completions endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Model name sent with the request
    #[arg(long)]
    pub model: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl ServiceOptions {
    fn or(self, fallback: Self) -> Self {
        Self {
            credentials: self.credentials.or(fallback.credentials),
            endpoint: self.endpoint.or(fallback.endpoint),
            model: self.model.or(fallback.model),
            timeout_secs: self.timeout_secs.or(fallback.timeout_secs),
        }
    }
}

/// Layout of the JSON config file: one flat object with any of the keys above.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(flatten)]
    pub analysis: AnalysisOptions,
    #[serde(flatten)]
    pub service: ServiceOptions,
    /// Keys neither group claimed; must end up empty.
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_json::Value>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let config: FileConfig = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
        if !config.unknown.is_empty() {
            let keys: Vec<&str> = config.unknown.keys().map(String::as_str).collect();
            return Err(Error::Config(format!(
                "unknown key(s) in {}: {}",
                path.display(),
                keys.join(", ")
            )));
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Isolation forest parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
    pub contamination: Contamination,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            seed: 0,
            contamination: Contamination::Auto,
        }
    }
}

impl DetectorConfig {
    pub fn build(&self) -> IsolationForest {
        IsolationForest::new()
            .with_n_estimators(self.n_estimators)
            .with_max_samples(self.max_samples)
            .with_random_state(self.seed)
            .with_contamination(self.contamination)
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub credentials: PathBuf,
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub detector: DetectorConfig,
    pub max_listed: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            credentials: PathBuf::from(DEFAULT_CREDENTIALS),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            detector: DetectorConfig::default(),
            max_listed: DEFAULT_MAX_LISTED,
        }
    }
}

impl Config {
    /// Merge flags over the optional config file over the defaults.
    pub fn resolve(
        analysis: AnalysisOptions,
        service: ServiceOptions,
        config_file: Option<&Path>,
    ) -> Result<Self> {
        let file = match config_file {
            Some(path) => {
                log::info!("reading config from {}", path.display());
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };
        let analysis = analysis.or(file.analysis);
        let service = service.or(file.service);
        let defaults = Config::default();

        let n_estimators = analysis.trees.unwrap_or(defaults.detector.n_estimators);
        let max_samples = analysis.max_samples.unwrap_or(defaults.detector.max_samples);
        let timeout_secs = service.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if n_estimators == 0 {
            return Err(Error::Config("trees must be at least 1".into()));
        }
        if max_samples == 0 {
            return Err(Error::Config("max_samples must be at least 1".into()));
        }
        if timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be at least 1".into()));
        }

        let config = Config {
            input: analysis.input.unwrap_or(defaults.input),
            credentials: service.credentials.unwrap_or(defaults.credentials),
            endpoint: service.endpoint.unwrap_or(defaults.endpoint),
            model: service.model.unwrap_or(defaults.model),
            timeout: Duration::from_secs(timeout_secs),
            detector: DetectorConfig {
                n_estimators,
                max_samples,
                seed: analysis.seed.unwrap_or(defaults.detector.seed),
                contamination: analysis
                    .contamination
                    .unwrap_or(defaults.detector.contamination),
            },
            max_listed: analysis.max_listed.unwrap_or(defaults.max_listed),
        };
        log::debug!("resolved config: {config:?}");
        Ok(config)
    }
}

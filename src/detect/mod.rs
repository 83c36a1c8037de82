//! Outlier detection over device positions.
//!
//! The isolation forest is the only model shipped; it sits behind
//! [`AnomalyDetector`] so the pipeline does not depend on it directly.

mod forest;

pub use forest::IsolationForest;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::model::{Dataset, Record};
use crate::error::{Error, Result};

/// A `(longitude, latitude)` pair.
pub type Point = [f64; 2];

/// Per-point verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyLabel {
    Inlier,
    Outlier,
}

impl AnomalyLabel {
    /// Outlier when `score` is strictly above `threshold`.
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score > threshold {
            AnomalyLabel::Outlier
        } else {
            AnomalyLabel::Inlier
        }
    }

    pub fn is_outlier(self) -> bool {
        self == AnomalyLabel::Outlier
    }
}

/// Expected share of outliers.
///
/// `Auto` uses the fixed score threshold of 0.5 from the isolation forest
/// paper; `Fraction(c)` flags the top `c` share of training scores.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Contamination {
    #[default]
    Auto,
    Fraction(f64),
}

impl FromStr for Contamination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Contamination::Auto);
        }
        let c: f64 = s
            .parse()
            .map_err(|_| Error::Config(format!("contamination '{s}' is neither 'auto' nor a number")))?;
        if c > 0.0 && c <= 0.5 {
            Ok(Contamination::Fraction(c))
        } else {
            Err(Error::Config(format!("contamination {c} must be in (0, 0.5]")))
        }
    }
}

impl TryFrom<String> for Contamination {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Contamination> for String {
    fn from(c: Contamination) -> String {
        c.to_string()
    }
}

impl fmt::Display for Contamination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contamination::Auto => f.write_str("auto"),
            Contamination::Fraction(c) => write!(f, "{c}"),
        }
    }
}

/// Scores and labels for one dataset, aligned with its records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// Anomaly scores in `(0, 1]`; higher is more anomalous.
    pub scores: Vec<f64>,
    pub labels: Vec<AnomalyLabel>,
    pub threshold: f64,
}

impl Detection {
    pub fn n_outliers(&self) -> usize {
        self.labels.iter().filter(|l| l.is_outlier()).count()
    }

    /// Records labelled as outliers, with their scores, in dataset order.
    pub fn outliers<'a>(&'a self, dataset: &'a Dataset) -> Vec<(&'a Record, f64)> {
        dataset
            .records
            .iter()
            .zip(self.labels.iter().zip(&self.scores))
            .filter(|(_, (label, _))| label.is_outlier())
            .map(|(rec, (_, score))| (rec, *score))
            .collect()
    }
}

/// Trait for outlier detectors over 2D points.
pub trait AnomalyDetector {
    /// Fit the detector on training points.
    fn fit(&mut self, points: &[Point]) -> Result<()>;

    /// Anomaly score of every point, higher = more anomalous.
    fn score_samples(&self, points: &[Point]) -> Result<Vec<f64>>;

    /// Scores strictly above this value are outliers.
    fn threshold(&self) -> f64;

    /// Label every point.
    fn predict(&self, points: &[Point]) -> Result<Vec<AnomalyLabel>> {
        let threshold = self.threshold();
        Ok(self
            .score_samples(points)?
            .into_iter()
            .map(|s| AnomalyLabel::from_score(s, threshold))
            .collect())
    }

    /// Fit and score in one step.
    fn fit_detect(&mut self, points: &[Point]) -> Result<Detection> {
        self.fit(points)?;
        let scores = self.score_samples(points)?;
        let threshold = self.threshold();
        let labels = scores
            .iter()
            .map(|&s| AnomalyLabel::from_score(s, threshold))
            .collect();
        Ok(Detection {
            scores,
            labels,
            threshold,
        })
    }
}

/// Run `detector` over the dataset's coordinates. An empty dataset yields
/// an empty detection rather than an error.
pub fn detect(detector: &mut dyn AnomalyDetector, dataset: &Dataset) -> Result<Detection> {
    if dataset.is_empty() {
        log::warn!("no usable records, skipping outlier detection");
        return Ok(Detection {
            scores: Vec::new(),
            labels: Vec::new(),
            threshold: detector.threshold(),
        });
    }
    let detection = detector.fit_detect(&dataset.coordinates())?;
    log::info!(
        "{} of {} records flagged as outliers (threshold {:.4})",
        detection.n_outliers(),
        dataset.len(),
        detection.threshold
    );
    Ok(detection)
}

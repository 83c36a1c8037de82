use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{AnomalyDetector, Contamination, Point};
use crate::error::{Error, Result};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Score above which a point is an outlier under `Contamination::Auto`.
const AUTO_THRESHOLD: f64 = 0.5;

/// Average path length of an unsuccessful BST search over `n` points,
/// used to normalise depths.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ---------------------------------------------------------------------------
// IsolationTree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// One random partition tree.
#[derive(Debug, Clone)]
pub struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    /// Grow a tree over `points[indices]` up to `height_limit` splits deep.
    fn grow(points: &[Point], indices: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        IsolationTree {
            root: Self::grow_node(points, indices, 0, height_limit, rng),
        }
    }

    fn grow_node(
        points: &[Point],
        indices: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> Node {
        if indices.len() <= 1 || depth >= height_limit {
            return Node::Leaf {
                size: indices.len(),
            };
        }

        // Features that still vary inside this node.
        let spans: Vec<(usize, f64, f64)> = (0..2)
            .filter_map(|f| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(points[i][f]), hi.max(points[i][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if spans.is_empty() {
            return Node::Leaf {
                size: indices.len(),
            };
        }

        let (feature, lo, hi) = spans[rng.gen_range(0..spans.len())];
        let value = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| points[i][feature] <= value);

        Node::Split {
            feature,
            value,
            left: Box::new(Self::grow_node(points, left, depth + 1, height_limit, rng)),
            right: Box::new(Self::grow_node(points, right, depth + 1, height_limit, rng)),
        }
    }

    /// Depth at which `point` lands, corrected for the unbuilt subtree of
    /// its leaf.
    pub fn path_length(&self, point: &Point) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    node = if point[*feature] <= *value { left.as_ref() } else { right.as_ref() };
                    depth += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// IsolationForest
// ---------------------------------------------------------------------------

/// Isolation forest (Liu, Ting, Zhou 2008) over 2D points.
///
/// Each tree is grown on a subsample drawn without replacement; a point's
/// score is `2^(-E[h(x)] / c(ψ))`, so scores near 1 are easy to isolate.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    contamination: Contamination,
    random_state: u64,
    trees: Vec<IsolationTree>,
    sample_size: usize,
    threshold: f64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: Contamination::Auto,
            random_state: 0,
            trees: Vec::new(),
            sample_size: 0,
            threshold: AUTO_THRESHOLD,
        }
    }
}

impl IsolationForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_max_samples(mut self, n: usize) -> Self {
        self.max_samples = n.max(1);
        self
    }

    pub fn with_contamination(mut self, contamination: Contamination) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Every value must be finite, and so must the spread of each feature,
    /// since split thresholds are drawn across it.
    fn check_points(points: &[Point]) -> Result<()> {
        if let Some(p) = points.iter().find(|p| !p.iter().all(|v| v.is_finite())) {
            return Err(Error::Model(format!("non-finite coordinate {p:?}")));
        }
        for feature in 0..2 {
            let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[feature]), hi.max(p[feature]))
            });
            if !points.is_empty() && !(hi - lo).is_finite() {
                return Err(Error::Model(format!(
                    "feature {feature} spans [{lo:e}, {hi:e}], too wide to split"
                )));
            }
        }
        Ok(())
    }
}

impl AnomalyDetector for IsolationForest {
    fn fit(&mut self, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Err(Error::Model("cannot fit on zero points".into()));
        }
        Self::check_points(points)?;

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let sample_size = self.max_samples.min(points.len());
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as usize;

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let indices = rand::seq::index::sample(&mut rng, points.len(), sample_size).into_vec();
                IsolationTree::grow(points, indices, height_limit, &mut rng)
            })
            .collect();
        self.sample_size = sample_size;

        self.threshold = match self.contamination {
            Contamination::Auto => AUTO_THRESHOLD,
            Contamination::Fraction(c) => {
                let scores = self.score_samples(points)?;
                percentile(scores, 1.0 - c)
            }
        };
        log::debug!(
            "fitted {} trees on {} points (subsample {}, height limit {height_limit})",
            self.trees.len(),
            points.len(),
            self.sample_size
        );
        Ok(())
    }

    fn score_samples(&self, points: &[Point]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(Error::Model("isolation forest is not fitted".into()));
        }
        Self::check_points(points)?;

        let normaliser = average_path_length(self.sample_size);
        let n_trees = self.trees.len() as f64;
        Ok(points
            .iter()
            .map(|p| {
                let mean_depth = self.trees.iter().map(|t| t.path_length(p)).sum::<f64>() / n_trees;
                let ratio = if normaliser > 0.0 { mean_depth / normaliser } else { 1.0 };
                2f64.powf(-ratio)
            })
            .collect())
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Linearly interpolated quantile `q` in `[0, 1]` of `values`.
fn percentile(mut values: Vec<f64>, q: f64) -> f64 {
    values.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::AnomalyLabel;

    /// `n` coincident points plus one far away, outlier last.
    fn cluster_with_outlier(n: usize) -> Vec<Point> {
        let mut pts = vec![[121.50, 25.03]; n];
        pts.push([120.20, 22.99]);
        pts
    }

    /// A small jittered cluster around (121.5, 25.0).
    fn jittered_cluster(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                [121.5 + (t * 0.37).sin() * 0.001, 25.0 + (t * 0.73).cos() * 0.001]
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.244).abs() < 1e-2, "{c256}");
    }

    #[test]
    fn test_single_far_outlier_is_only_outlier() {
        let pts = cluster_with_outlier(20);
        let mut forest = IsolationForest::new();
        forest.fit(&pts).unwrap();
        let labels = forest.predict(&pts).unwrap();
        assert_eq!(labels[20], AnomalyLabel::Outlier);
        assert!(labels[..20].iter().all(|l| *l == AnomalyLabel::Inlier));
    }

    #[test]
    fn test_far_outlier_scores_highest_in_tight_cluster() {
        let mut pts = jittered_cluster(60);
        pts.push([119.0, 23.0]);
        let mut forest = IsolationForest::new().with_random_state(7);
        let detection = forest.fit_detect(&pts).unwrap();
        assert_eq!(detection.labels[60], AnomalyLabel::Outlier);
        let max_inlier = detection.scores[..60].iter().cloned().fold(0.0, f64::max);
        assert!(detection.scores[60] > max_inlier);
    }

    #[test]
    fn test_scores_in_unit_interval() {
        let pts = jittered_cluster(40);
        let mut forest = IsolationForest::new().with_n_estimators(50);
        forest.fit(&pts).unwrap();
        for s in forest.score_samples(&pts).unwrap() {
            assert!(s > 0.0 && s <= 1.0, "score {s}");
        }
    }

    #[test]
    fn test_same_seed_same_labels() {
        let mut pts = jittered_cluster(80);
        pts.push([121.6, 25.1]);
        pts.push([121.4, 24.9]);

        let run = |seed| {
            let mut forest = IsolationForest::new().with_random_state(seed);
            forest.fit_detect(&pts).unwrap()
        };
        let a = run(0);
        let b = run(0);
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn test_subsample_capped_by_max_samples() {
        let pts = jittered_cluster(300);
        let mut forest = IsolationForest::new().with_n_estimators(5).with_max_samples(64);
        forest.fit(&pts).unwrap();
        assert_eq!(forest.sample_size, 64);
        assert_eq!(forest.score_samples(&pts).unwrap().len(), 300);
    }

    #[test]
    fn test_fraction_contamination_threshold() {
        let pts = cluster_with_outlier(19);
        let mut forest = IsolationForest::new().with_contamination(Contamination::Fraction(0.05));
        let detection = forest.fit_detect(&pts).unwrap();
        assert_eq!(detection.n_outliers(), 1);
        assert!(detection.labels[19].is_outlier());
    }

    #[test]
    fn test_single_point_is_inlier() {
        let pts = vec![[121.5, 25.0]];
        let mut forest = IsolationForest::new();
        let detection = forest.fit_detect(&pts).unwrap();
        assert_eq!(detection.scores, vec![0.5]);
        assert_eq!(detection.labels, vec![AnomalyLabel::Inlier]);
    }

    #[test]
    fn test_unfitted_and_bad_input_are_model_errors() {
        let forest = IsolationForest::new();
        assert!(matches!(
            forest.score_samples(&[[0.0, 0.0]]),
            Err(Error::Model(_))
        ));

        let mut forest = IsolationForest::new();
        assert!(matches!(forest.fit(&[]), Err(Error::Model(_))));
        assert!(matches!(
            forest.fit(&[[f64::NAN, 1.0]]),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn test_overflowing_spread_is_model_error() {
        let pts = [[-1e308, 0.0], [1e308, 0.0], [0.0, 0.0]];
        let mut forest = IsolationForest::new();
        assert!(matches!(forest.fit_detect(&pts), Err(Error::Model(_))));
        assert!(!forest.is_fitted());
    }

    #[test]
    fn test_percentile_interpolates() {
        assert_eq!(percentile(vec![1.0, 2.0, 3.0, 4.0, 5.0], 0.5), 3.0);
        assert!((percentile(vec![0.0, 10.0], 0.25) - 2.5).abs() < 1e-12);
    }
}

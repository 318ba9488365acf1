// ============================================================
// Layer 5 — Random Forest Regressor
// ============================================================
// Bagged CART regression trees over the feature matrix.
//
//   fit:
//     for each tree i (in parallel, seed = random_state + i)
//       rows     ← bootstrap sample (or a subsample, or all rows)
//       grow     ← split nodes on the feature / threshold pair
//                  with the lowest summed squared error, drawn
//                  from a random subset of max_features columns
//   predict:
//     mean of the tree outputs
//   predict_with_interval:
//     empirical (1 − c)/2 and (1 + c)/2 quantiles of the tree
//     outputs around the mean
//
// Trees are grown with an explicit stack, so max_depth: null
// cannot overflow the call stack.

use anyhow::{bail, ensure, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::RandomForestParams;
use crate::data::stats;
use crate::domain::traits::Regressor;

/// Minimum impurity decrease for a split to be kept.
const MIN_GAIN: f64 = 1e-12;

// ─── MaxFeatures ──────────────────────────────────────────────────────────────
/// Columns considered at each split.
///
/// In YAML: `sqrt`, `log2`, `all`, or a fraction such as `0.33`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MaxFeaturesRepr", into = "MaxFeaturesRepr")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Fraction(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MaxFeaturesRepr {
    Name(String),
    Fraction(f64),
}

impl TryFrom<MaxFeaturesRepr> for MaxFeatures {
    type Error = String;

    fn try_from(repr: MaxFeaturesRepr) -> Result<Self, Self::Error> {
        match repr {
            MaxFeaturesRepr::Fraction(f) => Ok(MaxFeatures::Fraction(f)),
            MaxFeaturesRepr::Name(name) => match name.as_str() {
                "sqrt"         => Ok(MaxFeatures::Sqrt),
                "log2"         => Ok(MaxFeatures::Log2),
                "all" | "auto" => Ok(MaxFeatures::All),
                other => Err(format!(
                    "unknown max_features '{other}', expected sqrt, log2, all or a fraction"
                )),
            },
        }
    }
}

impl From<MaxFeatures> for MaxFeaturesRepr {
    fn from(m: MaxFeatures) -> Self {
        match m {
            MaxFeatures::Sqrt        => MaxFeaturesRepr::Name("sqrt".into()),
            MaxFeatures::Log2        => MaxFeaturesRepr::Name("log2".into()),
            MaxFeatures::All         => MaxFeaturesRepr::Name("all".into()),
            MaxFeatures::Fraction(f) => MaxFeaturesRepr::Fraction(f),
        }
    }
}

impl MaxFeatures {
    /// Number of columns to draw out of `n_features`, at least 1.
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt        => n.sqrt().floor() as usize,
            MaxFeatures::Log2        => n.log2().floor() as usize,
            MaxFeatures::All         => n_features,
            MaxFeatures::Fraction(f) => (f * n).floor() as usize,
        };
        k.clamp(1, n_features.max(1))
    }
}

// ─── Regression tree ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature:   usize,
        threshold: f64,
        left:      usize,
        right:     usize,
    },
}

/// Growth limits shared by every tree of a forest.
#[derive(Debug, Clone, Copy)]
struct TreeLimits {
    max_depth:         Option<usize>,
    min_samples_split: usize,
    min_samples_leaf:  usize,
    max_features:      usize,
}

struct BestSplit {
    feature:   usize,
    threshold: f64,
    sse:       f64,
    left:      Vec<usize>,
    right:     Vec<usize>,
}

/// Nodes stored flat; the root is node 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

fn sse_of(y: &[f64], rows: &[usize]) -> (f64, f64) {
    let n = rows.len() as f64;
    let (sum, sum_sq) = rows
        .iter()
        .fold((0.0, 0.0), |(s, q), &i| (s + y[i], q + y[i] * y[i]));
    let mean = sum / n;
    (mean, (sum_sq - sum * sum / n).max(0.0))
}

impl DecisionTree {
    /// Grow a tree on `rows` of `x` / `y`. Returns the tree and the
    /// squared-error decrease credited to each feature.
    fn grow(
        x:      &Array2<f64>,
        y:      &[f64],
        rows:   Vec<usize>,
        limits: TreeLimits,
        rng:    &mut StdRng,
    ) -> (Self, Vec<f64>) {
        let n_features = x.ncols();
        let mut importances = vec![0.0; n_features];
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(0, rows, 0)];

        while let Some((node, rows, depth)) = stack.pop() {
            let (mean, sse) = sse_of(y, &rows);

            let can_split = rows.len() >= limits.min_samples_split
                && rows.len() >= 2 * limits.min_samples_leaf
                && limits.max_depth.map_or(true, |d| depth < d)
                && sse > MIN_GAIN;

            let best = if can_split {
                let features = index::sample(rng, n_features, limits.max_features);
                Self::best_split(x, y, &rows, features.iter(), limits.min_samples_leaf)
                    .filter(|b| sse - b.sse > MIN_GAIN)
            } else {
                None
            };

            match best {
                Some(split) => {
                    importances[split.feature] += sse - split.sse;
                    let left  = nodes.len();
                    let right = left + 1;
                    nodes.push(TreeNode::Leaf { value: 0.0 });
                    nodes.push(TreeNode::Leaf { value: 0.0 });
                    nodes[node] = TreeNode::Split {
                        feature:   split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };
                    stack.push((right, split.right, depth + 1));
                    stack.push((left, split.left, depth + 1));
                }
                None => nodes[node] = TreeNode::Leaf { value: mean },
            }
        }

        (Self { nodes }, importances)
    }

    /// Sorted sweep over each candidate feature, keeping the split
    /// with the smallest summed child SSE.
    fn best_split(
        x:        &Array2<f64>,
        y:        &[f64],
        rows:     &[usize],
        features: impl Iterator<Item = usize>,
        min_leaf: usize,
    ) -> Option<BestSplit> {
        let n = rows.len();
        let (total, total_sq) = rows
            .iter()
            .fold((0.0, 0.0), |(s, q), &i| (s + y[i], q + y[i] * y[i]));

        // (feature, threshold, sse)
        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = rows.to_vec();
        for f in features {
            sorted.sort_unstable_by(|a, b| x[[*a, f]].total_cmp(&x[[*b, f]]));

            let (mut sum_l, mut sq_l) = (0.0, 0.0);
            for i in 0..n - 1 {
                let yi = y[sorted[i]];
                sum_l += yi;
                sq_l  += yi * yi;

                let n_l = i + 1;
                let n_r = n - n_l;
                if n_l < min_leaf || n_r < min_leaf {
                    continue;
                }
                let (lo, hi) = (x[[sorted[i], f]], x[[sorted[i + 1], f]]);
                if lo >= hi {
                    continue;
                }

                let sum_r = total - sum_l;
                let sq_r  = total_sq - sq_l;
                let sse = (sq_l - sum_l * sum_l / n_l as f64) + (sq_r - sum_r * sum_r / n_r as f64);
                if best.map_or(true, |(_, _, b)| sse < b) {
                    best = Some((f, lo + (hi - lo) / 2.0, sse));
                }
            }
        }

        let (feature, threshold, sse) = best?;
        let (left, right) = rows.iter().partition(|&&r| x[[r, feature]] <= threshold);
        Some(BestSplit { feature, threshold, sse: sse.max(0.0), left, right })
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    node = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, d)) = stack.pop() {
            max_depth = max_depth.max(d);
            if let TreeNode::Split { left, right, .. } = &self.nodes[node] {
                stack.push((*left, d + 1));
                stack.push((*right, d + 1));
            }
        }
        max_depth
    }
}

// ─── Forest ───────────────────────────────────────────────────────────────────
/// Point forecast with its interval, `lower ≤ prediction ≤ upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInterval {
    pub prediction: f64,
    pub lower:      f64,
    pub upper:      f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params:              RandomForestParams,
    trees:               Vec<DecisionTree>,
    n_features:          usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(params: RandomForestParams) -> Self {
        Self { params, trees: Vec::new(), n_features: 0, feature_importances: Vec::new() }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Width of the matrix the forest was fitted on.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Normalised impurity decrease per column, summing to 1
    /// (all zeros if no tree ever split).
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    fn sample_rows(&self, n_rows: usize, rng: &mut StdRng) -> Vec<usize> {
        let n_draw = self.params.max_samples.map_or(n_rows, |m| m.min(n_rows)).max(1);
        if self.params.bootstrap {
            (0..n_draw).map(|_| rng.gen_range(0..n_rows)).collect()
        } else if n_draw < n_rows {
            index::sample(rng, n_rows, n_draw).into_vec()
        } else {
            (0..n_rows).collect()
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure!(x.nrows() > 0 && x.ncols() > 0, "cannot fit a forest on an empty matrix");
        ensure!(
            x.nrows() == y.len(),
            "feature matrix has {} rows but target has {}",
            x.nrows(),
            y.len()
        );
        ensure!(y.iter().all(|v| v.is_finite()), "target contains non-finite values");

        let y = y.to_vec();
        let limits = TreeLimits {
            max_depth:         self.params.max_depth,
            min_samples_split: self.params.min_samples_split.max(2),
            min_samples_leaf:  self.params.min_samples_leaf.max(1),
            max_features:      self.params.max_features.resolve(x.ncols()),
        };
        tracing::info!(
            "Fitting {} trees on {} rows x {} features ({} per split)",
            self.params.n_estimators,
            x.nrows(),
            x.ncols(),
            limits.max_features
        );

        let grown: Vec<(DecisionTree, Vec<f64>)> = (0..self.params.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.params.random_state.wrapping_add(i as u64));
                let rows = self.sample_rows(x.nrows(), &mut rng);
                DecisionTree::grow(x, &y, rows, limits, &mut rng)
            })
            .collect();

        let mut importances = vec![0.0; x.ncols()];
        for (_, tree_imp) in &grown {
            let total: f64 = tree_imp.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(tree_imp) {
                    *acc += v / total;
                }
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        self.trees               = grown.into_iter().map(|(t, _)| t).collect();
        self.n_features          = x.ncols();
        self.feature_importances = importances;

        let mean_depth =
            self.trees.iter().map(DecisionTree::depth).sum::<usize>() as f64 / self.trees.len() as f64;
        tracing::info!("Forest fitted: mean tree depth {mean_depth:.1}");
        Ok(())
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<()> {
        if !self.is_fitted() {
            bail!("random forest has not been fitted");
        }
        ensure!(
            x.ncols() == self.n_features,
            "expected {} feature columns, got {}",
            self.n_features,
            x.ncols()
        );
        Ok(())
    }

    /// Output of every tree for one row.
    pub fn tree_outputs(&self, row: ArrayView1<f64>) -> Vec<f64> {
        self.trees.iter().map(|t| t.predict_row(row)).collect()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_input(x)?;
        let preds: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| stats::mean(&self.tree_outputs(x.row(i))))
            .collect();
        Ok(Array1::from(preds))
    }

    pub fn predict_with_interval(
        &self,
        x:          &Array2<f64>,
        confidence: f64,
    ) -> Result<Vec<PredictionInterval>> {
        self.check_input(x)?;
        ensure!(
            confidence > 0.0 && confidence < 1.0,
            "confidence must be in (0, 1), got {confidence}"
        );
        let lo_q = (1.0 - confidence) / 2.0;
        let hi_q = (1.0 + confidence) / 2.0;

        Ok(x
            .outer_iter()
            .map(|row| {
                let mut outputs = self.tree_outputs(row);
                let prediction = stats::mean(&outputs);
                outputs.sort_by(f64::total_cmp);
                PredictionInterval {
                    prediction,
                    lower: stats::quantile_sorted(&outputs, lo_q).min(prediction),
                    upper: stats::quantile_sorted(&outputs, hi_q).max(prediction),
                }
            })
            .collect())
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }
}

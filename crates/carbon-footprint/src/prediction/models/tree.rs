use ndarray::{ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Growth limits for a single regression tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART regression tree minimising squared error; nodes live in a flat arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct Grower<'x, 'y, 'f, 'i> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    features: &'f [usize],
    params: TreeParams,
    nodes: Vec<Node>,
    importance: &'i mut [f64],
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree on the rows named by `samples`, considering only `features` for splits.
    /// Squared-error reductions are accumulated per feature into `importance`.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        samples: &[usize],
        features: &[usize],
        params: TreeParams,
        importance: &mut [f64],
    ) -> Self {
        let mut grower = Grower {
            x,
            y,
            features,
            params,
            nodes: Vec::new(),
            importance,
        };
        let mut samples = samples.to_vec();
        grower.grow(&mut samples, 0);
        Self {
            nodes: grower.nodes,
        }
    }

    pub fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

impl Grower<'_, '_, '_, '_> {
    fn grow(&mut self, samples: &mut [usize], depth: usize) -> usize {
        let slot = self.nodes.len();
        let mean = samples.iter().map(|&i| self.y[i]).sum::<f64>() / samples.len() as f64;
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= self.params.max_depth || samples.len() < self.params.min_samples_split {
            return slot;
        }

        let Some(split) = self.best_split(samples) else {
            return slot;
        };

        let mid = partition(samples, |&i| self.x[[i, split.feature]] <= split.threshold);
        self.importance[split.feature] += split.gain;

        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.grow(left_samples, depth + 1);
        let right = self.grow(right_samples, depth + 1);
        self.nodes[slot] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        slot
    }

    fn best_split(&self, samples: &[usize]) -> Option<SplitCandidate> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        if n < 2 * min_leaf {
            return None;
        }

        let total_sum: f64 = samples.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = samples.iter().map(|&i| self.y[i] * self.y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;

        let mut best: Option<SplitCandidate> = None;
        let mut ordered = samples.to_vec();

        for &feature in self.features {
            ordered.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let value = self.y[ordered[pos]];
                left_sum += value;
                left_sq += value * value;

                let left_n = pos + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let here = self.x[[ordered[pos], feature]];
                let next = self.x[[ordered[pos + 1], feature]];
                if here >= next {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / left_n as f64;
                let right_sse = right_sq - right_sum * right_sum / right_n as f64;
                let gain = parent_sse - left_sse - right_sse;

                if gain > 1e-12 && best.as_ref().map_or(true, |current| gain > current.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Reorder so every element satisfying `pred` precedes the rest; returns the boundary.
fn partition(samples: &mut [usize], pred: impl Fn(&usize) -> bool) -> usize {
    let mut boundary = 0;
    for idx in 0..samples.len() {
        if pred(&samples[idx]) {
            samples.swap(boundary, idx);
            boundary += 1;
        }
    }
    boundary
}

/// Pick `count` distinct feature indices out of `total`, sorted for reproducible scans.
pub(crate) fn sample_features(total: usize, count: usize, rng: &mut impl Rng) -> Vec<usize> {
    let mut features: Vec<usize> = (0..total).collect();
    features.shuffle(rng);
    features.truncate(count.clamp(1, total.max(1)));
    features.sort_unstable();
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    #[test]
    fn learns_a_step_function() {
        let x = Array2::from_shape_fn((10, 2), |(i, col)| if col == 0 { i as f64 } else { 0.0 });
        let y = Array1::from_shape_fn(10, |i| if i < 5 { 10.0 } else { 50.0 });
        let samples: Vec<usize> = (0..10).collect();
        let mut importance = vec![0.0; 2];

        let tree = RegressionTree::fit(x.view(), y.view(), &samples, &[0, 1], params(), &mut importance);

        assert_eq!(tree.predict(array![2.0, 0.0].view()), 10.0);
        assert_eq!(tree.predict(array![7.0, 0.0].view()), 50.0);
        assert!(importance[0] > 0.0);
        assert_eq!(importance[1], 0.0);
    }

    #[test]
    fn constant_target_yields_single_leaf() {
        let x = Array2::from_shape_fn((6, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(6, 3.0);
        let samples: Vec<usize> = (0..6).collect();
        let mut importance = vec![0.0; 1];

        let tree = RegressionTree::fit(x.view(), y.view(), &samples, &[0], params(), &mut importance);

        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict(array![100.0].view()), 3.0);
    }

    #[test]
    fn bootstrap_samples_only_see_their_rows() {
        let x = Array2::from_shape_fn((6, 1), |(i, _)| i as f64);
        let y = array![1.0, 1.0, 1.0, 9.0, 9.0, 9.0];
        let mut importance = vec![0.0; 1];

        let tree = RegressionTree::fit(x.view(), y.view(), &[0, 1, 2], &[0], params(), &mut importance);

        assert_eq!(tree.predict(array![5.0].view()), 1.0);
    }

    #[test]
    fn depth_limit_is_respected() {
        let x = Array2::from_shape_fn((64, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|value| value * value);
        let samples: Vec<usize> = (0..64).collect();
        let mut importance = vec![0.0; 1];
        let limited = TreeParams {
            max_depth: 3,
            ..params()
        };

        let tree = RegressionTree::fit(x.view(), y.view(), &samples, &[0], limited, &mut importance);
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn feature_sampling_is_seeded() {
        let mut first = SmallRng::seed_from_u64(7);
        let mut second = SmallRng::seed_from_u64(7);
        assert_eq!(
            sample_features(25, 20, &mut first),
            sample_features(25, 20, &mut second)
        );
    }
}

use crate::error::{Error, Result};
use crate::models::base_model::{ScoreFlag, SingleCapable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Node structure for Half-Space Trees
#[derive(Clone)]
struct HstNode {
    left: Option<Box<HstNode>>,
    right: Option<Box<HstNode>>,
    r_mass: usize,
    l_mass: usize,
    split_value: f64,
    k: usize,
}

/// Univariate Half-Space Trees.
///
/// Mass is counted in a latest window and swapped into the reference window every
/// `window_size` values. The score is normalised to `[0, 1]`, higher meaning more
/// anomalous; the model flags scores above `anomaly_cutoff`.
pub struct HalfSpaceTrees {
    window_size: usize,
    max_depth: usize,
    anomaly_cutoff: f64,
    roots: Vec<HstNode>,
    is_first_window: bool,
    step: usize,
    max_score: f64,
}

impl HalfSpaceTrees {
    pub fn new(
        min: f64,
        max: f64,
        window_size: usize,
        num_trees: usize,
        max_depth: usize,
        anomaly_cutoff: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        if !(min < max) {
            return Err(Error::Configuration(format!(
                "half_space_trees needs min < max, got [{}, {}]",
                min, max
            )));
        }
        if window_size == 0 || num_trees == 0 || max_depth == 0 {
            return Err(Error::Configuration(
                "half_space_trees window_size, num_trees and max_depth must be positive".into(),
            ));
        }

        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let roots = (0..num_trees)
            .map(|_| build_single_hs_tree(&mut rng, min, max, 0, max_depth))
            .collect();

        // Every node on a path can hold at most one full window of reference mass
        let max_score =
            num_trees as f64 * window_size as f64 * (2.0_f64.powi(max_depth as i32) - 1.0);

        Ok(HalfSpaceTrees {
            window_size,
            max_depth,
            anomaly_cutoff,
            roots,
            is_first_window: true,
            step: 0,
            max_score,
        })
    }

    fn update_mass(x: f64, node: &mut HstNode, ref_window: bool, max_depth: usize) {
        if ref_window {
            node.r_mass += 1;
        }
        node.l_mass += 1;

        if node.k < max_depth {
            let child = if x > node.split_value {
                node.right.as_deref_mut()
            } else {
                node.left.as_deref_mut()
            };
            if let Some(child) = child {
                HalfSpaceTrees::update_mass(x, child, ref_window, max_depth);
            }
        }
    }

    fn update_model(node: &mut HstNode) {
        node.r_mass = node.l_mass;
        node.l_mass = 0;

        if let Some(ref mut left) = node.left {
            HalfSpaceTrees::update_model(left);
        }
        if let Some(ref mut right) = node.right {
            HalfSpaceTrees::update_model(right);
        }
    }

    fn score_tree(&self, x: f64, node: &HstNode) -> f64 {
        if node.k == self.max_depth {
            return 0.0;
        }
        let child = if x > node.split_value {
            node.right.as_deref()
        } else {
            node.left.as_deref()
        };
        let below = child.map_or(0.0, |c| self.score_tree(x, c));
        (node.r_mass as f64) * 2.0_f64.powi(node.k as i32) + below
    }

    fn learn(&mut self, x: f64) {
        self.step += 1;

        let is_first_window = self.is_first_window;
        let max_depth = self.max_depth;
        for root in &mut self.roots {
            HalfSpaceTrees::update_mass(x, root, is_first_window, max_depth);
        }

        if self.step % self.window_size == 0 {
            self.is_first_window = false;
            for root in &mut self.roots {
                HalfSpaceTrees::update_model(root);
            }
        }
    }

    fn score(&self, x: f64) -> f64 {
        let mass: f64 = self.roots.iter().map(|root| self.score_tree(x, root)).sum();
        (1.0 - mass / self.max_score).clamp(0.0, 1.0)
    }
}

fn build_single_hs_tree(
    rng: &mut StdRng,
    min: f64,
    max: f64,
    current_depth: usize,
    max_depth: usize,
) -> HstNode {
    if current_depth == max_depth {
        return HstNode {
            left: None,
            right: None,
            r_mass: 0,
            l_mass: 0,
            split_value: 0.0,
            k: current_depth,
        };
    }

    // Keep splits away from the edges so both halves stay populated
    let margin = 0.15 * (max - min);
    let p = rng.gen_range((min + margin)..(max - margin));

    let left = build_single_hs_tree(rng, min, p, current_depth + 1, max_depth);
    let right = build_single_hs_tree(rng, p, max, current_depth + 1, max_depth);

    HstNode {
        left: Some(Box::new(left)),
        right: Some(Box::new(right)),
        r_mass: 0,
        l_mass: 0,
        split_value: p,
        k: current_depth,
    }
}

impl SingleCapable for HalfSpaceTrees {
    fn process_one(&mut self, x: f64) -> Result<ScoreFlag> {
        // Score before updating the model with the current instance
        let score = self.score(x);
        self.learn(x);
        Ok((score, i64::from(score > self.anomaly_cutoff)))
    }
}

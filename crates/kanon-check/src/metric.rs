//! Information-loss scoring.

use std::fmt;

use kanon_data::{Data, DataDefinition, DataManager, Hierarchy};
use kanon_types::Loss;

use crate::AnonymizationConfig;

/// Loss plus the transitively valid lower bound for one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricScore {
    pub loss: Loss,
    pub lower_bound: Loss,
}

/// Scores a transformed dataset. Lower is better.
pub trait Metric: Send {
    /// Capture dataset-dependent state before the first score.
    fn initialize(
        &mut self,
        manager: &DataManager,
        definition: &DataDefinition,
        generalized: &Data,
        hierarchies: &[Hierarchy],
        config: &AnonymizationConfig,
    );

    /// Score one check: the applied generalization levels plus the number of
    /// suppressed rows.
    fn score(&self, generalization: &[u32], suppressed_rows: usize, total_rows: usize)
        -> MetricScore;
}

/// Weighted combination of normalized generalization height and suppressed
/// fraction.
///
/// With factor `gs` (0 favors suppression, 1 favors generalization):
/// `loss = (1 − gs) · height + gs · suppression`. The lower bound is the
/// height term alone; it never decreases along a lattice path upward, so it
/// transfers to successors.
pub struct LossMetric {
    gs_factor: f64,
    heights: Vec<u32>,
}

impl LossMetric {
    /// Create an uninitialized metric.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gs_factor: 0.5,
            heights: Vec::new(),
        }
    }

    fn height_term(&self, generalization: &[u32]) -> f64 {
        if self.heights.is_empty() {
            return 0.0;
        }
        let mut sum = 0.0;
        for (&level, &height) in generalization.iter().zip(&self.heights) {
            if height > 1 {
                sum += f64::from(level) / f64::from(height - 1);
            }
        }
        sum / self.heights.len() as f64
    }
}

impl Default for LossMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for LossMetric {
    fn initialize(
        &mut self,
        _manager: &DataManager,
        _definition: &DataDefinition,
        _generalized: &Data,
        hierarchies: &[Hierarchy],
        config: &AnonymizationConfig,
    ) {
        self.heights = hierarchies.iter().map(Hierarchy::height).collect();
        self.gs_factor = config.gs_factor();
    }

    fn score(
        &self,
        generalization: &[u32],
        suppressed_rows: usize,
        total_rows: usize,
    ) -> MetricScore {
        let height = self.height_term(generalization);
        let suppression = if total_rows == 0 {
            0.0
        } else {
            suppressed_rows as f64 / total_rows as f64
        };
        let gs = self.gs_factor;
        MetricScore {
            loss: Loss::new((1.0 - gs) * height + gs * suppression),
            lower_bound: Loss::new((1.0 - gs) * height),
        }
    }
}

impl fmt::Debug for LossMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LossMetric")
            .field("gs_factor", &self.gs_factor)
            .field("heights", &self.heights)
            .finish()
    }
}

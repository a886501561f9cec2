//! Anonymization configuration and its subset projection.

use std::fmt;
use std::sync::Arc;

use kanon_data::DataManager;
use kanon_error::{KanonError, Result};
use kanon_types::RowSet;

use crate::PrivacyModel;

/// Privacy models plus the knobs of one anonymization run.
///
/// `subset_for` derives the projected configuration local recoding runs
/// against: restricted to a row set, optionally reweighted between
/// generalization and suppression.
#[derive(Clone)]
pub struct AnonymizationConfig {
    models: Vec<Arc<dyn PrivacyModel>>,
    max_outliers: f64,
    gs_factor: f64,
    subset: Option<RowSet>,
    num_rows: Option<usize>,
}

impl Default for AnonymizationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AnonymizationConfig {
    /// An empty configuration: no models, no suppression, balanced
    /// generalization/suppression weighting.
    #[must_use]
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            max_outliers: 0.0,
            gs_factor: 0.5,
            subset: None,
            num_rows: None,
        }
    }

    /// Add a privacy model.
    pub fn add_model(&mut self, model: Arc<dyn PrivacyModel>) {
        self.models.push(model);
    }

    /// The configured privacy models.
    #[must_use]
    pub fn privacy_models(&self) -> &[Arc<dyn PrivacyModel>] {
        &self.models
    }

    /// Set the maximum fraction of rows that may be suppressed.
    pub fn set_max_outliers(&mut self, fraction: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(KanonError::SuppressionLimitOutOfRange { value: fraction });
        }
        self.max_outliers = fraction;
        Ok(())
    }

    /// Maximum fraction of rows that may be suppressed.
    #[inline]
    #[must_use]
    pub fn max_outliers(&self) -> f64 {
        self.max_outliers
    }

    /// Set the generalization/suppression factor: 0 favors suppression, 1
    /// favors generalization.
    pub fn set_gs_factor(&mut self, factor: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(KanonError::GsFactorOutOfRange { value: factor });
        }
        self.gs_factor = factor;
        Ok(())
    }

    /// The generalization/suppression factor.
    #[inline]
    #[must_use]
    pub fn gs_factor(&self) -> f64 {
        self.gs_factor
    }

    /// Largest minimal class size any configured model imposes, or `None`
    /// when no model imposes one.
    #[must_use]
    pub fn minimal_group_size(&self) -> Option<usize> {
        self.models
            .iter()
            .filter_map(|m| m.minimal_class_size())
            .max()
    }

    /// Whether every configured model supports local recoding.
    #[must_use]
    pub fn is_local_recoding_supported(&self) -> bool {
        self.models.iter().all(|m| m.is_local_recoding_supported())
    }

    /// The row subset this configuration is restricted to, if any.
    #[must_use]
    pub fn subset(&self) -> Option<&RowSet> {
        self.subset.as_ref()
    }

    /// Capture dataset-dependent state.
    pub fn initialize(&mut self, manager: &DataManager) {
        self.num_rows = Some(manager.num_rows());
    }

    /// Row count captured by [`initialize`](Self::initialize).
    #[must_use]
    pub fn num_rows(&self) -> Option<usize> {
        self.num_rows
    }

    /// Project this configuration onto `rows` for local recoding.
    ///
    /// `gs_factor` of NaN leaves the configured factor in place. The clone
    /// is independent: mutating it never touches the original.
    #[must_use]
    pub fn subset_for(&self, rows: &RowSet, gs_factor: f64) -> Self {
        let mut projected = self.clone();
        projected.subset = Some(rows.clone());
        projected.num_rows = None;
        if !gs_factor.is_nan() {
            projected.gs_factor = gs_factor;
        }
        projected
    }
}

impl fmt::Debug for AnonymizationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnonymizationConfig")
            .field(
                "models",
                &self.models.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("max_outliers", &self.max_outliers)
            .field("gs_factor", &self.gs_factor)
            .field("subset", &self.subset.as_ref().map(RowSet::size))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KAnonymity;

    fn config_with_k(k: usize) -> AnonymizationConfig {
        let mut config = AnonymizationConfig::new();
        config.add_model(Arc::new(KAnonymity::new(k).expect("valid k")));
        config
    }

    #[test]
    fn defaults() {
        let config = AnonymizationConfig::new();
        assert!(config.privacy_models().is_empty());
        assert_eq!(config.max_outliers(), 0.0);
        assert_eq!(config.gs_factor(), 0.5);
        assert_eq!(config.minimal_group_size(), None);
        assert!(config.is_local_recoding_supported());
    }

    #[test]
    fn suppression_limit_range() {
        let mut config = AnonymizationConfig::new();
        assert!(config.set_max_outliers(0.99).is_ok());
        assert!(config.set_max_outliers(1.0).is_ok());
        assert!(config.set_max_outliers(1.01).is_err());
        assert!(config.set_max_outliers(-0.1).is_err());
    }

    #[test]
    fn gs_factor_range() {
        let mut config = AnonymizationConfig::new();
        assert!(config.set_gs_factor(0.0).is_ok());
        assert!(config.set_gs_factor(1.0).is_ok());
        assert!(config.set_gs_factor(1.1).is_err());
    }

    #[test]
    fn minimal_group_size_is_max_over_models() {
        let mut config = config_with_k(2);
        config.add_model(Arc::new(KAnonymity::new(5).expect("valid k")));
        assert_eq!(config.minimal_group_size(), Some(5));
    }

    #[test]
    fn subset_projection_is_independent() {
        let config = config_with_k(2);
        let mut rows = RowSet::create(10);
        rows.add(3);
        let projected = config.subset_for(&rows, 0.8);
        assert_eq!(projected.gs_factor(), 0.8);
        assert_eq!(projected.subset().map(RowSet::size), Some(1));
        // NaN leaves the factor configured.
        let kept = config.subset_for(&rows, f64::NAN);
        assert_eq!(kept.gs_factor(), config.gs_factor());
        // The original is untouched.
        assert!(config.subset().is_none());
        assert_eq!(config.gs_factor(), 0.5);
    }
}

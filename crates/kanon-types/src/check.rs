//! Outcome of checking one transformation.

use serde::{Deserialize, Serialize};

use crate::Loss;

/// Scored classification produced by a node check.
///
/// `minimal_class_size_fulfilled` is `None` when no configured model imposes
/// a minimal class size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// All configured privacy models hold (with suppression applied).
    pub privacy_model_fulfilled: bool,
    /// The minimal-class-size constraint holds without suppression.
    pub minimal_class_size_fulfilled: Option<bool>,
    /// Information loss of the transformed dataset.
    pub information_loss: Loss,
    /// Lower bound on the information loss of this node and, transitively,
    /// its successors.
    pub lower_bound: Loss,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_value_comparable() {
        let a = CheckOutcome {
            privacy_model_fulfilled: true,
            minimal_class_size_fulfilled: Some(true),
            information_loss: Loss::new(0.25),
            lower_bound: Loss::new(0.25),
        };
        assert_eq!(a, a);
        let mut b = a;
        b.privacy_model_fulfilled = false;
        assert_ne!(a, b);
    }
}

//! Primary error type for kanon operations.
//!
//! Structured variants for the failure kinds callers dispatch on, plus
//! classification predicates. Two outcomes are deliberately *not* errors:
//! a handle that is not optimizable and an inner search that finds no
//! solution both make `optimize*` return `Ok(0)`.

use thiserror::Error;

/// Primary error type for kanon operations.
#[derive(Error, Debug)]
pub enum KanonError {
    // === Argument validation ===
    /// Generalization/suppression factor outside `[0, 1]`.
    #[error("generalization/suppression factor must be in [0, 1], got {value}")]
    GsFactorOutOfRange { value: f64 },

    /// Fraction of records to optimize outside `(0, 1]`.
    #[error("fraction of records to optimize must be in (0, 1], got {value}")]
    RecordsOutOfRange { value: f64 },

    /// Adaption factor outside `[0, 1]`.
    #[error("adaption factor must be in [0, 1], got {value}")]
    AdaptionOutOfRange { value: f64 },

    /// Iteration cap must be positive.
    #[error("max iterations must be greater than zero")]
    MaxIterationsZero,

    /// Suppression limit outside `[0, 1]`.
    #[error("suppression limit must be in [0, 1], got {value}")]
    SuppressionLimitOutOfRange { value: f64 },

    /// Generic argument violation.
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    // === Buffer / handle protocol ===
    /// An unforked output handle is outstanding.
    #[error("the buffer is currently locked by another handle")]
    BufferLocked,

    /// Output handle does not belong to this result's input data.
    #[error("this output data is not associated to the correct input data")]
    WrongInputData,

    /// The output buffer may be inconsistent; the handle must be rebuilt
    /// before privacy is guaranteed again.
    #[error("handle must be rebuilt to guarantee privacy: {detail}")]
    RollbackRequired { detail: String },

    // === Data model ===
    /// Matrix shapes disagree.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Attribute is not part of the data definition.
    #[error("unknown attribute: {name}")]
    UnknownAttribute { name: String },

    /// A value in the data has no entry in its generalization hierarchy.
    #[error("value '{value}' of attribute '{attribute}' is missing from its hierarchy")]
    HierarchyGap { attribute: String, value: String },

    /// Generalization vector does not match the solution space.
    #[error("transformation out of bounds: {detail}")]
    TransformationOutOfBounds { detail: String },

    // === Internal ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error from a collaborator.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KanonError {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a generic invalid-argument error.
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            detail: detail.into(),
        }
    }

    /// Create a rollback-required error.
    pub fn rollback_required(detail: impl Into<String>) -> Self {
        Self::RollbackRequired {
            detail: detail.into(),
        }
    }

    /// Create a shape-mismatch error.
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether the caller violated an argument contract. No state changed.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::GsFactorOutOfRange { .. }
                | Self::RecordsOutOfRange { .. }
                | Self::AdaptionOutOfRange { .. }
                | Self::MaxIterationsZero
                | Self::SuppressionLimitOutOfRange { .. }
                | Self::InvalidArgument { .. }
                | Self::WrongInputData
        )
    }

    /// Whether the affected output handle must be rebuilt before its privacy
    /// guarantees hold again.
    #[must_use]
    pub const fn requires_rebuild(&self) -> bool {
        matches!(self, Self::RollbackRequired { .. })
    }
}

/// Result type alias using [`KanonError`].
pub type Result<T> = std::result::Result<T, KanonError>;

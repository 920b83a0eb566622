use thiserror::Error;

use super::VariantKind;
use crate::predict::PredictError;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("predict error: {0}")]
    Predict(#[from] PredictError),
    #[error("pass {detail_index} of {satellite} has no samples")]
    EmptyPass { satellite: String, detail_index: u32 },
    #[error("pass {pass_id} variants are inconsistent: {reason}")]
    InconsistentVariants { pass_id: u64, reason: String },
    #[error("pass {pass_id} is missing variant {variant}")]
    MissingVariant { pass_id: u64, variant: VariantKind },
    #[error("generation worker failed: {0}")]
    Worker(String),
}

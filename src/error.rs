use thiserror::Error;

/// Client-visible failures from the analytics entry points. Numerical
/// degeneracy (singular design matrix, zero variance) never surfaces here;
/// it is recovered locally via the ridge fallback or null reporting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("need at least {needed} responses for regression analysis, have {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("no response carries the `{field}` field")]
    MissingField { field: &'static str },
}

use serde::{Deserialize, Serialize};

/// Number of fixed numeric survey items per response.
pub const ITEM_COUNT: usize = 6;

/// Display labels for the six survey items, in column order.
pub const ITEM_LABELS: [&str; ITEM_COUNT] = [
    "Sentience",
    "EQ2030",
    "Reliance",
    "Future Education",
    "Understanding",
    "Social Impact",
];

/// One stored survey submission. Scores live in [-1, 1]; missing items and
/// the demographic bracket stay `None` rather than being imputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default)]
    pub q1: Option<f64>,
    #[serde(default)]
    pub q2: Option<f64>,
    #[serde(default)]
    pub q3: Option<f64>,
    #[serde(default)]
    pub q4: Option<f64>,
    #[serde(default)]
    pub q5: Option<f64>,
    #[serde(default)]
    pub q6: Option<f64>,
}

impl RawResponse {
    pub fn items(&self) -> [Option<f64>; ITEM_COUNT] {
        [self.q1, self.q2, self.q3, self.q4, self.q5, self.q6]
    }
}

/// One demographic category: the stored code plus a display label.
#[derive(Debug, Clone)]
pub struct Bracket {
    pub code: String,
    pub label: String,
}

impl Bracket {
    pub fn new(code: &str, label: &str) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
        }
    }
}

/// Ordered demographic category set. The first bracket is the reference
/// category for indicator encoding; tests may substitute custom schemes.
#[derive(Debug, Clone)]
pub struct BracketScheme {
    brackets: Vec<Bracket>,
}

impl BracketScheme {
    pub fn new(brackets: Vec<Bracket>) -> Self {
        assert!(
            !brackets.is_empty(),
            "bracket scheme needs at least one category"
        );
        Self { brackets }
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    pub fn reference(&self) -> &Bracket {
        &self.brackets[0]
    }

    /// Brackets that receive an indicator column, in scheme order.
    pub fn non_reference(&self) -> &[Bracket] {
        &self.brackets[1..]
    }

    pub fn position(&self, code: &str) -> Option<usize> {
        self.brackets.iter().position(|b| b.code == code)
    }
}

impl Default for BracketScheme {
    fn default() -> Self {
        Self::new(vec![
            Bracket::new("16-18", "16-18"),
            Bracket::new("19-22", "Undergrad"),
            Bracket::new("23-26", "Graduate"),
            Bracket::new("27-40", "Working"),
            Bracket::new("40+", "Older"),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FitMethod {
    #[serde(rename = "OLS")]
    Ols,
    Ridge,
}

impl std::fmt::Display for FitMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitMethod::Ols => write!(f, "OLS"),
            FitMethod::Ridge => write!(f, "Ridge"),
        }
    }
}

/// One fitted model. The coefficient vector is intercept-first; all four
/// per-coefficient vectors share length `predictors.len() + 1`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionResult {
    pub target: String,
    pub target_idx: usize,
    pub predictors: Vec<String>,
    pub beta: Vec<f64>,
    pub standard_errors: Vec<f64>,
    pub t_stats: Vec<f64>,
    pub p_values: Vec<f64>,
    pub r2: f64,
    pub adj_r2: Option<f64>,
    pub rmse: f64,
    pub n: usize,
    pub method: FitMethod,
}

/// Reason a single model was left out of a regression battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    TooFewRows { needed: usize, got: usize },
    TooFewPositives { needed: usize, got: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TooFewRows { needed, got } => {
                write!(f, "needs {needed} complete rows, have {got}")
            }
            SkipReason::TooFewPositives { needed, got } => {
                write!(f, "needs {needed} positive cases, have {got}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSkip {
    pub target: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Output of one regression battery: fitted models in presentation order
/// plus diagnostics for every model that was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct RegressionBatch {
    pub models: Vec<RegressionResult>,
    pub skipped: Vec<ModelSkip>,
}

/// Aggregate statistics over the item columns. Field names match the JSON
/// payload consumed by the analytics page.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryPayload {
    pub corr_matrix: Vec<Vec<f64>>,
    pub columns: Vec<String>,
    pub corr_matrix_with_age: Vec<Vec<f64>>,
    pub cov_matrix_with_age: Vec<Vec<f64>>,
    pub columns_with_age: Vec<String>,
    pub pca_components: Vec<usize>,
    pub pca_variance: Vec<f64>,
    pub cronbach_alpha: Option<f64>,
    pub kmo: Option<f64>,
    pub regression_summary: String,
    pub cov_matrix: Vec<Vec<f64>>,
    pub n: usize,
}

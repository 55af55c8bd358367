use nalgebra::DMatrix;

use crate::models::{
    BracketScheme, RawResponse, SummaryPayload, ITEM_COUNT, ITEM_LABELS,
};
use crate::regression;
use crate::table::{IndicatorEncoding, ResponseTable};

/// Ridge added to a non-invertible correlation matrix before computing
/// partial correlations.
const KMO_RIDGE: f64 = 1e-8;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample covariance (denominator n-1).
fn sample_cov(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let n = a.len();
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (n as f64 - 1.0)
}

/// Pairwise sample covariance matrix over column vectors.
pub fn covariance_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    columns
        .iter()
        .map(|a| columns.iter().map(|b| sample_cov(a, b)).collect())
        .collect()
}

/// Pairwise Pearson correlation. Zero-variance columns produce non-finite
/// entries, which the sanitizer turns into nulls downstream.
pub fn correlation_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let variances: Vec<f64> = columns.iter().map(|c| sample_cov(c, c)).collect();
    columns
        .iter()
        .enumerate()
        .map(|(i, a)| {
            columns
                .iter()
                .enumerate()
                .map(|(j, b)| {
                    if i == j {
                        if variances[i] > 0.0 {
                            1.0
                        } else {
                            f64::NAN
                        }
                    } else {
                        sample_cov(a, b) / (variances[i] * variances[j]).sqrt()
                    }
                })
                .collect()
        })
        .collect()
}

/// Principal-component explained-variance ratios, descending: eigenvalues
/// of the sample covariance matrix over their sum. Empty when total
/// variance is not positive.
pub fn explained_variance_ratios(columns: &[Vec<f64>]) -> Vec<f64> {
    let k = columns.len();
    let cov = covariance_matrix(columns);
    let matrix = DMatrix::from_fn(k, k, |i, j| cov[i][j]);
    let eigen = matrix.symmetric_eigen();

    let mut eigenvalues: Vec<f64> = eigen.eigenvalues.iter().map(|&v| v.max(0.0)).collect();
    eigenvalues.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let total: f64 = eigenvalues.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Vec::new();
    }
    eigenvalues.into_iter().map(|v| v / total).collect()
}

/// Cronbach's alpha over the item columns: `(k/(k-1)) * (1 - sum(var_i) /
/// var(total score))`. `None` under two rows or with non-positive
/// total-score variance.
pub fn cronbach_alpha(columns: &[Vec<f64>]) -> Option<f64> {
    let k = columns.len();
    if k < 2 || columns[0].len() < 2 {
        return None;
    }

    let item_variance_sum: f64 = columns.iter().map(|c| sample_cov(c, c)).sum();
    let totals: Vec<f64> = (0..columns[0].len())
        .map(|row| columns.iter().map(|c| c[row]).sum())
        .collect();
    let total_variance = sample_cov(&totals, &totals);
    if total_variance <= 0.0 {
        return None;
    }

    let alpha = (k as f64 / (k as f64 - 1.0)) * (1.0 - item_variance_sum / total_variance);
    alpha.is_finite().then_some(alpha)
}

/// Overall Kaiser-Meyer-Olkin adequacy from a correlation matrix:
/// `sum(r_ij^2) / (sum(r_ij^2) + sum(p_ij^2))` over i<j, with partial
/// correlations taken from the precision matrix.
pub fn kmo(corr: &[Vec<f64>]) -> Option<f64> {
    let k = corr.len();
    if k < 2 {
        return None;
    }

    // Symmetrize before inverting.
    let c = DMatrix::from_fn(k, k, |i, j| (corr[i][j] + corr[j][i]) / 2.0);
    let precision = match c.clone().try_inverse() {
        Some(p) => p,
        None => {
            let ridged = c + DMatrix::identity(k, k) * KMO_RIDGE;
            ridged.try_inverse()?
        }
    };

    let mut r2_sum = 0.0;
    let mut p2_sum = 0.0;
    for i in 0..k {
        for j in (i + 1)..k {
            let denom = (precision[(i, i)] * precision[(j, j)]).sqrt();
            let partial = if denom > 0.0 {
                -precision[(i, j)] / denom
            } else {
                0.0
            };
            r2_sum += corr[i][j] * corr[i][j];
            p2_sum += partial * partial;
        }
    }

    let denom = r2_sum + p2_sum;
    if !denom.is_finite() || denom <= 0.0 {
        return None;
    }
    let value = r2_sum / denom;
    value.is_finite().then_some(value)
}

fn item_label_strings() -> Vec<String> {
    ITEM_LABELS.iter().map(|l| l.to_string()).collect()
}

fn no_data_payload() -> SummaryPayload {
    SummaryPayload {
        corr_matrix: Vec::new(),
        columns: item_label_strings(),
        corr_matrix_with_age: Vec::new(),
        cov_matrix_with_age: Vec::new(),
        columns_with_age: Vec::new(),
        pca_components: Vec::new(),
        pca_variance: Vec::new(),
        cronbach_alpha: None,
        kmo: None,
        regression_summary: "No data available.".to_string(),
        cov_matrix: Vec::new(),
        n: 0,
    }
}

fn sparse_data_payload(n: usize) -> SummaryPayload {
    SummaryPayload {
        corr_matrix: vec![vec![0.0; ITEM_COUNT]; ITEM_COUNT],
        columns: item_label_strings(),
        corr_matrix_with_age: Vec::new(),
        cov_matrix_with_age: Vec::new(),
        columns_with_age: Vec::new(),
        pca_components: Vec::new(),
        pca_variance: Vec::new(),
        cronbach_alpha: None,
        kmo: None,
        regression_summary: "Need at least 2 complete responses.".to_string(),
        cov_matrix: Vec::new(),
        n,
    }
}

/// The full analytics payload. Never errors: low-data situations come back
/// as explicit placeholder payloads. Rows missing any item are dropped
/// entirely here (unlike the per-model exclusion in the regression
/// batteries); a missing bracket only coerces the indicators to the
/// reference row.
pub fn summary_payload(responses: &[RawResponse], scheme: &BracketScheme) -> SummaryPayload {
    let table = ResponseTable::from_responses(responses);
    if table.is_empty() {
        return no_data_payload();
    }

    let encoding = IndicatorEncoding::encode(&table, scheme);
    let mut complete_rows = Vec::new();
    for row in 0..table.len() {
        if let Some(items) = table.complete_items(row) {
            complete_rows.push((items, encoding.row_or_reference(row)));
        }
    }
    let n = complete_rows.len();
    if n < 2 {
        return sparse_data_payload(n);
    }

    let item_columns: Vec<Vec<f64>> = (0..ITEM_COUNT)
        .map(|col| complete_rows.iter().map(|(items, _)| items[col]).collect())
        .collect();

    let corr_matrix = correlation_matrix(&item_columns);
    let cov_matrix = covariance_matrix(&item_columns);

    let (corr_with_age, cov_with_age, columns_with_age) = if encoding.width() > 0 {
        let mut all_columns = item_columns.clone();
        for ind in 0..encoding.width() {
            all_columns.push(
                complete_rows
                    .iter()
                    .map(|(_, indicators)| indicators[ind])
                    .collect(),
            );
        }
        let mut labels = item_label_strings();
        labels.extend(encoding.labels().iter().cloned());
        (
            correlation_matrix(&all_columns),
            covariance_matrix(&all_columns),
            labels,
        )
    } else {
        (corr_matrix.clone(), cov_matrix.clone(), item_label_strings())
    };

    let pca_variance = explained_variance_ratios(&item_columns);

    SummaryPayload {
        corr_matrix: corr_matrix.clone(),
        columns: item_label_strings(),
        corr_matrix_with_age: corr_with_age,
        cov_matrix_with_age: cov_with_age,
        columns_with_age,
        pca_components: (1..=pca_variance.len()).collect(),
        pca_variance,
        cronbach_alpha: cronbach_alpha(&item_columns),
        kmo: kmo(&corr_matrix),
        regression_summary: regression::representative_summary(&table),
        cov_matrix,
        n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(seed: usize) -> f64 {
        let x = ((seed as f64 + 1.0).sin() * 43758.5453).abs().fract();
        (x * 2.0 - 1.0) * 0.9
    }

    fn varied_responses(n: usize) -> Vec<RawResponse> {
        (0..n)
            .map(|i| RawResponse {
                timestamp: "2026-02-01T00:00:00Z".to_string(),
                age_group: None,
                q1: Some(score(i * ITEM_COUNT)),
                q2: Some(score(i * ITEM_COUNT + 1)),
                q3: Some(score(i * ITEM_COUNT + 2)),
                q4: Some(score(i * ITEM_COUNT + 3)),
                q5: Some(score(i * ITEM_COUNT + 4)),
                q6: Some(score(i * ITEM_COUNT + 5)),
            })
            .collect()
    }

    #[test]
    fn correlation_matrix_is_symmetric_with_unit_diagonal() {
        let columns: Vec<Vec<f64>> = (0..4)
            .map(|c| (0..10).map(|r| score(c * 10 + r)).collect())
            .collect();
        let corr = correlation_matrix(&columns);

        for i in 0..4 {
            assert!((corr[i][i] - 1.0).abs() < 1e-12);
            for j in 0..4 {
                assert!((corr[i][j] - corr[j][i]).abs() < 1e-12);
                assert!(corr[i][j].abs() <= 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn identical_columns_correlate_perfectly() {
        let a: Vec<f64> = (0..8).map(|i| score(i)).collect();
        let corr = correlation_matrix(&[a.clone(), a]);
        assert!((corr[0][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn explained_variance_sums_to_one() {
        let columns: Vec<Vec<f64>> = (0..ITEM_COUNT)
            .map(|c| (0..12).map(|r| score(c * 12 + r)).collect())
            .collect();
        let ratios = explained_variance_ratios(&columns);

        assert_eq!(ratios.len(), ITEM_COUNT);
        assert!(ratios.iter().all(|&v| v >= 0.0));
        assert!((ratios.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        for pair in ratios.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn alpha_matches_direct_formula() {
        let columns: Vec<Vec<f64>> = (0..ITEM_COUNT)
            .map(|c| (0..9).map(|r| score(c * 9 + r)).collect())
            .collect();
        let alpha = cronbach_alpha(&columns).expect("variance is positive");

        let k = ITEM_COUNT as f64;
        let item_sum: f64 = columns.iter().map(|c| sample_cov(c, c)).sum();
        let totals: Vec<f64> = (0..9)
            .map(|r| columns.iter().map(|c| c[r]).sum())
            .collect();
        let expected = (k / (k - 1.0)) * (1.0 - item_sum / sample_cov(&totals, &totals));
        assert!((alpha - expected).abs() < 1e-12);
    }

    #[test]
    fn alpha_is_null_for_degenerate_inputs() {
        let flat = vec![vec![0.3; 6]; ITEM_COUNT];
        assert_eq!(cronbach_alpha(&flat), None);
        let single_row = vec![vec![0.3]; ITEM_COUNT];
        assert_eq!(cronbach_alpha(&single_row), None);
    }

    #[test]
    fn kmo_of_two_variables_is_one_half() {
        // For a 2x2 correlation matrix the partial correlation equals the
        // plain correlation, so the ratio is exactly 1/2.
        let corr = vec![vec![1.0, 0.4], vec![0.4, 1.0]];
        let value = kmo(&corr).expect("invertible matrix");
        assert!((value - 0.5).abs() < 1e-9);
    }

    #[test]
    fn kmo_rejects_degenerate_matrices() {
        assert_eq!(kmo(&[vec![1.0]]), None);
        let identity = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(kmo(&identity), None);
    }

    #[test]
    fn payload_reports_nulls_for_zero_variance_items() {
        let responses: Vec<RawResponse> = (0..6)
            .map(|_| RawResponse {
                timestamp: "2026-02-01T00:00:00Z".to_string(),
                age_group: None,
                q1: Some(0.0),
                q2: Some(0.0),
                q3: Some(0.0),
                q4: Some(0.0),
                q5: Some(0.0),
                q6: Some(0.0),
            })
            .collect();
        let payload = summary_payload(&responses, &BracketScheme::default());

        assert_eq!(payload.n, 6);
        assert_eq!(payload.cronbach_alpha, None);
        assert_eq!(payload.kmo, None);
        assert!(payload.pca_variance.is_empty());
        assert_eq!(payload.corr_matrix.len(), ITEM_COUNT);
    }

    #[test]
    fn payload_degrades_explicitly_below_two_rows() {
        let empty = summary_payload(&[], &BracketScheme::default());
        assert_eq!(empty.regression_summary, "No data available.");
        assert_eq!(empty.n, 0);

        let one = varied_responses(1);
        let sparse = summary_payload(&one, &BracketScheme::default());
        assert_eq!(
            sparse.regression_summary,
            "Need at least 2 complete responses."
        );
        assert_eq!(sparse.corr_matrix.len(), ITEM_COUNT);
        assert!(sparse.corr_matrix.iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn payload_includes_indicator_columns_when_brackets_present() {
        let mut responses = varied_responses(10);
        for (i, r) in responses.iter_mut().enumerate() {
            r.age_group = Some(if i % 2 == 0 { "16-18" } else { "19-22" }.to_string());
        }
        let payload = summary_payload(&responses, &BracketScheme::default());

        // 6 items + 4 non-reference brackets.
        assert_eq!(payload.columns_with_age.len(), ITEM_COUNT + 4);
        assert_eq!(payload.corr_matrix_with_age.len(), ITEM_COUNT + 4);
        assert_eq!(payload.columns.len(), ITEM_COUNT);
        assert_eq!(payload.pca_variance.len(), ITEM_COUNT);
        assert!(payload.cronbach_alpha.is_some());
    }
}

use std::fmt::Write;

use log::warn;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::AnalyticsError;
use crate::models::{
    BracketScheme, FitMethod, ModelSkip, RawResponse, RegressionBatch, RegressionResult,
    SkipReason, ITEM_COUNT, ITEM_LABELS,
};
use crate::table::{IndicatorEncoding, ResponseTable};

/// Global floor below which no regression battery is attempted.
pub const MIN_RESPONSES: usize = 6;

/// Minimum positive rows for a bracket-membership model.
pub const MIN_POSITIVE_CASES: usize = 2;

/// Penalty used by the stabilized fallback when the normal equations are
/// singular or the residual variance collapses.
const RIDGE_LAMBDA: f64 = 1e-3;

/// Residual variance at or below this is treated as an exact fit, which the
/// unregularized branch cannot attach standard errors to.
const DEGENERATE_SIGMA2: f64 = 1e-12;

#[derive(Debug, Clone)]
struct FittedModel {
    beta: Vec<f64>,
    standard_errors: Vec<f64>,
    t_stats: Vec<f64>,
    p_values: Vec<f64>,
    r2: f64,
    adj_r2: Option<f64>,
    rmse: f64,
    method: FitMethod,
}

fn design_matrix(xs: &[Vec<f64>], p: usize) -> DMatrix<f64> {
    DMatrix::from_fn(xs.len(), p + 1, |row, col| {
        if col == 0 {
            1.0
        } else {
            xs[row][col - 1]
        }
    })
}

fn adjusted_r2(r2: f64, n: usize, p: usize) -> Option<f64> {
    if n > p + 1 {
        Some(1.0 - (1.0 - r2) * (n as f64 - 1.0) / (n as f64 - p as f64 - 1.0))
    } else {
        None
    }
}

fn two_sided_p(t: f64, df: usize) -> f64 {
    match StudentsT::new(0.0, 1.0, df as f64) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Plain least squares. Returns `None` when the normal equations are
/// singular or the fit is too degenerate to carry standard errors.
fn fit_ols(xs: &[Vec<f64>], ys: &[f64]) -> Option<FittedModel> {
    let n = ys.len();
    let p = xs[0].len();
    let x = design_matrix(xs, p);
    let y = DVector::from_column_slice(ys);

    let xtx = x.transpose() * &x;
    let xtx_inv = xtx.try_inverse()?;
    let beta = &xtx_inv * x.transpose() * &y;
    if beta.iter().any(|b| !b.is_finite()) {
        return None;
    }

    let residuals = &y - &x * &beta;
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let mean = ys.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = ys.iter().map(|v| (v - mean) * (v - mean)).sum();
    if ss_tot <= 0.0 {
        return None;
    }

    let df = n - p - 1;
    let sigma2 = ss_res / df as f64;
    if sigma2 <= DEGENERATE_SIGMA2 {
        return None;
    }

    let mut standard_errors = Vec::with_capacity(p + 1);
    for j in 0..=p {
        let var = sigma2 * xtx_inv[(j, j)];
        if !var.is_finite() || var < 0.0 {
            return None;
        }
        standard_errors.push(var.sqrt());
    }

    let mut t_stats = Vec::with_capacity(p + 1);
    let mut p_values = Vec::with_capacity(p + 1);
    for j in 0..=p {
        let se = standard_errors[j];
        if se > 0.0 {
            let t = beta[j] / se;
            t_stats.push(t);
            p_values.push(two_sided_p(t, df));
        } else {
            t_stats.push(0.0);
            p_values.push(1.0);
        }
    }

    let r2 = 1.0 - ss_res / ss_tot;
    Some(FittedModel {
        beta: beta.iter().copied().collect(),
        standard_errors,
        t_stats,
        p_values,
        r2,
        adj_r2: adjusted_r2(r2, n, p),
        rmse: sigma2.sqrt(),
        method: FitMethod::Ols,
    })
}

/// Stabilized fallback: ridge penalty on every coefficient except the
/// intercept. Standard errors, t-statistics, and p-values are not
/// computable in this branch and come back as 0/0/1 placeholders.
fn fit_ridge(xs: &[Vec<f64>], ys: &[f64]) -> FittedModel {
    let n = ys.len();
    let p = xs[0].len();
    let x = design_matrix(xs, p);
    let y = DVector::from_column_slice(ys);

    let mut reg = x.transpose() * &x;
    for j in 1..=p {
        reg[(j, j)] += RIDGE_LAMBDA;
    }

    let placeholder = |beta: Vec<f64>, r2: f64, adj_r2: Option<f64>, rmse: f64| FittedModel {
        standard_errors: vec![0.0; p + 1],
        t_stats: vec![0.0; p + 1],
        p_values: vec![1.0; p + 1],
        beta,
        r2,
        adj_r2,
        rmse,
        method: FitMethod::Ridge,
    };

    let reg_inv = match reg.try_inverse() {
        Some(inv) => inv,
        None => return placeholder(vec![0.0; p + 1], 0.0, None, 0.0),
    };
    let beta = &reg_inv * x.transpose() * &y;

    let fitted = &x * &beta;
    let ss_res: f64 = (&y - &fitted).iter().map(|r| r * r).sum();
    let mean = ys.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = ys.iter().map(|v| (v - mean) * (v - mean)).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    placeholder(
        beta.iter().copied().collect(),
        r2,
        adjusted_r2(r2, n, p),
        (ss_res / n as f64).sqrt(),
    )
}

/// OLS first, stabilized fallback on degeneracy. Caller guarantees
/// `ys.len() >= predictor count + 2` so residual degrees of freedom stay
/// positive.
fn fit(xs: &[Vec<f64>], ys: &[f64]) -> FittedModel {
    match fit_ols(xs, ys) {
        Some(model) => model,
        None => fit_ridge(xs, ys),
    }
}

fn check_floor(responses: &[RawResponse]) -> Result<(), AnalyticsError> {
    if responses.len() < MIN_RESPONSES {
        return Err(AnalyticsError::InsufficientData {
            needed: MIN_RESPONSES,
            got: responses.len(),
        });
    }
    Ok(())
}

/// One model per survey item, in fixed item order: the item regressed on
/// the other five plus the bracket indicators when any response carries the
/// demographic field. Rows missing any used column are excluded for that
/// model only; models with too few complete rows are skipped, not errors.
pub fn per_item_regressions(
    responses: &[RawResponse],
    scheme: &BracketScheme,
) -> Result<RegressionBatch, AnalyticsError> {
    check_floor(responses)?;
    let table = ResponseTable::from_responses(responses);
    let encoding = IndicatorEncoding::encode(&table, scheme);
    let p = ITEM_COUNT - 1 + encoding.width();

    let mut models = Vec::new();
    let mut skipped = Vec::new();

    for target in 0..ITEM_COUNT {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for row in 0..table.len() {
            let (items, indicators) = match (table.complete_items(row), encoding.row(row)) {
                (Some(items), Some(indicators)) => (items, indicators),
                _ => continue,
            };
            let mut predictors: Vec<f64> = (0..ITEM_COUNT)
                .filter(|&col| col != target)
                .map(|col| items[col])
                .collect();
            predictors.extend_from_slice(indicators);
            xs.push(predictors);
            ys.push(items[target]);
        }

        let label = format!("Question {}", target + 1);
        if ys.len() < p + 2 {
            let reason = SkipReason::TooFewRows {
                needed: p + 2,
                got: ys.len(),
            };
            warn!("skipping {label}: {reason}");
            skipped.push(ModelSkip {
                target: label,
                reason,
            });
            continue;
        }

        let fitted = fit(&xs, &ys);
        let mut predictor_labels: Vec<String> = (0..ITEM_COUNT)
            .filter(|&col| col != target)
            .map(|col| ITEM_LABELS[col].to_string())
            .collect();
        predictor_labels.extend(encoding.labels().iter().cloned());

        models.push(RegressionResult {
            target: label,
            target_idx: target,
            predictors: predictor_labels,
            beta: fitted.beta,
            standard_errors: fitted.standard_errors,
            t_stats: fitted.t_stats,
            p_values: fitted.p_values,
            r2: fitted.r2,
            adj_r2: fitted.adj_r2,
            rmse: fitted.rmse,
            n: ys.len(),
            method: fitted.method,
        });
    }

    Ok(RegressionBatch { models, skipped })
}

/// One binary-membership model per bracket: 1 if the row belongs to the
/// bracket, regressed on the six raw items (no indicators, which would be
/// collinear with the target). Output is ordered by descending positive
/// count; brackets with under two positive rows are skipped.
pub fn per_category_regressions(
    responses: &[RawResponse],
    scheme: &BracketScheme,
) -> Result<RegressionBatch, AnalyticsError> {
    check_floor(responses)?;
    let table = ResponseTable::from_responses(responses);
    if !table.has_demographics() {
        return Err(AnalyticsError::MissingField { field: "age_group" });
    }

    let p = ITEM_COUNT;
    let mut ranked: Vec<(usize, RegressionResult)> = Vec::new();
    let mut skipped = Vec::new();

    for (idx, bracket) in scheme.brackets().iter().enumerate() {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut positives = 0usize;
        for row in 0..table.len() {
            let (items, code) = match (table.complete_items(row), table.category(row)) {
                (Some(items), Some(code)) => (items, code),
                _ => continue,
            };
            let hit = code == bracket.code;
            if hit {
                positives += 1;
            }
            xs.push(items.to_vec());
            ys.push(if hit { 1.0 } else { 0.0 });
        }

        if positives < MIN_POSITIVE_CASES {
            let reason = SkipReason::TooFewPositives {
                needed: MIN_POSITIVE_CASES,
                got: positives,
            };
            warn!("skipping bracket {}: {reason}", bracket.code);
            skipped.push(ModelSkip {
                target: bracket.label.clone(),
                reason,
            });
            continue;
        }
        if ys.len() < p + 2 {
            let reason = SkipReason::TooFewRows {
                needed: p + 2,
                got: ys.len(),
            };
            warn!("skipping bracket {}: {reason}", bracket.code);
            skipped.push(ModelSkip {
                target: bracket.label.clone(),
                reason,
            });
            continue;
        }

        let fitted = fit(&xs, &ys);
        ranked.push((
            positives,
            RegressionResult {
                target: bracket.label.clone(),
                target_idx: idx,
                predictors: ITEM_LABELS.iter().map(|l| l.to_string()).collect(),
                beta: fitted.beta,
                standard_errors: fitted.standard_errors,
                t_stats: fitted.t_stats,
                p_values: fitted.p_values,
                r2: fitted.r2,
                adj_r2: fitted.adj_r2,
                rmse: fitted.rmse,
                n: ys.len(),
                method: fitted.method,
            },
        ));
    }

    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(RegressionBatch {
        models: ranked.into_iter().map(|(_, model)| model).collect(),
        skipped,
    })
}

/// Readable summary of the representative model: the last item regressed
/// on the other five. The layout is a presentation detail; the numbers are
/// the same ones the battery reports.
pub fn representative_summary(table: &ResponseTable) -> String {
    let target = ITEM_COUNT - 1;
    let p = ITEM_COUNT - 1;

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for row in 0..table.len() {
        if let Some(items) = table.complete_items(row) {
            xs.push(items[..target].to_vec());
            ys.push(items[target]);
        }
    }
    if ys.len() < p + 2 {
        return format!(
            "Regression unavailable: need at least {} complete responses, have {}.",
            p + 2,
            ys.len()
        );
    }

    let fitted = fit(&xs, &ys);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ~ {}",
        ITEM_LABELS[target],
        ITEM_LABELS[..target].join(" + ")
    );
    let adj = fitted
        .adj_r2
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "n/a".to_string());
    let _ = writeln!(
        out,
        "n = {}   method = {}   R² = {:.4}   adj. R² = {}   RMSE = {:.4}",
        ys.len(),
        fitted.method,
        fitted.r2,
        adj,
        fitted.rmse
    );
    let _ = writeln!(
        out,
        "{:<18} {:>10} {:>10} {:>10} {:>10}",
        "predictor", "coef", "std err", "t", "P>|t|"
    );
    let names: Vec<&str> = std::iter::once("const")
        .chain(ITEM_LABELS[..target].iter().copied())
        .collect();
    for (j, name) in names.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<18} {:>10.4} {:>10.4} {:>10.4} {:>10.3}",
            name, fitted.beta[j], fitted.standard_errors[j], fitted.t_stats[j], fitted.p_values[j]
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bracket;

    /// Deterministic pseudo-random score in [-1, 1].
    fn score(seed: usize) -> f64 {
        let x = ((seed as f64 + 1.0).sin() * 43758.5453).abs().fract();
        (x * 2.0 - 1.0) * 0.9
    }

    fn response(scores: [f64; ITEM_COUNT], age: Option<&str>) -> RawResponse {
        RawResponse {
            timestamp: "2026-02-01T00:00:00Z".to_string(),
            age_group: age.map(str::to_string),
            q1: Some(scores[0]),
            q2: Some(scores[1]),
            q3: Some(scores[2]),
            q4: Some(scores[3]),
            q5: Some(scores[4]),
            q6: Some(scores[5]),
        }
    }

    fn varied_responses(n: usize) -> Vec<RawResponse> {
        (0..n)
            .map(|i| {
                let mut scores = [0.0; ITEM_COUNT];
                for (j, slot) in scores.iter_mut().enumerate() {
                    *slot = score(i * ITEM_COUNT + j);
                }
                response(scores, None)
            })
            .collect()
    }

    #[test]
    fn ols_recovers_known_line() {
        let xs: Vec<Vec<f64>> = [0.0, 1.0, 2.0, 3.0].iter().map(|&x| vec![x]).collect();
        let ys = [2.1, 4.9, 8.1, 10.9];
        let model = fit(&xs, &ys);

        assert_eq!(model.method, FitMethod::Ols);
        assert!((model.beta[0] - 2.06).abs() < 1e-8);
        assert!((model.beta[1] - 2.96).abs() < 1e-8);
        assert!(model.standard_errors.iter().all(|&se| se > 0.0));
        assert!(model.r2 > 0.99 && model.r2 <= 1.0);
        assert!(model.adj_r2.is_some());
        for &p in &model.p_values {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn larger_t_means_smaller_p() {
        assert!(two_sided_p(3.0, 8) < two_sided_p(1.0, 8));
        assert!((two_sided_p(0.0, 8) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn per_item_battery_has_consistent_vectors() {
        let responses = varied_responses(15);
        let batch = per_item_regressions(&responses, &BracketScheme::default())
            .expect("battery should run");

        assert_eq!(batch.models.len(), ITEM_COUNT);
        assert!(batch.skipped.is_empty());
        for (idx, model) in batch.models.iter().enumerate() {
            assert_eq!(model.target_idx, idx);
            let len = model.predictors.len() + 1;
            assert_eq!(model.beta.len(), len);
            assert_eq!(model.standard_errors.len(), len);
            assert_eq!(model.t_stats.len(), len);
            assert_eq!(model.p_values.len(), len);
            assert_eq!(model.n, 15);
            assert!(model.r2 <= 1.0);
            if let Some(adj) = model.adj_r2 {
                assert!(adj <= model.r2 + 1e-12);
            }
        }
    }

    #[test]
    fn below_global_floor_is_an_error() {
        let responses = varied_responses(5);
        let err = per_item_regressions(&responses, &BracketScheme::default())
            .expect_err("floor should apply");
        assert_eq!(
            err,
            AnalyticsError::InsufficientData { needed: 6, got: 5 }
        );
    }

    #[test]
    fn exact_linear_dependency_falls_back_to_ridge() {
        let responses: Vec<RawResponse> = (0..12)
            .map(|i| {
                let mut scores = [0.0; ITEM_COUNT];
                for j in [0, 1, 3, 4, 5] {
                    scores[j] = score(i * ITEM_COUNT + j);
                }
                scores[2] = (scores[0] + scores[1] + scores[3] + scores[4] + scores[5]) / 5.0;
                response(scores, None)
            })
            .collect();

        let batch = per_item_regressions(&responses, &BracketScheme::default())
            .expect("battery should run");
        let model = &batch.models[2];
        assert_eq!(model.method, FitMethod::Ridge);
        assert!(model.standard_errors.iter().all(|&se| se == 0.0));
        assert!(model.t_stats.iter().all(|&t| t == 0.0));
        assert!(model.p_values.iter().all(|&p| p == 1.0));
        assert!(model.r2 > 0.99);
    }

    #[test]
    fn rows_missing_the_bracket_are_excluded_from_indicator_models() {
        let mut responses = varied_responses(14);
        for (i, r) in responses.iter_mut().enumerate() {
            if i < 12 {
                r.age_group = Some(if i % 2 == 0 { "A" } else { "B" }.to_string());
            }
        }
        let scheme = BracketScheme::new(vec![Bracket::new("A", "A"), Bracket::new("B", "B")]);
        let batch = per_item_regressions(&responses, &scheme).expect("battery should run");

        for model in &batch.models {
            assert_eq!(model.n, 12);
            assert_eq!(model.predictors.len(), 6);
            assert_eq!(*model.predictors.last().unwrap(), "B");
        }
    }

    #[test]
    fn category_battery_orders_by_positive_count_and_skips_rare() {
        let mut responses = varied_responses(10);
        for (i, r) in responses.iter_mut().enumerate() {
            r.age_group = Some(if i < 6 { "A" } else { "B" }.to_string());
        }
        let scheme = BracketScheme::new(vec![
            Bracket::new("A", "A"),
            Bracket::new("B", "B"),
            Bracket::new("C", "C"),
        ]);
        let batch = per_category_regressions(&responses, &scheme).expect("battery should run");

        assert_eq!(batch.models.len(), 2);
        assert_eq!(batch.models[0].target, "A");
        assert_eq!(batch.models[1].target, "B");
        for model in &batch.models {
            assert_eq!(model.predictors.len(), ITEM_COUNT);
            assert_eq!(model.n, 10);
        }
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].target, "C");
        assert_eq!(
            batch.skipped[0].reason,
            SkipReason::TooFewPositives { needed: 2, got: 0 }
        );
    }

    #[test]
    fn category_battery_requires_the_field() {
        let responses = varied_responses(10);
        let err = per_category_regressions(&responses, &BracketScheme::default())
            .expect_err("field is absent");
        assert_eq!(err, AnalyticsError::MissingField { field: "age_group" });
    }

    #[test]
    fn representative_summary_reports_fit_statistics() {
        let responses = varied_responses(12);
        let table = ResponseTable::from_responses(&responses);
        let text = representative_summary(&table);

        assert!(text.contains("Social Impact ~"));
        assert!(text.contains("R²"));
        assert!(text.contains("const"));
        assert!(text.contains("Sentience"));
    }

    #[test]
    fn representative_summary_degrades_on_sparse_data() {
        let responses = varied_responses(3);
        let table = ResponseTable::from_responses(&responses);
        let text = representative_summary(&table);
        assert!(text.starts_with("Regression unavailable"));
    }
}

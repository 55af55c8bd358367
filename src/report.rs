use std::fmt::Write;

use chrono::Utc;

use crate::models::{BracketScheme, RawResponse, RegressionBatch};
use crate::{regression, summary};

fn write_battery(output: &mut String, batch: &RegressionBatch) {
    for model in &batch.models {
        let adj = model
            .adj_r2
            .map(|v| format!("{v:.3}"))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            output,
            "- {}: R² {:.3} (adj {adj}, RMSE {:.3}, n = {}, {})",
            model.target, model.r2, model.rmse, model.n, model.method
        );
    }
    for skip in &batch.skipped {
        let _ = writeln!(output, "- {} skipped: {}", skip.target, skip.reason);
    }
    if batch.models.is_empty() && batch.skipped.is_empty() {
        let _ = writeln!(output, "No models fitted.");
    }
}

/// Markdown report over the current response set: consistency statistics,
/// both regression batteries, and the representative model text.
pub fn build_report(responses: &[RawResponse], scheme: &BracketScheme) -> String {
    let payload = summary::summary_payload(responses, scheme);

    let mut output = String::new();
    let _ = writeln!(output, "# Survey Analytics Report");
    let _ = writeln!(
        output,
        "Generated {} over {} responses ({} complete).",
        Utc::now().date_naive(),
        responses.len(),
        payload.n
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Internal Consistency");
    match payload.cronbach_alpha {
        Some(alpha) => {
            let _ = writeln!(output, "- Cronbach's alpha: {alpha:.3}");
        }
        None => {
            let _ = writeln!(output, "- Cronbach's alpha: not defined for this data.");
        }
    }
    match payload.kmo {
        Some(kmo) => {
            let _ = writeln!(output, "- Sampling adequacy (KMO): {kmo:.3}");
        }
        None => {
            let _ = writeln!(output, "- Sampling adequacy (KMO): not defined for this data.");
        }
    }
    if !payload.pca_variance.is_empty() {
        let leading: Vec<String> = payload
            .pca_variance
            .iter()
            .take(3)
            .map(|v| format!("{:.1}%", v * 100.0))
            .collect();
        let _ = writeln!(
            output,
            "- Leading principal components: {}",
            leading.join(", ")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Per-Item Models");
    match regression::per_item_regressions(responses, scheme) {
        Ok(batch) => write_battery(&mut output, &batch),
        Err(err) => {
            let _ = writeln!(output, "Not available: {err}.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Age Bracket Models");
    match regression::per_category_regressions(responses, scheme) {
        Ok(batch) => write_battery(&mut output, &batch),
        Err(err) => {
            let _ = writeln!(output, "Not available: {err}.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Representative Model");
    let _ = writeln!(output, "```");
    output.push_str(payload.regression_summary.trim_end());
    let _ = writeln!(output);
    let _ = writeln!(output, "```");

    output
}

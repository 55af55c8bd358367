use anyhow::Context;
use chrono::Utc;
use clap::ValueEnum;
use rand::distributions::Distribution as _;
use rand::Rng;
use statrs::distribution::Normal;

use crate::models::{BracketScheme, RawResponse};

/// Score distribution for synthetic responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SampleDistribution {
    Normal,
    Uniform,
    Bimodal,
}

fn draw_score<R: Rng>(
    rng: &mut R,
    distribution: SampleDistribution,
    centered: &Normal,
    peaked: &Normal,
) -> f64 {
    let value = match distribution {
        SampleDistribution::Normal => centered.sample(rng),
        SampleDistribution::Uniform => rng.gen_range(-1.0..=1.0),
        SampleDistribution::Bimodal => {
            let offset = if rng.gen_bool(0.5) { 0.5 } else { -0.5 };
            offset + peaked.sample(rng)
        }
    };
    (value.clamp(-1.0, 1.0) * 100.0).round() / 100.0
}

/// Generates `count` synthetic responses with scores clipped to [-1, 1],
/// rounded to two decimals, and a bracket drawn uniformly from the scheme.
pub fn generate(
    count: usize,
    distribution: SampleDistribution,
    scheme: &BracketScheme,
) -> anyhow::Result<Vec<RawResponse>> {
    let centered = Normal::new(0.0, 0.3).context("bad normal parameters")?;
    let peaked = Normal::new(0.0, 0.2).context("bad normal parameters")?;
    let mut rng = rand::thread_rng();

    let responses = (0..count)
        .map(|_| {
            let bracket = &scheme.brackets()[rng.gen_range(0..scheme.brackets().len())];
            let mut scores = [0.0; 6];
            for slot in scores.iter_mut() {
                *slot = draw_score(&mut rng, distribution, &centered, &peaked);
            }
            RawResponse {
                timestamp: Utc::now().to_rfc3339(),
                age_group: Some(bracket.code.clone()),
                q1: Some(scores[0]),
                q2: Some(scores[1]),
                q3: Some(scores[2]),
                q4: Some(scores[3]),
                q5: Some(scores[4]),
                q6: Some(scores[5]),
            }
        })
        .collect();
    Ok(responses)
}

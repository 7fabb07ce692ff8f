//! Scoring simulated reviews against ground truth.

use wss_core::{cosine_similarity, Embedder, GroundTruth, SimulationOutput, WssResult};

use crate::lexicon::{emotions, polarity};
use crate::report::{DataInfo, EvaluationReport, Metrics};

/// Largest possible star difference on a 1-5 scale.
const MAX_STAR_ERROR: f64 = 4.0;

const EMOTION_WEIGHT: f64 = 0.25;
const SENTIMENT_WEIGHT: f64 = 0.25;
const TOPIC_WEIGHT: f64 = 0.5;

/// 1 - mean normalised star error. Errors above 4 stars count as 4.
pub fn preference_estimation(pairs: &[(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let total: f64 = pairs
        .iter()
        .map(|(pred, truth)| (pred - truth).abs().min(MAX_STAR_ERROR) / MAX_STAR_ERROR)
        .sum();
    1.0 - total / pairs.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewErrors {
    pub emotion: f64,
    pub sentiment: f64,
    pub topic: f64,
}

impl ReviewErrors {
    pub fn weighted(&self) -> f64 {
        EMOTION_WEIGHT * self.emotion + SENTIMENT_WEIGHT * self.sentiment + TOPIC_WEIGHT * self.topic
    }
}

/// Error components between a simulated and a real review, each in [0, 1].
pub fn review_errors(
    embedder: &dyn Embedder,
    simulated: &str,
    real: &str,
) -> WssResult<ReviewErrors> {
    if simulated.trim() == real.trim() {
        return Ok(ReviewErrors {
            emotion: 0.0,
            sentiment: 0.0,
            topic: 0.0,
        });
    }

    let sentiment = (polarity(simulated) - polarity(real)).abs() / 2.0;

    let (a, b) = (emotions(simulated), emotions(real));
    let emotion = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum::<f64>() / 2.0;

    let embeddings = embedder.embed_batch(&[simulated, real])?;
    let cos = match embeddings.as_slice() {
        [x, y] => cosine_similarity(x, y) as f64,
        _ => 0.0,
    };
    let topic = (1.0 - cos).clamp(0.0, 1.0);

    Ok(ReviewErrors {
        emotion: emotion.clamp(0.0, 1.0),
        sentiment: sentiment.clamp(0.0, 1.0),
        topic,
    })
}

/// Pair outputs with ground truth by position and compute the payload.
pub fn evaluate(
    embedder: &dyn Embedder,
    outputs: &[SimulationOutput],
    groundtruth: &[GroundTruth],
) -> WssResult<EvaluationReport> {
    let evaluated = outputs.len().min(groundtruth.len());
    let data_info = DataInfo {
        evaluated_count: evaluated,
        original_simulation_count: outputs.len(),
        original_ground_truth_count: groundtruth.len(),
    };
    if evaluated == 0 {
        return Ok(EvaluationReport::new(Metrics::default(), data_info));
    }

    let pairs: Vec<(f64, f64)> = outputs
        .iter()
        .zip(groundtruth)
        .map(|(o, g)| (o.stars, g.stars))
        .collect();
    let preference = preference_estimation(&pairs);

    let mut review_error = 0.0;
    for (o, g) in outputs.iter().zip(groundtruth) {
        review_error += review_errors(embedder, &o.review, &g.review)?.weighted();
    }
    let review = 1.0 - review_error / evaluated as f64;

    Ok(EvaluationReport::new(
        Metrics {
            preference_estimation: preference,
            review_generation: review,
            overall_quality: (preference + review) / 2.0,
        },
        data_info,
    ))
}

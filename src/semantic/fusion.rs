//! Scoring helpers: cosine similarity, score normalization and weighted
//! fusion of text and image similarities.

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;

/// Relative weight of the two modalities. Not required to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub text: f32,
    pub image: f32,
}

impl SimilarityWeights {
    pub const fn new(text: f32, image: f32) -> Self {
        Self { text, image }
    }

    pub fn is_finite(&self) -> bool {
        self.text.is_finite() && self.image.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    MinMax,
    ZScore,
    /// Scores pass through unchanged. Also used for unknown method names.
    #[default]
    #[serde(other)]
    None,
}

impl From<&str> for Normalization {
    fn from(method: &str) -> Self {
        match method.trim().to_lowercase().as_str() {
            "minmax" => Normalization::MinMax,
            "zscore" => Normalization::ZScore,
            _ => Normalization::None,
        }
    }
}

/// Which weight set an item is scored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteClass {
    ImageFocused,
    DocFocused,
    Default,
}

/// Cosine of the angle between `a` and `b`. Zero for empty vectors, vectors of
/// different lengths, and zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Rescale `scores` into [0, 1]. A batch without spread maps to all zeros.
pub fn normalize(scores: &[f32], method: Normalization) -> Vec<f32> {
    match method {
        Normalization::None => scores.to_vec(),
        Normalization::MinMax => min_max(scores),
        Normalization::ZScore => {
            if scores.is_empty() {
                return Vec::new();
            }
            let n = scores.len() as f32;
            let mean = scores.iter().sum::<f32>() / n;
            let std = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n).sqrt();
            if std == 0.0 {
                return vec![0.0; scores.len()];
            }
            let standardized: Vec<f32> = scores.iter().map(|s| (s - mean) / std).collect();
            min_max(&standardized)
        }
    }
}

fn min_max(scores: &[f32]) -> Vec<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == min {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Combine the two similarities. A modality that is missing contributes
/// nothing; with both missing the score is zero.
pub fn fuse(
    text_sim: f32,
    image_sim: f32,
    weights: SimilarityWeights,
    has_text: bool,
    has_image: bool,
) -> f32 {
    match (has_text, has_image) {
        (true, true) => weights.text * text_sim + weights.image * image_sim,
        (true, false) => text_sim,
        (false, true) => image_sim,
        (false, false) => 0.0,
    }
}

/// Classify an item by URL and site name and pick its weights. Image-focused
/// sites are checked first.
pub fn select_weights(
    config: &FusionConfig,
    url: &str,
    site_name: &str,
) -> (SiteClass, SimilarityWeights) {
    let inputs = [url, site_name];
    if config.image_focused_sites.is_match(&inputs) {
        (SiteClass::ImageFocused, config.image_focused_weights)
    } else if config.doc_focused_sites.is_match(&inputs) {
        (SiteClass::DocFocused, config.doc_focused_weights)
    } else {
        (SiteClass::Default, config.default_weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn cosine_basics() {
        let v = [0.3, -1.2, 4.0];
        assert!(close(cosine_similarity(&v, &v), 1.0));
        assert!(close(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
        assert!(close(cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]), -1.0));
    }

    #[test]
    fn cosine_degenerate_inputs_are_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn minmax_scales_to_unit_range() {
        let out = normalize(&[2.0, 4.0, 6.0], Normalization::MinMax);
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
        assert_eq!(normalize(&[3.0, 3.0], Normalization::MinMax), vec![0.0, 0.0]);
    }

    #[test]
    fn zscore_is_rescaled_to_unit_range() {
        let out = normalize(&[1.0, 2.0, 3.0], Normalization::ZScore);
        assert!(close(out[0], 0.0));
        assert!(close(out[1], 0.5));
        assert!(close(out[2], 1.0));

        let out = normalize(&[0.1, 0.1, 0.4], Normalization::ZScore);
        assert!(close(out[0], 0.0) && close(out[1], 0.0));
        assert!(close(out[2], 1.0));
        assert_eq!(normalize(&[7.0, 7.0, 7.0], Normalization::ZScore), vec![0.0; 3]);
    }

    #[test]
    fn unknown_method_is_passthrough() {
        let scores = [0.2, 0.9];
        assert_eq!(normalize(&scores, Normalization::from("softmax")), scores.to_vec());
        assert_eq!(Normalization::from("MinMax"), Normalization::MinMax);
        let parsed: Normalization = serde_yml::from_str("softmax").unwrap();
        assert_eq!(parsed, Normalization::None);
    }

    #[test]
    fn normalization_names_round_trip_through_yaml() {
        let parsed: Normalization = serde_yml::from_str("zscore").unwrap();
        assert_eq!(parsed, Normalization::ZScore);
        assert_eq!(Normalization::default(), Normalization::None);
        assert_eq!(serde_yml::to_string(&Normalization::None).unwrap().trim(), "none");
    }

    #[test]
    fn empty_scores_stay_empty() {
        for method in [Normalization::None, Normalization::MinMax, Normalization::ZScore] {
            assert!(normalize(&[], method).is_empty());
        }
    }

    #[test]
    fn fuse_cases() {
        let w = SimilarityWeights::new(0.6, 0.4);
        assert!(close(fuse(0.8, 0.6, w, true, true), 0.72));
        assert!(close(fuse(0.8, 0.6, w, true, false), 0.8));
        assert!(close(fuse(0.8, 0.6, w, false, true), 0.6));
        assert_eq!(fuse(0.8, 0.6, w, false, false), 0.0);
    }

    #[test]
    fn weights_follow_site_class() {
        let config = FusionConfig::default();
        let (class, w) = select_weights(&config, "https://www.pinterest.com/pin/1", "");
        assert_eq!(class, SiteClass::ImageFocused);
        assert_eq!(w, SimilarityWeights::new(0.1, 0.9));

        let (class, w) = select_weights(&config, "https://example.com/a", "Acme Blog");
        assert_eq!(class, SiteClass::DocFocused);
        assert_eq!(w, SimilarityWeights::new(0.7, 0.3));

        let (class, w) = select_weights(&config, "https://example.com/a", "");
        assert_eq!(class, SiteClass::Default);
        assert_eq!(w, SimilarityWeights::new(0.4, 0.6));
    }
}

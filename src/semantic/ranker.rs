use std::sync::Arc;
use std::thread::sleep;

use serde::{Deserialize, Serialize};

use super::embeddings::{Embedder, EmbeddingVector, Modality};
use super::fusion::{cosine_similarity, fuse, normalize, select_weights, Normalization, SiteClass};
use super::preprocess::preprocess_content;
use crate::acquire::AcquisitionResult;
use crate::config::{EmbeddingConfig, FusionConfig};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("query has neither text nor image")]
    EmptyQuery,

    #[error("query could not be embedded")]
    QueryEmbedding,
}

/// An acquired page plus any vectors computed for it earlier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusItem {
    #[serde(flatten)]
    pub result: AcquisitionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
}

impl From<AcquisitionResult> for CorpusItem {
    fn from(result: AcquisitionResult) -> Self {
        Self {
            result,
            text_embedding: None,
            image_embedding: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemVectors {
    pub text: Option<EmbeddingVector>,
    pub image: Option<EmbeddingVector>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryVectors {
    pub text: Option<EmbeddingVector>,
    pub image: Option<EmbeddingVector>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub site_name: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_similarity: Option<f32>,
    pub site_class: SiteClass,
}

pub struct SearchRanker {
    embedder: Arc<dyn Embedder>,
    embedding: EmbeddingConfig,
    fusion: FusionConfig,
}

impl SearchRanker {
    pub fn new(embedder: Arc<dyn Embedder>, embedding: EmbeddingConfig, fusion: FusionConfig) -> Self {
        Self {
            embedder,
            embedding,
            fusion,
        }
    }

    /// Embed the query, embed whatever the corpus is missing, and rank.
    pub fn search(
        &self,
        query_text: Option<&str>,
        query_image: Option<&str>,
        corpus: &[CorpusItem],
        top_k: usize,
    ) -> Result<Vec<RankedResult>, SearchError> {
        let query = self.embed_query(query_text, query_image)?;
        let vectors = self.embed_corpus(corpus);
        Ok(self.rank(&query, corpus, &vectors, top_k))
    }

    pub fn embed_query(
        &self,
        text: Option<&str>,
        image: Option<&str>,
    ) -> Result<QueryVectors, SearchError> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let image = image.map(str::trim).filter(|i| !i.is_empty());
        if text.is_none() && image.is_none() {
            return Err(SearchError::EmptyQuery);
        }

        let mut query = QueryVectors::default();
        if let Some(text) = text {
            query.text = self.embed(Modality::Text, "query", text, self.embedding.query_delay());
        }
        if let Some(image) = image {
            query.image = self.embed(Modality::Image, "query", image, self.embedding.query_delay());
        }

        if query.text.is_none() && query.image.is_none() {
            return Err(SearchError::QueryEmbedding);
        }
        Ok(query)
    }

    /// Vectors for every item, in corpus order. Precomputed vectors are used
    /// as-is; the rest are requested in batches with a pause after each call.
    pub fn embed_corpus(&self, corpus: &[CorpusItem]) -> Vec<ItemVectors> {
        let mut out = Vec::with_capacity(corpus.len());
        let delay = self.embedding.embed_delay();

        for (batch_no, batch) in corpus.chunks(self.embedding.batch_size.max(1)).enumerate() {
            log::debug!("embedding batch {} ({} items)", batch_no + 1, batch.len());

            for item in batch {
                let url = item.result.url.as_str();

                let text = match &item.text_embedding {
                    Some(values) => Some(EmbeddingVector::new(Modality::Text, url, values.clone())),
                    None => preprocess_content(&item.result.title, &item.result.description)
                        .and_then(|content| self.embed(Modality::Text, url, &content, delay)),
                };

                let image = match &item.image_embedding {
                    Some(values) => Some(EmbeddingVector::new(Modality::Image, url, values.clone())),
                    None if !item.result.image.trim().is_empty() => {
                        self.embed(Modality::Image, url, &item.result.image, delay)
                    }
                    None => None,
                };

                out.push(ItemVectors { text, image });
            }
        }

        out
    }

    /// Score `corpus` against `query`, best first. Ties keep corpus order.
    ///
    /// With a single query modality that vector is compared against both item
    /// modalities, since text and images share one space.
    pub fn rank(
        &self,
        query: &QueryVectors,
        corpus: &[CorpusItem],
        vectors: &[ItemVectors],
        top_k: usize,
    ) -> Vec<RankedResult> {
        let text_probe = query.text.as_ref().or(query.image.as_ref());
        let image_probe = query.image.as_ref().or(query.text.as_ref());

        // Only a missing vector makes a modality absent. A vector that cannot be
        // compared still counts, with similarity 0.
        let similarity = |probe: Option<&EmbeddingVector>, item: Option<&EmbeddingVector>| {
            let (probe, item) = (probe?, item?);
            if let Err(err) = item.check_dimensions(probe.values.len()) {
                log::warn!("{}: {:?} vector scored as 0: {err}", item.owner, item.modality);
                return Some(0.0);
            }
            if !item.is_finite() || !probe.is_finite() {
                log::warn!("{}: {:?} vector has non-finite values, scored as 0", item.owner, item.modality);
                return Some(0.0);
            }
            Some(cosine_similarity(&probe.values, &item.values))
        };

        let mut text_sims: Vec<Option<f32>> = Vec::with_capacity(corpus.len());
        let mut image_sims: Vec<Option<f32>> = Vec::with_capacity(corpus.len());
        for item in vectors.iter().take(corpus.len()) {
            text_sims.push(similarity(text_probe, item.text.as_ref()));
            image_sims.push(similarity(image_probe, item.image.as_ref()));
        }
        text_sims.resize(corpus.len(), None);
        image_sims.resize(corpus.len(), None);

        normalize_present(&mut text_sims, self.fusion.normalization);
        normalize_present(&mut image_sims, self.fusion.normalization);

        let mut ranked: Vec<RankedResult> = corpus
            .iter()
            .zip(text_sims.into_iter().zip(image_sims))
            .map(|(item, (text_sim, image_sim))| {
                let r = &item.result;
                let (site_class, weights) = select_weights(&self.fusion, &r.url, &r.site_name);
                let score = fuse(
                    text_sim.unwrap_or(0.0),
                    image_sim.unwrap_or(0.0),
                    weights,
                    text_sim.is_some(),
                    image_sim.is_some(),
                );

                RankedResult {
                    url: r.url.clone(),
                    title: r.title.clone(),
                    description: r.description.clone(),
                    image: r.image.clone(),
                    site_name: r.site_name.clone(),
                    score,
                    text_similarity: text_sim,
                    image_similarity: image_sim,
                    site_class,
                }
            })
            .collect();

        // stable, so equal scores keep corpus order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);
        ranked
    }

    fn embed(
        &self,
        modality: Modality,
        owner: &str,
        input: &str,
        delay: std::time::Duration,
    ) -> Option<EmbeddingVector> {
        let values = match modality {
            Modality::Text => self.embedder.embed_text(input),
            Modality::Image => self.embedder.embed_image(input),
        };
        if !delay.is_zero() {
            sleep(delay);
        }
        values.map(|values| EmbeddingVector::new(modality, owner, values))
    }
}

/// Normalize the present similarities across the corpus, leaving gaps alone.
fn normalize_present(sims: &mut [Option<f32>], method: Normalization) {
    if method == Normalization::None {
        return;
    }

    let present: Vec<f32> = sims.iter().flatten().copied().collect();
    let mut normalized = normalize(&present, method).into_iter();
    for sim in sims.iter_mut().filter(|s| s.is_some()) {
        *sim = normalized.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, site: &str) -> CorpusItem {
        CorpusItem {
            result: AcquisitionResult {
                site_name: site.to_string(),
                title: url.to_string(),
                ..AcquisitionResult::failure(url, "unused")
            },
            text_embedding: None,
            image_embedding: None,
        }
    }

    fn vectors(text: Option<Vec<f32>>, image: Option<Vec<f32>>) -> ItemVectors {
        ItemVectors {
            text: text.map(|v| EmbeddingVector::new(Modality::Text, "item", v)),
            image: image.map(|v| EmbeddingVector::new(Modality::Image, "item", v)),
        }
    }

    struct NoEmbedder;

    impl Embedder for NoEmbedder {
        fn embed_text(&self, _text: &str) -> Option<Vec<f32>> {
            None
        }

        fn embed_image(&self, _image: &str) -> Option<Vec<f32>> {
            None
        }
    }

    fn ranker(fusion: FusionConfig) -> SearchRanker {
        SearchRanker::new(Arc::new(NoEmbedder), EmbeddingConfig::default(), fusion)
    }

    fn text_query(v: Vec<f32>) -> QueryVectors {
        QueryVectors {
            text: Some(EmbeddingVector::new(Modality::Text, "query", v)),
            image: None,
        }
    }

    #[test]
    fn ranks_by_fused_score() {
        let corpus = vec![item("https://a.example", ""), item("https://b.example", "")];
        let vecs = vec![
            vectors(Some(vec![0.0, 1.0]), None),
            vectors(Some(vec![1.0, 0.0]), None),
        ];
        let ranked = ranker(FusionConfig::default()).rank(&text_query(vec![1.0, 0.0]), &corpus, &vecs, 10);
        assert_eq!(ranked[0].url, "https://b.example");
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn ties_keep_corpus_order_and_top_k_applies() {
        let corpus: Vec<_> = (0..5).map(|i| item(&format!("https://{i}.example"), "")).collect();
        let vecs: Vec<_> = (0..5).map(|_| vectors(Some(vec![1.0, 1.0]), None)).collect();
        let ranked = ranker(FusionConfig::default()).rank(&text_query(vec![1.0, 1.0]), &corpus, &vecs, 3);
        let urls: Vec<_> = ranked.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["https://0.example", "https://1.example", "https://2.example"]);
    }

    #[test]
    fn text_query_reaches_image_vectors() {
        let corpus = vec![item("https://example.com", "")];
        let vecs = vec![vectors(Some(vec![1.0, 0.0]), Some(vec![0.0, 1.0]))];
        let ranked = ranker(FusionConfig::default()).rank(&text_query(vec![1.0, 0.0]), &corpus, &vecs, 1);
        // default weights 0.4 text, 0.6 image
        assert!((ranked[0].score - 0.4).abs() < 1e-6);
        assert_eq!(ranked[0].image_similarity, Some(0.0));
    }

    #[test]
    fn site_class_changes_weights() {
        let corpus = vec![
            item("https://www.pinterest.com/pin/1", ""),
            item("https://example.com/docs/x", ""),
        ];
        let both = || vectors(Some(vec![1.0, 0.0]), Some(vec![0.0, 1.0]));
        let query = QueryVectors {
            text: Some(EmbeddingVector::new(Modality::Text, "query", vec![1.0, 0.0])),
            image: Some(EmbeddingVector::new(Modality::Image, "query", vec![1.0, 0.0])),
        };
        let ranked = ranker(FusionConfig::default()).rank(&query, &corpus, &[both(), both()], 10);
        // text matches perfectly, so the doc-focused item wins
        assert_eq!(ranked[0].site_class, SiteClass::DocFocused);
        assert!((ranked[0].score - 0.7).abs() < 1e-6);
        assert_eq!(ranked[1].site_class, SiteClass::ImageFocused);
        assert!((ranked[1].score - 0.1).abs() < 1e-6);
    }

    #[test]
    fn items_without_vectors_score_zero() {
        let corpus = vec![item("https://a.example", ""), item("https://b.example", "")];
        let vecs = vec![ItemVectors::default(), vectors(Some(vec![0.5, 0.5]), None)];
        let ranked = ranker(FusionConfig::default()).rank(&text_query(vec![1.0, 1.0]), &corpus, &vecs, 10);
        assert_eq!(ranked[0].url, "https://b.example");
        assert_eq!(ranked[1].score, 0.0);
        assert_eq!(ranked[1].text_similarity, None);
    }

    fn both_query(v: Vec<f32>) -> QueryVectors {
        QueryVectors {
            text: Some(EmbeddingVector::new(Modality::Text, "query", v.clone())),
            image: Some(EmbeddingVector::new(Modality::Image, "query", v)),
        }
    }

    #[test]
    fn mismatched_dimensions_score_zero() {
        let corpus = vec![item("https://a.example", "")];
        let vecs = vec![vectors(Some(vec![1.0, 0.0, 0.0]), None)];
        let ranked = ranker(FusionConfig::default()).rank(&text_query(vec![1.0, 0.0]), &corpus, &vecs, 10);
        assert_eq!(ranked[0].text_similarity, Some(0.0));
        assert_eq!(ranked[0].score, 0.0);
    }

    #[test]
    fn mismatched_vector_is_still_weighted() {
        let corpus = vec![item("https://a.example", ""), item("https://b.example", "")];
        let vecs = vec![
            // text has the wrong length, image similarity 0.8
            vectors(Some(vec![1.0, 0.0, 0.0]), Some(vec![0.8, 0.6])),
            // text similarity 0.5, image similarity 0.6
            vectors(Some(vec![0.5, 0.75f32.sqrt()]), Some(vec![0.6, 0.8])),
        ];
        let ranked = ranker(FusionConfig::default()).rank(&both_query(vec![1.0, 0.0]), &corpus, &vecs, 10);

        assert_eq!(ranked[0].url, "https://b.example");
        assert!((ranked[0].score - 0.56).abs() < 1e-5);
        assert_eq!(ranked[1].url, "https://a.example");
        assert!((ranked[1].score - 0.48).abs() < 1e-5);
        assert_eq!(ranked[1].text_similarity, Some(0.0));
    }

    #[test]
    fn non_finite_vectors_never_lead() {
        let corpus = vec![
            item("https://a.example", ""),
            item("https://b.example", ""),
            item("https://c.example", ""),
        ];
        let vecs = vec![
            vectors(Some(vec![f32::INFINITY, 0.0]), None),
            vectors(Some(vec![f32::NAN, 1.0]), None),
            vectors(Some(vec![1.0, 0.0]), None),
        ];
        let ranked = ranker(FusionConfig::default()).rank(&text_query(vec![1.0, 0.0]), &corpus, &vecs, 10);

        assert_eq!(ranked[0].url, "https://c.example");
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
        assert!(ranked.iter().all(|r| r.score.is_finite()));
        assert_eq!(ranked[1].score, 0.0);
        assert_eq!(ranked[2].score, 0.0);
    }

    #[test]
    fn out_of_range_corpus_value_is_scored_as_zero() {
        let json = r#"[
            {"url": "https://a.example", "success": true, "text_embedding": [1e39, 0.0]},
            {"url": "https://c.example", "success": true, "text_embedding": [1.0, 0.0]}
        ]"#;
        let corpus: Vec<CorpusItem> = serde_json::from_str(json).unwrap();
        assert!(corpus[0].text_embedding.as_ref().unwrap()[0].is_infinite());
        let vecs: Vec<_> = corpus
            .iter()
            .map(|c| vectors(c.text_embedding.clone(), None))
            .collect();
        let ranked = ranker(FusionConfig::default()).rank(&text_query(vec![1.0, 0.0]), &corpus, &vecs, 10);
        assert_eq!(ranked[0].url, "https://c.example");
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn minmax_normalizes_across_corpus() {
        let fusion = FusionConfig {
            normalization: Normalization::MinMax,
            ..Default::default()
        };
        let corpus = vec![item("https://a.example", ""), item("https://b.example", "")];
        let vecs = vec![
            vectors(Some(vec![1.0, 1.0]), None),
            vectors(Some(vec![1.0, 0.0]), None),
        ];
        let ranked = ranker(fusion).rank(&text_query(vec![1.0, 0.0]), &corpus, &vecs, 10);
        assert_eq!(ranked[0].text_similarity, Some(1.0));
        assert_eq!(ranked[1].text_similarity, Some(0.0));
    }

    #[test]
    fn empty_query_is_rejected() {
        let r = ranker(FusionConfig::default());
        assert!(matches!(r.embed_query(None, Some("  ")), Err(SearchError::EmptyQuery)));
        assert!(matches!(
            r.embed_query(Some("rust"), None),
            Err(SearchError::QueryEmbedding)
        ));
    }

    #[test]
    fn empty_corpus_ranks_nothing() {
        let ranked = ranker(FusionConfig::default()).rank(&text_query(vec![1.0]), &[], &[], 10);
        assert!(ranked.is_empty());
    }
}

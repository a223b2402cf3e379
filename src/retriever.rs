use tracing::debug;

use crate::embeddings::Embedder;
use crate::error::Result;
use crate::splitter::Chunk;
use crate::vector_db::{ScoredChunk, VectorIndex};

/// Retrieval with a session default breadth over a shared, read-only index.
pub struct Retriever<E> {
    index: VectorIndex<E>,
    default_k: usize,
    score_threshold: Option<f32>,
}

impl<E: Embedder> Retriever<E> {
    pub fn new(index: VectorIndex<E>, default_k: usize) -> Self {
        Retriever {
            index,
            default_k,
            score_threshold: None,
        }
    }

    /// Drop hits scoring below `threshold`.
    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn index(&self) -> &VectorIndex<E> {
        &self.index
    }

    /// `k` overrides the default for this call only.
    pub fn effective_k(&self, k: Option<usize>) -> usize {
        k.unwrap_or(self.default_k)
    }

    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        let k = self.effective_k(k);
        let mut hits = self.index.search(query, k).await?;
        if let Some(threshold) = self.score_threshold {
            hits.retain(|hit| hit.score >= threshold);
        }
        debug!("Retrieved {} chunks (k = {})", hits.len(), k);
        Ok(hits)
    }

    /// Chunks only, best first.
    pub async fn retrieve_chunks(&self, query: &str, k: Option<usize>) -> Result<Vec<Chunk>> {
        match self.score_threshold {
            None => self.index.retrieve(query, self.effective_k(k)).await,
            Some(_) => Ok(self
                .retrieve(query, k)
                .await?
                .into_iter()
                .map(|hit| hit.chunk)
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::loader::DocumentMetadata;
    use crate::vector_db::SimilarityMetric;

    async fn retriever(default_k: usize) -> anyhow::Result<Retriever<HashingEmbedder>> {
        let chunks = ["Sleep well.", "Drink water.", "Walk daily.", "Eat greens."]
            .iter()
            .map(|text| Chunk {
                text: text.to_string(),
                metadata: DocumentMetadata {
                    source: "tips.txt".to_string(),
                    file_path: "docs/tips.txt".to_string(),
                    page: None,
                },
            })
            .collect();
        let index = VectorIndex::build(chunks, HashingEmbedder::new(4096), SimilarityMetric::Cosine).await?;
        Ok(Retriever::new(index, default_k))
    }

    #[tokio::test]
    async fn test_default_and_override_k() -> anyhow::Result<()> {
        let retriever = retriever(2).await?;
        assert_eq!(retriever.retrieve("water", None).await?.len(), 2);
        assert_eq!(retriever.retrieve("water", Some(3)).await?.len(), 3);
        // The override does not stick.
        assert_eq!(retriever.default_k(), 2);
        assert_eq!(retriever.retrieve("water", None).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_threshold_filters_weak_hits() -> anyhow::Result<()> {
        let retriever = retriever(4).await?.with_score_threshold(Some(0.5));
        let hits = retriever.retrieve("drink water", None).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "Drink water.");
        Ok(())
    }

    #[tokio::test]
    async fn test_chunks_follow_scored_order() -> anyhow::Result<()> {
        let retriever = retriever(3).await?;
        let scored: Vec<Chunk> = retriever
            .retrieve("walk and water", None)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();
        assert_eq!(retriever.retrieve_chunks("walk and water", None).await?, scored);

        let strict = retriever.with_score_threshold(Some(0.5));
        let chunks = strict.retrieve_chunks("drink water", Some(4)).await?;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Drink water.");
        Ok(())
    }
}

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use crate::splitter::Chunk;
use crate::utils::{dir_has_entries, ensure_dir};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl SimilarityMetric {
    /// Higher is more similar for every metric.
    pub fn score(&self, a: &Array1<f32>, b: &Array1<f32>) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::Euclidean => {
                let diff = a - b;
                -diff.dot(&diff).sqrt()
            }
        }
    }
}

fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    let dot_product = a.dot(b);
    let norm_a = (a.dot(a)).sqrt();
    let norm_b = (b.dot(b)).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub vector: Array1<f32>,
    pub chunk: Chunk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// On-disk layout of the index file.
#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    embedding_model: String,
    metric: SimilarityMetric,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// Flat in-memory index searched exhaustively. Read-only once built.
pub struct VectorIndex<E> {
    embedder: E,
    metric: SimilarityMetric,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// Removes a persisted index so the next start rebuilds it. Returns whether a
/// file was there.
pub fn discard_persisted(persist_path: &Path) -> Result<bool> {
    if persist_path.is_file() {
        fs::remove_file(persist_path)?;
        info!("Removed persisted index {}", persist_path.display());
        return Ok(true);
    }
    Ok(false)
}

/// Directory holding the index file; a bare file name lives in `.`.
fn index_dir(persist_path: &Path) -> &Path {
    persist_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

impl<E: Embedder> VectorIndex<E> {
    /// Embeds every chunk and builds the index in memory.
    pub async fn build(chunks: Vec<Chunk>, embedder: E, metric: SimilarityMetric) -> Result<Self> {
        info!(
            "Embedding {} chunks with {}",
            chunks.len(),
            embedder.model_id()
        );

        let mut entries = Vec::with_capacity(chunks.len());
        let mut dimension = 0;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let vector = Array1::from(embedder.embed(&chunk.text).await?);
            if i == 0 {
                dimension = vector.len();
            } else if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            debug!("Embedded chunk {} from {}", i + 1, chunk.metadata.source);
            entries.push(IndexEntry {
                id: Uuid::new_v4(),
                vector,
                chunk,
            });
        }

        Ok(Self {
            embedder,
            metric,
            dimension,
            entries,
        })
    }

    /// Loads the index at `persist_path` when its directory already holds
    /// anything; otherwise builds from `chunks` and writes it there.
    pub async fn build_or_load(
        chunks: Vec<Chunk>,
        persist_path: &Path,
        embedder: E,
        metric: SimilarityMetric,
    ) -> Result<Self> {
        let parent = index_dir(persist_path);
        if dir_has_entries(parent)? {
            info!("Loading vector index from {}", persist_path.display());
            return Self::load(persist_path, embedder, metric);
        }

        info!("Building vector index");
        let index = Self::build(chunks, embedder, metric).await?;
        ensure_dir(parent)?;
        index.persist(persist_path)?;
        Ok(index)
    }

    pub fn load(persist_path: &Path, embedder: E, metric: SimilarityMetric) -> Result<Self> {
        let load_error = |reason: String| RagError::IndexLoad {
            path: persist_path.to_path_buf(),
            reason,
        };

        let file = File::open(persist_path).map_err(|e| load_error(e.to_string()))?;
        let persisted: PersistedIndex = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| load_error(e.to_string()))?;

        if let Some(bad) = persisted
            .entries
            .iter()
            .find(|entry| entry.vector.len() != persisted.dimension)
        {
            return Err(load_error(format!(
                "entry {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                persisted.dimension
            )));
        }

        if persisted.embedding_model != embedder.model_id() {
            warn!(
                "Index was built with embedding model {}, now using {}",
                persisted.embedding_model,
                embedder.model_id()
            );
        }
        if persisted.metric != metric {
            warn!(
                "Index was built for {:?} similarity, keeping it instead of {:?}",
                persisted.metric, metric
            );
        }

        info!("Loaded {} index entries", persisted.entries.len());
        Ok(Self {
            embedder,
            metric: persisted.metric,
            dimension: persisted.dimension,
            entries: persisted.entries,
        })
    }

    pub fn persist(&self, persist_path: &Path) -> Result<()> {
        let persisted = PersistedIndex {
            embedding_model: self.embedder.model_id().to_string(),
            metric: self.metric,
            dimension: self.dimension,
            entries: self.entries.clone(),
        };
        let writer = BufWriter::new(File::create(persist_path)?);
        serde_json::to_writer(writer, &persisted)?;
        info!("Persisted vector index to {}", persist_path.display());
        Ok(())
    }

    /// Top `k` chunks for `query`, best first; ties keep insertion order.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = Array1::from(self.embedder.embed(query).await?);
        if query_vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (self.metric.score(&entry.vector, &query_vector), entry))
            .collect();

        // `sort_by` is stable, so equal scores stay in insertion order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect())
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .search(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::loader::DocumentMetadata;
    use std::cell::Cell;
    use tempfile::tempdir;

    /// Counts calls so tests can tell whether the build path ran.
    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: Cell<usize>,
    }

    impl CountingEmbedder {
        fn new(dimension: usize) -> Self {
            Self {
                inner: HashingEmbedder::new(dimension),
                calls: Cell::new(0),
            }
        }
    }

    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.set(self.calls.get() + 1);
            self.inner.embed(text).await
        }
    }

    fn chunk(text: &str, source: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                file_path: format!("docs/{source}"),
                page: None,
            },
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("Sleep 8 hours nightly for recovery.", "sleep.txt"),
            chunk("Drink water throughout the day to stay hydrated.", "water.txt"),
            chunk("Walk thirty minutes daily for heart health.", "walk.txt"),
            chunk("A regular sleep schedule improves sleep quality.", "sleep2.txt"),
            chunk("Vegetables and fruit provide fibre and vitamins.", "food.txt"),
        ]
    }

    #[tokio::test]
    async fn test_single_chunk_scenario() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("vectorstore").join("vectorstore.json");
        let only = chunk("Sleep 8 hours nightly for recovery.", "sleep.txt");
        let index = VectorIndex::build_or_load(
            vec![only.clone()],
            &path,
            HashingEmbedder::new(64),
            SimilarityMetric::Cosine,
        )
        .await?;

        let hits = index.retrieve("sleep advice", 1).await?;
        assert_eq!(hits, vec![only]);
        assert!(path.is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_build_then_load_is_idempotent() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("store").join("vectorstore.json");

        let built = VectorIndex::build_or_load(
            corpus(),
            &path,
            CountingEmbedder::new(128),
            SimilarityMetric::Cosine,
        )
        .await?;
        assert_eq!(built.embedder().calls.get(), 5);
        let bytes_before = fs::read(&path)?;

        let loaded = VectorIndex::build_or_load(
            Vec::new(),
            &path,
            CountingEmbedder::new(128),
            SimilarityMetric::Cosine,
        )
        .await?;
        assert_eq!(loaded.embedder().calls.get(), 0);
        assert_eq!(loaded.len(), 5);
        assert_eq!(fs::read(&path)?, bytes_before);

        for query in ["how much sleep", "hydration", "exercise for the heart"] {
            assert_eq!(built.search(query, 3).await?, loaded.search(query, 3).await?);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_bare_file_name_is_reused() -> anyhow::Result<()> {
        assert_eq!(index_dir(Path::new("vectorstore.json")), Path::new("."));
        assert_eq!(index_dir(Path::new("store/vectorstore.json")), Path::new("store"));

        let dir = tempdir()?;
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir.path())?;
        let path = Path::new("vectorstore.json");

        let outcome = async {
            VectorIndex::build_or_load(
                corpus(),
                path,
                CountingEmbedder::new(32),
                SimilarityMetric::Cosine,
            )
            .await?;
            let bytes_before = fs::read(path)?;

            let loaded = VectorIndex::build_or_load(
                corpus(),
                path,
                CountingEmbedder::new(32),
                SimilarityMetric::Cosine,
            )
            .await?;
            anyhow::Ok((bytes_before, fs::read(path)?, loaded.embedder().calls.get()))
        }
        .await;
        std::env::set_current_dir(previous)?;

        let (bytes_before, bytes_after, calls) = outcome?;
        assert_eq!(bytes_after, bytes_before);
        assert_eq!(calls, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_never_more_than_k() -> anyhow::Result<()> {
        let index =
            VectorIndex::build(corpus(), HashingEmbedder::new(64), SimilarityMetric::Cosine).await?;
        assert_eq!(index.retrieve("sleep", 3).await?.len(), 3);
        assert_eq!(index.retrieve("sleep", 5).await?.len(), 5);
        assert_eq!(index.retrieve("sleep", 50).await?.len(), 5);
        assert!(index.retrieve("sleep", 0).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_results_ordered_by_score() -> anyhow::Result<()> {
        let index =
            VectorIndex::build(corpus(), HashingEmbedder::new(1024), SimilarityMetric::Cosine).await?;
        let hits = index.search("sleep quality and schedule", 5).await?;
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].chunk.metadata.source, "sleep2.txt");
        Ok(())
    }

    #[tokio::test]
    async fn test_smaller_k_is_prefix_of_larger_k() -> anyhow::Result<()> {
        let index =
            VectorIndex::build(corpus(), HashingEmbedder::new(64), SimilarityMetric::Cosine).await?;
        let three = index.retrieve("water and sleep", 3).await?;
        let five = index.retrieve("water and sleep", 5).await?;
        assert_eq!(three[..], five[..3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() -> anyhow::Result<()> {
        let chunks = vec![
            chunk("Stretch after waking.", "first.txt"),
            chunk("Stretch after waking.", "second.txt"),
            chunk("Stretch after waking.", "third.txt"),
        ];
        let index =
            VectorIndex::build(chunks, HashingEmbedder::new(32), SimilarityMetric::Cosine).await?;
        let sources: Vec<_> = index
            .retrieve("stretch", 3)
            .await?
            .into_iter()
            .map(|c| c.metadata.source)
            .collect();
        assert_eq!(sources, vec!["first.txt", "second.txt", "third.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing_without_embedding() -> anyhow::Result<()> {
        let index =
            VectorIndex::build(Vec::new(), CountingEmbedder::new(16), SimilarityMetric::Cosine)
                .await?;
        assert!(index.is_empty());
        assert!(index.retrieve("anything", 4).await?.is_empty());
        assert_eq!(index.embedder().calls.get(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_euclidean_prefers_closest() -> anyhow::Result<()> {
        let index = VectorIndex::build(
            corpus(),
            HashingEmbedder::new(1024),
            SimilarityMetric::Euclidean,
        )
        .await?;
        let hits = index.search("Drink water throughout the day to stay hydrated.", 2).await?;
        assert_eq!(hits[0].chunk.metadata.source, "water.txt");
        assert!(hits[0].score.abs() < 1e-5);
        assert!(hits[0].score >= hits[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn test_persisted_metric_wins() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("vectorstore.json");
        let built = VectorIndex::build(corpus(), HashingEmbedder::new(32), SimilarityMetric::Euclidean)
            .await?;
        built.persist(&path)?;

        let loaded = VectorIndex::load(&path, HashingEmbedder::new(32), SimilarityMetric::Cosine)?;
        assert_eq!(loaded.metric(), SimilarityMetric::Euclidean);
        Ok(())
    }

    #[tokio::test]
    async fn test_dimension_mismatch_on_query() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("vectorstore.json");
        VectorIndex::build(corpus(), HashingEmbedder::new(32), SimilarityMetric::Cosine)
            .await?
            .persist(&path)?;

        let loaded = VectorIndex::load(&path, HashingEmbedder::new(64), SimilarityMetric::Cosine)?;
        let err = loaded.search("sleep", 2).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 32,
                actual: 64
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_non_empty_dir_without_index_is_fatal() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("stray.txt"), "left over")?;
        let path = dir.path().join("vectorstore.json");

        let result = VectorIndex::build_or_load(
            corpus(),
            &path,
            HashingEmbedder::new(16),
            SimilarityMetric::Cosine,
        )
        .await;
        assert!(matches!(result, Err(RagError::IndexLoad { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_index_is_fatal() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("vectorstore.json");
        fs::write(&path, "{not json")?;
        let result = VectorIndex::load(&path, HashingEmbedder::new(16), SimilarityMetric::Cosine);
        assert!(matches!(result, Err(RagError::IndexLoad { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_discard_forces_rebuild() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("vectorstore.json");
        VectorIndex::build_or_load(
            corpus(),
            &path,
            HashingEmbedder::new(16),
            SimilarityMetric::Cosine,
        )
        .await?;

        assert!(discard_persisted(&path)?);
        assert!(!discard_persisted(&path)?);

        let rebuilt = VectorIndex::build_or_load(
            corpus(),
            &path,
            CountingEmbedder::new(16),
            SimilarityMetric::Cosine,
        )
        .await?;
        assert_eq!(rebuilt.embedder().calls.get(), 5);
        Ok(())
    }
}

use super::chunker::chunk_document;
use super::embeddings::EmbeddingProvider;
use super::vector::cosine_similarity;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Chunking and batching knobs for building an index.
#[derive(Debug, Clone, Copy)]
pub struct IndexParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub page: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub page: usize,
    pub text: String,
    pub score: f32,
}

/// Embedding index over a chunked source document, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentIndex {
    pub embedding_model: String,
    pub entries: Vec<IndexEntry>,
}

impl DocumentIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chunk `text` and embed the chunks `batch_size` at a time.
    pub async fn build(
        text: &str,
        embedder: &dyn EmbeddingProvider,
        params: IndexParams,
    ) -> anyhow::Result<Self> {
        let chunks = chunk_document(text, params.chunk_size, params.chunk_overlap);
        let batch_size = params.batch_size.max(1);
        let batches = chunks.len().div_ceil(batch_size);
        let mut entries = Vec::with_capacity(chunks.len());

        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = embedder
                .embed(&texts)
                .await
                .with_context(|| format!("embedding batch {}/{batches}", batch_index + 1))?;
            if vectors.len() != batch.len() {
                anyhow::bail!(
                    "embedder returned {} vectors for a batch of {}",
                    vectors.len(),
                    batch.len()
                );
            }
            entries.extend(batch.iter().zip(vectors).map(|(chunk, embedding)| IndexEntry {
                page: chunk.page,
                text: chunk.text.clone(),
                embedding,
            }));
            tracing::info!(batch = batch_index + 1, batches, "embedded batch");
        }

        Ok(Self {
            embedding_model: embedder.model().to_string(),
            entries,
        })
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading index {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing index {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(self)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing index {}", path.display()))
    }

    /// Reload a persisted index, or build one from the source document and
    /// persist it. `None` when neither exists.
    pub async fn load_or_build(
        index_path: &Path,
        source_path: &Path,
        embedder: &dyn EmbeddingProvider,
        params: IndexParams,
    ) -> anyhow::Result<Option<Self>> {
        if tokio::fs::try_exists(index_path).await.unwrap_or(false) {
            let index = Self::load(index_path).await?;
            if index.embedding_model != embedder.model() {
                tracing::warn!(
                    index_model = %index.embedding_model,
                    embedder_model = embedder.model(),
                    "persisted index was built with a different embedding model"
                );
            }
            tracing::info!(entries = index.len(), path = %index_path.display(), "loaded document index");
            return Ok(Some(index));
        }

        if !tokio::fs::try_exists(source_path).await.unwrap_or(false) {
            return Ok(None);
        }

        let bytes = tokio::fs::read(source_path)
            .await
            .with_context(|| format!("reading source document {}", source_path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        let index = Self::build(&text, embedder, params).await?;
        index.save(index_path).await?;
        tracing::info!(entries = index.len(), path = %index_path.display(), "built document index");
        Ok(Some(index))
    }

    /// Top-`k` passages by cosine similarity, best first.
    pub async fn search(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        k: usize,
    ) -> anyhow::Result<Vec<Passage>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = embedder.embed_one(query).await?;

        let mut scored: Vec<Passage> = self
            .entries
            .iter()
            .map(|entry| Passage {
                page: entry.page,
                text: entry.text.clone(),
                score: cosine_similarity(&query_vector, &entry.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

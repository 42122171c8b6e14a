pub mod embeddings;
pub mod hnsw_store;
pub mod store;

use crate::loader::DocumentExtract;
use anyhow::Result;
use std::collections::HashMap;
use store::VectorStore;

/// Retrieval depth for discovery and per-metric extraction.
pub const DEFAULT_TOP_K: usize = 5;

/// Chunk sets up to this size use the exact linear store; beyond it the
/// approximate HNSW store takes over.
const LINEAR_SCAN_LIMIT: usize = 64;

#[derive(Clone, Debug)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

/// Per-document similarity index over evidence chunks. Built from the
/// persisted chunk artifact, never from the pre-persistence value, so the
/// extraction stage only ever sees what went to disk.
pub struct ContextIndex {
    store: Box<dyn VectorStore>,
    embedder: embeddings::EmbeddingClient,
}

impl ContextIndex {
    pub async fn build(
        extract: &DocumentExtract,
        embedder: embeddings::EmbeddingClient,
    ) -> Result<Self> {
        let store: Box<dyn VectorStore> = if extract.chunks.len() <= LINEAR_SCAN_LIMIT {
            Box::new(store::LinearVectorStore::new())
        } else {
            Box::new(hnsw_store::HnswVectorStore::new())
        };
        Self::build_with_store(extract, embedder, store).await
    }

    pub async fn build_with_store(
        extract: &DocumentExtract,
        embedder: embeddings::EmbeddingClient,
        mut store: Box<dyn VectorStore>,
    ) -> Result<Self> {
        let contents: Vec<String> = extract.chunks.iter().map(|c| c.contexto.clone()).collect();
        let vectors = embedder.embed_batch(&contents).await?;

        for (i, (chunk, embedding)) in extract.chunks.iter().zip(vectors).enumerate() {
            let metadata = HashMap::from([
                ("pg".to_string(), chunk.pagina.to_string()),
                ("indicador".to_string(), chunk.indicador_id.clone()),
            ]);
            store.add_document(Document {
                id: format!("chunk-{}", i),
                content: chunk.contexto.clone(),
                embedding,
                metadata,
            })?;
        }

        tracing::debug!("Context index built with {} chunks", store.count());

        Ok(ContextIndex { store, embedder })
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<(Document, f32)>> {
        let query_embedding = self.embedder.embed(query).await?;
        self.store.search(&query_embedding, top_k)
    }
}

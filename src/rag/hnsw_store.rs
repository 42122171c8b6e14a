use super::{store::VectorStore, Document};
use anyhow::Result;
use hnsw_rs::prelude::*;
use std::collections::HashMap;

/// Approximate nearest-neighbor store. The index lives only for one document
/// run, so nothing is ever dumped to disk.
pub struct HnswVectorStore {
    hnsw: Hnsw<'static, f32, DistCosine>,
    documents: HashMap<usize, Document>,
    next_id: usize,
}

impl HnswVectorStore {
    pub fn new() -> Self {
        // M=24, ef_construction=200 are decent defaults for small corpora.
        HnswVectorStore {
            hnsw: Hnsw::new(24, 10000, 16, 200, DistCosine),
            documents: HashMap::new(),
            next_id: 0,
        }
    }
}

impl Default for HnswVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStore for HnswVectorStore {
    fn add_document(&mut self, doc: Document) -> Result<()> {
        let internal_id = self.next_id;
        self.next_id += 1;

        self.hnsw.insert((&doc.embedding, internal_id));
        self.documents.insert(internal_id, doc);

        Ok(())
    }

    fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<(Document, f32)>> {
        let ef_search = top_k * 2;
        let neighbors = self.hnsw.search(query_embedding, top_k, ef_search);

        let mut results = Vec::new();
        for neighbor in neighbors {
            if let Some(doc) = self.documents.get(&neighbor.d_id) {
                // DistCosine distance is 1.0 - similarity.
                let similarity = 1.0 - neighbor.distance;
                results.push((doc.clone(), similarity));
            }
        }

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        if top_k > 0 && results.len() > top_k {
            results.truncate(top_k);
        }

        Ok(results)
    }

    fn count(&self) -> usize {
        self.documents.len()
    }
}

use super::Document;
use anyhow::Result;

/// Trait for vector storage backends
pub trait VectorStore: Send + Sync {
    /// Add a document to the store
    fn add_document(&mut self, doc: Document) -> Result<()>;

    /// Search for the top-k most similar documents
    fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<(Document, f32)>>;

    /// Count documents
    fn count(&self) -> usize;
}

/// Exact linear-scan store. Deterministic, so unit tests run against it;
/// the HNSW store is the runtime default.
#[derive(Default)]
pub struct LinearVectorStore {
    documents: Vec<Document>,
}

impl LinearVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for LinearVectorStore {
    fn add_document(&mut self, doc: Document) -> Result<()> {
        self.documents.retain(|d| d.id != doc.id);
        self.documents.push(doc);
        Ok(())
    }

    fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<(Document, f32)>> {
        let mut scores: Vec<(Document, f32)> = self
            .documents
            .iter()
            .map(|d| {
                let score = cosine_similarity(query_embedding, &d.embedding);
                (d.clone(), score)
            })
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        if top_k > 0 && scores.len() > top_k {
            scores.truncate(top_k);
        }

        Ok(scores)
    }

    fn count(&self) -> usize {
        self.documents.len()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn doc(id: &str, embedding: Vec<f32>) -> Document {
        Document {
            id: id.to_string(),
            content: format!("content of {}", id),
            embedding,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn search_orders_by_similarity() {
        let mut store = LinearVectorStore::new();
        store.add_document(doc("far", vec![0.0, 1.0])).unwrap();
        store.add_document(doc("near", vec![1.0, 0.0])).unwrap();
        store.add_document(doc("mid", vec![1.0, 1.0])).unwrap();

        let results = store.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = results.iter().map(|(d, _)| d.id.as_str()).collect();
        assert_eq!(ids, ["near", "mid", "far"]);
    }

    #[test]
    fn search_truncates_to_top_k() {
        let mut store = LinearVectorStore::new();
        for i in 0..10 {
            store
                .add_document(doc(&format!("d{}", i), vec![1.0, i as f32]))
                .unwrap();
        }
        assert_eq!(store.search(&[1.0, 0.0], 5).unwrap().len(), 5);
    }

    #[test]
    fn adding_same_id_replaces() {
        let mut store = LinearVectorStore::new();
        store.add_document(doc("a", vec![1.0, 0.0])).unwrap();
        store.add_document(doc("a", vec![0.0, 1.0])).unwrap();
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Client for the `/embeddings` route of an OpenAI-compatible API.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    /// Embed a batch of texts in one request. Results come back in input
    /// order regardless of how the server ordered its response.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let req = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.client.post(&url).json(&req);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let resp = builder.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Embedding request failed ({}): {}", status, err_text);
        }

        let mut body: EmbeddingResponse = resp.json().await?;

        if body.data.len() != texts.len() {
            anyhow::bail!(
                "Embedding response returned {} vectors for {} inputs",
                body.data.len(),
                texts.len()
            );
        }

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding response was empty"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_vectors_reorder_by_index() {
        let raw = r#"{
            "data": [
                {"embedding": [0.2, 0.2], "index": 1},
                {"embedding": [0.1, 0.1], "index": 0}
            ]
        }"#;
        let mut resp: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        resp.data.sort_by_key(|d| d.index);
        assert_eq!(resp.data[0].embedding, vec![0.1, 0.1]);
        assert_eq!(resp.data[1].embedding, vec![0.2, 0.2]);
    }
}

use crate::llm::{ChatMessage, LlmClient};
use crate::rag::{ContextIndex, Document, DEFAULT_TOP_K};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// Seed query anchoring discovery on the diversity disclosure.
pub const SEED_QUERY: &str =
    "GRI 405-1: Diversidade de empregados, gênero, raça, idade e composição do conselho";

const DISCOVERY_PROMPT: &str = "Você é um auditor especialista em GRI 405-1. \
Adicione um nome curto para cada métrica quantitativa relevante deste contexto. \
Retire pelo menos 20 métricas.\n\
Analise o contexto e identifique APENAS métricas quantitativas de diversidade \
(ex: % de mulheres, negros, PCDs, faixas etárias).\n\
Ignore outros temas como emissões ou corrupção.\n\n\
Retorne um JSON onde a CHAVE é o nome curto da métrica (snake_case) e o VALOR \
é a pergunta para extração.\n\
Contexto: {context}";

const EXTRACTION_PROMPT: &str = "Extraia o valor numérico e o trecho comprobatório.\n\
Responda em formato JSON:\n\
{\n\
    \"valor\": \"o número encontrado\",\n\
    \"trecho_original\": \"a frase exata de onde tirou a informação\"\n\
}\n\
Contexto: {context}\n\
Métrica: {question}";

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d*\.\d+|\d+").expect("static pattern compiles"));

/// One extracted metric before company/year/timestamp are attached.
#[derive(Clone, Debug)]
pub struct MetricRecord {
    pub metric: String,
    pub valor: f64,
    pub fonte: Option<String>,
    pub paginas: String,
}

/// Validation boundary for the extraction response: anything that deserializes
/// into this shape is well-formed, everything else is a per-metric failure.
#[derive(Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    valor: Value,
    #[serde(default)]
    trecho_original: Option<String>,
}

pub struct MetricProcessor {
    llm: LlmClient,
}

impl MetricProcessor {
    pub fn new(llm: LlmClient) -> Self {
        MetricProcessor { llm }
    }

    /// Discovery then extraction. A malformed discovery response aborts the
    /// document; a failed metric only loses its own row.
    pub async fn run(&self, index: &ContextIndex) -> Result<Vec<MetricRecord>> {
        let metrics = self.discover_metrics(index).await?;
        tracing::info!("Discovery proposed {} metrics", metrics.len());

        let mut records = Vec::new();
        for (metric, question) in &metrics {
            match self.extract_metric(index, metric, question).await {
                Ok(record) => {
                    tracing::info!("Extracted: {}", metric);
                    records.push(record);
                }
                Err(e) => {
                    tracing::error!("Extraction failed for {}: {}", metric, e);
                }
            }
        }

        Ok(records)
    }

    /// Ask the model which metrics this document can answer, as a mapping
    /// from snake_case metric name to extraction question.
    pub async fn discover_metrics(
        &self,
        index: &ContextIndex,
    ) -> Result<IndexMap<String, String>> {
        let retrieved = index.search(SEED_QUERY, DEFAULT_TOP_K).await?;
        let context = join_contexts(&retrieved);

        let prompt = DISCOVERY_PROMPT.replace("{context}", &context);
        let (response, usage) = self.llm.chat(&[ChatMessage::user(prompt)]).await?;
        if let Some(usage) = usage {
            tracing::debug!(
                "Discovery used {} tokens ({} prompt, {} completion)",
                usage.total_tokens,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        let json = extract_json_object(&response)
            .ok_or_else(|| anyhow::anyhow!("Discovery response contained no JSON object"))?;
        let metrics: IndexMap<String, String> =
            serde_json::from_str(json).context("Malformed discovery response")?;

        if metrics.is_empty() {
            anyhow::bail!("Discovery returned an empty metric map");
        }

        Ok(metrics)
    }

    /// Retrieve evidence for one question and ask the model for the value
    /// plus a literal supporting quote.
    pub async fn extract_metric(
        &self,
        index: &ContextIndex,
        metric: &str,
        question: &str,
    ) -> Result<MetricRecord> {
        let retrieved = index.search(question, DEFAULT_TOP_K).await?;
        let paginas = distinct_pages(&retrieved);
        let context = join_contexts(&retrieved);

        let prompt = EXTRACTION_PROMPT
            .replace("{context}", &context)
            .replace("{question}", question);
        let (response, _) = self.llm.chat(&[ChatMessage::user(prompt)]).await?;

        let json = extract_json_object(&response)
            .ok_or_else(|| anyhow::anyhow!("Extraction response contained no JSON object"))?;
        let parsed: ExtractionResponse =
            serde_json::from_str(json).context("Malformed extraction response")?;

        Ok(MetricRecord {
            metric: metric.to_string(),
            valor: normalize_value(&parsed.valor),
            fonte: parsed.trecho_original,
            paginas,
        })
    }
}

fn join_contexts(retrieved: &[(Document, f32)]) -> String {
    retrieved
        .iter()
        .map(|(doc, _)| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Distinct page numbers of the retrieved chunks, first-retrieval order.
fn distinct_pages(retrieved: &[(Document, f32)]) -> String {
    let mut pages: Vec<&str> = Vec::new();
    for (doc, _) in retrieved {
        let pg = doc.metadata.get("pg").map(|p| p.as_str()).unwrap_or("N/A");
        if !pages.contains(&pg) {
            pages.push(pg);
        }
    }
    pages.join(", ")
}

/// Model responses often wrap JSON in prose or code fences; take the
/// outermost object.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end >= start).then_some(&raw[start..=end])
}

/// Coerce a free-form model value to a number: nested objects collapse to
/// their first value, commas become decimal dots, the first numeric substring
/// wins, and no digits means zero. A trailing percent divides by 100 unless
/// the number is already at most 1; ambiguous for plain values in (1, 100],
/// kept as documented.
pub fn normalize_value(valor: &Value) -> f64 {
    let valor = match valor {
        Value::Null => return 0.0,
        Value::Object(map) => match map.values().next() {
            Some(first) => first,
            None => return 0.0,
        },
        other => other,
    };

    let texto = match valor {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let texto = texto.replace(',', ".");
    let texto = texto.trim();

    let parsed = NUMBER_RE
        .find(texto)
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let num = match parsed {
        Some(n) => n,
        None => return 0.0,
    };

    if texto.contains('%') {
        if num > 1.0 {
            num / 100.0
        } else {
            num
        }
    } else {
        num
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn percent_values_become_fractions() {
        assert_eq!(normalize_value(&json!("52%")), 0.52);
        assert_eq!(normalize_value(&json!("45,5%")), 0.455);
    }

    #[test]
    fn fractional_percent_is_not_divided_again() {
        assert_eq!(normalize_value(&json!("0.3%")), 0.3);
        assert_eq!(normalize_value(&json!("1%")), 1.0);
    }

    #[test]
    fn plain_numbers_pass_through() {
        assert_eq!(normalize_value(&json!("45")), 45.0);
        assert_eq!(normalize_value(&json!(45.5)), 45.5);
        assert_eq!(normalize_value(&json!("cerca de 32 pessoas")), 32.0);
    }

    #[test]
    fn no_digits_defaults_to_zero() {
        assert_eq!(normalize_value(&json!("não informado")), 0.0);
        assert_eq!(normalize_value(&Value::Null), 0.0);
        assert_eq!(normalize_value(&json!({})), 0.0);
    }

    #[test]
    fn nested_object_takes_first_value() {
        assert_eq!(
            normalize_value(&json!({"percentual": "45%", "outro": "99%"})),
            0.45
        );
    }

    #[test]
    fn negative_and_comma_decimals_parse() {
        assert_eq!(normalize_value(&json!("-12,5")), -12.5);
    }

    #[test]
    fn json_object_is_found_inside_fences() {
        let raw = "Claro! Aqui está:\n```json\n{\"mulheres_pct\": \"Qual o percentual?\"}\n```";
        let json = extract_json_object(raw).unwrap();
        let parsed: IndexMap<String, String> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed["mulheres_pct"], "Qual o percentual?");
    }

    #[test]
    fn missing_json_object_is_none() {
        assert!(extract_json_object("sem dados estruturados").is_none());
    }

    #[test]
    fn extraction_response_tolerates_missing_fields() {
        let parsed: ExtractionResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(normalize_value(&parsed.valor), 0.0);
        assert!(parsed.trecho_original.is_none());
    }

    #[test]
    fn distinct_pages_keep_first_seen_order() {
        use std::collections::HashMap;
        let doc = |pg: &str| Document {
            id: pg.to_string(),
            content: String::new(),
            embedding: Vec::new(),
            metadata: HashMap::from([("pg".to_string(), pg.to_string())]),
        };
        let retrieved = vec![(doc("3"), 0.9), (doc("5"), 0.8), (doc("3"), 0.7)];
        assert_eq!(distinct_pages(&retrieved), "3, 5");
    }
}

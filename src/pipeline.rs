use crate::config::{Config, Taxonomy};
use crate::llm::LlmClient;
use crate::loader::{DocumentExtract, DocumentLoader, PLACEHOLDER_EMPRESA};
use crate::processor::{MetricProcessor, MetricRecord};
use crate::rag::embeddings::EmbeddingClient;
use crate::rag::ContextIndex;
use anyhow::{Context, Result};
use chrono::Local;
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Audit-table columns exported first, in this order; anything else keeps its
/// original position after them.
pub const COLUMN_PRIORITY: [&str; 6] = [
    "empresa",
    "ano_relatorio",
    "Dado Extraído",
    "Valor",
    "Fonte (Texto Original)",
    "Página",
];

/// Terminal result for one document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    Processed,
    /// No relevant content: zero evidence chunks, nothing to extract.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Loading,
    ExtractingEvidence,
    PersistingChunks,
    DiscoveringMetrics,
    ExtractingValues,
    Exporting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loading => "loading",
            Stage::ExtractingEvidence => "extracting-evidence",
            Stage::PersistingChunks => "persisting-chunks",
            Stage::DiscoveringMetrics => "discovering-metrics",
            Stage::ExtractingValues => "extracting-values",
            Stage::Exporting => "exporting",
        };
        write!(f, "{}", name)
    }
}

/// Runs one PDF end-to-end: load, locate evidence, persist the chunk
/// artifact, discover and extract metrics, export the audit table.
pub struct DocumentPipeline {
    loader: DocumentLoader,
    processor: MetricProcessor,
    embedder: EmbeddingClient,
    output_dir: PathBuf,
}

impl DocumentPipeline {
    pub fn new(config: &Config, taxonomy: Taxonomy) -> Self {
        let base_url = config.llm_provider.base_url();
        let api_key = config.api_key();

        DocumentPipeline {
            loader: DocumentLoader::new(taxonomy),
            processor: MetricProcessor::new(LlmClient::new(
                base_url,
                &config.chat_model,
                api_key.clone(),
            )),
            embedder: EmbeddingClient::new(base_url, &config.embedding_model, api_key),
            output_dir: config.output_dir.clone(),
        }
    }

    pub async fn run(&self, pdf_path: &Path) -> Result<RunOutcome> {
        let base_name = base_name(pdf_path);

        tracing::info!(stage = %Stage::Loading, "Processing {:?}", pdf_path);
        let extract = self.loader.extract_content(pdf_path)?;

        self.process_extract(extract, &base_name).await
    }

    /// Everything after the PDF parse. Separated so the skip decision is
    /// observable without a real document.
    pub async fn process_extract(
        &self,
        extract: DocumentExtract,
        base_name: &str,
    ) -> Result<RunOutcome> {
        tracing::info!(stage = %Stage::ExtractingEvidence, "{} chunks", extract.chunks.len());
        if extract.chunks.is_empty() {
            tracing::warn!("{}: no relevant content", base_name);
            return Ok(RunOutcome::Skipped);
        }

        tracing::info!(stage = %Stage::PersistingChunks, "Persisting chunk artifact");
        let artifact_path = self.persist_chunks(&extract, base_name)?;

        // Extraction operates only on the persisted representation; the
        // in-memory extract is dropped here.
        drop(extract);
        let persisted = load_chunks(&artifact_path)?;

        tracing::info!(stage = %Stage::DiscoveringMetrics, "Building context index");
        let index = ContextIndex::build(&persisted, self.embedder.clone()).await?;

        tracing::info!(stage = %Stage::ExtractingValues, "Running metric extraction");
        let records = self.processor.run(&index).await?;

        tracing::info!(stage = %Stage::Exporting, "{} audit rows", records.len());
        let csv_path = self.export_csv(&records, &persisted, base_name)?;
        tracing::info!("Audit table saved: {:?}", csv_path);

        Ok(RunOutcome::Processed)
    }

    /// Write the chunk artifact the audit trail keeps and the extraction
    /// stage re-reads.
    fn persist_chunks(&self, extract: &DocumentExtract, base_name: &str) -> Result<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d");
        let filename = format!("chunks_empresa_{}_{}.json", base_name, timestamp);
        let path = self.output_dir.join(filename);

        let json = serde_json::to_string_pretty(extract)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write chunk artifact {:?}", path))?;

        tracing::info!("Chunk artifact saved: {:?}", path);
        Ok(path)
    }

    fn export_csv(
        &self,
        records: &[MetricRecord],
        persisted: &DocumentExtract,
        base_name: &str,
    ) -> Result<PathBuf> {
        let empresa = final_company_name(&persisted.metadata.empresa, base_name);
        let ano = persisted.metadata.ano;
        let data_extracao = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let rows: Vec<IndexMap<String, String>> = records
            .iter()
            .map(|r| audit_row(r, &empresa, ano, &data_extracao))
            .collect();

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("resultado_{}_{}_{}.csv", empresa, ano, timestamp);
        let path = self.output_dir.join(filename);

        let csv = render_csv(&rows, &COLUMN_PRIORITY);
        std::fs::write(&path, csv)
            .with_context(|| format!("Failed to write audit table {:?}", path))?;

        Ok(path)
    }
}

pub fn load_chunks(path: &Path) -> Result<DocumentExtract> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chunk artifact {:?}", path))?;
    let extract: DocumentExtract = serde_json::from_str(&contents)
        .with_context(|| format!("Malformed chunk artifact {:?}", path))?;
    Ok(extract)
}

fn base_name(pdf_path: &Path) -> String {
    pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(' ', "_"))
        .unwrap_or_else(|| "documento".to_string())
}

/// The loader's metadata default is a placeholder, not a detected company;
/// only a different non-empty value is trusted over the filename.
fn final_company_name(detected: &str, base_name: &str) -> String {
    if detected.is_empty() || detected == PLACEHOLDER_EMPRESA {
        base_name.replace(' ', "_")
    } else {
        detected.replace(' ', "_")
    }
}

fn audit_row(
    record: &MetricRecord,
    empresa: &str,
    ano: i32,
    data_extracao: &str,
) -> IndexMap<String, String> {
    IndexMap::from([
        ("empresa".to_string(), empresa.to_string()),
        ("ano_relatorio".to_string(), ano.to_string()),
        ("Dado Extraído".to_string(), record.metric.clone()),
        ("Valor".to_string(), record.valor.to_string()),
        (
            "Fonte (Texto Original)".to_string(),
            record.fonte.clone().unwrap_or_default(),
        ),
        ("Página".to_string(), record.paginas.clone()),
        ("data_extracao".to_string(), data_extracao.to_string()),
    ])
}

/// Priority columns that exist come first, the rest keep their original
/// relative order.
pub fn order_columns(existing: &[String], priority: &[&str]) -> Vec<String> {
    let mut ordered: Vec<String> = priority
        .iter()
        .filter(|p| existing.iter().any(|c| c == *p))
        .map(|p| p.to_string())
        .collect();
    ordered.extend(
        existing
            .iter()
            .filter(|c| !priority.contains(&c.as_str()))
            .cloned(),
    );
    ordered
}

/// Semicolon-separated, UTF-8 with a byte-order mark so spreadsheet tools
/// pick the encoding up.
fn render_csv(rows: &[IndexMap<String, String>], priority: &[&str]) -> String {
    let existing: Vec<String> = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    let columns = order_columns(&existing, priority);

    let mut out = String::from("\u{feff}");
    out.push_str(
        &columns
            .iter()
            .map(|c| csv_field(c))
            .collect::<Vec<_>>()
            .join(";"),
    );
    out.push('\n');

    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|c| csv_field(row.get(c).map(|v| v.as_str()).unwrap_or("")))
            .collect();
        out.push_str(&line.join(";"));
        out.push('\n');
    }

    out
}

fn csv_field(value: &str) -> String {
    if value.contains(';') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

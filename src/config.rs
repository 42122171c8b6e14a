use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "esgrag.json";
const TAXONOMY_FILE: &str = "esg_indicadores.json";

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Serialize, Deserialize, Clone, Default, PartialEq)]
pub enum LlmProvider {
    #[default]
    OpenAi,
    LmStudio,
}

impl LlmProvider {
    pub fn base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::LmStudio => "http://localhost:1234/v1",
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub llm_provider: LlmProvider,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Incoming PDFs, scanned by the batch runner.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    /// Successfully processed PDFs are moved here.
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    /// Chunk artifacts and audit tables.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_taxonomy_path")]
    pub taxonomy_path: PathBuf,
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/output")
}

fn default_taxonomy_path() -> PathBuf {
    PathBuf::from(TAXONOMY_FILE)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            llm_provider: LlmProvider::default(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            raw_dir: default_raw_dir(),
            processed_dir: default_processed_dir(),
            output_dir: default_output_dir(),
            taxonomy_path: default_taxonomy_path(),
        }
    }
}

impl Config {
    pub fn load() -> Config {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if let Ok(config) = serde_json::from_str(&contents) {
                    return config;
                }
            }
        }
        Config::default()
    }

    /// API key for the OpenAI-compatible endpoint. LM Studio runs without one.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY").ok()
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.raw_dir, &self.processed_dir, &self.output_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        Ok(())
    }
}

/// One configured indicator of the reporting taxonomy (e.g. a GRI disclosure).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct IndicatorSpec {
    pub id_dashboard: String,
    pub categoria: String,
    /// Keyword synonyms matched case-insensitively against page text.
    pub subtemas: Vec<String>,
    pub unidade: String,
}

/// Taxonomy keyed by indicator identifier ("GRI 405-1", ...). Insertion order
/// is preserved so evidence scanning stays deterministic across runs.
pub type Taxonomy = IndexMap<String, IndicatorSpec>;

pub fn load_taxonomy(path: &Path) -> Result<Taxonomy> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read taxonomy file {:?}", path))?;
    let taxonomy: Taxonomy = serde_json::from_str(&contents)
        .with_context(|| format!("Malformed taxonomy file {:?}", path))?;
    Ok(taxonomy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_parses_and_keeps_order() {
        let raw = r#"{
            "GRI 405-1": {
                "id_dashboard": "diversidade_genero",
                "categoria": "Social",
                "subtemas": ["mulheres", "gênero"],
                "unidade": "%"
            },
            "GRI 405-2": {
                "id_dashboard": "equidade_salarial",
                "categoria": "Social",
                "subtemas": ["salário"],
                "unidade": "%"
            }
        }"#;
        let taxonomy: Taxonomy = serde_json::from_str(raw).unwrap();
        let keys: Vec<&String> = taxonomy.keys().collect();
        assert_eq!(keys, ["GRI 405-1", "GRI 405-2"]);
        assert_eq!(taxonomy["GRI 405-1"].id_dashboard, "diversidade_genero");
        assert_eq!(taxonomy["GRI 405-1"].subtemas.len(), 2);
    }

    #[test]
    fn config_defaults_point_at_data_dirs() {
        let config = Config::default();
        assert_eq!(config.raw_dir, PathBuf::from("data/raw"));
        assert_eq!(config.output_dir, PathBuf::from("data/output"));
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.llm_provider.base_url(), "https://api.openai.com/v1");
    }
}

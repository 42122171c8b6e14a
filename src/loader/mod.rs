pub mod evidence;
pub mod layout;
pub mod text;

use crate::config::Taxonomy;
use evidence::{EvidenceChunk, EvidenceLocator};
use lopdf::{Dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Defaults carried over from the upstream system; the exporter treats this
/// exact company literal as "no real metadata" and falls back to the filename.
pub const PLACEHOLDER_EMPRESA: &str = "Bradesco";
pub const PLACEHOLDER_ANO: i32 = 2024;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to load PDF {path:?}: {source}")]
    Load {
        path: PathBuf,
        source: lopdf::Error,
    },
    #[error("Failed to read page {page}: {source}")]
    Page { page: u32, source: lopdf::Error },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DocumentMetadata {
    pub empresa: String,
    pub ano: i32,
}

/// The persisted chunk artifact: everything the extraction stage is allowed
/// to see. Serialized as JSON before discovery/extraction run.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DocumentExtract {
    pub metadata: DocumentMetadata,
    pub chunks: Vec<EvidenceChunk>,
}

/// Turns one PDF into metadata plus evidence chunks. Owns the injected
/// taxonomy via its evidence locator.
pub struct DocumentLoader {
    locator: EvidenceLocator,
}

impl DocumentLoader {
    pub fn new(taxonomy: Taxonomy) -> Self {
        DocumentLoader {
            locator: EvidenceLocator::new(taxonomy),
        }
    }

    pub fn extract_content(&self, pdf_path: &Path) -> Result<DocumentExtract, LoaderError> {
        let doc = Document::load(pdf_path).map_err(|source| LoaderError::Load {
            path: pdf_path.to_path_buf(),
            source,
        })?;

        let metadata = read_metadata(&doc);

        let mut chunks = Vec::new();
        for (page_num, page_id) in doc.get_pages() {
            let words = text::extract_words(&doc, page_id)
                .map_err(|source| LoaderError::Page { page: page_num, source })?;
            let page_text = layout::reconstruct_page(&words);
            chunks.extend(self.locator.locate(&page_text, page_num as usize));
        }

        tracing::info!(
            "Extracted {} evidence chunks from {:?}",
            chunks.len(),
            pdf_path.file_name().unwrap_or_default()
        );

        Ok(DocumentExtract { metadata, chunks })
    }
}

/// Company and year from the PDF info dictionary, placeholder defaults when
/// the document carries none.
fn read_metadata(doc: &Document) -> DocumentMetadata {
    let info = info_dictionary(doc);

    let empresa = info
        .and_then(|dict| info_string(dict, b"Title"))
        .unwrap_or_else(|| PLACEHOLDER_EMPRESA.to_string());

    let ano = info
        .and_then(|dict| info_string(dict, b"CreationDate"))
        .and_then(|date| creation_year(&date))
        .unwrap_or(PLACEHOLDER_ANO);

    DocumentMetadata { empresa, ano }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = dict.get(key).ok()?.as_str().ok()?;
    let value = decode_pdf_string(bytes);
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Info strings are either UTF-16BE with a BOM or byte-encoded.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).to_string()
    }
}

/// Year out of a PDF date like "D:20240315120000Z".
fn creation_year(date: &str) -> Option<i32> {
    let digits = date.strip_prefix("D:").unwrap_or(date);
    let year: i32 = digits.get(..4)?.parse().ok()?;
    (1900..=2100).contains(&year).then_some(year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_defaults_to_placeholders() {
        let doc = Document::with_version("1.5");
        let metadata = read_metadata(&doc);
        assert_eq!(metadata.empresa, PLACEHOLDER_EMPRESA);
        assert_eq!(metadata.ano, PLACEHOLDER_ANO);
    }

    #[test]
    fn creation_year_parses_pdf_dates() {
        assert_eq!(creation_year("D:20240315120000Z"), Some(2024));
        assert_eq!(creation_year("20231201"), Some(2023));
        assert_eq!(creation_year("D:0000"), None);
        assert_eq!(creation_year("garbage"), None);
    }

    #[test]
    fn utf16_info_strings_decode() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "Natura".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_string(&bytes), "Natura");
        assert_eq!(decode_pdf_string(b"Natura"), "Natura");
    }

    #[test]
    fn extract_serializes_with_audit_field_names() {
        let extract = DocumentExtract {
            metadata: DocumentMetadata {
                empresa: "Natura".to_string(),
                ano: 2024,
            },
            chunks: vec![EvidenceChunk {
                indicador_id: "GRI 405-1".to_string(),
                chave: "diversidade_genero".to_string(),
                valor: 45.0,
                contexto: "...mulheres 45%...".to_string(),
                pagina: 3,
            }],
        };

        let json = serde_json::to_value(&extract).unwrap();
        assert_eq!(json["metadata"]["empresa"], "Natura");
        assert_eq!(json["metadata"]["ano"], 2024);
        assert_eq!(json["chunks"][0]["indicador_id"], "GRI 405-1");
        assert_eq!(json["chunks"][0]["pagina"], 3);
        assert_eq!(json["chunks"][0]["valor"], 45.0);
    }
}

use crate::config::Taxonomy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters captured on each side of a numeric match.
pub const CONTEXT_WINDOW: usize = 70;

/// Integers or decimals (comma or dot separator) followed by a percent sign.
const NUMERIC_PERCENT_PATTERN: &str = r"(\d{1,3}(?:[.,]\d+)?)\s*%";

/// An evidence window tying a numeric match to an indicator on one page.
/// Invariant: `contexto` contains the normalized indicator identifier or one
/// of its keyword synonyms; windows failing that check are never emitted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EvidenceChunk {
    pub indicador_id: String,
    pub chave: String,
    pub valor: f64,
    pub contexto: String,
    pub pagina: usize,
}

/// Scans reconstructed page text for indicator evidence. The taxonomy is an
/// injected immutable value so tests can run with alternate configurations.
pub struct EvidenceLocator {
    taxonomy: Taxonomy,
    pattern: Regex,
}

impl EvidenceLocator {
    pub fn new(taxonomy: Taxonomy) -> Self {
        EvidenceLocator {
            taxonomy,
            pattern: Regex::new(NUMERIC_PERCENT_PATTERN).expect("static pattern compiles"),
        }
    }

    /// Produce zero or more chunks for one page of reconstructed text.
    /// `pagina` is 1-based. A page matching nothing yields an empty vector.
    pub fn locate(&self, page_text: &str, pagina: usize) -> Vec<EvidenceChunk> {
        let mut chunks = Vec::new();
        if page_text.is_empty() {
            return chunks;
        }

        let page_lower = page_text.to_lowercase();

        for (indicator_id, spec) in &self.taxonomy {
            let id_limpo = indicator_id.strip_prefix("GRI ").unwrap_or(indicator_id);

            let page_mentions = page_text.contains(id_limpo)
                || spec
                    .subtemas
                    .iter()
                    .any(|k| page_lower.contains(&k.to_lowercase()));
            if !page_mentions {
                continue;
            }

            for caps in self.pattern.captures_iter(page_text) {
                let matched = caps.get(0).expect("match group 0 exists");
                let window =
                    char_window(page_text, matched.start(), matched.end(), CONTEXT_WINDOW);
                let contexto = window.trim();

                // The page-level test is too coarse: the identifier or a
                // synonym must also appear inside the narrow window, else the
                // number belongs to another column or topic.
                let window_lower = contexto.to_lowercase();
                let window_mentions = contexto.contains(id_limpo)
                    || spec
                        .subtemas
                        .iter()
                        .any(|k| window_lower.contains(&k.to_lowercase()));
                if !window_mentions {
                    continue;
                }

                let numeral = caps.get(1).expect("capture group 1 exists").as_str();
                let valor: f64 = match numeral.replace(',', ".").parse() {
                    Ok(v) => v,
                    Err(_) => continue,
                };

                chunks.push(EvidenceChunk {
                    indicador_id: indicator_id.clone(),
                    chave: spec.id_dashboard.clone(),
                    valor,
                    contexto: format!("...{}...", contexto),
                    pagina,
                });
            }
        }

        chunks
    }
}

/// Symmetric character window around a byte range, clipped to text bounds.
/// Works in characters, not bytes, so multi-byte text never splits a char.
fn char_window(text: &str, start: usize, end: usize, window: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(window.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(window)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    &text[from..to]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorSpec;
    use indexmap::IndexMap;

    fn diversity_taxonomy() -> Taxonomy {
        let mut taxonomy = IndexMap::new();
        taxonomy.insert(
            "GRI 405-1".to_string(),
            IndicatorSpec {
                id_dashboard: "diversidade_genero".to_string(),
                categoria: "Social".to_string(),
                subtemas: vec!["mulheres".to_string(), "diversidade".to_string()],
                unidade: "%".to_string(),
            },
        );
        taxonomy
    }

    #[test]
    fn finds_indicator_evidence_with_page_provenance() {
        let locator = EvidenceLocator::new(diversity_taxonomy());
        let chunks = locator.locate("GRI 405-1 mulheres no quadro 45% do total", 3);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].indicador_id, "GRI 405-1");
        assert_eq!(chunks[0].chave, "diversidade_genero");
        assert_eq!(chunks[0].valor, 45.0);
        assert_eq!(chunks[0].pagina, 3);
        assert!(chunks[0].contexto.contains("45%"));
    }

    #[test]
    fn comma_decimal_normalizes_to_dot() {
        let locator = EvidenceLocator::new(diversity_taxonomy());
        let chunks = locator.locate("participação de mulheres atingiu 45,5% em 2024", 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].valor, 45.5);
    }

    #[test]
    fn window_without_indicator_mention_is_discarded() {
        // Page-level test passes (keyword at the start), but the number sits
        // more than a window away from any mention, so no chunk survives.
        let filler = "x".repeat(200);
        let text = format!("mulheres na liderança. {} 80% dos fornecedores", filler);
        let locator = EvidenceLocator::new(diversity_taxonomy());
        assert!(locator.locate(&text, 1).is_empty());
    }

    #[test]
    fn every_chunk_context_contains_id_or_synonym() {
        let text = "Relatório 2024: mulheres 30%, diversidade 41,2%, GRI 405-1 55% conselho";
        let locator = EvidenceLocator::new(diversity_taxonomy());
        let chunks = locator.locate(text, 2);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            let lower = chunk.contexto.to_lowercase();
            assert!(
                chunk.contexto.contains("405-1")
                    || lower.contains("mulheres")
                    || lower.contains("diversidade"),
                "chunk context lost its indicator mention: {}",
                chunk.contexto
            );
        }
    }

    #[test]
    fn locate_is_deterministic() {
        let text = "diversidade 41% e mulheres 30% no GRI 405-1";
        let locator = EvidenceLocator::new(diversity_taxonomy());
        assert_eq!(locator.locate(text, 1), locator.locate(text, 1));
    }

    #[test]
    fn empty_page_yields_no_chunks() {
        let locator = EvidenceLocator::new(diversity_taxonomy());
        assert!(locator.locate("", 1).is_empty());
    }

    #[test]
    fn unrelated_page_yields_no_chunks() {
        let locator = EvidenceLocator::new(diversity_taxonomy());
        assert!(locator
            .locate("emissões de carbono caíram 12% neste ano", 1)
            .is_empty());
    }

    #[test]
    fn window_clips_at_text_bounds() {
        let locator = EvidenceLocator::new(diversity_taxonomy());
        let chunks = locator.locate("mulheres 45%", 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].contexto, "...mulheres 45%...");
    }

    #[test]
    fn multibyte_text_near_window_edge_does_not_panic() {
        let pad = "çã".repeat(80);
        let text = format!("{}mulheres em posições de liderança 33%{}", pad, pad);
        let locator = EvidenceLocator::new(diversity_taxonomy());
        let chunks = locator.locate(&text, 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].valor, 33.0);
    }
}

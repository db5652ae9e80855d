//! Sparse Encoder (C4): fits a BM25 vocabulary over a corpus and encodes documents
//! and queries into sparse (index, value) vectors for the hybrid vector index
//! (spec.md §4.3).
//!
//! The encoder must be fit once over a representative corpus before it can encode
//! anything (spec.md §9: no online vocabulary growth — the caller is responsible for
//! bootstrapping it, typically from the first ingested paper's chunks).

use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// A sparse vector as parallel (index, value) pairs, the representation the vector
/// index stores alongside dense embeddings (spec.md §4.4).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// A fitted BM25 vocabulary: term -> index, document frequency, and corpus statistics
/// (spec.md §4.3's "k1=1.2, b=0.75" defaults).
#[derive(Debug, Clone, Default)]
pub struct Bm25Encoder {
    vocab: HashMap<String, u32>,
    doc_freq: HashMap<String, u32>,
    doc_count: usize,
    avg_doc_len: f32,
    fitted: bool,
}

impl Bm25Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Fit the vocabulary and document-frequency table over a corpus of document
    /// texts. Replaces any prior fit state.
    pub fn fit(&mut self, documents: &[String]) {
        let mut vocab = HashMap::new();
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0usize;

        for doc in documents {
            let tokens = tokenize(doc);
            total_len += tokens.len();
            let mut seen = std::collections::HashSet::new();
            for term in tokens {
                let next_id = vocab.len() as u32;
                vocab.entry(term.clone()).or_insert(next_id);
                if seen.insert(term.clone()) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        let doc_count = documents.len();
        self.avg_doc_len = if doc_count > 0 {
            total_len as f32 / doc_count as f32
        } else {
            0.0
        };
        self.vocab = vocab;
        self.doc_freq = doc_freq;
        self.doc_count = doc_count;
        self.fitted = true;
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.doc_count as f32;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Encode a single document into its BM25 sparse vector. Terms absent from the
    /// fitted vocabulary are dropped; callers that need them should refit first.
    pub fn encode_document(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        let doc_len = tokens.len() as f32;
        let mut term_freq: HashMap<&str, u32> = HashMap::new();
        for t in &tokens {
            *term_freq.entry(t.as_str()).or_insert(0) += 1;
        }

        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (term, tf) in term_freq {
            let Some(&idx) = self.vocab.get(term) else {
                continue;
            };
            let tf = tf as f32;
            let idf = self.idf(term);
            let denom = tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_len.max(1.0));
            let score = idf * (tf * (K1 + 1.0)) / denom.max(f32::EPSILON);
            indices.push(idx);
            values.push(score);
        }

        let mut pairs: Vec<(u32, f32)> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|(idx, _)| *idx);
        SparseVector {
            indices: pairs.iter().map(|(i, _)| *i).collect(),
            values: pairs.iter().map(|(_, v)| *v).collect(),
        }
    }

    /// Encode a batch of documents.
    pub fn encode_documents(&self, texts: &[String]) -> Vec<SparseVector> {
        texts.iter().map(|t| self.encode_document(t)).collect()
    }

    /// Encode a query the same way as a document; BM25 query weighting typically
    /// uses raw term presence rather than full tf saturation (spec.md §4.3).
    pub fn encode_query(&self, text: &str) -> SparseVector {
        let tokens: std::collections::HashSet<String> = tokenize(text).into_iter().collect();
        let mut pairs: Vec<(u32, f32)> = tokens
            .iter()
            .filter_map(|term| {
                let idx = *self.vocab.get(term)?;
                Some((idx, self.idf(term)))
            })
            .collect();
        pairs.sort_by_key(|(idx, _)| *idx);
        SparseVector {
            indices: pairs.iter().map(|(i, _)| *i).collect(),
            values: pairs.iter().map(|(_, v)| *v).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfitted_encoder_yields_empty_vectors() {
        let enc = Bm25Encoder::new();
        assert!(!enc.is_fitted());
        let v = enc.encode_document("some text here");
        assert!(v.indices.is_empty());
    }

    #[test]
    fn test_fit_then_encode_document_nonempty() {
        let mut enc = Bm25Encoder::new();
        enc.fit(&[
            "attention is all you need".to_string(),
            "transformers for natural language processing".to_string(),
        ]);
        assert!(enc.is_fitted());
        let v = enc.encode_document("attention mechanism in transformers");
        assert!(!v.indices.is_empty());
        assert_eq!(v.indices.len(), v.values.len());
    }

    #[test]
    fn test_rare_term_scores_higher_than_common_term() {
        let mut enc = Bm25Encoder::new();
        enc.fit(&[
            "the model uses attention".to_string(),
            "the model uses layers".to_string(),
            "the model uses dropout".to_string(),
            "quantum entanglement rarely appears".to_string(),
        ]);
        let common_idf = enc.idf("the");
        let rare_idf = enc.idf("quantum");
        assert!(rare_idf > common_idf);
    }

    #[test]
    fn test_encode_query_matches_vocab_indices() {
        let mut enc = Bm25Encoder::new();
        enc.fit(&["graph neural networks for molecules".to_string()]);
        let q = enc.encode_query("graph networks");
        for idx in &q.indices {
            assert!(enc.vocab.values().any(|v| v == idx));
        }
    }

    #[test]
    fn test_indices_are_sorted() {
        let mut enc = Bm25Encoder::new();
        enc.fit(&["zebra apple mango banana cherry date".to_string()]);
        let v = enc.encode_document("zebra apple mango banana cherry date");
        let mut sorted = v.indices.clone();
        sorted.sort();
        assert_eq!(v.indices, sorted);
    }
}

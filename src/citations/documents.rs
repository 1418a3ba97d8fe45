//! Retrieved documents, citation filtering, and the sources footer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Metadata keys tried, in order, for the document body text.
const TEXT_KEYS: [&str; 9] = [
    "contextualized_text",
    "text",
    "content",
    "chunk",
    "body",
    "document",
    "pageContent",
    "page_content",
    "summary",
];

/// Title used when a document carries none.
const DEFAULT_TITLE: &str = "Reference Doc";

/// A retrieved, reranked candidate that the model may cite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Vector-store record id.
    pub id: String,
    /// Similarity score from the vector query.
    #[serde(default)]
    pub score: f64,
    /// Score assigned by the reranker, if reranking ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    /// Namespace the record was retrieved from.
    #[serde(default)]
    pub namespace: String,
    /// Arbitrary record metadata (title, heading, URL, chunk id, text).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            score: 0.0,
            rerank_score: None,
            namespace: String::new(),
            metadata: Map::new(),
        }
    }

    /// Builder-style metadata setter, mostly for tests and fixtures.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The identifier the model cites this document by.
    ///
    /// Looks up `chunk_id`, then `chunkId`, then falls back to the record id.
    /// Numeric ids are rendered as strings.
    pub fn chunk_id(&self) -> String {
        ["chunk_id", "chunkId"]
            .iter()
            .find_map(|key| self.metadata.get(*key).and_then(value_as_id))
            .unwrap_or_else(|| self.id.clone())
    }

    pub fn title(&self) -> &str {
        self.meta_str("doc_title").unwrap_or(DEFAULT_TITLE)
    }

    pub fn heading(&self) -> Option<&str> {
        self.meta_str("heading")
    }

    pub fn source_url(&self) -> Option<&str> {
        self.meta_str("source_url")
    }

    pub fn category(&self) -> Option<&str> {
        self.meta_str("category")
    }

    /// Effective score for relevance decisions: rerank score, else vector score.
    pub fn relevance(&self) -> f64 {
        self.rerank_score.unwrap_or(self.score)
    }

    /// Body text of the document, from the first populated text key.
    ///
    /// Arrays contribute their string items joined by newlines; numbers are
    /// rendered; anything else is skipped.
    pub fn text(&self) -> String {
        TEXT_KEYS
            .iter()
            .filter_map(|key| self.metadata.get(*key))
            .map(normalize_text)
            .find(|text| !text.is_empty())
            .unwrap_or_default()
    }

    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Keep the documents whose chunk id was declared as used.
///
/// Document order is preserved. With no identifiers nothing is cited.
pub fn filter_cited(documents: &[SourceDocument], used: &[String]) -> Vec<SourceDocument> {
    if used.is_empty() {
        return Vec::new();
    }
    let used: HashSet<&str> = used.iter().map(String::as_str).collect();
    documents
        .iter()
        .filter(|doc| used.contains(doc.chunk_id().as_str()))
        .cloned()
        .collect()
}

/// Render the sources footer appended after the answer.
///
/// Returns `None` when there is nothing to cite.
pub fn format_sources(documents: &[SourceDocument]) -> Option<String> {
    if documents.is_empty() {
        return None;
    }

    let lines: Vec<String> = documents
        .iter()
        .map(|doc| {
            let heading = doc
                .heading()
                .map(|h| format!(" ({h})"))
                .unwrap_or_default();
            let chunk = format!(" (chunk {})", doc.chunk_id());
            match doc.source_url() {
                Some(url) => format!("* [{}]({url}){heading}{chunk}", doc.title()),
                None => format!("* {}{heading}{chunk}", doc.title()),
            }
        })
        .collect();

    Some(format!("\n\n<<SOURCES>>\n{}\n<</SOURCES>>", lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(docs: &[SourceDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn chunk_id_fallback_chain() {
        let doc = SourceDocument::new("rec-1");
        assert_eq!(doc.chunk_id(), "rec-1");

        let doc = SourceDocument::new("rec-1").with_meta("chunkId", "alt-7");
        assert_eq!(doc.chunk_id(), "alt-7");

        let doc = SourceDocument::new("rec-1")
            .with_meta("chunkId", "alt-7")
            .with_meta("chunk_id", "main-3");
        assert_eq!(doc.chunk_id(), "main-3");
    }

    #[test]
    fn numeric_chunk_id_is_stringified() {
        let doc = SourceDocument::new("rec-1").with_meta("chunk_id", 42);
        assert_eq!(doc.chunk_id(), "42");
    }

    #[test]
    fn non_scalar_chunk_id_falls_through() {
        let doc = SourceDocument::new("rec-1").with_meta("chunk_id", json!({"x": 1}));
        assert_eq!(doc.chunk_id(), "rec-1");
    }

    #[test]
    fn filter_keeps_declared_documents() {
        let docs = vec![
            SourceDocument::new("a"),
            SourceDocument::new("b"),
            SourceDocument::new("c"),
        ];
        let cited = filter_cited(&docs, &["b".to_string()]);
        assert_eq!(ids(&cited), vec!["b"]);
    }

    #[test]
    fn filter_with_no_identifiers_is_empty() {
        let docs = vec![SourceDocument::new("a")];
        assert!(filter_cited(&docs, &[]).is_empty());
    }

    #[test]
    fn filter_preserves_document_order() {
        let docs = vec![
            SourceDocument::new("a"),
            SourceDocument::new("b"),
            SourceDocument::new("c"),
        ];
        let used = vec!["c".to_string(), "a".to_string(), "c".to_string()];
        assert_eq!(ids(&filter_cited(&docs, &used)), vec!["a", "c"]);
    }

    #[test]
    fn text_uses_first_populated_key() {
        let doc = SourceDocument::new("a")
            .with_meta("text", "")
            .with_meta("content", json!(["line 1", 5, "line 2"]))
            .with_meta("summary", "ignored");
        assert_eq!(doc.text(), "line 1\nline 2");

        let doc = SourceDocument::new("a").with_meta("body", 12);
        assert_eq!(doc.text(), "12");

        assert_eq!(SourceDocument::new("a").text(), "");
    }

    #[test]
    fn format_sources_with_and_without_url() {
        let docs = vec![
            SourceDocument::new("r1")
                .with_meta("doc_title", "Resume")
                .with_meta("source_url", "https://example.com/cv")
                .with_meta("heading", "Experience")
                .with_meta("chunk_id", "cv-2"),
            SourceDocument::new("r2"),
        ];
        let footer = format_sources(&docs).unwrap();
        assert_eq!(
            footer,
            "\n\n<<SOURCES>>\n\
             * [Resume](https://example.com/cv) (Experience) (chunk cv-2)\n\
             * Reference Doc (chunk r2)\n\
             <</SOURCES>>"
        );
    }

    #[test]
    fn format_sources_empty_is_none() {
        assert_eq!(format_sources(&[]), None);
    }

    #[test]
    fn deserializes_pinecone_style_record() {
        let doc: SourceDocument = serde_json::from_value(json!({
            "id": "x",
            "score": 0.7,
            "metadata": { "doc_title": "T" }
        }))
        .unwrap();
        assert_eq!(doc.title(), "T");
        assert_eq!(doc.relevance(), 0.7);
        assert!(doc.rerank_score.is_none());
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream;
use portfolio_chat::chat::{DeltaStream, GenerationRequest, Generator, Retriever};
use portfolio_chat::citations::{SourceDocument, SourceExtractor};
use portfolio_chat::error::{ChatError, Result};
use std::sync::{Arc, Mutex};

/// Feed `fragments` through a fresh extractor; returns (visible text, captured text).
pub fn run_extractor<S: AsRef<str>>(fragments: &[S]) -> (String, String) {
    let mut extractor = SourceExtractor::new();
    let mut visible = String::new();
    for fragment in fragments {
        for piece in extractor.feed(fragment.as_ref()) {
            assert!(!piece.is_empty(), "extractor emitted an empty piece");
            visible.push_str(&piece);
        }
    }
    if let Some(rest) = extractor.flush() {
        visible.push_str(&rest);
    }
    let captured = extractor.finalize().to_string();
    (visible, captured)
}

/// Split `text` into fragments of `size` characters.
pub fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

/// Split `text` at the given character offsets (unsorted, may repeat).
pub fn split_at_chars(text: &str, cuts: &[usize]) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (chars.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut fragments = Vec::new();
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(chars.len())) {
        fragments.push(chars[start..cut].iter().collect());
        start = cut;
    }
    fragments
}

/// Generator replaying a fixed list of fragments, recording each request.
pub struct ScriptedGenerator {
    pub name: String,
    pub fragments: Vec<Result<String, String>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(fragments: Vec<String>) -> Self {
        Self {
            name: "scripted".into(),
            fragments: fragments.into_iter().map(Ok).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Emits `fragments` and then fails with `message`.
    pub fn failing_after(fragments: Vec<String>, message: &str) -> Self {
        let mut generator = Self::new(fragments);
        generator.fragments.push(Err(message.to_string()));
        generator
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<DeltaStream> {
        self.requests.lock().unwrap().push(request.clone());
        let backend = self.name.clone();
        let items: Vec<Result<String>> = self
            .fragments
            .iter()
            .map(|f| match f {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(ChatError::Upstream {
                    backend: backend.clone(),
                    message: message.clone(),
                }),
            })
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Generator whose request always fails.
pub struct UnreachableGenerator;

#[async_trait]
impl Generator for UnreachableGenerator {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn stream(&self, _request: &GenerationRequest) -> Result<DeltaStream> {
        Err(ChatError::Status {
            service: "unreachable".into(),
            status: 503,
            body: "service unavailable".into(),
        })
    }
}

/// Retriever returning a fixed document list.
pub struct StaticRetriever(pub Vec<SourceDocument>);

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<SourceDocument>> {
        Ok(self.0.clone())
    }
}

/// Retriever that always errors.
pub struct BrokenRetriever;

#[async_trait]
impl Retriever for BrokenRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<SourceDocument>> {
        Err(ChatError::MissingApiKey("PINECONE_API_KEY".into()))
    }
}

/// Three cited-ready documents with chunk ids `a`, `b`, `c`.
pub fn sample_documents() -> Vec<SourceDocument> {
    ["a", "b", "c"]
        .iter()
        .map(|id| {
            SourceDocument::new(format!("rec-{id}"))
                .with_meta("chunk_id", *id)
                .with_meta("doc_title", format!("Doc {id}"))
                .with_meta("text", format!("Body of {id}"))
        })
        .collect()
}

pub fn arc<T: Generator + 'static>(generator: T) -> Arc<dyn Generator> {
    Arc::new(generator)
}

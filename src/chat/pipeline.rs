//! One chat turn end to end: retrieval, prompt, generation, citation extraction.
//!
//! [`ChatPipeline::respond`] yields [`ChatEvent`]s that the server frames as
//! Server-Sent Events. Visible text is forwarded as soon as the extractor
//! releases it; the sources footer and the terminal `[DONE]` follow once the
//! generation stream ends.

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;

use super::classify::{AlwaysRetrieve, QueryClassifier, Route};
use super::generation::{ChatMessage, GenerationRequest, Generator};
use super::prompt::{build_system_prompt, temperature_for, Mode};
use super::retrieval::Retriever;
use crate::citations::{filter_cited, format_sources, SourceExtractor};
use crate::config::{CitationConfig, GenerationConfig};

/// Data payload of the terminal event.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Message shown to clients when generation fails mid-request.
pub const STREAM_ERROR_MESSAGE: &str = "Stream error occurred";

/// One event of the response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Visible text to append to the answer.
    Content(String),
    /// Generation failed; no further events follow.
    Error {
        message: String,
        details: Option<String>,
    },
    /// The answer is complete.
    Done,
}

#[derive(Serialize)]
struct ContentPayload<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ChatEvent {
    /// The SSE `data:` payload for this event.
    pub fn to_data(&self) -> String {
        match self {
            Self::Content(content) => serde_json::to_string(&ContentPayload { content })
                .unwrap_or_else(|_| String::from("{}")),
            Self::Error { message, details } => serde_json::to_string(&ErrorPayload {
                error: message,
                details: details.as_deref(),
            })
            .unwrap_or_else(|_| String::from("{}")),
            Self::Done => DONE_SENTINEL.to_string(),
        }
    }

    fn stream_error(err: impl std::fmt::Display) -> Self {
        Self::Error {
            message: STREAM_ERROR_MESSAGE.to_string(),
            details: Some(err.to_string()),
        }
    }
}

/// A single user turn to answer.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Correlates log lines of one request.
    pub request_id: String,
    /// Latest user message; used both as retrieval query and model input.
    pub query: String,
    pub mode: Mode,
}

/// Long-lived services shared by every request.
pub struct ChatPipeline {
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn Retriever>,
    classifier: Arc<dyn QueryClassifier>,
    generation: GenerationConfig,
    citations: CitationConfig,
}

impl ChatPipeline {
    pub fn new(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        generation: GenerationConfig,
        citations: CitationConfig,
    ) -> Self {
        Self {
            generator,
            retriever,
            classifier: Arc::new(AlwaysRetrieve),
            generation,
            citations,
        }
    }

    /// Replace the default classifier, which retrieves for every query.
    pub fn with_classifier(mut self, classifier: Arc<dyn QueryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Answer `turn`, yielding events in the order they should reach the client.
    pub fn respond(self: Arc<Self>, turn: ChatTurn) -> impl Stream<Item = ChatEvent> + Send + 'static {
        async_stream::stream! {
            let request_id = turn.request_id.as_str();

            let documents = match self.classifier.classify(&turn.query).await {
                Route::Skip => {
                    tracing::info!(request_id, "retrieval skipped");
                    Vec::new()
                }
                Route::Retrieve { query } => match self.retriever.retrieve(&query).await {
                    Ok(documents) => documents,
                    Err(e) => {
                        tracing::error!(request_id, error = %e, "retrieval failed");
                        Vec::new()
                    }
                },
            };
            tracing::info!(
                request_id,
                mode = %turn.mode,
                documents = documents.len(),
                "context prepared"
            );

            let request = GenerationRequest {
                system_prompt: build_system_prompt(turn.mode, &documents),
                messages: vec![ChatMessage::user(turn.query.clone())],
                temperature: temperature_for(turn.mode, &self.generation),
                max_tokens: self.generation.max_tokens,
            };

            let mut deltas = match self.generator.stream(&request).await {
                Ok(deltas) => deltas,
                Err(e) => {
                    tracing::error!(request_id, error = %e, "generation failed");
                    yield ChatEvent::stream_error(e);
                    return;
                }
            };

            let mut extractor = SourceExtractor::new();
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(text) => {
                        for piece in extractor.feed(&text) {
                            yield ChatEvent::Content(piece);
                        }
                    }
                    Err(e) => {
                        tracing::error!(request_id, error = %e, "generation stream broke");
                        if let Some(rest) = extractor.flush() {
                            yield ChatEvent::Content(rest);
                        }
                        yield ChatEvent::stream_error(e);
                        return;
                    }
                }
            }
            if let Some(rest) = extractor.flush() {
                yield ChatEvent::Content(rest);
            }

            if !documents.is_empty() {
                let used = extractor.used_sources(self.citations.trust_unterminated);
                let cited = filter_cited(&documents, &used);
                tracing::info!(
                    request_id,
                    block = ?extractor.block_state(),
                    declared = used.len(),
                    cited = cited.len(),
                    "citations resolved"
                );
                if let Some(footer) = format_sources(&cited) {
                    yield ChatEvent::Content(footer);
                }
            }

            yield ChatEvent::Done;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_event_is_json() {
        let data = ChatEvent::Content("a \"quoted\"\nline".into()).to_data();
        assert_eq!(data, r#"{"content":"a \"quoted\"\nline"}"#);
    }

    #[test]
    fn error_event_omits_missing_details() {
        let event = ChatEvent::Error {
            message: "boom".into(),
            details: None,
        };
        assert_eq!(event.to_data(), r#"{"error":"boom"}"#);

        let event = ChatEvent::stream_error("upstream 500");
        assert_eq!(
            event.to_data(),
            r#"{"error":"Stream error occurred","details":"upstream 500"}"#
        );
    }

    #[test]
    fn done_event_is_sentinel() {
        assert_eq!(ChatEvent::Done.to_data(), "[DONE]");
    }
}

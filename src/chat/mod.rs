//! The chat service around the citation extractor.
//!
//! - [`classify`]: whether a query needs retrieval
//! - [`generation`]: streamed completions from OpenAI-compatible backends with fallback
//! - [`retrieval`]: embedding, vector query and hosted rerank of candidate documents
//! - [`prompt`]: system prompt with context and the used-sources instruction
//! - [`pipeline`]: one chat turn as a stream of client events
//! - [`rate_limit`]: per-client fixed-window limiting

pub mod classify;
pub mod generation;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;
pub mod retrieval;

pub use classify::{AlwaysRetrieve, QueryClassifier, Route, SmallTalkFilter};
pub use generation::{ChatMessage, DeltaStream, FallbackGenerator, GenerationRequest, Generator};
pub use pipeline::{ChatEvent, ChatPipeline, ChatTurn};
pub use prompt::Mode;
pub use rate_limit::RateLimiter;
pub use retrieval::{NoRetrieval, Retriever};

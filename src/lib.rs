//! Streaming chat backend for a portfolio site, with in-stream citation extraction.
//!
//! A chat turn retrieves candidate documents, asks an LLM to answer from them,
//! and streams the answer to the client as Server-Sent Events. The model is told
//! to finish with a marker-delimited block naming the chunks it used; that block
//! is cut out of the stream on the fly and turned into a sources footer listing
//! only the documents the model actually relied on.
//!
//! # Architecture
//!
//! - **Extraction**: a per-request state machine withholds at most a marker's
//!   length of trailing text, so markers split across fragments are still found
//! - **Generation**: OpenAI-compatible streaming completions (Groq primary,
//!   OpenRouter fallback by default)
//! - **Retrieval**: OpenAI embeddings, Pinecone vector query and hosted rerank
//! - **Transport**: axum over HTTP, one SSE event per visible fragment
//!
//! # Modules
//!
//! - [`citations`]: marker constants, the streaming extractor, used-sources parsing, citation filtering
//! - [`chat`]: generation, retrieval, prompt, pipeline and rate limiting
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`error`]: library error type
//! - [`server`]: HTTP routes and shared state

pub mod chat;
pub mod citations;
pub mod config;
pub mod error;
pub mod server;

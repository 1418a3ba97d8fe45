//! In-stream citation handling.
//!
//! The model ends its answer with a used-sources block listing the chunk ids it
//! relied on. [`extractor`] strips that block from the streamed text while it
//! arrives, [`parse`] turns the captured text into identifiers, and
//! [`documents`] keeps only the retrieved documents that were actually cited.

pub mod documents;
pub mod extractor;
pub mod markers;
pub mod parse;

pub use documents::{filter_cited, format_sources, SourceDocument};
pub use extractor::{BlockState, SourceExtractor};
pub use parse::parse_used_sources;

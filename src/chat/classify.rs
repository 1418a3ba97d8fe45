//! Deciding whether a query needs retrieval at all.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::RetrievalConfig;

/// What to do with a query before generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Retrieve context using `query`, which may differ from the user's text.
    Retrieve { query: String },
    /// Answer without retrieved context.
    Skip,
}

#[async_trait]
pub trait QueryClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Route;
}

/// Retrieves for every query, unchanged.
pub struct AlwaysRetrieve;

#[async_trait]
impl QueryClassifier for AlwaysRetrieve {
    async fn classify(&self, query: &str) -> Route {
        Route::Retrieve {
            query: query.to_string(),
        }
    }
}

/// Words that on their own make a message small talk.
const SMALL_TALK_WORDS: &[&str] = &[
    "hi", "hello", "hey", "hiya", "howdy", "yo", "sup", "there", "thanks", "thank", "you",
    "thx", "ty", "ok", "okay", "cool", "great", "nice", "bye", "goodbye", "good", "morning",
    "afternoon", "evening", "cheers",
];

/// Longest message still considered small talk, in words.
const SMALL_TALK_MAX_WORDS: usize = 4;

/// Skips retrieval for greetings and thanks; retrieves for everything else.
pub struct SmallTalkFilter;

impl SmallTalkFilter {
    pub fn is_small_talk(query: &str) -> bool {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        !words.is_empty()
            && words.len() <= SMALL_TALK_MAX_WORDS
            && words.iter().all(|w| SMALL_TALK_WORDS.contains(w))
    }
}

#[async_trait]
impl QueryClassifier for SmallTalkFilter {
    async fn classify(&self, query: &str) -> Route {
        if Self::is_small_talk(query) {
            Route::Skip
        } else {
            Route::Retrieve {
                query: query.to_string(),
            }
        }
    }
}

pub fn build_classifier(config: &RetrievalConfig) -> Arc<dyn QueryClassifier> {
    if config.skip_small_talk {
        tracing::info!("small-talk queries answered without retrieval");
        Arc::new(SmallTalkFilter)
    } else {
        Arc::new(AlwaysRetrieve)
    }
}

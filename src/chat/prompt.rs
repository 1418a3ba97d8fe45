//! System prompt assembly.
//!
//! The prompt carries the retrieved context and tells the model how to declare
//! which chunks it used. The declaration format is built from
//! [`crate::citations::markers`] so the extractor always recognises it.

use crate::citations::markers::{END, START_PRIMARY};
use crate::citations::SourceDocument;

/// Conversation tone selected by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Professional,
    Casual,
}

impl Mode {
    /// Parse a client-supplied mode. Anything other than `casual` is professional.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("casual") => Self::Casual,
            _ => Self::Professional,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Casual => "casual",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const KNOWLEDGE_OVERVIEW: &str = "\
### What I Know (Knowledge Categories):
1. **Professional Life:** work experience, education, technical skills, projects and achievements.
2. **Personal Life:** interests, hobbies, background stories and public milestones.
3. **The System (RAG):** how this assistant retrieves information and its operating modes.
";

const BASE_CONSTRAINTS: &str = "\
### Rules:
* Refer to the portfolio owner in the third person.
* Use the Knowledge Categories above to guide your answers.
* If a query falls outside these categories, politely redirect the user.
";

const PROFESSIONAL_PERSONA: &str = "\
You are the portfolio owner's professional chief of staff.
**Vibe:** Sharp, efficient, and organized.
";

const CASUAL_PERSONA: &str = "\
You are the portfolio owner's AI sidekick.
**Vibe:** Clever, low-key, and friendly.
";

const NO_CONTEXT: &str = "\
[Note: No specific document matches found. Using general knowledge.]
Answer from general knowledge about the portfolio owner and suggest asking about \
specific projects or experience.";

/// Build the system prompt for `mode` with `documents` as context.
///
/// When documents are present the prompt lists each with its chunk id and asks
/// the model to close its answer with a used-sources block.
pub fn build_system_prompt(mode: Mode, documents: &[SourceDocument]) -> String {
    let (persona, context_title) = match mode {
        Mode::Professional => (PROFESSIONAL_PERSONA, "### Contextual Data:"),
        Mode::Casual => (CASUAL_PERSONA, "### Memories:"),
    };

    let mut prompt = format!("{persona}\n{KNOWLEDGE_OVERVIEW}\n{BASE_CONSTRAINTS}\n{context_title}\n");
    if documents.is_empty() {
        prompt.push_str(NO_CONTEXT);
        return prompt;
    }

    prompt.push_str(&format_context(documents));
    prompt.push_str("\n\n");
    prompt.push_str(&used_sources_instruction());
    prompt
}

/// Render documents as headed context sections separated by rules.
pub fn format_context(documents: &[SourceDocument]) -> String {
    documents
        .iter()
        .map(|doc| {
            let category = doc
                .category()
                .map(|c| format!("[Category: {c}] "))
                .unwrap_or_default();
            let heading = doc.heading().unwrap_or("General Information");
            format!(
                "#### {category}{heading}\n[chunk_id: {}]\n{}",
                doc.chunk_id(),
                doc.text().trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Instruction describing the used-sources block, built from the marker constants.
pub fn used_sources_instruction() -> String {
    format!(
        "### Citing Sources:\n\
         After your answer, list the chunk_id of every context section you actually used, \
         one per line, in exactly this format:{START_PRIMARY}chunk-id-1\nchunk-id-2{END}\n\
         If you used none of the sections, write none inside the block. \
         Do not mention this block in your answer."
    )
}

/// Sampling temperature for `mode`.
pub fn temperature_for(mode: Mode, config: &crate::config::GenerationConfig) -> f32 {
    match mode {
        Mode::Professional => config.professional_temperature,
        Mode::Casual => config.casual_temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::{parse_used_sources, SourceExtractor};
    use crate::config::GenerationConfig;

    fn docs() -> Vec<SourceDocument> {
        vec![SourceDocument::new("rec-1")
            .with_meta("chunk_id", "cv-1")
            .with_meta("heading", "Experience")
            .with_meta("category", "work")
            .with_meta("text", "  Built things.  ")]
    }

    #[test]
    fn mode_parsing_is_lenient() {
        assert_eq!(Mode::parse_lenient(Some("casual")), Mode::Casual);
        assert_eq!(Mode::parse_lenient(Some(" CASUAL ")), Mode::Casual);
        assert_eq!(Mode::parse_lenient(Some("pirate")), Mode::Professional);
        assert_eq!(Mode::parse_lenient(None), Mode::Professional);
    }

    #[test]
    fn context_lists_chunk_ids() {
        let context = format_context(&docs());
        assert_eq!(
            context,
            "#### [Category: work] Experience\n[chunk_id: cv-1]\nBuilt things."
        );
    }

    #[test]
    fn prompt_without_documents_has_no_citation_instruction() {
        let prompt = build_system_prompt(Mode::Casual, &[]);
        assert!(prompt.contains("AI sidekick"));
        assert!(prompt.contains("No specific document matches"));
        assert!(!prompt.contains("<<USED_SOURCES>>"));
    }

    #[test]
    fn prompt_with_documents_requests_block() {
        let prompt = build_system_prompt(Mode::Professional, &docs());
        assert!(prompt.contains("chief of staff"));
        assert!(prompt.contains("[chunk_id: cv-1]"));
        assert!(prompt.contains(START_PRIMARY));
        assert!(prompt.contains(END));
    }

    #[test]
    fn instruction_example_round_trips_through_extractor() {
        // A model copying the example verbatim must be understood.
        let instruction = used_sources_instruction();
        let mut extractor = SourceExtractor::new();
        let mut visible: String = extractor.feed(&instruction).concat();
        visible.extend(extractor.flush());
        assert!(!visible.contains("<<USED_SOURCES>>"));
        assert_eq!(
            parse_used_sources(extractor.finalize()),
            vec!["chunk-id-1", "chunk-id-2"]
        );
    }

    #[test]
    fn temperature_follows_mode() {
        let config = GenerationConfig::default();
        assert_eq!(temperature_for(Mode::Casual, &config), 0.8);
        assert_eq!(temperature_for(Mode::Professional, &config), 0.5);
    }
}

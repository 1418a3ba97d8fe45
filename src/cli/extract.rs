//! CLI `extract` command: replay a recorded model response through the extractor.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use portfolio_chat::citations::{BlockState, SourceExtractor};
use portfolio_chat::config::ChatConfig;

/// Feed a transcript in `chunk_size`-character fragments and print what the
/// client would see, followed by the identifiers the block declared.
pub fn extract(file: Option<&Path>, chunk_size: usize, config: &ChatConfig) -> Result<()> {
    anyhow::ensure!(chunk_size > 0, "--chunk-size must be > 0");

    let transcript = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let chars: Vec<char> = transcript.chars().collect();
    let mut extractor = SourceExtractor::new();
    let mut visible = String::new();
    let mut emissions = 0usize;

    for fragment in chars.chunks(chunk_size) {
        let fragment: String = fragment.iter().collect();
        for piece in extractor.feed(&fragment) {
            emissions += 1;
            visible.push_str(&piece);
        }
    }
    if let Some(rest) = extractor.flush() {
        emissions += 1;
        visible.push_str(&rest);
    }

    let state = extractor.block_state();
    let used = extractor.used_sources(config.citations.trust_unterminated);

    println!("{visible}");
    println!();
    println!("Fragments in:      {}", chars.len().div_ceil(chunk_size));
    println!("Emissions out:     {emissions}");
    println!("Block:             {}", describe(state));
    println!("Captured text:     {:?}", extractor.finalize());
    if used.is_empty() {
        println!("Used sources:      (none)");
    } else {
        println!("Used sources:");
        for id in &used {
            println!("  {id}");
        }
    }

    Ok(())
}

fn describe(state: BlockState) -> &'static str {
    match state {
        BlockState::Absent => "absent",
        BlockState::Open => "unterminated",
        BlockState::Closed => "closed",
    }
}

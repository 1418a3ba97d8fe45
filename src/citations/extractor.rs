//! Incremental extraction of the used-sources block from a generation stream.
//!
//! The model appends a block delimited by the markers in [`super::markers`] to
//! the end of its answer. Fragments arrive in arbitrary pieces, so a marker can
//! be split across any number of them. [`SourceExtractor`] withholds only the
//! few trailing characters that could still turn into a marker and emits
//! everything else as soon as it arrives.

use super::markers;
use super::parse::parse_used_sources;

/// Whether the stream contained a used-sources block, and if it was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// No start marker has been seen.
    Absent,
    /// A start marker was consumed but its end marker has not arrived.
    Open,
    /// At least one block was opened and every opened block was closed.
    Closed,
}

/// Per-request state machine splitting a fragment stream into visible text and
/// captured control text.
///
/// One instance serves exactly one generation stream. It performs no I/O and
/// holds no external resources.
#[derive(Debug)]
pub struct SourceExtractor {
    /// Text not yet safe to emit or to commit to `captured`.
    buffered: String,
    /// `true` between a start marker and its end marker.
    capturing: bool,
    /// Text seen between start and end markers.
    captured: String,
    /// Number of start markers consumed.
    blocks_opened: usize,
    /// Byte length of `captured` when the last block closed.
    closed_len: usize,
    /// Characters withheld while scanning visible text.
    start_hold_back: usize,
    /// Characters withheld while capturing.
    end_hold_back: usize,
}

impl Default for SourceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor {
    pub fn new() -> Self {
        Self {
            buffered: String::new(),
            capturing: false,
            captured: String::new(),
            blocks_opened: 0,
            closed_len: 0,
            start_hold_back: markers::max_start_len().saturating_sub(1),
            end_hold_back: markers::end_len().saturating_sub(1),
        }
    }

    /// Feed the next fragment and return the pieces that may be shown now.
    ///
    /// An empty fragment is a no-op. Returned pieces are never empty and never
    /// contain a complete marker.
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        let mut emitted = Vec::new();
        if fragment.is_empty() {
            return emitted;
        }
        self.buffered.push_str(fragment);

        loop {
            if self.capturing {
                if let Some(idx) = self.buffered.find(markers::END) {
                    self.captured.push_str(&self.buffered[..idx]);
                    self.buffered.drain(..idx + markers::END.len());
                    self.capturing = false;
                    self.closed_len = self.captured.len();
                    continue;
                }
                // Keep a possible partial end marker for the next fragment.
                let cut = tail_start(&self.buffered, self.end_hold_back);
                self.captured.push_str(&self.buffered[..cut]);
                self.buffered.drain(..cut);
                break;
            }

            if let Some((idx, marker)) = markers::find_start(&self.buffered) {
                if idx > 0 {
                    emitted.push(self.buffered[..idx].to_string());
                }
                self.buffered.drain(..idx + marker.len());
                self.open_block();
                continue;
            }

            let cut = tail_start(&self.buffered, self.start_hold_back);
            if cut > 0 {
                emitted.push(self.buffered.drain(..cut).collect());
            }
            break;
        }

        emitted
    }

    /// Release whatever is still withheld once the upstream is exhausted.
    ///
    /// Outside a block the residual text is visible and returned. Inside an
    /// unterminated block it is control content: it moves to the captured text
    /// and nothing is returned.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffered.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffered);
        if self.capturing {
            self.captured.push_str(&rest);
            None
        } else {
            Some(rest)
        }
    }

    /// The accumulated control-block text.
    ///
    /// Folds residual buffered text into the capture if a block is still open.
    /// Calling it again returns the same text.
    pub fn finalize(&mut self) -> &str {
        if self.capturing && !self.buffered.is_empty() {
            let rest = std::mem::take(&mut self.buffered);
            self.captured.push_str(&rest);
        }
        &self.captured
    }

    pub fn block_state(&self) -> BlockState {
        if self.blocks_opened == 0 {
            BlockState::Absent
        } else if self.capturing {
            BlockState::Open
        } else {
            BlockState::Closed
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Finalize and parse the captured identifiers.
    ///
    /// An unterminated block yields no identifiers unless `trust_unterminated`
    /// is set, since its content may have been cut mid-identifier. Identifiers
    /// from blocks closed before it are kept either way.
    pub fn used_sources(&mut self, trust_unterminated: bool) -> Vec<String> {
        match self.block_state() {
            BlockState::Absent => Vec::new(),
            BlockState::Open if !trust_unterminated => {
                let captured_len = self.finalize().len();
                tracing::warn!(
                    captured_len,
                    closed_len = self.closed_len,
                    "used-sources block never closed, ignoring its identifiers"
                );
                parse_used_sources(&self.captured[..self.closed_len])
            }
            BlockState::Open | BlockState::Closed => parse_used_sources(self.finalize()),
        }
    }

    fn open_block(&mut self) {
        if !self.captured.is_empty() && !self.captured.ends_with('\n') {
            self.captured.push('\n');
        }
        self.capturing = true;
        self.blocks_opened += 1;
    }
}

/// Byte index where the last `keep` characters of `s` begin.
fn tail_start(s: &str, keep: usize) -> usize {
    if keep == 0 {
        return s.len();
    }
    s.char_indices()
        .rev()
        .nth(keep - 1)
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

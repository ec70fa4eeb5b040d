//! Stateful stream filter that removes `<think>…</think>` blocks from a
//! textual stream delivered as arbitrary-sized chunks.
//!
//! The filter is an explicit state machine over characters, so the output is
//! identical for any rechunking of the same input and the only buffering is
//! a partial tag (at most 7 characters of lookahead). Matching is strict:
//! lowercase, no whitespace inside the tag. Providers that emit variants are
//! normalized in the adapters, never here.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    Outside,
    MaybeOpen,
    Inside,
    MaybeClose,
}

pub struct StreamFilter {
    state: FilterState,
    pending: String,
}

impl StreamFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Outside,
            pending: String::new(),
        }
    }

    /// Process one chunk, returning `(clean, thinking)` text.
    pub fn push(&mut self, chunk: &str) -> (String, String) {
        let mut clean = String::new();
        let mut thinking = String::new();
        for ch in chunk.chars() {
            self.step(ch, &mut clean, &mut thinking);
        }
        (clean, thinking)
    }

    fn step(&mut self, ch: char, clean: &mut String, thinking: &mut String) {
        loop {
            match self.state {
                FilterState::Outside => {
                    if ch == '<' {
                        self.pending.push(ch);
                        self.state = FilterState::MaybeOpen;
                    } else {
                        clean.push(ch);
                    }
                    return;
                }
                FilterState::MaybeOpen => {
                    self.pending.push(ch);
                    if self.pending == OPEN_TAG {
                        self.pending.clear();
                        self.state = FilterState::Inside;
                        return;
                    }
                    if OPEN_TAG.starts_with(self.pending.as_str()) {
                        return;
                    }
                    // Not a tag after all: the buffered prefix was literal
                    // text; the offending char is reprocessed from Outside.
                    self.pending.pop();
                    clean.push_str(&self.pending);
                    self.pending.clear();
                    self.state = FilterState::Outside;
                }
                FilterState::Inside => {
                    if ch == '<' {
                        self.pending.push(ch);
                        self.state = FilterState::MaybeClose;
                    } else {
                        thinking.push(ch);
                    }
                    return;
                }
                FilterState::MaybeClose => {
                    self.pending.push(ch);
                    if self.pending == CLOSE_TAG {
                        self.pending.clear();
                        self.state = FilterState::Outside;
                        return;
                    }
                    if CLOSE_TAG.starts_with(self.pending.as_str()) {
                        return;
                    }
                    self.pending.pop();
                    thinking.push_str(&self.pending);
                    self.pending.clear();
                    self.state = FilterState::Inside;
                }
            }
        }
    }

    /// End-of-stream flush. An unmatched partial open tag was literal text;
    /// a partial close tag belongs to the thinking it interrupted. No
    /// synthetic close is inserted for an unterminated block.
    pub fn finish(&mut self) -> (String, String) {
        let pending = std::mem::take(&mut self.pending);
        match self.state {
            FilterState::MaybeOpen => {
                self.state = FilterState::Outside;
                (pending, String::new())
            }
            FilterState::MaybeClose => {
                self.state = FilterState::Inside;
                (String::new(), pending)
            }
            _ => (String::new(), String::new()),
        }
    }
}

impl Default for StreamFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot filtering for buffered (non-streaming) bodies.
pub fn strip_thinking(text: &str) -> (String, String) {
    let mut filter = StreamFilter::new();
    let (mut clean, mut thinking) = filter.push(text);
    let (tail_clean, tail_thinking) = filter.finish();
    clean.push_str(&tail_clean);
    thinking.push_str(&tail_thinking);
    (clean, thinking)
}

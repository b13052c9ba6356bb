//! Sentence splitter
//!
//! Breaks the LLM's streamed text deltas into chunks suitable for handing
//! to TTS incrementally, rather than waiting for the full response. A chunk
//! is emitted once it both reaches a minimum length and ends on terminal
//! punctuation, so TTS isn't fed a fragment like "Well," on its own. An
//! `Interrupt` flushes whatever is buffered immediately, since the turn is
//! being abandoned and there's no value in waiting for punctuation that
//! will never come.

const TERMINALS: [char; 4] = ['.', '!', '?', '\n'];

pub struct SentenceSplitter {
    min_len: usize,
    buffer: String,
}

impl SentenceSplitter {
    pub fn new(min_len: usize) -> Self {
        Self { min_len, buffer: String::new() }
    }

    /// Feed a text delta; returns any chunks now ready to emit, in order.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut ready = Vec::new();
        loop {
            let Some(cut) = self.find_cut() else { break };
            let chunk = self.buffer[..cut].trim().to_string();
            self.buffer.drain(..cut);
            if !chunk.is_empty() {
                ready.push(chunk);
            }
        }
        ready
    }

    /// Finds the byte offset just past the first terminal punctuation mark
    /// that leaves at least `min_len` characters before it, if one exists.
    fn find_cut(&self) -> Option<usize> {
        let mut char_count = 0;
        for (idx, ch) in self.buffer.char_indices() {
            char_count += 1;
            if TERMINALS.contains(&ch) && char_count >= self.min_len {
                return Some(idx + ch.len_utf8());
            }
        }
        None
    }

    /// Flush whatever remains, regardless of length or punctuation. Used at
    /// normal end-of-turn and on interrupt.
    pub fn flush(&mut self) -> Option<String> {
        let chunk = self.buffer.trim().to_string();
        self.buffer.clear();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_chunk_once_length_and_punctuation_are_met() {
        let mut splitter = SentenceSplitter::new(10);
        assert!(splitter.push("Hi.").is_empty());
        let chunks = splitter.push(" This is a longer sentence.");
        assert_eq!(chunks, vec!["Hi. This is a longer sentence.".to_string()]);
    }

    #[test]
    fn short_fragment_before_punctuation_is_not_split_early() {
        let mut splitter = SentenceSplitter::new(50);
        let chunks = splitter.push("Well.");
        assert!(chunks.is_empty());
    }

    #[test]
    fn flush_returns_remaining_buffer_regardless_of_punctuation() {
        let mut splitter = SentenceSplitter::new(50);
        splitter.push("an incomplete thought without a period");
        let flushed = splitter.flush();
        assert_eq!(flushed, Some("an incomplete thought without a period".into()));
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn multiple_sentences_in_one_delta_all_emit() {
        let mut splitter = SentenceSplitter::new(5);
        let chunks = splitter.push("First one. Second one. Third.");
        assert_eq!(chunks.len(), 3);
    }
}

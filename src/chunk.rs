//! Sentence-window text chunker.
//!
//! Splits document body text into overlapping passages bounded by a target
//! word count. Splitting occurs on sentence boundaries so each passage stays
//! readable, and consecutive passages share a 20% word overlap to preserve
//! context continuity across boundaries for embedding and retrieval.

/// Fraction of the target size shared between consecutive passages.
const OVERLAP_DIVISOR: usize = 5;

/// Split text into overlapping passages of at most `target_words` words.
///
/// Sentences are accumulated greedily until the next one would exceed the
/// target; a single sentence longer than the target is kept whole rather
/// than dropped. The next window starts `window_len - overlap` words after
/// the current one (overlap = 20% of target, minimum 1), measured in whole
/// sentences. Empty input yields no passages.
pub fn chunk_text(text: &str, target_words: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let overlap = (target_words / OVERLAP_DIVISOR).max(1);
    let mut chunks = Vec::new();
    let mut i = 0;

    while i < sentences.len() {
        let mut window: Vec<&str> = Vec::new();
        let mut window_len = 0usize;
        let mut j = i;

        while j < sentences.len() && window_len < target_words {
            let sent_len = word_count(&sentences[j]);
            if window_len + sent_len > target_words && !window.is_empty() {
                break;
            }
            window.push(&sentences[j]);
            window_len += sent_len;
            j += 1;
        }

        if !window.is_empty() {
            chunks.push(window.join(" "));
        }

        if window_len == 0 {
            // Degenerate window: advance one sentence to guarantee termination
            i += 1;
            continue;
        }

        let step = window_len.saturating_sub(overlap).max(1);
        let mut words_seen = 0usize;
        let mut advanced = false;
        for (k, sentence) in sentences.iter().enumerate().skip(i) {
            words_seen += word_count(sentence);
            if words_seen >= step {
                i = k + 1;
                advanced = true;
                break;
            }
        }
        if !advanced {
            // Remaining text is shorter than one step; the last window
            // already covered it
            break;
        }
    }

    chunks
}

/// Split text into sentence units on terminal punctuation followed by
/// whitespace, keeping the punctuation with its sentence. A trailing
/// fragment without terminal punctuation has one restored.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|n| n.is_whitespace()) {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        let mut last = trimmed.to_string();
        if !last.ends_with(['.', '!', '?']) {
            last.push('.');
        }
        sentences.push(last);
    }

    sentences
}

fn word_count(sentence: &str) -> usize {
    sentence.split_whitespace().count()
}

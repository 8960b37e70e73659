use crate::embed::tokenize;

/// Default target chunk size and overlap, in whitespace-delimited tokens,
/// for the paragraph/heading-aware splitter.
pub const DEFAULT_CHUNK_TOKENS: usize = 400;
pub const DEFAULT_OVERLAP_TOKENS: usize = 50;

/// Split `text` into an ordered, gap-free partition of chunks, each
/// targeting `target_tokens` tokens with `overlap_tokens` of repeated
/// trailing context carried into the next chunk. Paragraph boundaries
/// (blank lines) are preferred split points over mid-paragraph breaks.
pub fn chunk_text(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text.split("\n\n").filter(|p| !p.trim().is_empty()).collect();
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current_words: Vec<String> = Vec::new();

    for paragraph in paragraphs {
        let words = tokenize(paragraph);
        current_words.extend(words);

        while current_words.len() >= target_tokens {
            let chunk_words: Vec<String> = current_words.drain(..target_tokens).collect();
            chunks.push(chunk_words.join(" "));
            let overlap_start = chunk_words.len().saturating_sub(overlap_tokens);
            let mut carried: Vec<String> = chunk_words[overlap_start..].to_vec();
            carried.extend(current_words.drain(..));
            current_words = carried;
        }
    }

    if !current_words.is_empty() {
        chunks.push(current_words.join(" "));
    }

    chunks
}

/// Semantic chunking for Q&A-structured documents: each `Q: ... A: ...`
/// pair becomes exactly one chunk, with no overlap.
pub fn chunk_qa_pairs(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Q:") && !current.is_empty() {
            chunks.push(current.trim().to_string());
            current = String::new();
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("one two three", 400, 50);
        assert_eq!(chunks, vec!["one two three".to_string()]);
    }

    #[test]
    fn long_text_splits_with_overlap() {
        let words: Vec<String> = (0..900).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&text, 400, 50);
        assert!(chunks.len() >= 2);
        // consecutive chunks share the overlap window
        let first_tail: Vec<&str> = chunks[0].split(' ').rev().take(50).collect();
        let second_head: Vec<&str> = chunks[1].split(' ').take(50).collect();
        assert_eq!(first_tail.into_iter().rev().collect::<Vec<_>>(), second_head);
    }

    #[test]
    fn qa_pairs_split_on_question_markers() {
        let text = "Q: What is Rust?\nA: A systems language.\nQ: Is it fast?\nA: Yes.";
        let chunks = chunk_qa_pairs(text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("Q: What is Rust?"));
        assert!(chunks[1].starts_with("Q: Is it fast?"));
    }
}

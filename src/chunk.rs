//! Sliding-window word chunker.
//!
//! Splits extracted text into overlapping fixed-size windows of
//! whitespace-delimited words. Each window advances by
//! `chunk_size - overlap` words, so consecutive chunks share `overlap`
//! words and the windows cover the input with no gaps.
//!
//! Chunk identity is `{document_id}_{index}` — deterministic, so
//! re-ingesting a document overwrites its chunks instead of duplicating
//! them. Each chunk also carries a SHA-256 hash of its text for staleness
//! detection.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split text into overlapping word windows.
///
/// Returns chunks with contiguous indices starting at 0. Empty or
/// whitespace-only text yields no chunks; callers must treat that as an
/// extraction failure rather than silently skipping the document.
///
/// `overlap >= chunk_size` is a configuration error rejected at startup
/// (see [`crate::config::validate`]); it is a logic error to reach this
/// function with such values.
pub fn chunk_text(document_id: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    debug_assert!(chunk_size > 0 && overlap < chunk_size);

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(words.len());
        chunks.push(make_chunk(
            document_id,
            chunks.len() as i64,
            &words[start..end].join(" "),
        ));
        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Number of chunks `chunk_text` emits for a text of `word_count` words.
///
/// `ceil(max(1, L - O) / (C - O))` for `L > 0`, `0` for `L == 0`.
pub fn chunk_count(word_count: usize, chunk_size: usize, overlap: usize) -> usize {
    if word_count == 0 {
        return 0;
    }
    let step = chunk_size - overlap;
    let effective = word_count.saturating_sub(overlap).max(1);
    effective.div_ceil(step)
}

/// Deterministic chunk id shared by the chunker and the exists-check in the
/// ingestion pipeline.
pub fn chunk_id(document_id: &str, index: i64) -> String {
    format!("{}_{}", document_id, index)
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("doc1", "", 1000, 200).is_empty());
        assert!(chunk_text("doc1", "   \n\t ", 1000, 200).is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_text("doc1", "alpha beta gamma", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "doc1_0");
        assert_eq!(chunks[0].text, "alpha beta gamma");
    }

    #[test]
    fn fresh_ingest_scenario_2400_words() {
        // 2400 words at size 1000 / overlap 200 => ceil((2400-200)/800) = 3
        let chunks = chunk_text("doc1", &words(2400), 1000, 200);
        assert_eq!(chunks.len(), 3);
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["doc1_0", "doc1_1", "doc1_2"]);
    }

    #[test]
    fn consecutive_chunks_overlap_by_configured_words() {
        let chunks = chunk_text("doc1", &words(2400), 1000, 200);
        let first: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let second: Vec<&str> = chunks[1].text.split_whitespace().collect();
        assert_eq!(&first[800..], &second[..200]);
    }

    #[test]
    fn windows_cover_input_without_gaps() {
        let text = words(1234);
        let all: Vec<&str> = text.split_whitespace().collect();
        let chunks = chunk_text("doc1", &text, 100, 25);
        // Every input word must appear at the predicted offset of some window.
        let step = 75;
        for (i, chunk) in chunks.iter().enumerate() {
            let window: Vec<&str> = chunk.text.split_whitespace().collect();
            let start = i * step;
            assert_eq!(window, &all[start..(start + window.len())]);
        }
        // Last window ends at the last input word.
        let last: Vec<&str> = chunks.last().unwrap().text.split_whitespace().collect();
        assert_eq!(*last.last().unwrap(), *all.last().unwrap());
    }

    #[test]
    fn final_partial_window_is_kept() {
        // 850 words at size 500 / overlap 100: windows at 0 and 400,
        // the second holding only 450 words.
        let chunks = chunk_text("doc1", &words(850), 500, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text.split_whitespace().count(), 450);
    }

    #[test]
    fn exact_multiple_emits_no_redundant_window() {
        // 1000 words at size 1000: exactly one chunk, no empty follow-up.
        let chunks = chunk_text("doc1", &words(1000), 1000, 200);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn count_formula_matches_emitted_chunks() {
        for (len, size, overlap) in [
            (1usize, 1000usize, 200usize),
            (999, 1000, 200),
            (1000, 1000, 200),
            (1001, 1000, 200),
            (2400, 1000, 200),
            (2401, 1000, 200),
            (850, 500, 100),
            (5000, 700, 0),
        ] {
            let emitted = chunk_text("doc1", &words(len), size, overlap).len();
            assert_eq!(
                emitted,
                chunk_count(len, size, overlap),
                "len={} size={} overlap={}",
                len,
                size,
                overlap
            );
        }
    }

    #[test]
    fn deterministic_ids_and_hashes() {
        let text = words(1700);
        let a = chunk_text("doc1", &text, 600, 150);
        let b = chunk_text("doc1", &text, 600, 150);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.hash, y.hash);
        }
    }
}

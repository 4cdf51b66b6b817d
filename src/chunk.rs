//! Sentence-boundary text chunker.
//!
//! Splits extracted document text into [`Chunk`]s bounded by a configurable
//! character limit. Splitting occurs after sentence-ending punctuation
//! (`.`, `!`, `?` followed by whitespace) to preserve semantic coherence;
//! a sentence longer than the limit is hard-split at the character budget.
//!
//! Each chunk after the first carries the previous chunk's last `overlap`
//! characters as a prefix, so context survives a chunk boundary. Output is
//! deterministic for identical input and configuration, which keeps
//! re-chunking idempotent.
//!
//! Chunk identity is positional: `source_path` + `sequence_index` derive the
//! deterministic vector id used by the lifecycle manager.

use crate::models::Chunk;

/// Split `text` into bounded, overlapping chunks.
///
/// Preconditions (enforced by config validation): `max_chars > 0` and
/// `overlap < max_chars`. Every produced chunk is non-empty and at most
/// `max_chars` characters; whitespace-only input yields no chunks.
pub fn chunk_text(source_path: &str, text: &str, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    debug_assert!(max_chars > 0);
    debug_assert!(overlap < max_chars);

    // Sentence pieces are capped below max_chars by the overlap width, so a
    // chunk never exceeds max_chars once its overlap prefix is added.
    let budget = max_chars - overlap;

    let mut chunks: Vec<Chunk> = Vec::new();
    for (sentence_offset, sentence) in split_sentences(text) {
        let sent_chars: Vec<char> = sentence.chars().collect();
        let mut start = 0usize;
        while start < sent_chars.len() {
            let end = (start + budget).min(sent_chars.len());
            let piece: String = sent_chars[start..end].iter().collect();

            let chunk_body = match chunks.last() {
                Some(prev) if overlap > 0 => {
                    let mut body = tail_chars(&prev.text, overlap);
                    body.push_str(&piece);
                    body
                }
                _ => piece,
            };

            chunks.push(Chunk {
                text: chunk_body,
                sequence_index: chunks.len(),
                source_path: source_path.to_string(),
                char_offset: sentence_offset + start,
            });
            start = end;
        }
    }
    chunks
}

/// Deterministic vector id for a chunk: `<sanitized_path>_<sequence_index>`.
///
/// Sanitization maps every non-alphanumeric character of the relative path
/// to `_`, keeping ids safe for any store's id charset.
pub fn vector_id(source_path: &str, sequence_index: usize) -> String {
    format!("{}_{}", sanitize_path(source_path), sequence_index)
}

fn sanitize_path(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Split text into trimmed sentences with their character offsets.
///
/// A boundary is `.`, `!`, or `?` immediately followed by whitespace (or end
/// of input). The separating whitespace is consumed; segments that trim to
/// nothing are dropped.
fn split_sentences(text: &str) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let is_boundary = matches!(chars[i], '.' | '!' | '?')
            && chars.get(i + 1).map_or(true, |next| next.is_whitespace());
        i += 1;
        if is_boundary {
            push_segment(&chars, start, i, &mut out);
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            start = i;
        }
    }
    push_segment(&chars, start, chars.len(), &mut out);
    out
}

fn push_segment(chars: &[char], start: usize, end: usize, out: &mut Vec<(usize, String)>) {
    let mut s = start;
    let mut e = end;
    while s < e && chars[s].is_whitespace() {
        s += 1;
    }
    while e > s && chars[e - 1].is_whitespace() {
        e -= 1;
    }
    if s < e {
        out.push((s, chars[s..e].iter().collect()));
    }
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

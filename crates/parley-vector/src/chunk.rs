//! Sliding-window text chunking for document indexing.

/// Split `text` into windows of at most `size` characters, consecutive
/// windows sharing up to `overlap` characters.
///
/// A window that would cut a word is pulled back to the last whitespace in
/// its second half. Chunks are trimmed; blank chunks are dropped.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let size = size.max(1);
    let overlap = overlap.min(size.saturating_sub(1));
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }

        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            let floor = start + size / 2;
            if let Some(ws) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                end = ws;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(chunk_text("  short text ", 100, 10), vec!["short text"]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n ", 100, 10).is_empty());
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = "word ".repeat(200);
        for chunk in chunk_text(&text, 50, 10) {
            assert!(chunk.chars().count() <= 50);
        }
    }

    #[test]
    fn test_breaks_on_whitespace() {
        let chunks = chunk_text("alpha beta gamma delta", 12, 0);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn test_overlap_repeats_tail() {
        let chunks = chunk_text("aaaa bbbb cccc dddd", 10, 5);
        assert_eq!(chunks, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd"]);
    }

    #[test]
    fn test_unbroken_text_splits_hard() {
        let chunks = chunk_text(&"x".repeat(25), 10, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "xxxxx");
    }

    #[test]
    fn test_overlap_larger_than_size_still_progresses() {
        let chunks = chunk_text(&"y".repeat(30), 5, 50);
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= 30);
    }

    #[test]
    fn test_multibyte_characters() {
        let chunks = chunk_text("héllo wörld ünïcode", 8, 0);
        assert!(chunks.iter().all(|c| c.chars().count() <= 8));
        assert_eq!(chunks.concat().replace(' ', ""), "héllowörldünïcode");
    }
}

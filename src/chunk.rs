//! Greedy packing of segmentation tokens into bounded chunks.
//!
//! Tokens are appended to the current chunk until the next one would push its
//! character count past the limit. Chunk boundaries therefore always fall
//! between tokens, and concatenating the chunks reproduces the input exactly.
//! A single token longer than the limit becomes a chunk of its own.

use crate::segment::Segmenter;

/// Packs `tokens` into chunks of at most `max_chars` characters.
pub fn pack_tokens(tokens: &[&str], max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for token in tokens {
        let len = token.chars().count();
        if current_len + len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(token);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Segments `text` and packs the tokens.
pub fn chunk_text(segmenter: &dyn Segmenter, text: &str, max_chars: usize) -> Vec<String> {
    let tokens = segmenter.cut(text);
    pack_tokens(&tokens, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::tests::JIEBA;

    #[test]
    fn test_pack_respects_limit() {
        let tokens = ["ab", "cd", "e", "fgh", "i"];
        let chunks = pack_tokens(&tokens, 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "i"]);
    }

    #[test]
    fn test_oversized_token_stands_alone() {
        let tokens = ["a", "toolongtoken", "b"];
        let chunks = pack_tokens(&tokens, 4);
        assert_eq!(chunks, vec!["a", "toolongtoken", "b"]);
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        assert!(chunk_text(&**JIEBA, "", 500).is_empty());
    }

    #[test]
    fn test_chunks_reconstruct_and_stay_bounded() {
        let paragraph = "自然语言处理是人工智能领域的一个重要方向。它研究能实现人与计算机之间用自然语言进行有效通信的各种理论和方法。\n";
        let text = paragraph.repeat(30);
        for limit in [20, 64, 500] {
            let chunks = chunk_text(&**JIEBA, &text, limit);
            assert_eq!(chunks.concat(), text);
            assert!(chunks.iter().all(|c| c.chars().count() <= limit));
        }
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunks = pack_tokens(&["你好", "世界"], 4);
        assert_eq!(chunks, vec!["你好世界"]);
    }
}

//! In-band reasoning extraction.
//!
//! Some models wrap chain-of-thought in `<think>...</think>` inside the
//! assistant text instead of using a dedicated response field. The blocks
//! are stripped from the stored text and kept separately for the record.

use std::sync::OnceLock;

use regex::Regex;

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // (?s) so blocks may span lines; non-greedy so multiple blocks split.
        Regex::new(r"(?s)<think>(.*?)</think>").unwrap()
    })
}

/// Split `text` into (thinking, visible text).
///
/// Returns `None` thinking when no block is present; the text comes back
/// unchanged in that case.
pub fn extract_thinking(text: &str) -> (Option<String>, String) {
    let re = think_re();
    if !re.is_match(text) {
        return (None, text.to_string());
    }

    let mut blocks = Vec::new();
    for cap in re.captures_iter(text) {
        let inner = cap[1].trim();
        if !inner.is_empty() {
            blocks.push(inner.to_string());
        }
    }

    let visible = re.replace_all(text, "").trim().to_string();
    let thinking = if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n"))
    };
    (thinking, visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_block_passes_through() {
        let (thinking, text) = extract_thinking("plain answer");
        assert!(thinking.is_none());
        assert_eq!(text, "plain answer");
    }

    #[test]
    fn test_single_block_is_stripped() {
        let (thinking, text) = extract_thinking("<think>step one</think>the answer");
        assert_eq!(thinking.as_deref(), Some("step one"));
        assert_eq!(text, "the answer");
    }

    #[test]
    fn test_multiline_block() {
        let input = "<think>line one\nline two</think>\ndone";
        let (thinking, text) = extract_thinking(input);
        assert_eq!(thinking.as_deref(), Some("line one\nline two"));
        assert_eq!(text, "done");
    }

    #[test]
    fn test_multiple_blocks_joined() {
        let input = "<think>a</think>middle<think>b</think>end";
        let (thinking, text) = extract_thinking(input);
        assert_eq!(thinking.as_deref(), Some("a\nb"));
        assert_eq!(text, "middleend");
    }

    #[test]
    fn test_empty_block_yields_no_thinking() {
        let (thinking, text) = extract_thinking("<think>  </think>answer");
        assert!(thinking.is_none());
        assert_eq!(text, "answer");
    }

    #[test]
    fn test_unclosed_block_left_alone() {
        let input = "<think>never closed";
        let (thinking, text) = extract_thinking(input);
        assert!(thinking.is_none());
        assert_eq!(text, input);
    }
}

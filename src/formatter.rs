use html_escape::decode_html_entities;

use crate::transcript::CaptionFragment;

/// Decodes the HTML entities YouTube leaves in caption text.
pub fn clean_caption_text(raw: &str) -> String {
    // Timed text is sometimes double-escaped, leaving a literal "&#39;" after one pass.
    decode_html_entities(raw).replace("&#39;", "'")
}

/// Joins fragment texts in provider order, separated by a single space.
pub fn join_fragments(fragments: &[CaptionFragment]) -> String {
    fragments
        .iter()
        .map(|fragment| fragment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::test_support::fragment;

    #[test]
    fn test_clean_caption_text() {
        assert_eq!(clean_caption_text("it&#39;s &amp; that"), "it's & that");
        assert_eq!(clean_caption_text("it&amp;#39;s"), "it's");
        assert_eq!(clean_caption_text("plain"), "plain");
    }

    #[test]
    fn test_join_keeps_order() {
        let forward = [fragment("one"), fragment("two"), fragment("three")];
        let backward = [fragment("three"), fragment("two"), fragment("one")];

        assert_eq!(join_fragments(&forward), "one two three");
        assert_eq!(join_fragments(&backward), "three two one");
    }

    #[test]
    fn test_join_multibyte_length() {
        let fragments = [fragment("こんにちは"), fragment("世界")];
        let text = join_fragments(&fragments);

        assert_eq!(text, "こんにちは 世界");
        assert_eq!(text.chars().count(), 8);
        assert_eq!(text.len(), 22);
    }

    #[test]
    fn test_join_empty() {
        assert_eq!(join_fragments(&[]), "");
        assert_eq!(join_fragments(&[fragment(""), fragment("a")]), " a");
    }
}

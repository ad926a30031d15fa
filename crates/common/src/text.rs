//! Text helpers for channel payloads.

/// Truncate `text` to at most `max_chars` characters, never splitting a
/// character. Returns a borrowed slice when no truncation is needed.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Short suffix of an identifier for log lines, mirroring how operators
/// recognize Instagram ids by their last digits.
#[must_use]
pub fn id_suffix(id: &str) -> &str {
    let chars = id.chars().count();
    if chars <= 6 {
        return id;
    }
    match id.char_indices().nth(chars - 6) {
        Some((idx, _)) => &id[idx..],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text_intact() {
        assert_eq!(truncate_chars("oi", 1000), "oi");
    }

    #[test]
    fn truncate_cuts_at_character_count() {
        let long = "a".repeat(1200);
        assert_eq!(truncate_chars(&long, 1000).len(), 1000);
    }

    #[test]
    fn truncate_respects_multibyte_boundaries() {
        // Each "é" is two bytes; counting must be by character.
        let text = "ééééé";
        assert_eq!(truncate_chars(text, 3), "ééé");
    }

    #[test]
    fn id_suffix_shortens_long_ids() {
        assert_eq!(id_suffix("178941123456789"), "456789");
        assert_eq!(id_suffix("12345"), "12345");
    }
}

//! Text helpers for character-range references into tweet text
//!
//! Slice offsets are produced by an upstream JavaScript extractor, so they count
//! UTF-16 code units rather than bytes or Unicode scalar values. Every length and
//! substring computation on tweet text goes through these helpers.

/// Length of `text` in UTF-16 code units
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Substring of `text` covering UTF-16 code units `[start, end)`
///
/// Out-of-range or inverted bounds are clamped, yielding an empty string rather
/// than panicking. A range that splits a surrogate pair is decoded lossily.
pub fn utf16_slice(text: &str, start: i64, end: i64) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let len = units.len() as i64;
    let start = start.clamp(0, len) as usize;
    let end = end.clamp(0, len) as usize;
    if start >= end {
        return String::new();
    }
    String::from_utf16_lossy(&units[start..end])
}

/// Truncate `text` to at most `max_chars` characters for log fields
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_len_ascii() {
        assert_eq!(utf16_len("BTC will hit $100k"), 18);
    }

    #[test]
    fn test_utf16_len_counts_surrogate_pairs_as_two() {
        // U+1F680 ROCKET is outside the BMP
        assert_eq!(utf16_len("to the moon 🚀"), 14);
    }

    #[test]
    fn test_utf16_slice_after_emoji() {
        let text = "🚀 BTC 100k";
        // rocket occupies units 0..2, space at 2
        assert_eq!(utf16_slice(text, 3, 6), "BTC");
    }

    #[test]
    fn test_utf16_slice_clamps_bounds() {
        assert_eq!(utf16_slice("abc", -4, 2), "ab");
        assert_eq!(utf16_slice("abc", 1, 99), "bc");
        assert_eq!(utf16_slice("abc", 2, 1), "");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("short", 100), "short");
        assert_eq!(truncate("héllo", 2), "hé");
    }
}

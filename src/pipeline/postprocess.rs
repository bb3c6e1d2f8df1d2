//! Post-processing: deterministic cleanup of backend-generated translations.
//!
//! Even with a strict prompt, LLMs wrap answers in code fences, open with a
//! chatty "Here is the translation:" line, or emit Windows line endings. The
//! rules here fix those quirks without touching the translated content, so
//! the prompt can stay focused on *what* to translate.
//!
//! Cleanup runs before page-marker relabelling; none of the rules add or
//! remove digits.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw chunk translation.
///
/// Rules (applied in order):
/// 1. Strip an outer code fence (```` ``` ````, ```` ```text ````, ```` ```markdown ````)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Drop a leading "Here is the translation:" preamble line
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Strip invisible Unicode that carries no meaning (zero-width space, BOM,
///    word joiner, soft hyphen). ZWJ/ZWNJ are kept: Arabic-script text needs them.
/// 7. Trim leading and trailing blank lines
pub fn clean_translation(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = strip_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    trim_blank_edges(&s)
}

// ── Rule 1: Strip outer code fence ───────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text|txt|plaintext)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap()
});

fn strip_outer_fence(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCE.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Drop a chatty preamble ───────────────────────────────────────────

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A\s*(?:sure[,!.]?\s*)?(?:here\s+is|here's)\s+(?:the\s+|your\s+)?translation[^\n]*:[ \t]*\n")
        .unwrap()
});

fn strip_preamble(input: &str) -> String {
    RE_PREAMBLE.replace(input, "").to_string()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 6: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}

// ── Rule 7: Trim blank edges ─────────────────────────────────────────────────

fn trim_blank_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fence_with_language() {
        assert_eq!(strip_outer_fence("```text\nمرحبا\npage 1\n```"), "مرحبا\npage 1");
        assert_eq!(strip_outer_fence("```markdown\n# Title\n```"), "# Title");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_outer_fence("```\nhello\n```\n"), "hello");
    }

    #[test]
    fn test_inner_fences_kept() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(strip_outer_fence(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_strip_preamble() {
        assert_eq!(
            strip_preamble("Here is the translation into Arabic:\nصفحة 1\n"),
            "صفحة 1\n"
        );
        assert_eq!(strip_preamble("Sure! Here's your translation:\nx"), "x");
        assert_eq!(strip_preamble("page 1\nHere is the translation:\n"), "page 1\nHere is the translation:\n");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn test_invisible_chars_keep_joiners() {
        let input = "a\u{200B}b\u{FEFF}c\u{200C}d\u{200D}e";
        assert_eq!(remove_invisible_chars(input), "abc\u{200C}d\u{200D}e");
    }

    #[test]
    fn test_clean_translation_full_pipeline() {
        let input = "```\r\nHere is the translation:\r\nصفحة 1   \r\n\r\n\r\n\r\n\r\nنص\r\n```";
        let result = clean_translation(input);
        assert_eq!(result, "صفحة 1\n\n\nنص");
    }

    #[test]
    fn test_clean_keeps_digits() {
        let input = "page 7: 1,234 items";
        assert_eq!(clean_translation(input), input);
    }
}

//! Page-label rewriting: turn chunk-local page markers into global ones.
//!
//! The backend sees each chunk as a standalone document, so the page markers
//! it writes ("page 3", "صفحة ٣") count from 1 inside the chunk. Given the
//! chunk's first global page, every marker number `n` becomes
//! `n + start_page - 1`. The label word and the whitespace after it are kept
//! byte-for-byte; only the digits change.
//!
//! Digits may be ASCII, Arabic-Indic (`٠`–`٩`) or Extended Arabic-Indic
//! (`۰`–`۹`); rewritten numbers are always ASCII.
//!
//! Rewriting is **not** idempotent: running it twice with a start page other
//! than 1 shifts the numbers twice.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

use crate::config::DEFAULT_LABELS;

static DEFAULT_RELABELER: Lazy<PageRelabeler> = Lazy::new(|| PageRelabeler::new(DEFAULT_LABELS));

/// Rewrites page markers for a fixed set of label words.
#[derive(Debug, Clone)]
pub struct PageRelabeler {
    re: Regex,
}

impl Default for PageRelabeler {
    fn default() -> Self {
        DEFAULT_RELABELER.clone()
    }
}

impl PageRelabeler {
    /// Build a relabeler for `labels`, matched case-insensitively.
    /// Blank labels are ignored; with no usable label the defaults apply.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .map(|l| regex::escape(&l))
            .collect();
        if alternatives.is_empty() {
            return Self::default();
        }
        let pattern = format!(
            r"(?i)({})(\s+)([0-9\x{{0660}}-\x{{0669}}\x{{06F0}}-\x{{06F9}}]+)",
            alternatives.join("|")
        );
        // Labels are escaped, so the pattern is always valid.
        let re = Regex::new(&pattern).unwrap_or_else(|_| DEFAULT_RELABELER.re.clone());
        Self { re }
    }

    /// Replace every marker number with `local + start_page - 1`.
    ///
    /// Text without markers comes back unchanged. Numbers too large to
    /// shift are left as they are.
    pub fn rewrite(&self, text: &str, start_page: usize) -> String {
        let offset = start_page.saturating_sub(1) as u64;
        let rewritten: Cow<'_, str> = self.re.replace_all(text, |caps: &Captures<'_>| {
            match parse_digits(&caps[3]).and_then(|n| n.checked_add(offset)) {
                Some(global) => format!("{}{}{}", &caps[1], &caps[2], global),
                None => caps[0].to_string(),
            }
        });
        rewritten.into_owned()
    }

    /// Marker numbers in order of appearance.
    pub fn marker_numbers(&self, text: &str) -> Vec<u64> {
        self.re
            .captures_iter(text)
            .filter_map(|caps| parse_digits(&caps[3]))
            .collect()
    }
}

/// Rewrite with the default labels.
pub fn rewrite(text: &str, start_page: usize) -> String {
    DEFAULT_RELABELER.rewrite(text, start_page)
}

/// Count local marker numbers that break the chunk-local numbering assumption.
///
/// Relabelling assumes the backend numbers pages `1..=chunk_len` in order. A
/// marker is anomalous when it is 0, exceeds `chunk_len`, or goes backwards
/// relative to the previous marker. The text is never altered; callers log
/// the count so misnumbered output can be spotted.
pub fn numbering_anomalies(local_numbers: &[u64], chunk_len: usize) -> usize {
    let mut anomalies = 0;
    let mut previous = 0u64;
    for &n in local_numbers {
        if n == 0 || n > chunk_len as u64 || n < previous {
            anomalies += 1;
        }
        previous = previous.max(n);
    }
    anomalies
}

fn parse_digits(digits: &str) -> Option<u64> {
    digits.chars().try_fold(0u64, |acc, c| {
        let d = match c {
            '0'..='9' => c as u32 - '0' as u32,
            '\u{0660}'..='\u{0669}' => c as u32 - 0x0660,
            '\u{06F0}'..='\u{06F9}' => c as u32 - 0x06F0,
            _ => return None,
        };
        acc.checked_mul(10)?.checked_add(d as u64)
    })
}

//! System prompts for chunk translation.
//!
//! Callers can override the default via [`crate::config::PipelineConfig::system_prompt`];
//! the override may use the same `{language}` and `{label}` placeholders.

/// Default translation prompt. `{language}` is replaced with the target
/// language, `{label}` with the page-marker label the backend must emit.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Translate the contents of this PDF into {language}. \
Maintain the original formatting, headings, bullet points, and structure as much as possible. \
Mark the start of every page with the label \"{label}\" followed by the page number, \
counting from 1 for the first page of this document. \
Return only the translation, with no additions, explanations, or suggestions.";

/// Page-marker label the backend is asked to use for a target language.
///
/// Arabic output gets the Arabic label; anything else uses "page". Both are
/// recognised by the default relabeler.
pub fn marker_label(target_language: &str) -> &'static str {
    match target_language.trim().to_lowercase().as_str() {
        "arabic" | "ar" | "العربية" => "صفحة",
        _ => "page",
    }
}

/// The label the backend is told to write, chosen from the labels the
/// relabeler will match.
///
/// The language's usual label wins when it is configured; otherwise the first
/// configured label is used. Only an empty list falls back to
/// [`marker_label`], which the default relabeler then matches.
pub fn prompt_label<'a, S: AsRef<str>>(target_language: &str, labels: &'a [S]) -> &'a str {
    let preferred = marker_label(target_language);
    let mut configured = labels.iter().map(|l| l.as_ref().trim()).filter(|l| !l.is_empty());
    match configured.clone().find(|l| l.to_lowercase() == preferred) {
        Some(label) => label,
        None => configured.next().unwrap_or(preferred),
    }
}

/// Fill the placeholders of `template` for `target_language`, asking for a
/// page label out of `labels`.
pub fn render_prompt<S: AsRef<str>>(template: &str, target_language: &str, labels: &[S]) -> String {
    template
        .replace("{language}", target_language)
        .replace("{label}", prompt_label(target_language, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, DEFAULT_LABELS};
    use crate::pipeline::relabel::PageRelabeler;

    #[test]
    fn default_prompt_for_arabic_uses_arabic_label() {
        let p = render_prompt(DEFAULT_SYSTEM_PROMPT, "Arabic", &DEFAULT_LABELS);
        assert!(p.contains("into Arabic"));
        assert!(p.contains("\"صفحة\""));
        assert!(!p.contains('{'));
    }

    #[test]
    fn other_languages_use_page_label() {
        let p = render_prompt(DEFAULT_SYSTEM_PROMPT, "French", &DEFAULT_LABELS);
        assert!(p.contains("into French"));
        assert!(p.contains("\"page\""));
    }

    #[test]
    fn custom_template_without_placeholders_is_unchanged() {
        assert_eq!(
            render_prompt("Translate.", "German", &DEFAULT_LABELS),
            "Translate."
        );
    }

    #[test]
    fn custom_label_replaces_language_default() {
        assert_eq!(prompt_label("German", &["Seite"]), "Seite");
        assert_eq!(prompt_label("Arabic", &["page"]), "page");
        assert_eq!(prompt_label("Arabic", &[" Page ", "صفحة"]), "صفحة");
        assert_eq!(prompt_label("French", &["Seite", "PAGE"]), "PAGE");
        assert_eq!(prompt_label("French", &["", "  "]), "page");
    }

    #[test]
    fn prompted_label_is_always_relabeled() {
        let cases: [(&str, &[&str]); 5] = [
            ("German", &["Seite"]),
            ("Arabic", &["page"]),
            ("Arabic", &["صفحة", "page"]),
            ("French", &["feuille", "page"]),
            ("Spanish", &[]),
        ];
        for (language, labels) in cases {
            let mut builder = PipelineConfig::builder().target_language(language);
            if !labels.is_empty() {
                builder = builder.labels(labels.iter().copied());
            }
            let config = builder.build().unwrap();
            let label = prompt_label(&config.target_language, &config.labels);
            let prompt = render_prompt(DEFAULT_SYSTEM_PROMPT, &config.target_language, &config.labels);
            assert!(prompt.contains(&format!("\"{label}\"")), "{language}: {prompt}");

            let relabeler = PageRelabeler::new(&config.labels);
            assert_eq!(
                relabeler.rewrite(&format!("{label} 3"), 11),
                format!("{label} 13"),
                "{language} with {labels:?}"
            );
        }
    }
}

pub const DEFAULT_STYLE_HINTS: &str = "informal, use Du for German";

/// Prompt handed to the translator task when the resolved provider isn't
/// `mock` (mock providers get the protected text directly, for
/// backward-compatible output in tests that predate prompt templating).
pub fn build_translation_prompt(
    source_text: &str,
    protected_text: &str,
    target_locale: &str,
    style_hints: Option<&str>,
) -> String {
    let style = style_hints.unwrap_or(DEFAULT_STYLE_HINTS).trim();
    format!(
        "Translate the source to {target_locale}. Style hints: {style}.\n\
         Do not modify placeholder tokens like \u{27e6}PH_*\u{27e7} and term tokens like \u{27e6}TERM_*\u{27e7}.\n\
         Keep actual newlines and escaped \\n unchanged.\n\
         Output only the translated string.\n\
         SOURCE: {source_text}\n\
         PROTECTED: {protected_text}"
    )
}

pub fn build_reviewer_prompt(
    source_text: &str,
    draft_text: &str,
    target_locale: &str,
    style_hints: Option<&str>,
) -> String {
    let style = style_hints.unwrap_or(DEFAULT_STYLE_HINTS).trim();
    format!(
        "Review and improve this {target_locale} translation. Style hints: {style}.\n\
         Keep placeholder tokens (\u{27e6}PH_*\u{27e7}) and glossary tokens (\u{27e6}TERM_*\u{27e7}) unchanged.\n\
         Keep actual newlines and escaped \\n unchanged.\n\
         Output only the revised translation string.\n\
         SOURCE: {source_text}\n\
         DRAFT: {draft_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_prompt_carries_all_sections() {
        let prompt = build_translation_prompt("Heal 10 HP", "Heal 10 \u{27e6}PH_1\u{27e7}", "de-DE", None);
        assert!(prompt.contains("Translate the source to de-DE"));
        assert!(prompt.contains("informal, use Du for German"));
        assert!(prompt.contains("SOURCE: Heal 10 HP"));
        assert!(prompt.contains("PROTECTED: Heal 10 \u{27e6}PH_1\u{27e7}"));
    }

    #[test]
    fn reviewer_prompt_uses_draft_section() {
        let prompt = build_reviewer_prompt("Heal 10 HP", "Heile 10 HP", "de-DE", Some("formal"));
        assert!(prompt.contains("Review and improve this de-DE translation"));
        assert!(prompt.contains("Style hints: formal"));
        assert!(prompt.contains("DRAFT: Heile 10 HP"));
    }
}

use {
    async_trait::async_trait,
    crosstalk_channels::{Classification, ContentFilter, FilterError, Severity},
    regex::{Regex, RegexBuilder},
};

use crate::words::CustomWords;

/// Words flagged even without the remote service.
const BASE_WORDS: &[&str] = &["spam", "scam", "fake", "virus", "malware"];

/// Word-list classifier used as the offline fallback.
#[derive(Debug, Clone, Default)]
pub struct LocalWordFilter {
    custom: CustomWords,
}

impl LocalWordFilter {
    pub fn new(custom: CustomWords) -> Self {
        Self { custom }
    }

    /// Classify `text` against the base and custom lists, masking hits with `*`.
    pub fn classify_text(&self, text: &str) -> Classification {
        let Some(pattern) = self.pattern() else {
            return Classification::clean(text);
        };
        if !pattern.is_match(text) {
            return Classification::clean(text);
        }
        let redacted = pattern
            .replace_all(text, |caps: &regex::Captures<'_>| "*".repeat(caps[0].chars().count()))
            .into_owned();
        Classification {
            severity: Severity::from_ratio(mask_ratio(&redacted, text)),
            redacted_text: redacted,
        }
    }

    fn pattern(&self) -> Option<Regex> {
        let words: Vec<String> = BASE_WORDS
            .iter()
            .map(|w| (*w).to_string())
            .chain(self.custom.list())
            .map(|w| regex::escape(&w))
            .collect();
        if words.is_empty() {
            return None;
        }
        RegexBuilder::new(&format!(r"\b(?:{})\b", words.join("|")))
            .case_insensitive(true)
            .build()
            .ok()
    }
}

/// Share of `original`'s characters that are masked in `redacted`.
pub(crate) fn mask_ratio(redacted: &str, original: &str) -> f64 {
    let total = original.chars().count();
    if total == 0 {
        return 0.0;
    }
    let masked = redacted.chars().filter(|c| *c == '*').count();
    masked as f64 / total as f64
}

#[async_trait]
impl ContentFilter for LocalWordFilter {
    async fn classify(&self, text: &str) -> Result<Classification, FilterError> {
        Ok(self.classify_text(text))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn clean_text_is_untouched() {
        let verdict = LocalWordFilter::default().classify_text("hello world");
        assert_eq!(verdict, Classification::clean("hello world"));
    }

    #[test]
    fn whole_words_only() {
        let verdict = LocalWordFilter::default().classify_text("spammer is not a word hit");
        assert_eq!(verdict.severity, Severity::None);
    }

    #[rstest]
    #[case("Scam", Severity::High)]
    #[case("this is a scam", Severity::Medium)]
    #[case("there is a small chance this long message mentions malware only once today", Severity::Low)]
    fn severity_follows_masked_share(#[case] text: &str, #[case] expected: Severity) {
        let verdict = LocalWordFilter::default().classify_text(text);
        assert_eq!(verdict.severity, expected);
        assert!(verdict.redacted_text.contains('*'));
    }

    #[test]
    fn custom_words_are_masked() {
        let custom = CustomWords::new();
        custom.add("bogus");
        let verdict = LocalWordFilter::new(custom).classify_text("totally BOGUS claim here");
        assert_eq!(verdict.redacted_text, "totally ***** claim here");
    }

    #[test]
    fn ratio_of_empty_text_is_zero() {
        assert_eq!(mask_ratio("", ""), 0.0);
    }
}

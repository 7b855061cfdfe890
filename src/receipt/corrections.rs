//! Post-processing of plain OCR text
//!
//! An ordered list of case-insensitive find/replace rules, then per-line
//! whitespace collapsing with blank lines removed.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::config::CorrectionRule;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Compiled correction rules
#[derive(Debug, Clone)]
pub struct TextCorrector {
    rules: Vec<(Regex, String)>,
}

impl TextCorrector {
    pub fn new(rules: &[CorrectionRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| {
                RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, rule.replacement.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut processed = text.to_string();
        for (pattern, replacement) in &self.rules {
            processed = pattern
                .replace_all(&processed, replacement.as_str())
                .into_owned();
        }

        processed
            .split('\n')
            .map(|line| WHITESPACE_RE.replace_all(line.trim(), " ").into_owned())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_corrections;

    fn rule(pattern: &str, replacement: &str) -> CorrectionRule {
        CorrectionRule {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }

    #[test]
    fn test_default_rules_compile() {
        let corrector = TextCorrector::new(&default_corrections()).unwrap();
        assert_eq!(corrector.len(), 17);
        assert!(!corrector.is_empty());
        assert!(TextCorrector::new(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_known_misreads() {
        let corrector = TextCorrector::new(&default_corrections()).unwrap();
        let text = "MountainHosTel\nGESAATCIFA 12.50\nDanke fur ThrenBesuch";
        assert_eq!(
            corrector.apply(text),
            "Mountain Hostel\nGesamt CHF 12.50\nDanke fur Ihren Besuch"
        );
    }

    #[test]
    fn test_digit_spaces_joined() {
        let corrector = TextCorrector::new(&default_corrections()).unwrap();
        assert_eq!(corrector.apply("Total 1 2.50"), "Total 12.50");
    }

    #[test]
    fn test_rules_apply_in_order() {
        let corrector = TextCorrector::new(&[rule("a", "b"), rule("b", "c")]).unwrap();
        assert_eq!(corrector.apply("a"), "c");

        let corrector = TextCorrector::new(&[rule("b", "c"), rule("a", "b")]).unwrap();
        assert_eq!(corrector.apply("a"), "b");
    }

    #[test]
    fn test_whitespace_collapsed_and_blank_lines_dropped() {
        let corrector = TextCorrector::new(&[]).unwrap();
        assert_eq!(
            corrector.apply("  one \t two  \n\n   \nthree   four\n"),
            "one two\nthree four"
        );
    }

    #[test]
    fn test_empty_text() {
        let corrector = TextCorrector::new(&default_corrections()).unwrap();
        assert_eq!(corrector.apply(""), "");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(TextCorrector::new(&[rule("(unclosed", "x")]).is_err());
    }
}

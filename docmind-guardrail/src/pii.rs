use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Guardrail, GuardrailError, GuardrailResult};

macro_rules! pii_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

pii_pattern!(RE_EMAIL, r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}");
pii_pattern!(RE_PHONE, r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b");
pii_pattern!(RE_SSN, r"\b\d{3}-\d{2}-\d{4}\b");
pii_pattern!(
    RE_CREDIT_CARD,
    r"\b(?:4\d{3}|5[1-5]\d{2}|3[47]\d{2}|6(?:011|5\d{2}))[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{3,4}\b"
);
pii_pattern!(
    RE_IP_ADDRESS,
    r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b"
);
pii_pattern!(RE_API_KEY, r"\b(?:sk|pk|api|key)[-_][A-Za-z0-9_\-]{16,}\b");

/// Categories of personal data the redactor recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
    ApiKey,
}

impl PiiType {
    /// Every supported category.
    pub const ALL: [PiiType; 6] = [
        PiiType::Email,
        PiiType::CreditCard,
        PiiType::Ssn,
        PiiType::Phone,
        PiiType::IpAddress,
        PiiType::ApiKey,
    ];

    fn regex(self) -> Option<&'static Regex> {
        let pattern = match self {
            PiiType::Email => &RE_EMAIL,
            PiiType::Phone => &RE_PHONE,
            PiiType::Ssn => &RE_SSN,
            PiiType::CreditCard => &RE_CREDIT_CARD,
            PiiType::IpAddress => &RE_IP_ADDRESS,
            PiiType::ApiKey => &RE_API_KEY,
        };
        pattern.as_ref()
    }

    /// Placeholder written in place of a match.
    pub fn placeholder(self) -> &'static str {
        match self {
            PiiType::Email => "[REDACTED_EMAIL]",
            PiiType::Phone => "[REDACTED_PHONE]",
            PiiType::Ssn => "[REDACTED_SSN]",
            PiiType::CreditCard => "[REDACTED_CARD]",
            PiiType::IpAddress => "[REDACTED_IP]",
            PiiType::ApiKey => "[REDACTED_KEY]",
        }
    }
}

/// Masks personal data in text.
///
/// Categories are applied in a fixed order (card numbers before phone
/// numbers) so a longer match is never split by a shorter pattern.
#[derive(Debug, Clone)]
pub struct PiiRedactor {
    name: String,
    types: Vec<PiiType>,
}

impl Default for PiiRedactor {
    fn default() -> Self {
        Self::new()
    }
}

impl PiiRedactor {
    /// Redact every supported category.
    pub fn new() -> Self {
        Self { name: "pii_redactor".to_string(), types: PiiType::ALL.to_vec() }
    }

    /// Redact only the given categories.
    pub fn with_types(types: &[PiiType]) -> Self {
        let types = PiiType::ALL.iter().copied().filter(|t| types.contains(t)).collect();
        Self { name: "pii_redactor".to_string(), types }
    }

    /// Use a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Check that every configured pattern compiled.
    pub fn verify(&self) -> Result<(), GuardrailError> {
        match self.types.iter().find(|t| t.regex().is_none()) {
            Some(t) => Err(GuardrailError::Pattern(format!("{t:?} pattern failed to compile"))),
            None => Ok(()),
        }
    }

    /// Replace every match with its placeholder; returns the new text and
    /// the number of replacements.
    pub fn redact(&self, text: &str) -> (String, usize) {
        let mut output = text.to_string();
        let mut total = 0;
        for pii in &self.types {
            let Some(regex) = pii.regex() else { continue };
            let count = regex.find_iter(&output).count();
            if count > 0 {
                output = regex.replace_all(&output, pii.placeholder()).into_owned();
                total += count;
            }
        }
        (output, total)
    }
}

#[async_trait]
impl Guardrail for PiiRedactor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, text: &str) -> GuardrailResult {
        let (new_text, changes) = self.redact(text);
        if changes == 0 {
            GuardrailResult::Pass
        } else {
            GuardrailResult::Transform {
                new_text,
                reason: format!("redacted {changes} PII match(es)"),
                changes,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        assert!(PiiRedactor::new().verify().is_ok());
    }

    #[test]
    fn redacts_email_and_ssn() {
        let (text, n) = PiiRedactor::new().redact("Mail bob@corp.io, SSN 123-45-6789.");
        assert_eq!(text, "Mail [REDACTED_EMAIL], SSN [REDACTED_SSN].");
        assert_eq!(n, 2);
    }

    #[test]
    fn redacts_phone_numbers() {
        let (text, n) = PiiRedactor::new().redact("Call 555-867-5309 today");
        assert_eq!(text, "Call [REDACTED_PHONE] today");
        assert_eq!(n, 1);
    }

    #[test]
    fn card_number_is_not_split_into_phone() {
        let (text, n) = PiiRedactor::new().redact("Card 4111 1111 1111 1111 on file");
        assert_eq!(text, "Card [REDACTED_CARD] on file");
        assert_eq!(n, 1);
    }

    #[test]
    fn plain_amounts_are_untouched() {
        let input = "The invoice total is $12,400.00 due on 2024-03-01.";
        let (text, n) = PiiRedactor::new().redact(input);
        assert_eq!(text, input);
        assert_eq!(n, 0);
    }

    #[test]
    fn with_types_limits_categories() {
        let redactor = PiiRedactor::with_types(&[PiiType::Email]);
        let (text, _) = redactor.redact("bob@corp.io 123-45-6789");
        assert_eq!(text, "[REDACTED_EMAIL] 123-45-6789");
    }

    #[tokio::test]
    async fn validate_reports_transform() {
        let result = PiiRedactor::new().validate("ip 10.0.0.12").await;
        match result {
            GuardrailResult::Transform { new_text, changes, .. } => {
                assert_eq!(new_text, "ip [REDACTED_IP]");
                assert_eq!(changes, 1);
            }
            other => panic!("expected transform, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_text_passes() {
        assert!(PiiRedactor::new().validate("nothing to see").await.is_pass());
    }
}

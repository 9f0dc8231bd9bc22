//! PII (Personally Identifiable Information) detection types
//!
//! Korean-specific identifiers: resident registration number, business
//! registration number, bank account, phone, email (§4.1).

use serde::{Deserialize, Serialize};

/// PII types relevant to Korean small-business consulting queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PIIType {
    /// Person's name
    PersonName,
    /// Mobile or landline phone number
    PhoneNumber,
    /// Email address
    Email,
    /// Resident registration number (주민등록번호), 6-7 digit format
    ResidentRegistrationNumber,
    /// Business registration number (사업자등록번호), 3-2-5 digit format
    BusinessRegistrationNumber,
    /// Bank account number
    BankAccount,
    /// Physical address
    Address,
}

impl PIIType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PersonName => "Person Name",
            Self::PhoneNumber => "Phone Number",
            Self::Email => "Email",
            Self::ResidentRegistrationNumber => "Resident Registration Number",
            Self::BusinessRegistrationNumber => "Business Registration Number",
            Self::BankAccount => "Bank Account",
            Self::Address => "Address",
        }
    }

    /// Whether this PII type must always be redacted regardless of caller config.
    pub fn always_redact(&self) -> bool {
        matches!(
            self,
            Self::ResidentRegistrationNumber | Self::BusinessRegistrationNumber | Self::BankAccount
        )
    }

    pub fn severity(&self) -> PIISeverity {
        match self {
            Self::ResidentRegistrationNumber | Self::BankAccount => PIISeverity::Critical,
            Self::BusinessRegistrationNumber | Self::PhoneNumber | Self::Address => PIISeverity::High,
            Self::PersonName | Self::Email => PIISeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PIISeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// A detected PII span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PIIEntity {
    pub pii_type: PIIType,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    #[serde(default)]
    pub method: DetectionMethod,
}

impl PIIEntity {
    pub fn new(pii_type: PIIType, text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            pii_type,
            text: text.into(),
            start,
            end,
            confidence: 1.0,
            method: DetectionMethod::Regex,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_method(mut self, method: DetectionMethod) -> Self {
        self.method = method;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectionMethod {
    #[default]
    Regex,
    Dictionary,
    Hybrid,
}

/// How a detected PII span is transformed before the query reaches the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RedactionStrategy {
    Mask,
    TypeMask,
    PartialMask { visible_start: usize, visible_end: usize },
    Remove,
}

impl Default for RedactionStrategy {
    fn default() -> Self {
        Self::PartialMask { visible_start: 2, visible_end: 2 }
    }
}

impl RedactionStrategy {
    pub fn apply(&self, text: &str, pii_type: PIIType) -> String {
        match self {
            Self::Mask => "[REDACTED]".to_string(),
            Self::TypeMask => format!("[{}]", pii_type.name().to_uppercase().replace(' ', "_")),
            Self::PartialMask { visible_start, visible_end } => {
                let chars: Vec<char> = text.chars().collect();
                let len = chars.len();
                if len <= visible_start + visible_end {
                    return "*".repeat(len);
                }
                let start: String = chars[..*visible_start].iter().collect();
                let end: String = chars[len - visible_end..].iter().collect();
                let middle = "*".repeat(len - visible_start - visible_end);
                format!("{start}{middle}{end}")
            }
            Self::Remove => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pii_type_severity() {
        assert_eq!(PIIType::ResidentRegistrationNumber.severity(), PIISeverity::Critical);
        assert_eq!(PIIType::PhoneNumber.severity(), PIISeverity::High);
        assert_eq!(PIIType::PersonName.severity(), PIISeverity::Medium);
    }

    #[test]
    fn test_partial_mask() {
        let strategy = RedactionStrategy::PartialMask { visible_start: 2, visible_end: 2 };
        assert_eq!(strategy.apply("1234567890", PIIType::PhoneNumber), "12******90");
    }

    #[test]
    fn test_type_mask() {
        let strategy = RedactionStrategy::TypeMask;
        assert_eq!(
            strategy.apply("123456-1234567", PIIType::ResidentRegistrationNumber),
            "[RESIDENT_REGISTRATION_NUMBER]"
        );
    }

    #[test]
    fn test_pii_entity_builder() {
        let entity = PIIEntity::new(PIIType::BusinessRegistrationNumber, "123-45-67890", 0, 12)
            .with_confidence(0.95)
            .with_method(DetectionMethod::Regex);

        assert_eq!(entity.pii_type, PIIType::BusinessRegistrationNumber);
        assert_eq!(entity.confidence, 0.95);
        assert_eq!(entity.method, DetectionMethod::Regex);
    }
}

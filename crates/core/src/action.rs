//! Action hints surfaced alongside a generated answer

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A structured action suggestion (e.g. "generate_contract").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSuggestion {
    #[serde(rename = "type")]
    pub action_type: String,
    pub label: String,
    pub description: Option<String>,
    pub params: HashMap<String, serde_json::Value>,
}

impl ActionSuggestion {
    pub fn new(action_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            label: label.into(),
            description: None,
            params: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_builder() {
        let action = ActionSuggestion::new("generate_contract", "근로계약서 자동 생성")
            .with_description("근로계약서 초안을 자동으로 생성합니다")
            .with_param("template", "standard");
        assert_eq!(action.action_type, "generate_contract");
        assert_eq!(action.params.get("template").unwrap(), "standard");
    }
}

use fetchcrunch_core::LeadInPreference;
use serde::{Deserialize, Serialize};

use crate::bootstrap::BootstrapOptions;

pub const DEFAULT_TEMPLATE: &str = "<svg onload=__bootstrap__>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrunchConfig {
    /// Wrapper markup with one `__bootstrap__` attribute value.
    #[serde(default = "default_template")]
    pub template: String,
    /// Effort hint for the compressor.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub direct_eval: bool,
    #[serde(default)]
    pub empty_url: bool,
    /// Most bytes `String.fromCharCode(...chunk)` may be spread over. Larger
    /// documents use the text decoder.
    #[serde(default = "default_max_call_stack_size")]
    pub max_call_stack_size: usize,
    #[serde(default)]
    pub lead_in_preference: LeadInPreference,
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_iterations() -> u32 {
    50
}

fn default_max_call_stack_size() -> usize {
    65536
}

impl Default for CrunchConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            iterations: default_iterations(),
            direct_eval: false,
            empty_url: false,
            max_call_stack_size: default_max_call_stack_size(),
            lead_in_preference: LeadInPreference::default(),
        }
    }
}

impl CrunchConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn bootstrap_options(&self) -> BootstrapOptions {
        BootstrapOptions {
            direct_eval: self.direct_eval,
            empty_url: self.empty_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(CrunchConfig::from_json("{}").expect("valid json"), CrunchConfig::default());
    }

    #[test]
    fn test_camel_case_fields() {
        let config = CrunchConfig::from_json(
            r#"{"template":"<body onload=__bootstrap__>","iterations":5,"directEval":true,
                "maxCallStackSize":1000,"leadInPreference":"smallestCompressed"}"#,
        )
        .expect("valid json");
        assert_eq!(config.template, "<body onload=__bootstrap__>");
        assert_eq!(config.iterations, 5);
        assert!(config.direct_eval);
        assert!(!config.empty_url);
        assert_eq!(config.max_call_stack_size, 1000);
        assert_eq!(config.lead_in_preference, LeadInPreference::SmallestCompressed);
    }

    #[test]
    fn test_unknown_preference_is_rejected() {
        assert!(CrunchConfig::from_json(r#"{"leadInPreference":"fastest"}"#).is_err());
    }
}

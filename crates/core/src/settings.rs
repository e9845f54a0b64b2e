//! Settings the knowledge-search service resolves on every request.
//!
//! Unlike [`crate::config::AppConfig`], these are read at request time so a
//! missing value surfaces as a client-visible error instead of a startup failure.

use std::collections::HashMap;

use thiserror::Error;

pub const KNOWLEDGE_BASE_ID: &str = "KNOWLEDGE_BASE_ID";
pub const AWS_REGION: &str = "AWS_REGION";
pub const LLM_ID: &str = "LLM_ID";

/// Required keys, in the order they are reported.
pub const REQUIRED_SEARCH_SETTINGS: [&str; 3] = [KNOWLEDGE_BASE_ID, AWS_REGION, LLM_ID];

pub trait SettingsSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads the process environment; blank values count as unset.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvSource;

impl SettingsSource for EnvSource {
    fn lookup(&self, key: &str) -> Option<String> {
        crate::config::read_env(key)
    }
}

impl SettingsSource for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).filter(|value| !value.trim().is_empty()).cloned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchSettings {
    pub knowledge_base_id: String,
    pub region: String,
    pub model_id: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Missing environment variables: {}", missing.join(", "))]
pub struct MissingSettings {
    pub missing: Vec<&'static str>,
}

impl SearchSettings {
    pub fn resolve(source: &dyn SettingsSource) -> Result<Self, MissingSettings> {
        let knowledge_base_id = source.lookup(KNOWLEDGE_BASE_ID);
        let region = source.lookup(AWS_REGION);
        let model_id = source.lookup(LLM_ID);

        match (knowledge_base_id, region, model_id) {
            (Some(knowledge_base_id), Some(region), Some(model_id)) => {
                Ok(Self { knowledge_base_id, region, model_id })
            }
            (knowledge_base_id, region, model_id) => {
                let present = [knowledge_base_id.is_some(), region.is_some(), model_id.is_some()];
                let missing = REQUIRED_SEARCH_SETTINGS
                    .into_iter()
                    .zip(present)
                    .filter_map(|(key, present)| (!present).then_some(key))
                    .collect();
                Err(MissingSettings { missing })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{MissingSettings, SearchSettings, AWS_REGION, KNOWLEDGE_BASE_ID, LLM_ID};

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn resolves_when_all_settings_present() {
        let settings = SearchSettings::resolve(&source(&[
            (KNOWLEDGE_BASE_ID, "KB1"),
            (AWS_REGION, "us-west-2"),
            (LLM_ID, "anthropic.claude-3-haiku"),
        ]))
        .expect("settings should resolve");

        assert_eq!(settings.knowledge_base_id, "KB1");
        assert_eq!(settings.region, "us-west-2");
        assert_eq!(settings.model_id, "anthropic.claude-3-haiku");
    }

    #[test]
    fn reports_exactly_the_missing_keys_in_order() {
        let error = SearchSettings::resolve(&source(&[(AWS_REGION, "us-west-2")]))
            .expect_err("two settings are missing");

        assert_eq!(error, MissingSettings { missing: vec![KNOWLEDGE_BASE_ID, LLM_ID] });
        assert_eq!(error.to_string(), "Missing environment variables: KNOWLEDGE_BASE_ID, LLM_ID");
    }

    #[test]
    fn blank_values_count_as_missing() {
        let error = SearchSettings::resolve(&source(&[
            (KNOWLEDGE_BASE_ID, "KB1"),
            (AWS_REGION, "  "),
            (LLM_ID, "model"),
        ]))
        .expect_err("blank region is missing");

        assert_eq!(error.missing, vec![AWS_REGION]);
    }
}

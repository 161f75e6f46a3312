//! services/api/src/adapters/registry.rs
//!
//! Wires the vendor backends into a `ProviderRegistry`.

use super::gemini::{self, GeminiBackend};
use super::openai::{self, OpenAiBackend};
use crate::config::Config;
use invoice_extraction_core::ports::{ExtractionProvider, TextExtractor};
use invoice_extraction_core::provider::{PromptedProvider, ProviderRegistry};
use std::sync::Arc;

/// Registers every supported vendor. Credentials are checked on selection,
/// so a missing key only fails requests that ask for that vendor.
pub fn build_provider_registry(
    config: &Config,
    text_extractor: Arc<dyn TextExtractor>,
) -> ProviderRegistry {
    let http = reqwest::Client::new();

    let openai_key = config.openai_api_key.clone();
    let openai_model = config.openai_model.clone();
    let openai_text = text_extractor.clone();

    let gemini_key = config.gemini_api_key.clone();
    let gemini_model = config.gemini_model.clone();
    let gemini_base = config.gemini_api_base.clone();

    ProviderRegistry::new(config.default_provider.clone())
        .register(openai::PROVIDER_NAME, move || {
            let backend = OpenAiBackend::from_api_key(openai_key.as_deref(), &openai_model)?;
            let provider: Arc<dyn ExtractionProvider> =
                Arc::new(PromptedProvider::new(openai::PROVIDER_NAME, backend, openai_text.clone()));
            Ok(provider)
        })
        .register(gemini::PROVIDER_NAME, move || {
            let backend = GeminiBackend::from_api_key(
                http.clone(),
                gemini_key.as_deref(),
                &gemini_model,
                &gemini_base,
            )?;
            let provider: Arc<dyn ExtractionProvider> = Arc::new(PromptedProvider::new(
                gemini::PROVIDER_NAME,
                backend,
                text_extractor.clone(),
            ));
            Ok(provider)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PdfTextAdapter;
    use invoice_extraction_core::ports::PortError;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let mut vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vars.insert("DATABASE_URL".into(), "postgres://localhost/invoices".into());
        Config::from_vars(&vars).unwrap()
    }

    #[test]
    fn registers_both_vendors() {
        let registry = build_provider_registry(&config(&[]), Arc::new(PdfTextAdapter::new()));
        assert_eq!(registry.names(), vec!["gemini".to_string(), "openai".to_string()]);
        assert_eq!(registry.default_provider(), "openai");
    }

    #[test]
    fn a_missing_key_fails_only_its_own_vendor() {
        let registry = build_provider_registry(
            &config(&[("GEMINI_API_KEY", "g-key")]),
            Arc::new(PdfTextAdapter::new()),
        );

        let gemini = registry.resolve(Some("gemini")).ok().unwrap();
        assert_eq!(gemini.name(), "gemini");

        let err = registry.resolve(None).err().unwrap();
        assert!(matches!(err, PortError::ProviderConfiguration(ref m) if m.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn unknown_vendor_lists_the_available_ones() {
        let registry = build_provider_registry(&config(&[]), Arc::new(PdfTextAdapter::new()));
        let err = registry.resolve(Some("claude")).err().unwrap();
        assert!(matches!(err, PortError::ProviderConfiguration(ref m) if m.contains("gemini, openai")));
    }
}

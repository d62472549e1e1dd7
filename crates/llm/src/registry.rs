//! Provider Registry
//!
//! Maps a provider identifier to a constructor returning the
//! `LlmProvider` trait object. Backends are added with `register`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::openai::{OpenAIProvider, DEEPSEEK_PROFILE, OLLAMA_PROFILE, OPENAI_PROFILE};
use crate::provider::LlmProvider;
use crate::tool_choice::ToolChoiceClassifier;
use crate::types::{LlmError, LlmResult, ProviderConfig};

/// Constructor stored in the registry
pub type ProviderConstructor = Arc<
    dyn Fn(ProviderConfig, Arc<ToolChoiceClassifier>) -> LlmResult<Arc<dyn LlmProvider>>
        + Send
        + Sync,
>;

/// Registry of provider constructors keyed by identifier
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in backends: anthropic, openai, deepseek, ollama
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("anthropic", |config, classifier| {
            Ok(Arc::new(AnthropicProvider::new(config, classifier)?) as Arc<dyn LlmProvider>)
        });
        registry.register("openai", |config, classifier| {
            Ok(Arc::new(OpenAIProvider::with_profile(OPENAI_PROFILE, config, classifier)?)
                as Arc<dyn LlmProvider>)
        });
        registry.register("deepseek", |config, classifier| {
            Ok(
                Arc::new(OpenAIProvider::with_profile(DEEPSEEK_PROFILE, config, classifier)?)
                    as Arc<dyn LlmProvider>,
            )
        });
        registry.register("ollama", |config, classifier| {
            Ok(Arc::new(OpenAIProvider::with_profile(OLLAMA_PROFILE, config, classifier)?)
                as Arc<dyn LlmProvider>)
        });
        registry
    }

    /// Register (or replace) a constructor. Identifiers are case-insensitive.
    pub fn register<F>(&mut self, id: &str, constructor: F)
    where
        F: Fn(ProviderConfig, Arc<ToolChoiceClassifier>) -> LlmResult<Arc<dyn LlmProvider>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(id.trim().to_lowercase(), Arc::new(constructor));
    }

    /// Whether a provider identifier is known
    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(&id.trim().to_lowercase())
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Construct the provider named by `config.provider`.
    ///
    /// All configuration problems surface here, before any network call.
    pub fn create(
        &self,
        config: ProviderConfig,
        classifier: Arc<ToolChoiceClassifier>,
    ) -> LlmResult<Arc<dyn LlmProvider>> {
        let id = config.provider.trim().to_lowercase();
        let constructor = self.constructors.get(&id).ok_or_else(|| {
            LlmError::config(format!(
                "Unknown provider '{}' (available: {})",
                config.provider,
                self.ids().join(", ")
            ))
        })?;
        debug!(provider = %id, model = %config.model, "Creating provider");
        constructor(config, classifier)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

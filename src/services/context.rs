//! Agent Context
//!
//! Process-wide state shared by sessions: the effective configuration,
//! the provider registry, the tool-choice classifier and an optional
//! codebase context source. Built once at startup and handed to every
//! session it creates.

use std::sync::Arc;

use tracing::info;

use taskforge_llm::{KeywordTables, LlmProvider, ProviderRegistry, ToolChoiceClassifier};
use taskforge_tools::ToolExecutor;

use crate::models::settings::AppConfig;
use crate::services::prompt::{build_system_prompt, ContextSource};
use crate::services::reflection::ReflectionEvaluator;
use crate::services::session::TaskSession;
use crate::utils::error::{AppError, AppResult};

pub struct AgentContext {
    config: AppConfig,
    registry: ProviderRegistry,
    classifier: Arc<ToolChoiceClassifier>,
    context_source: Option<Arc<dyn ContextSource>>,
}

impl AgentContext {
    /// Validate `config` and load any extra keyword tables it names.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate().map_err(AppError::config)?;

        let classifier = if config.keyword_tables.is_empty() {
            ToolChoiceClassifier::builtin()
        } else {
            let mut extra = KeywordTables::default();
            for path in &config.keyword_tables {
                info!(path = %path.display(), "Loading keyword table");
                extra.merge(KeywordTables::from_path(path)?);
            }
            ToolChoiceClassifier::with_extra_tables(extra)?
        };

        Ok(Self {
            config,
            registry: ProviderRegistry::with_builtin(),
            classifier: Arc::new(classifier),
            context_source: None,
        })
    }

    /// Replace the provider registry, e.g. to add a custom backend.
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_context_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.context_source = Some(source);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Arc<ToolChoiceClassifier> {
        &self.classifier
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Construct the configured provider adapter.
    pub fn create_provider(&self) -> AppResult<Arc<dyn LlmProvider>> {
        Ok(self
            .registry
            .create(self.config.provider.clone(), self.classifier.clone())?)
    }

    /// Create a session for `task` with a fresh provider and the full
    /// system prompt.
    pub async fn new_session(
        &self,
        task: &str,
        tools: Arc<dyn ToolExecutor>,
    ) -> AppResult<TaskSession> {
        let provider = self.create_provider()?;

        let codebase_context = match &self.context_source {
            Some(source) => source.context_for(task).await,
            None => None,
        };

        let reflection =
            ReflectionEvaluator::new(Some(provider.clone()), self.config.reflection.clone());
        let mut session = TaskSession::new(provider, tools.clone(), self.config.session.clone())
            .with_reflection(reflection);

        let system_prompt = build_system_prompt(
            session.working_dir(),
            &tools.definitions(),
            codebase_context.as_deref(),
        );
        session = session.with_system_prompt(system_prompt);
        session.set_task(task);

        info!(
            session_id = %session.id(),
            provider = %self.config.provider.provider,
            model = %self.config.provider.model,
            "Created task session"
        );
        Ok(session)
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::config::BackendConfig;
use crate::llm_client::{LanguageModel, LlmClient};
use crate::workflow::summarizer::SummaryQueue;
use crate::workflow::summary_cache::SummaryCache;
use crate::workflow::MindMateWorkflow;

pub struct BackendRuntime {
    pub config: BackendConfig,
    pub workflow: Arc<MindMateWorkflow>,
    pub summary_cache: Arc<SummaryCache>,
    pub summary_worker: JoinHandle<()>,
}

pub struct BackendRuntimeBuilder {
    config: BackendConfig,
    model: Option<Arc<dyn LanguageModel>>,
}

impl BackendRuntimeBuilder {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Use `model` instead of the configured HTTP provider.
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Wire the workflow and start the summary worker. Must run inside a tokio
    /// runtime.
    pub fn build(self) -> Result<BackendRuntime> {
        tokio::runtime::Handle::try_current()
            .context("backend runtime must be built inside a tokio runtime")?;

        let config = self.config;
        let model: Arc<dyn LanguageModel> = match self.model {
            Some(model) => model,
            None => {
                let client = LlmClient::from_config(&config)
                    .context("failed to create LLM client")?;
                tracing::info!(
                    "Using model '{}' at {}",
                    client.model(),
                    config.llm_api_url
                );
                Arc::new(client)
            }
        };

        let summary_cache = Arc::new(SummaryCache::new(config.summary_staleness()));
        let (summaries, summary_worker) = SummaryQueue::spawn(model.clone(), summary_cache.clone());
        let workflow = Arc::new(MindMateWorkflow::new(
            model,
            &config,
            summary_cache.clone(),
            summaries,
        ));

        tracing::info!(
            "Summary worker started (staleness {}s, thresholds {:?})",
            config.summary_staleness_secs,
            config.summarization
        );

        Ok(BackendRuntime {
            config,
            workflow,
            summary_cache,
            summary_worker,
        })
    }
}

impl BackendRuntime {
    pub fn bootstrap(config: BackendConfig) -> Result<Self> {
        BackendRuntimeBuilder::new(config).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    #[test]
    fn build_outside_tokio_fails_cleanly() {
        let result = BackendRuntimeBuilder::new(BackendConfig::default())
            .with_model(Arc::new(ScriptedModel::new()))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn build_with_injected_model() {
        let mut config = BackendConfig::default();
        config.confidence = 0.75;
        let runtime = BackendRuntimeBuilder::new(config)
            .with_model(Arc::new(ScriptedModel::new()))
            .build()
            .unwrap();
        assert!(runtime.summary_cache.is_empty());
        assert!(!runtime.summary_worker.is_finished());
        assert!((runtime.config.confidence - 0.75).abs() < f32::EPSILON);
    }
}

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::config::BackendConfig;
use crate::llm_client::LanguageModel;
use crate::schema::{round_seconds, ChatRequest, ChatResponse, PerformanceMetrics, SessionInsights};

use super::analysis::AnalysisStage;
use super::context::truncate_chars;
use super::error::WorkflowError;
use super::response::ResponseStage;
use super::summarizer::{SummaryJob, SummaryQueue};
use super::summary_cache::SummaryCache;
use super::trigger::SummarizationTrigger;
use super::types::{ActivityRecord, AnalysisResult, ChatTurn, ConversationSummary, VoiceAnalysis};

const DEFAULT_MODALITY: &str = "Person-centered";
const PREVIEW_CHARS: usize = 50;

/// Per-request state threaded through the two stages. Never shared.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub user_id: String,
    pub session_id: Option<String>,
    pub user_message: String,
    pub history: Vec<ChatTurn>,
    /// Summary as supplied by the caller.
    pub provided_summary: Option<ConversationSummary>,
    /// Summary actually fed to analysis: a fresh cached one, else the provided one.
    pub effective_summary: Option<ConversationSummary>,
    pub activities: Vec<ActivityRecord>,
    pub user_patterns: Map<String, Value>,
    pub voice: Option<VoiceAnalysis>,
    pub analysis: Option<AnalysisResult>,
    pub reply: Option<String>,
    pub response_generated: bool,
}

impl WorkflowState {
    pub fn new(user_message: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_message: user_message.into(),
            ..Default::default()
        }
    }

    /// Normalize optional inputs: blank ids become `anonymous`, empty summaries
    /// and voice signals become absent.
    pub fn from_request(request: ChatRequest) -> Self {
        let user_id = request.effective_user_id();
        Self {
            user_id,
            session_id: request.session_id,
            user_message: request.user_message.trim().to_string(),
            history: request.recent_messages,
            provided_summary: request.conversation_summary.filter(|s| !s.is_empty()),
            effective_summary: None,
            activities: request.user_activities,
            user_patterns: request.user_patterns,
            voice: request.voice_analysis.filter(|v| !v.is_empty()),
            analysis: None,
            reply: None,
            response_generated: false,
        }
    }
}

/// Sequences trigger check, analysis and response for one chat turn.
pub struct MindMateWorkflow {
    analysis: AnalysisStage,
    response: ResponseStage,
    cache: Arc<SummaryCache>,
    trigger: SummarizationTrigger,
    summaries: SummaryQueue,
    confidence: f32,
}

impl MindMateWorkflow {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        config: &BackendConfig,
        cache: Arc<SummaryCache>,
        summaries: SummaryQueue,
    ) -> Self {
        Self {
            analysis: AnalysisStage::new(model.clone()),
            response: ResponseStage::new(model),
            cache,
            trigger: SummarizationTrigger::new(config.summarization.clone()),
            summaries,
            confidence: config.confidence,
        }
    }

    pub fn cache(&self) -> &Arc<SummaryCache> {
        &self.cache
    }

    pub async fn process(&self, request: ChatRequest) -> Result<ChatResponse, WorkflowError> {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4();
        let mut state = WorkflowState::from_request(request);

        let preview = truncate_chars(&state.user_message, PREVIEW_CHARS);
        tracing::info!(
            "[{}] Chat for user {} (session {:?}): '{}{}'",
            request_id,
            state.user_id,
            state.session_id,
            preview,
            if preview.len() < state.user_message.len() { "..." } else { "" }
        );
        if let Some(voice) = &state.voice {
            tracing::debug!(
                "[{}] Voice analysis: tone {:?}, stress {:?}",
                request_id,
                voice.emotional_tone,
                voice.stress_level
            );
        }

        let will_summarize = self.trigger.should_trigger(&state.user_id, &state.history);
        if will_summarize {
            self.summaries.submit(SummaryJob {
                user_id: state.user_id.clone(),
                history: state.history.clone(),
                prior_summary: state.provided_summary.clone(),
                latest_analysis: None,
            });
        }
        tracing::info!(
            "[{}] Context: {} messages, {} activities, background summarization: {}",
            request_id,
            state.history.len(),
            state.activities.len(),
            will_summarize
        );

        state.effective_summary = self
            .cache
            .get(&state.user_id)
            .or_else(|| state.provided_summary.clone());

        tracing::debug!("[{}] Analysis stage starting", request_id);
        let analysis = self.analysis.analyze(&state).await?;
        tracing::debug!("[{}] Analysis complete: {}", request_id, analysis.therapeutic_approach);
        state.analysis = Some(analysis);

        tracing::debug!("[{}] Response stage starting", request_id);
        let reply = self.response.respond(&state).await?;
        if reply.trim().is_empty() {
            return Err(WorkflowError::EmptyReply);
        }
        state.reply = Some(reply);
        state.response_generated = true;

        let response = self.assemble(state, will_summarize, started);
        tracing::info!(
            "[{}] Reply ready in {:.2}s ({} chars, modality {})",
            request_id,
            response.processing_time,
            response.message.chars().count(),
            response.modality
        );
        Ok(response)
    }

    fn assemble(&self, state: WorkflowState, will_summarize: bool, started: Instant) -> ChatResponse {
        let analysis = state.analysis.unwrap_or_default();
        let modality = if analysis.therapeutic_approach.trim().is_empty() {
            DEFAULT_MODALITY.to_string()
        } else {
            analysis.therapeutic_approach.clone()
        };

        let metrics = PerformanceMetrics {
            context_messages: state.history.len(),
            context_activities: state.activities.len(),
            has_summary: state.provided_summary.is_some(),
            background_summarization: will_summarize,
            cached_summary_available: self.cache.contains(&state.user_id),
        };

        ChatResponse {
            message: state.reply.unwrap_or_default(),
            modality,
            confidence: self.confidence,
            processing_time: round_seconds(started.elapsed().as_secs_f64()),
            voice_aware: state.voice.is_some(),
            session_insights: SessionInsights::from_analysis(&analysis, metrics),
        }
    }
}

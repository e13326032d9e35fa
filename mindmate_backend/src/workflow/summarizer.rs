use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::llm_client::LanguageModel;
use crate::structured::{generate_typed, FieldKind, OutputSchema, SchemaField, StructuredOutput};

use super::context::format_full_history;
use super::summary_cache::SummaryCache;
use super::types::{AnalysisResult, ChatTurn, ConversationSummary};

pub static SUMMARY_SCHEMA: OutputSchema = OutputSchema {
    name: "ConversationSummary",
    description: "Contextual conversation summarization preserving therapeutic progress",
    fields: &[
        SchemaField {
            name: "therapeutic_progress",
            kind: FieldKind::Text,
            description: "Therapeutic journey and breakthrough moments",
        },
        SchemaField {
            name: "emotional_patterns",
            kind: FieldKind::Text,
            description: "Recurring emotional themes and patterns",
        },
        SchemaField {
            name: "cultural_context",
            kind: FieldKind::Text,
            description: "Family dynamics, academic pressures, cultural factors",
        },
        SchemaField {
            name: "language_preferences",
            kind: FieldKind::Text,
            description: "Communication style and language mixing patterns",
        },
        SchemaField {
            name: "key_insights",
            kind: FieldKind::TextList,
            description: "Important psychological insights to preserve",
        },
        SchemaField {
            name: "stress_evolution",
            kind: FieldKind::Text,
            description: "How stress categories and levels have changed",
        },
        SchemaField {
            name: "intervention_history",
            kind: FieldKind::Text,
            description: "Therapeutic approaches used and their effectiveness",
        },
    ],
};

impl StructuredOutput for ConversationSummary {
    fn schema() -> &'static OutputSchema {
        &SUMMARY_SCHEMA
    }
}

/// Snapshot of everything a summarization pass needs. Owned, so the request
/// that submitted it can finish independently.
#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub user_id: String,
    pub history: Vec<ChatTurn>,
    pub prior_summary: Option<ConversationSummary>,
    /// The analysis of the submitting turn is not ready at submission time, so
    /// this is normally `None` and the summary trails the analysis by one turn.
    pub latest_analysis: Option<AnalysisResult>,
}

pub fn build_summary_prompt(job: &SummaryJob) -> String {
    let existing = job
        .prior_summary
        .as_ref()
        .filter(|s| !s.is_empty())
        .and_then(|s| serde_json::to_string_pretty(s).ok())
        .unwrap_or_else(|| "No previous summary".to_string());
    let analysis = job
        .latest_analysis
        .as_ref()
        .and_then(|a| serde_json::to_string_pretty(a).ok())
        .unwrap_or_else(|| "{}".to_string());

    format!(
        "Create a comprehensive therapeutic summary for Indian youth mental wellness continuation.\n\n\
         COMPREHENSIVE SUMMARIZATION GUIDELINES:\n\
         - Preserve ALL therapeutic progress and breakthrough moments\n\
         - Track emotional patterns and psychological developments over time\n\
         - Maintain cultural context (family dynamics, academic pressures, Indian youth challenges)\n\
         - Document language preferences and communication evolution\n\
         - Record therapeutic approaches that worked/didn't work\n\
         - Identify stress pattern changes and coping mechanism development\n\
         - Preserve important personal details for therapeutic continuity\n\n\
         EXISTING SUMMARY:\n{}\n\n\
         FULL CONVERSATION TO SUMMARIZE:\n{}\n\n\
         LATEST PSYCHOLOGICAL ANALYSIS:\n{}\n\n\
         Create a rich summary that enables seamless therapeutic conversation continuation.",
        existing,
        format_full_history(&job.history),
        analysis
    )
}

/// One summarization call. `Ok(None)` when the model produced nothing usable,
/// including an all-empty summary.
pub async fn summarize(
    model: &dyn LanguageModel,
    job: &SummaryJob,
) -> Result<Option<ConversationSummary>> {
    let prompt = build_summary_prompt(job);
    let summary = generate_typed::<ConversationSummary>(model, &prompt).await?;
    Ok(summary.filter(|s| !s.is_empty()))
}

/// Run a job to completion and store the result. Failures are logged and
/// dropped: they never reach a user request.
pub async fn process_job(model: &dyn LanguageModel, cache: &SummaryCache, job: SummaryJob) {
    let message_count = job.history.len();
    tracing::info!(
        "Background summarization started for user {} ({} messages)",
        job.user_id,
        message_count
    );

    match summarize(model, &job).await {
        Ok(Some(summary)) => {
            cache.put(&job.user_id, summary, message_count);
            tracing::info!("Background summary cached for user {}", job.user_id);
        }
        Ok(None) => {
            tracing::warn!(
                "Background summarization for user {} produced no summary",
                job.user_id
            );
        }
        Err(e) => {
            tracing::error!(
                "Background summarization failed for user {}: {:#}",
                job.user_id,
                e
            );
        }
    }
}

/// Handle to the background summary worker. Jobs run one at a time in
/// submission order; the worker exits once every handle is dropped.
#[derive(Clone)]
pub struct SummaryQueue {
    tx: flume::Sender<SummaryJob>,
}

impl SummaryQueue {
    pub fn spawn(model: Arc<dyn LanguageModel>, cache: Arc<SummaryCache>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = flume::unbounded::<SummaryJob>();
        let handle = tokio::spawn(async move {
            while let Ok(job) = rx.recv_async().await {
                process_job(model.as_ref(), &cache, job).await;
            }
            tracing::debug!("Summary worker stopped");
        });
        (Self { tx }, handle)
    }

    /// Hand a job to the worker. Returns `false` if the worker is gone; the
    /// caller carries on either way.
    pub fn submit(&self, job: SummaryJob) -> bool {
        let user_id = job.user_id.clone();
        match self.tx.send(job) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Summary worker unavailable, dropping job for user {}", user_id);
                false
            }
        }
    }
}

use std::sync::Arc;

use crate::llm_client::LanguageModel;
use crate::structured::{generate_typed, FieldKind, OutputSchema, SchemaField, StructuredOutput};

use super::context::{
    format_activities, format_analysis_context, format_voice_signal, truncate_chars,
};
use super::error::WorkflowError;
use super::orchestrator::WorkflowState;
use super::types::AnalysisResult;

const ANALYSIS_CONTEXT_CHARS: usize = 500;

pub static ANALYSIS_SCHEMA: OutputSchema = OutputSchema {
    name: "PsychologicalAnalysis",
    description: "Psychology-focused analysis for Indian youth mental wellness",
    fields: &[
        SchemaField {
            name: "emotional_state",
            kind: FieldKind::Text,
            description: "Current emotional condition with psychological markers",
        },
        SchemaField {
            name: "stress_categories",
            kind: FieldKind::TextList,
            description: "Academic/Family/Social/Emotional/Identity/Career/Miscellaneous stress types",
        },
        SchemaField {
            name: "therapeutic_approach",
            kind: FieldKind::Text,
            description: "CBT/ACT/MBCT recommendation based on psychological assessment",
        },
        SchemaField {
            name: "cultural_pressures",
            kind: FieldKind::Text,
            description: "Indian family/academic/social pressures affecting mental health",
        },
        SchemaField {
            name: "language_style",
            kind: FieldKind::Text,
            description: "User's communication pattern (formal/casual/hindi-mixed) to match",
        },
        SchemaField {
            name: "psychological_insights",
            kind: FieldKind::TextList,
            description: "2-3 key psychology-based observations",
        },
        SchemaField {
            name: "coping_assessment",
            kind: FieldKind::Text,
            description: "Current coping mechanisms and psychological resilience",
        },
        SchemaField {
            name: "intervention_priority",
            kind: FieldKind::Text,
            description: "Immediate/supportive/long-term intervention needs",
        },
        SchemaField {
            name: "activity_recommendations",
            kind: FieldKind::TextList,
            description: "Psychology-based instant and long-term activities",
        },
    ],
};

impl StructuredOutput for AnalysisResult {
    fn schema() -> &'static OutputSchema {
        &ANALYSIS_SCHEMA
    }
}

/// First model stage: a structured psychological reading of the current turn.
pub struct AnalysisStage {
    model: Arc<dyn LanguageModel>,
}

impl AnalysisStage {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Full prompt first; if the model gives nothing usable, one retry with the
    /// minimal prompt. A provider error on either attempt aborts immediately.
    pub async fn analyze(&self, state: &WorkflowState) -> Result<AnalysisResult, WorkflowError> {
        tracing::debug!(
            "Analysis: {} recent messages, summary: {}",
            state.history.len().min(super::context::ANALYSIS_TURN_LIMIT),
            state.effective_summary.is_some()
        );

        let prompt = build_analysis_prompt(state);
        if let Some(analysis) = generate_typed::<AnalysisResult>(self.model.as_ref(), &prompt).await?
        {
            return Ok(analysis.normalized());
        }

        tracing::info!("Analysis returned nothing usable, retrying with minimal prompt");
        let minimal = build_minimal_prompt(&state.user_message);
        match generate_typed::<AnalysisResult>(self.model.as_ref(), &minimal).await? {
            Some(analysis) => Ok(analysis.normalized()),
            None => Err(WorkflowError::AnalysisUnavailable),
        }
    }
}

pub fn build_analysis_prompt(state: &WorkflowState) -> String {
    let context = format_analysis_context(&state.history, state.effective_summary.as_ref());
    let activities = format_activities(&state.activities);
    let voice = state
        .voice
        .as_ref()
        .filter(|v| !v.is_empty())
        .map(|v| format!("\n\n{}", format_voice_signal(v)))
        .unwrap_or_default();

    format!(
        "Analyze this user's mental health state for Indian youth (16-25 years).\n\n\
         User's message: \"{message}\"\n\n\
         Recent context: {context}\n\n\
         Activities: {activities}{voice}\n\n\
         Provide analysis in this exact format:\n\
         - Emotional state: [current condition]\n\
         - Stress categories: [Academic/Family/Social/Emotional/Identity/Career types]\n\
         - Therapeutic approach: [CBT/ACT/MBCT recommendation]\n\
         - Cultural pressures: [Indian family/academic/social pressures]\n\
         - Language style: [formal/casual/hindi-mixed]\n\
         - Psychological insights: [2-3 key observations]\n\
         - Coping assessment: [current resilience level]\n\
         - Intervention priority: [immediate/supportive/long-term]\n\
         - Activity recommendations: [specific helpful activities]\n\n\
         Focus on practical therapeutic assessment for Indian cultural context.",
        message = state.user_message,
        context = truncate_chars(&context, ANALYSIS_CONTEXT_CHARS),
        activities = activities,
        voice = voice,
    )
}

pub fn build_minimal_prompt(user_message: &str) -> String {
    format!(
        "Analyze: \"{}\"\n\n\
         Provide psychological analysis for Indian youth with these fields:\n{}",
        user_message,
        ANALYSIS_SCHEMA.field_names().join(", ")
    )
}

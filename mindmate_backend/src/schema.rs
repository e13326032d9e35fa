//! Wire types for the chat HTTP API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::workflow::types::{
    ActivityRecord, AnalysisResult, ChatTurn, ConversationSummary, VoiceAnalysis,
};

pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recent_messages: Vec<ChatTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<ConversationSummary>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_activities: Vec<ActivityRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_patterns: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_analysis: Option<VoiceAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Clients send `null` for "nothing" as often as they omit the field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user_message cannot be empty")]
    EmptyMessage,
    #[error("user_message is too long ({actual} characters, max {max})")]
    MessageTooLong { actual: usize, max: usize },
}

impl ChatRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self, max_chars: usize) -> Result<(), ValidationError> {
        let message = self.user_message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        let actual = message.chars().count();
        if actual > max_chars {
            return Err(ValidationError::MessageTooLong {
                actual,
                max: max_chars,
            });
        }
        Ok(())
    }

    /// The caller's id, or `anonymous` when absent or blank.
    pub fn effective_user_id(&self) -> String {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(ANONYMOUS_USER)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub context_messages: usize,
    pub context_activities: usize,
    pub has_summary: bool,
    pub background_summarization: bool,
    pub cached_summary_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInsights {
    pub emotional_state: String,
    pub stress_categories: Vec<String>,
    pub therapeutic_approach: String,
    pub cultural_pressures: String,
    pub language_style: String,
    pub psychological_insights: Vec<String>,
    pub coping_assessment: String,
    pub intervention_priority: String,
    pub activity_recommendations: Vec<String>,
    pub performance_metrics: PerformanceMetrics,
}

impl SessionInsights {
    pub fn from_analysis(analysis: &AnalysisResult, metrics: PerformanceMetrics) -> Self {
        Self {
            emotional_state: analysis.emotional_state.clone(),
            stress_categories: analysis.stress_categories.clone(),
            therapeutic_approach: analysis.therapeutic_approach.clone(),
            cultural_pressures: analysis.cultural_pressures.clone(),
            language_style: analysis.language_style.clone(),
            psychological_insights: analysis.psychological_insights.clone(),
            coping_assessment: analysis.coping_assessment.clone(),
            intervention_priority: analysis.intervention_priority.clone(),
            activity_recommendations: analysis.activity_recommendations.clone(),
            performance_metrics: metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub modality: String,
    pub confidence: f32,
    /// Seconds, rounded to two decimals.
    pub processing_time: f64,
    pub voice_aware: bool,
    pub session_insights: SessionInsights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

pub fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_parses_with_defaults() {
        let request: ChatRequest = serde_json::from_str(r#"{"user_message": "hi"}"#).unwrap();
        assert!(request.recent_messages.is_empty());
        assert!(request.conversation_summary.is_none());
        assert_eq!(request.effective_user_id(), "anonymous");
    }

    #[test]
    fn nulls_read_as_empty() {
        let request: ChatRequest = serde_json::from_str(
            r#"{
                "user_message": "hi",
                "recent_messages": null,
                "user_activities": null,
                "user_patterns": null,
                "voice_analysis": null,
                "user_id": "  "
            }"#,
        )
        .unwrap();
        assert!(request.recent_messages.is_empty());
        assert!(request.user_activities.is_empty());
        assert!(request.user_patterns.is_empty());
        assert!(request.voice_analysis.is_none());
        assert_eq!(request.effective_user_id(), "anonymous");
    }

    #[test]
    fn full_request_parses() {
        let request: ChatRequest = serde_json::from_str(
            r#"{
                "user_message": "Feeling low",
                "recent_messages": [
                    {"role": "user", "content": "hey", "created_at": "2024-06-01T10:00:00Z"},
                    {"role": "assistant", "content": "hi!"}
                ],
                "conversation_summary": {"emotional_patterns": "low mornings"},
                "user_activities": [{"activity_type": "breathing_exercise", "score": 4}],
                "voice_analysis": {"emotional_tone": "sad", "insights": ["slow speech"]},
                "user_id": "u-42",
                "session_id": "s-1"
            }"#,
        )
        .unwrap();
        assert_eq!(request.recent_messages.len(), 2);
        assert_eq!(request.user_activities[0].score, Some(4.0));
        assert_eq!(request.effective_user_id(), "u-42");
        assert_eq!(request.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn validation_bounds() {
        assert_eq!(
            ChatRequest::new("   ").validate(5000),
            Err(ValidationError::EmptyMessage)
        );
        assert!(ChatRequest::new("a".repeat(5000)).validate(5000).is_ok());
        assert_eq!(
            ChatRequest::new("a".repeat(5001)).validate(5000),
            Err(ValidationError::MessageTooLong {
                actual: 5001,
                max: 5000
            })
        );
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round_seconds(1.23456), 1.23);
        assert_eq!(round_seconds(0.005), 0.01);
        assert_eq!(round_seconds(2.0), 2.0);
    }
}

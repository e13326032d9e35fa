use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    #[default]
    Assistant,
}

/// Anything that is not the user is treated as the companion's side.
impl From<String> for Role {
    fn from(raw: String) -> Self {
        if raw.trim().eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

/// One message of the conversation as supplied by the caller. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        alias = "created_at",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Rolling therapeutic summary of a user's conversation.
///
/// Every field defaults so that partial summaries sent by clients still parse.
/// Keys outside the known set (`key_themes`, `created_at`, ...) are kept in
/// `extra` and travel with the summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSummary {
    pub therapeutic_progress: String,
    pub emotional_patterns: String,
    pub cultural_context: String,
    pub language_preferences: String,
    pub key_insights: Vec<String>,
    pub stress_evolution: String,
    pub intervention_history: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConversationSummary {
    pub fn is_empty(&self) -> bool {
        self.therapeutic_progress.trim().is_empty()
            && self.emotional_patterns.trim().is_empty()
            && self.cultural_context.trim().is_empty()
            && self.language_preferences.trim().is_empty()
            && self.key_insights.iter().all(|i| i.trim().is_empty())
            && self.stress_evolution.trim().is_empty()
            && self.intervention_history.trim().is_empty()
            && self.extra.values().all(is_blank_value)
    }
}

/// Output of the analysis stage. Fields are required: a model answer missing
/// any of them is treated as no answer at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub emotional_state: String,
    pub stress_categories: Vec<String>,
    pub therapeutic_approach: String,
    pub cultural_pressures: String,
    pub language_style: String,
    pub psychological_insights: Vec<String>,
    pub coping_assessment: String,
    pub intervention_priority: String,
    pub activity_recommendations: Vec<String>,
}

impl AnalysisResult {
    /// Stress categories are a set: drop blanks and repeats (case-insensitive),
    /// keeping the first spelling seen.
    pub fn normalized(mut self) -> Self {
        let mut seen: Vec<String> = Vec::with_capacity(self.stress_categories.len());
        self.stress_categories.retain(|category| {
            let key = category.trim().to_lowercase();
            if key.is_empty() || seen.contains(&key) {
                return false;
            }
            seen.push(key);
            true
        });
        for category in &mut self.stress_categories {
            *category = category.trim().to_string();
        }
        self
    }
}

/// Signals extracted from the user's voice recording, when the turn was spoken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_pace: Option<String>,
    /// Free-form: clients send either a label or an object of cues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psychological_markers: Option<serde_json::Value>,
}

impl VoiceAnalysis {
    pub fn is_empty(&self) -> bool {
        self.emotional_tone.is_none()
            && self.stress_level.is_none()
            && self.speech_pace.is_none()
            && self.cultural_context.as_ref().map_or(true, is_blank_value)
            && self.insights.is_empty()
            && self.confidence_score.is_none()
            && self
                .psychological_markers
                .as_ref()
                .map_or(true, is_blank_value)
    }
}

fn is_blank_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// A wellness activity the user completed (game, check-in, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

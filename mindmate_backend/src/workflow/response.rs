use std::sync::Arc;

use crate::llm_client::{LanguageModel, Message};

use super::context::format_response_context;
use super::error::WorkflowError;
use super::orchestrator::WorkflowState;
use super::types::AnalysisResult;

pub const COMPANION_SYSTEM_PROMPT: &str = "\
You are MindMate, a culturally-aware AI therapeutic companion specialized in Indian youth mental wellness (ages 16-25). Generate a response that combines professional psychology expertise with warm, companion-style delivery.

COMPANION COUNSELOR RESPONSE GUIDELINES:

PSYCHOLOGY EXPERTISE:
- Apply CBT techniques: cognitive restructuring, thought challenging, behavioral activation
- Use ACT principles: values clarification, psychological flexibility, mindful awareness
- Employ MBCT approaches: emotional regulation, present-moment awareness, self-compassion
- Address stress categories identified in analysis (academic/family/social/emotional/identity/career)

CULTURAL SENSITIVITY (Indian Youth Context):
- Understand academic pressure (board exams, competitive exams, parental expectations)
- Acknowledge family dynamics (joint family, traditional vs modern values, generation gap)
- Respect cultural nuances (festivals affecting mood, arranged marriage discussions, career path pressures)
- Be sensitive to mental health stigma and family involvement considerations

COMPANION DELIVERY STYLE:
- Use warm, friend-like tone while maintaining professional boundaries
- Match user's language comfort level (if they use \"yaar/bhai\", mirror appropriately)
- Be empathetic and non-judgmental, like talking to a caring friend who understands psychology
- Validate cultural struggles without dismissing traditional values
- Ask thoughtful questions (if needed) that promote self-exploration
- Provide practical coping strategies suitable for Indian family/social context

IMPORTANT: Generate ONLY the natural conversation response. Do NOT include:
- Numbered annotations (1., 2., 3.)
- Technique labels in parentheses (CBT), (ACT), (MBCT)
- Structural annotations (validation), (reframe), (strategy)
- Any meta-commentary about the response structure

Don't be rigid in response structure; blend elements naturally.
Keep responses conversational and appropriately sized for the context.
For normal chats keep it concise for 2-way communication, but provide deeper responses when user needs more support.
";

/// Second model stage: the companion's natural-language reply.
pub struct ResponseStage {
    model: Arc<dyn LanguageModel>,
}

impl ResponseStage {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn respond(&self, state: &WorkflowState) -> Result<String, WorkflowError> {
        let analysis = state
            .analysis
            .as_ref()
            .ok_or(WorkflowError::MissingAnalysis)?;

        let messages = vec![
            Message::system(COMPANION_SYSTEM_PROMPT),
            Message::user(build_response_prompt(state, analysis)),
        ];
        let raw = self.model.generate(messages).await?;
        if raw.trim().is_empty() {
            return Err(WorkflowError::EmptyModelResponse);
        }

        Ok(clean_response(&raw))
    }
}

pub fn build_response_prompt(state: &WorkflowState, analysis: &AnalysisResult) -> String {
    let analysis_json = serde_json::to_string_pretty(analysis).unwrap_or_default();
    let context = format_response_context(&state.history, &state.user_message);
    let voice = state
        .voice
        .as_ref()
        .filter(|v| !v.is_empty())
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .map(|json| format!("\nVOICE ANALYSIS INSIGHTS:\n{}\n", json))
        .unwrap_or_default();

    format!(
        "PSYCHOLOGICAL ANALYSIS:\n{}\n\n\
         CONVERSATION CONTEXT:\n{}{}\n\n\
         USER'S CURRENT MESSAGE: \"{}\"\n\n\
         Generate a completely natural, conversational response as MindMate.",
        analysis_json, context, voice, state.user_message
    )
}

/// Strip wrapping artifacts models sometimes add around a plain reply: one
/// layer of quotes, or a JSON envelope with a `content` field.
pub fn clean_response(raw: &str) -> String {
    let mut text = raw.trim();

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = &text[1..text.len() - 1];
    }

    if text.starts_with('{') || text.starts_with('[') {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(serde_json::Value::Object(map)) => {
                if let Some(content) = map.get("content") {
                    let content = match content {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    return content.trim().to_string();
                }
            }
            Ok(serde_json::Value::String(s)) => return s.trim().to_string(),
            _ => {}
        }
    }

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;
    use crate::workflow::types::{ChatTurn, VoiceAnalysis};

    fn analysed_state(message: &str) -> WorkflowState {
        let mut state = WorkflowState::new(message, "u1");
        state.analysis = Some(AnalysisResult {
            emotional_state: "anxious".to_string(),
            therapeutic_approach: "ACT".to_string(),
            ..Default::default()
        });
        state
    }

    #[test]
    fn clean_response_strips_quotes_and_envelopes() {
        assert_eq!(clean_response("  \"hello\"  "), "hello");
        assert_eq!(clean_response(r#"{"content": "hi there"}"#), "hi there");
        assert_eq!(clean_response("not json at all"), "not json at all");
        assert_eq!(clean_response("{not json"), "{not json");
        assert_eq!(clean_response(r#"{"reply": "x"}"#), r#"{"reply": "x"}"#);
        assert_eq!(clean_response("\""), "\"");
    }

    #[test]
    fn clean_response_is_idempotent_on_plain_text() {
        let once = clean_response("Take a slow breath with me.");
        assert_eq!(clean_response(&once), once);
    }

    #[test]
    fn prompt_has_sections_in_order() {
        let mut state = analysed_state("I feel stuck");
        state.history = vec![ChatTurn::user("hey"), ChatTurn::assistant("hi!")];
        state.voice = Some(VoiceAnalysis {
            emotional_tone: Some("flat".to_string()),
            ..Default::default()
        });
        let analysis = state.analysis.clone().unwrap();
        let prompt = build_response_prompt(&state, &analysis);

        let a = prompt.find("PSYCHOLOGICAL ANALYSIS:").unwrap();
        let c = prompt.find("CONVERSATION CONTEXT:").unwrap();
        let v = prompt.find("VOICE ANALYSIS INSIGHTS:").unwrap();
        let m = prompt.find("USER'S CURRENT MESSAGE: \"I feel stuck\"").unwrap();
        assert!(a < c && c < v && v < m);
        assert!(prompt.contains("User (current): I feel stuck"));
        assert!(prompt.contains("\"therapeutic_approach\": \"ACT\""));
    }

    #[tokio::test]
    async fn respond_uses_system_prompt_and_cleans() {
        let model = Arc::new(ScriptedModel::new());
        model.push_text("\"Hey, that sounds exhausting.\"");
        let stage = ResponseStage::new(model.clone());

        let reply = stage.respond(&analysed_state("so tired")).await.unwrap();
        assert_eq!(reply, "Hey, that sounds exhausting.");

        let calls = model.free_form_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, "system");
        assert!(calls[0][0].content.starts_with("You are MindMate"));
    }

    #[tokio::test]
    async fn respond_requires_analysis() {
        let model = Arc::new(ScriptedModel::new());
        let stage = ResponseStage::new(model.clone());

        let error = stage
            .respond(&WorkflowState::new("hi", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::MissingAnalysis));
        assert!(model.free_form_calls().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let model = Arc::new(ScriptedModel::new());
        model.push_text_error("connection reset");
        let stage = ResponseStage::new(model);

        let error = stage.respond(&analysed_state("hi")).await.unwrap_err();
        assert!(matches!(error, WorkflowError::Model(_)));
        assert!(error.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn blank_model_output_is_an_error() {
        let model = Arc::new(ScriptedModel::new());
        model.push_text("   ");
        let stage = ResponseStage::new(model);

        let error = stage.respond(&analysed_state("hi")).await.unwrap_err();
        assert!(matches!(error, WorkflowError::EmptyModelResponse));
    }
}

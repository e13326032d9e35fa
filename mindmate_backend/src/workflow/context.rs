//! Pure text shaping of conversation history, activities and voice signals
//! into bounded prompt blocks. Nothing here fails or keeps state.

use super::types::{ActivityRecord, ChatTurn, ConversationSummary, VoiceAnalysis};

pub const ANALYSIS_TURN_LIMIT: usize = 5;
pub const ANALYSIS_TURN_CHARS: usize = 80;
pub const SUMMARY_FIELD_CHARS: usize = 100;
pub const RESPONSE_TURN_LIMIT: usize = 3;
pub const RESPONSE_TURN_CHARS: usize = 100;
pub const ACTIVITY_LIMIT: usize = 2;
const TIMESTAMP_CHARS: usize = 16;

/// Cut `text` to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// The trailing `n` items of a slice (all of them when shorter).
pub fn last_n<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// Compact block for the analysis prompt: a condensed summary line followed by
/// the last few turns, each cut short.
pub fn format_analysis_context(
    history: &[ChatTurn],
    summary: Option<&ConversationSummary>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(summary) = summary.filter(|s| !s.is_empty()) {
        parts.push(format!(
            "SUMMARY: Progress: {}... | Patterns: {}... | Culture: {}...",
            truncate_chars(&summary.therapeutic_progress, SUMMARY_FIELD_CHARS),
            truncate_chars(&summary.emotional_patterns, SUMMARY_FIELD_CHARS),
            truncate_chars(&summary.cultural_context, SUMMARY_FIELD_CHARS),
        ));
    }

    let recent = last_n(history, ANALYSIS_TURN_LIMIT);
    if !recent.is_empty() {
        parts.push("RECENT:".to_string());
        for turn in recent {
            let speaker = if turn.is_user() { "User" } else { "AI" };
            parts.push(format!(
                "{}: {}",
                speaker,
                truncate_chars(&turn.content, ANALYSIS_TURN_CHARS)
            ));
        }
    }

    if parts.is_empty() {
        "New conversation".to_string()
    } else {
        parts.join("\n")
    }
}

pub fn format_activities(activities: &[ActivityRecord]) -> String {
    if activities.is_empty() {
        return "No recent activities".to_string();
    }

    activities
        .iter()
        .take(ACTIVITY_LIMIT)
        .map(|activity| {
            let name = if activity.activity_type.trim().is_empty() {
                "Unknown".to_string()
            } else {
                activity.activity_type.replace('_', " ")
            };
            let score = activity
                .score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            format!("{}: {}", name, score)
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Block for the response prompt: the last few turns plus the raw current
/// message, always last.
pub fn format_response_context(history: &[ChatTurn], current_message: &str) -> String {
    let recent = last_n(history, RESPONSE_TURN_LIMIT);
    if recent.is_empty() {
        return format!("User's message: '{}' (New conversation)", current_message);
    }

    let mut parts: Vec<String> = recent
        .iter()
        .map(|turn| {
            format!(
                "{}: {}",
                speaker_label(turn),
                truncate_chars(&turn.content, RESPONSE_TURN_CHARS)
            )
        })
        .collect();
    parts.push(format!("User (current): {}", current_message));
    parts.join("\n")
}

/// The whole history, verbatim. Only used off the request path, so nothing is
/// cut except the timestamp, which is shortened to minute precision.
pub fn format_full_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return "No conversation to summarize".to_string();
    }

    history
        .iter()
        .enumerate()
        .map(|(idx, turn)| {
            let stamp = match turn.timestamp.as_deref().filter(|t| !t.is_empty()) {
                Some(ts) => truncate_chars(ts, TIMESTAMP_CHARS).to_string(),
                None => format!("Message {}", idx + 1),
            };
            format!("{} {}: {}", stamp, speaker_label(turn), turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Voice signal lines for the analysis prompt. Missing values render as `N/A`.
pub fn format_voice_signal(voice: &VoiceAnalysis) -> String {
    let cultural = match &voice.cultural_context {
        Some(serde_json::Value::String(label)) => label.clone(),
        Some(serde_json::Value::Null) | None => "N/A".to_string(),
        Some(other) => other.to_string(),
    };
    format!(
        "VOICE ANALYSIS DATA:\n\
         - Emotional tone: {}\n\
         - Stress level: {}\n\
         - Speech pace: {}\n\
         - Cultural context: {}\n\
         - Voice insights: {}",
        voice.emotional_tone.as_deref().unwrap_or("N/A"),
        voice.stress_level.as_deref().unwrap_or("N/A"),
        voice.speech_pace.as_deref().unwrap_or("N/A"),
        cultural,
        if voice.insights.is_empty() {
            "none".to_string()
        } else {
            voice.insights.join("; ")
        }
    )
}

fn speaker_label(turn: &ChatTurn) -> &'static str {
    if turn.is_user() {
        "User"
    } else {
        "MindMate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> Vec<ChatTurn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("user message {}", i))
                } else {
                    ChatTurn::assistant(format!("reply {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("नमस्ते दोस्त", 3), "नमस");
        assert_eq!(truncate_chars("short", 80), "short");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn analysis_context_for_new_conversation() {
        assert_eq!(format_analysis_context(&[], None), "New conversation");
        let empty = ConversationSummary::default();
        assert_eq!(format_analysis_context(&[], Some(&empty)), "New conversation");
    }

    #[test]
    fn analysis_context_keeps_last_five_turns_cut_to_eighty_chars() {
        let mut turns = history(7);
        turns.push(ChatTurn::user("x".repeat(200)));

        let block = format_analysis_context(&turns, None);
        let lines: Vec<&str> = block.lines().collect();

        assert_eq!(lines[0], "RECENT:");
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "AI: reply 3");
        assert_eq!(lines[5], format!("User: {}", "x".repeat(80)));
    }

    #[test]
    fn analysis_context_prepends_condensed_summary() {
        let summary = ConversationSummary {
            therapeutic_progress: "p".repeat(150),
            emotional_patterns: "evening anxiety".to_string(),
            cultural_context: "joint family".to_string(),
            ..Default::default()
        };

        let block = format_analysis_context(&history(1), Some(&summary));
        let first = block.lines().next().unwrap();
        assert_eq!(
            first,
            format!(
                "SUMMARY: Progress: {}... | Patterns: evening anxiety... | Culture: joint family...",
                "p".repeat(100)
            )
        );
        assert!(block.ends_with("User: user message 0"));
    }

    #[test]
    fn response_context_appends_current_message_last() {
        let block = format_response_context(&history(5), "I can't sleep");
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "User: user message 2");
        assert_eq!(lines[1], "MindMate: reply 3");
        assert_eq!(lines[3], "User (current): I can't sleep");
    }

    #[test]
    fn response_context_without_history() {
        assert_eq!(
            format_response_context(&[], "hello"),
            "User's message: 'hello' (New conversation)"
        );
    }

    #[test]
    fn full_history_is_verbatim() {
        let long = "y".repeat(500);
        let turns = vec![
            ChatTurn::user(long.clone()).with_timestamp("2024-03-05T10:30:59.123Z"),
            ChatTurn::assistant("take a breath"),
        ];
        let block = format_full_history(&turns);
        assert_eq!(
            block,
            format!(
                "2024-03-05T10:30 User: {}\nMessage 2 MindMate: take a breath",
                long
            )
        );
        assert_eq!(format_full_history(&[]), "No conversation to summarize");
    }

    #[test]
    fn activities_show_first_two() {
        let activities = vec![
            ActivityRecord {
                activity_type: "memory_game".to_string(),
                score: Some(85.0),
            },
            ActivityRecord {
                activity_type: String::new(),
                score: None,
            },
            ActivityRecord {
                activity_type: "mood_mountain".to_string(),
                score: Some(3.5),
            },
        ];
        assert_eq!(format_activities(&activities), "memory game: 85 | Unknown: N/A");
        assert_eq!(format_activities(&[]), "No recent activities");
    }

    #[test]
    fn voice_signal_renders_missing_values() {
        let voice = VoiceAnalysis {
            emotional_tone: Some("anxious".to_string()),
            cultural_context: Some(serde_json::json!({"code_switching": true})),
            insights: vec!["fast breathing".to_string()],
            ..Default::default()
        };
        let block = format_voice_signal(&voice);
        assert!(block.contains("- Emotional tone: anxious"));
        assert!(block.contains("- Stress level: N/A"));
        assert!(block.contains(r#"- Cultural context: {"code_switching":true}"#));
        assert!(block.contains("- Voice insights: fast breathing"));
    }

    #[test]
    fn formatting_is_repeatable() {
        let turns = history(9);
        let summary = ConversationSummary {
            emotional_patterns: "exam dread".to_string(),
            ..Default::default()
        };
        assert_eq!(
            format_analysis_context(&turns, Some(&summary)),
            format_analysis_context(&turns, Some(&summary))
        );
        assert_eq!(
            format_response_context(&turns, "ok"),
            format_response_context(&turns, "ok")
        );
        assert_eq!(format_full_history(&turns), format_full_history(&turns));
    }
}

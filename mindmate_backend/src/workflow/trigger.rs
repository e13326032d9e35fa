use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::config::SummarizationConfig;

use super::types::ChatTurn;

/// Decides, per user, whether the conversation has grown enough since the last
/// summarization pass to warrant another one.
pub struct SummarizationTrigger {
    thresholds: SummarizationConfig,
    last_counts: Mutex<HashMap<String, usize>>,
}

impl SummarizationTrigger {
    pub fn new(thresholds: SummarizationConfig) -> Self {
        Self {
            thresholds,
            last_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate the thresholds and, on a positive decision, record the current
    /// count before returning. Check and record happen under one lock, so two
    /// concurrent requests for the same user cannot both fire.
    pub fn should_trigger(&self, user_id: &str, history: &[ChatTurn]) -> bool {
        let count = history.len();
        let total_chars: usize = history.iter().map(|t| t.content.chars().count()).sum();

        let mut last_counts = self
            .last_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = last_counts.get(user_id).copied().unwrap_or(0);
        // A shorter history than last time (client reset) counts as no growth
        let increase = count.saturating_sub(previous);

        let fire = meets_thresholds(&self.thresholds, increase, count, total_chars);
        if fire {
            last_counts.insert(user_id.to_string(), count);
        }
        fire
    }

    /// Message count recorded at the last positive decision, if any.
    pub fn last_count(&self, user_id: &str) -> Option<usize> {
        self.last_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .copied()
    }
}

pub fn meets_thresholds(
    thresholds: &SummarizationConfig,
    increase: usize,
    count: usize,
    total_chars: usize,
) -> bool {
    let by_count =
        increase >= thresholds.min_new_messages && count > thresholds.min_total_messages;
    let by_length = total_chars > thresholds.char_threshold
        && increase >= thresholds.min_new_messages_for_length;
    by_count || by_length
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize, chars_each: usize) -> Vec<ChatTurn> {
        (0..n).map(|_| ChatTurn::user("a".repeat(chars_each))).collect()
    }

    #[test]
    fn count_rule_boundaries() {
        let cfg = SummarizationConfig::default();
        assert!(meets_thresholds(&cfg, 10, 16, 0));
        assert!(!meets_thresholds(&cfg, 10, 15, 0));
        assert!(!meets_thresholds(&cfg, 9, 40, 0));
    }

    #[test]
    fn length_rule_boundaries() {
        let cfg = SummarizationConfig::default();
        assert!(meets_thresholds(&cfg, 5, 6, 3001));
        assert!(!meets_thresholds(&cfg, 5, 6, 3000));
        assert!(!meets_thresholds(&cfg, 4, 6, 9000));
    }

    #[test]
    fn first_long_conversation_fires_and_records() {
        let trigger = SummarizationTrigger::new(SummarizationConfig::default());
        assert!(trigger.should_trigger("u1", &turns(16, 10)));
        assert_eq!(trigger.last_count("u1"), Some(16));
    }

    #[test]
    fn debounces_until_enough_new_messages() {
        let trigger = SummarizationTrigger::new(SummarizationConfig::default());
        assert!(trigger.should_trigger("u1", &turns(16, 10)));
        assert!(!trigger.should_trigger("u1", &turns(16, 10)));
        assert!(!trigger.should_trigger("u1", &turns(25, 10)));
        assert!(trigger.should_trigger("u1", &turns(26, 10)));
        assert_eq!(trigger.last_count("u1"), Some(26));
    }

    #[test]
    fn negative_decision_records_nothing() {
        let trigger = SummarizationTrigger::new(SummarizationConfig::default());
        assert!(!trigger.should_trigger("u1", &turns(5, 10)));
        assert_eq!(trigger.last_count("u1"), None);
    }

    #[test]
    fn shrinking_history_does_not_fire() {
        let trigger = SummarizationTrigger::new(SummarizationConfig::default());
        assert!(trigger.should_trigger("u1", &turns(30, 10)));
        assert!(!trigger.should_trigger("u1", &turns(20, 400)));
    }

    #[test]
    fn users_are_tracked_independently() {
        let trigger = SummarizationTrigger::new(SummarizationConfig::default());
        assert!(trigger.should_trigger("u1", &turns(16, 10)));
        assert!(trigger.should_trigger("u2", &turns(16, 10)));
    }

    #[test]
    fn length_rule_fires_on_short_but_wordy_history() {
        let trigger = SummarizationTrigger::new(SummarizationConfig::default());
        assert!(trigger.should_trigger("u1", &turns(6, 600)));
    }
}

//! Prompt construction for artifact generation.

use crate::journal::HistoryRecord;
use crate::session::{ConversationTurn, TurnRole};

/// Default task description: propose the next workout.
pub const WORKOUT_PLAN_TASK: &str = r#"You are a strength coach. Propose the user's next workout as an ordered list of exercises.
For each exercise give the load (or duration in seconds for timed holds) as the primary quantity and the repetitions as the secondary quantity.
Omit the secondary quantity for exercises that have no repetitions."#;

/// Strict output format directive appended to every prompt.
pub const OUTPUT_FORMAT_DIRECTIVE: &str = r#"## Output format
Respond with ONLY a JSON object of this exact shape, with no additional text or markdown formatting:
{"items": [{"name": "<exercise name>", "primary": <number>, "secondary": <number, optional>}]}
Every item must have a non-empty name and a numeric primary value."#;

/// Instruction added when recent history is available.
pub const PROGRESSION_DIRECTIVE: &str = "Base the proposal on the history above. Prefer a small progressive improvement over the most recent values rather than repeating them or jumping ahead.";

/// Maximum conversation turns included in a prompt.
pub const MAX_PROMPT_TURNS: usize = 6;

/// Task text for one kind of generation workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptProfile {
    pub task: String,
}

impl PromptProfile {
    pub fn workout_plan() -> Self {
        Self {
            task: WORKOUT_PLAN_TASK.to_string(),
        }
    }

    pub fn with_task(task: impl Into<String>) -> Self {
        Self { task: task.into() }
    }
}

impl Default for PromptProfile {
    fn default() -> Self {
        Self::workout_plan()
    }
}

/// Everything a generation step knows about the session.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// Recent historical records, most recent first. May be empty.
    pub records: Vec<HistoryRecord>,
    /// Advisory conversation log, oldest first.
    pub conversation: Vec<ConversationTurn>,
}

impl GenerationContext {
    pub fn new(records: Vec<HistoryRecord>, conversation: Vec<ConversationTurn>) -> Self {
        Self {
            records,
            conversation,
        }
    }

    /// Number of rejections recorded in the conversation.
    pub fn rejections(&self) -> usize {
        self.conversation
            .iter()
            .filter(|turn| turn.role == TurnRole::User && turn.content.starts_with(REJECTION_PREFIX))
            .count()
    }
}

/// Prefix of the user turn recorded for a rejection.
pub const REJECTION_PREFIX: &str = "Rejected";

/// Build the single instruction sent to the generation service.
pub fn build_prompt(profile: &PromptProfile, context: &GenerationContext) -> String {
    let mut sections = vec![profile.task.trim().to_string(), OUTPUT_FORMAT_DIRECTIVE.to_string()];

    if !context.records.is_empty() {
        let history = context
            .records
            .iter()
            .map(|record| {
                let items = record
                    .items
                    .iter()
                    .map(|item| item.describe())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {}: {}", record.date, items)
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "## Recent history (most recent first)\n{}\n\n{}",
            history, PROGRESSION_DIRECTIVE
        ));
    }

    if !context.conversation.is_empty() {
        let skip = context.conversation.len().saturating_sub(MAX_PROMPT_TURNS);
        let turns = context.conversation[skip..]
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "coach",
                };
                format!("{}: {}", role, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "## Conversation so far\n{}\n\nDo not repeat a proposal the user rejected.",
            turns
        ));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactItem;
    use chrono::NaiveDate;

    fn record(day: u32, items: Vec<ArtifactItem>) -> HistoryRecord {
        HistoryRecord {
            id: day as i64,
            date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            items,
        }
    }

    #[test]
    fn empty_context_has_task_and_format_only() {
        let prompt = build_prompt(&PromptProfile::workout_plan(), &GenerationContext::default());
        assert!(prompt.starts_with("You are a strength coach."));
        assert!(prompt.contains(OUTPUT_FORMAT_DIRECTIVE));
        assert!(!prompt.contains("Recent history"));
        assert!(!prompt.contains(PROGRESSION_DIRECTIVE));
    }

    #[test]
    fn history_is_summarized_with_progression_directive() {
        let context = GenerationContext::new(
            vec![
                record(2, vec![ArtifactItem::new("Squat", 102.5, Some(5.0))]),
                record(1, vec![ArtifactItem::new("Squat", 100.0, Some(5.0))]),
            ],
            vec![],
        );
        let prompt = build_prompt(&PromptProfile::workout_plan(), &context);

        assert!(prompt.contains("- 2026-10-02: Squat 102.5 x 5"));
        assert!(prompt.contains("- 2026-10-01: Squat 100 x 5"));
        assert!(prompt.contains(PROGRESSION_DIRECTIVE));
        let newest = prompt.find("2026-10-02").unwrap();
        let oldest = prompt.find("2026-10-01").unwrap();
        assert!(newest < oldest, "order preserved");
    }

    #[test]
    fn conversation_is_truncated_to_latest_turns() {
        let conversation: Vec<_> = (0..10)
            .map(|i| ConversationTurn::user(format!("turn {}", i)))
            .collect();
        let context = GenerationContext::new(vec![], conversation);
        let prompt = build_prompt(&PromptProfile::workout_plan(), &context);

        assert!(!prompt.contains("turn 3"));
        assert!(prompt.contains("turn 4"));
        assert!(prompt.contains("user: turn 9"));
    }

    #[test]
    fn custom_task_replaces_default() {
        let profile = PromptProfile::with_task("Suggest a mobility routine.");
        let prompt = build_prompt(&profile, &GenerationContext::default());
        assert!(prompt.starts_with("Suggest a mobility routine."));
        assert!(prompt.contains(OUTPUT_FORMAT_DIRECTIVE));
    }

    #[test]
    fn rejections_are_counted_from_user_turns() {
        let context = GenerationContext::new(
            vec![],
            vec![
                ConversationTurn::user("Leg day please"),
                ConversationTurn::assistant("Squat 100 x 5"),
                ConversationTurn::user(format!("{} the proposal", REJECTION_PREFIX)),
                ConversationTurn::assistant("Squat 95 x 6"),
                ConversationTurn::user(format!("{} the proposal", REJECTION_PREFIX)),
            ],
        );
        assert_eq!(context.rejections(), 2);
    }
}

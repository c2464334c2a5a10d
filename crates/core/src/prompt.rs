use crate::ConversationTurn;

/// Sentence the model is told to answer with when the context lacks the answer.
pub const REFUSAL_SENTENCE: &str =
    "Based on the provided documents, I cannot answer this question.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub fn format_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_rewrite_prompt(query: &str, history: &[ConversationTurn]) -> String {
    format!(
        "Given the conversation history and the new question, rewrite the new question \
as a **standalone, specific question** suited for semantic search. \
Reply with the rewritten question only.

HISTORY:
{history}

NEW QUESTION: {query}

REWRITTEN QUESTION:",
        history = format_history(history),
    )
}

pub fn build_augmented_prompt(
    original_query: &str,
    sources: &[String],
    history: &[ConversationTurn],
) -> String {
    format!(
        "
You are a precise expert assistant. Your task is to answer the user's question.

**Rules:**
1.  Answer **exclusively** from the **DOCUMENT CONTEXT** below.
2.  Use the **CONVERSATION HISTORY** only to resolve follow-up questions \
(e.g. \"and what about it?\").
3.  Do not use any prior knowledge that is not in the context.

**DOCUMENT CONTEXT:**
---
{context}
---

**CONVERSATION HISTORY:**
{history}

**CURRENT QUESTION:**
{original_query}

If the answer is not contained in the context, say exactly: \"{REFUSAL_SENTENCE}\"
",
        context = sources.join(CONTEXT_SEPARATOR),
        history = format_history(history),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("Who makes the P-200 pump?"),
            ConversationTurn::model("Acme Hydraulics."),
        ]
    }

    #[test]
    fn augmented_prompt_carries_context_history_and_refusal_rule() {
        let sources = vec![
            "P-200 max pressure is 200 bar.".to_string(),
            "Service every 500h.".to_string(),
        ];
        let prompt = build_augmented_prompt("What is its max pressure?", &sources, &history());

        assert!(prompt.contains("P-200 max pressure is 200 bar.\n\n---\n\nService every 500h."));
        assert!(prompt.contains("user: Who makes the P-200 pump?\nmodel: Acme Hydraulics."));
        assert!(prompt.contains("**CURRENT QUESTION:**\nWhat is its max pressure?"));
        assert!(prompt.contains(&format!("say exactly: \"{REFUSAL_SENTENCE}\"")));
        assert!(prompt.contains("exclusively"));
    }

    #[test]
    fn augmented_prompt_is_deterministic() {
        let sources = vec!["a".to_string()];
        assert_eq!(
            build_augmented_prompt("q", &sources, &history()),
            build_augmented_prompt("q", &sources, &history())
        );
    }

    #[test]
    fn augmented_prompt_without_sources_still_has_refusal_rule() {
        let prompt = build_augmented_prompt("q", &[], &[]);
        assert!(prompt.contains(REFUSAL_SENTENCE));
    }

    #[test]
    fn rewrite_prompt_embeds_history_and_question() {
        let prompt = build_rewrite_prompt("What is its max pressure?", &history());
        assert!(prompt.contains("HISTORY:\nuser: Who makes the P-200 pump?"));
        assert!(prompt.contains("NEW QUESTION: What is its max pressure?"));
        assert!(prompt.ends_with("REWRITTEN QUESTION:"));
    }
}

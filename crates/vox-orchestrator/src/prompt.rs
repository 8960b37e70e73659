use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Generic,
    Support,
    Tutor,
}

impl Persona {
    fn template(self) -> &'static str {
        match self {
            Persona::Generic => "You are a helpful voice assistant. Keep replies concise and natural to speak aloud.",
            Persona::Support => {
                "You are a calm, patient customer support agent. Acknowledge the caller's issue before \
                 offering a solution, and ask a clarifying question when the request is ambiguous."
            }
            Persona::Tutor => {
                "You are a friendly tutor. Explain concepts step by step, check understanding with short \
                 questions, and avoid jargon the learner hasn't used themselves."
            }
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Persona::Generic
    }
}

/// Pure composition of a chat turn's system prompt. No I/O, no randomness —
/// same inputs always produce the same string, which is what keeps the
/// orchestrator's cache-hit contract honest.
pub fn build(
    user_message: &str,
    conversation_context: Option<&str>,
    rag_context: Option<&str>,
    persona: Persona,
) -> String {
    let mut out = String::from(persona.template());

    if let Some(rag) = rag_context {
        if !rag.trim().is_empty() {
            out.push_str("\n\nContext:\n");
            out.push_str(rag.trim());
        }
    }

    if let Some(history) = conversation_context {
        if !history.trim().is_empty() {
            out.push_str("\n\nConversation History:\n");
            out.push_str(history.trim_end());
        }
    }

    out.push_str(&format!("\n\nUser: {}\nAssistant:", user_message));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_prompt_has_persona_and_user_turn() {
        let out = build("hi there", None, None, Persona::Generic);
        assert!(out.starts_with(Persona::Generic.template()));
        assert!(out.ends_with("User: hi there\nAssistant:"));
        assert!(!out.contains("Context:"));
        assert!(!out.contains("Conversation History:"));
    }

    #[test]
    fn empty_rag_and_history_are_omitted() {
        let out = build("hi", Some("   "), Some(""), Persona::Generic);
        assert!(!out.contains("Context:"));
        assert!(!out.contains("Conversation History:"));
    }

    #[test]
    fn composition_order_is_persona_then_rag_then_history_then_user() {
        let out = build("question", Some("User: earlier\n"), Some("fact one"), Persona::Support);
        let rag_pos = out.find("Context:").unwrap();
        let history_pos = out.find("Conversation History:").unwrap();
        let user_pos = out.find("User: question").unwrap();
        assert!(rag_pos < history_pos);
        assert!(history_pos < user_pos);
    }

    #[test]
    fn persona_selects_distinct_templates() {
        assert_ne!(Persona::Generic.template(), Persona::Support.template());
        assert_ne!(Persona::Support.template(), Persona::Tutor.template());
    }
}
